pub mod candidate;
pub mod driver;
pub mod reservation;
