pub mod health;
pub mod storage;
pub mod uploads;
