pub mod setting;
pub mod logger;
pub mod error;
