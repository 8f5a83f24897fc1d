pub mod backup;
pub mod checkpoint;
pub mod config;
pub mod error;
pub mod executor;
pub mod planner;
pub mod prompt;
pub mod report;
pub mod retention;
pub mod storage;

pub use error::{Error, Result};
