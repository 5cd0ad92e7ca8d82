pub mod domain;
pub mod error;
pub mod infra;
pub mod planner;
pub mod ports;
pub mod service;
pub mod worker;

pub use error::{DomainError, MaxRetriesExceeded};
