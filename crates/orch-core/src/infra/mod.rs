pub mod memory;
pub mod postgres;
pub mod rate_limit;

pub use memory::{
    InMemoryDeploymentRepository, InMemoryDriftReportRepository, InMemoryLock, InMemoryTaskRepository,
};
pub use postgres::{PostgresDeploymentRepository, PostgresDriftReportRepository, PostgresLock, PostgresTaskRepository};
pub use rate_limit::RateLimiter;
