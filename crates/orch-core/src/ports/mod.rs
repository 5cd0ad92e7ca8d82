pub mod detector;
pub mod event_sink;
pub mod executor;
pub mod lock;
pub mod repository;

pub use detector::DriftDetector;
pub use event_sink::{EventSink, LoggingEventSink};
pub use executor::Executor;
pub use lock::{Lock, LockGuard};
pub use repository::{DeploymentRepository, DriftReportRepository, TaskRepository};
