use thiserror::Error;
use uuid::Uuid;

/// Taxonomy from the error-handling design: invariant violations, not-found,
/// missing preconditions, and lock contention. Executor/deadline/retry
/// failures surface as task-status transitions instead of error values.
#[derive(Debug, Error)]
pub enum DomainError {
    #[error("invalid state transition: {entity} {id} cannot go {from} -> {to}")]
    InvalidStateTransition {
        entity: &'static str,
        id: Uuid,
        from: String,
        to: String,
    },

    #[error("{entity} {id} not found")]
    NotFound { entity: &'static str, id: Uuid },

    #[error("precondition missing: {0}")]
    PreconditionMissing(String),

    #[error("could not acquire lock {resource_id}")]
    LockContention { resource_id: String },
}

#[derive(Debug, Error)]
#[error("task {task_id} has exhausted its {max_attempts} attempts")]
pub struct MaxRetriesExceeded {
    pub task_id: Uuid,
    pub max_attempts: u32,
}
