use async_trait::async_trait;

/// Cross-instance mutual exclusion, keyed by string resource id. Acquire is
/// try-once and non-blocking. Release is a safe CAS-delete: it must only
/// delete a key whose stored token matches the one issued at acquire time,
/// so a caller can never release a lock it doesn't hold. Locks are
/// advisory — callers must acquire before computing the invariants a lock
/// protects.
#[async_trait]
pub trait Lock: Send + Sync {
    /// Returns `true` and holds the lock if acquired, `false` if already held.
    async fn acquire(&self, resource_id: &str, ttl_seconds: u64) -> anyhow::Result<bool>;
    async fn release(&self, resource_id: &str) -> anyhow::Result<bool>;
    async fn extend(&self, resource_id: &str, ttl_seconds: u64) -> anyhow::Result<bool>;
    async fn is_locked(&self, resource_id: &str) -> anyhow::Result<bool>;
}

const _: () = {
    fn _assert_object_safe(_: &dyn Lock) {}
};

/// Scoped handle for a held lock. Callers must `release` explicitly on every
/// exit path (including error paths) since async `Drop` cannot run the
/// network call that release requires.
pub struct LockGuard<'a> {
    lock: &'a dyn Lock,
    resource_id: String,
}

impl<'a> LockGuard<'a> {
    pub fn new(lock: &'a dyn Lock, resource_id: impl Into<String>) -> Self {
        Self {
            lock,
            resource_id: resource_id.into(),
        }
    }

    pub async fn release(self) -> anyhow::Result<bool> {
        self.lock.release(&self.resource_id).await
    }
}
