//! Admin lock gating protected entities.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{watch, Mutex, RwLock};
use tokio::task::JoinHandle;

use crate::error::DeviceError;

/// How long an unlock lasts before the lock re-arms itself.
const RELOCK_TIMEOUT: Duration = Duration::from_secs(60);

/// Observable lock state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LockState {
    pub locked: bool,
    pub open: bool,
}

/// Credential-gated lock that protects configuration entities.
///
/// While locked, protected entities (the security panel) are read-only;
/// the protection state is broadcast over a watch channel. An unlock
/// arms a single-slot auto-relock timer; arming always cancels any
/// previously armed timer first, so timers never stack.
pub struct AdminLock {
    name: String,
    credential: String,
    relock_timeout: Duration,
    state: RwLock<LockState>,
    protection: watch::Sender<bool>,
    relock_task: Mutex<Option<JoinHandle<()>>>,
}

impl AdminLock {
    /// A new lock, initially locked, with the default relock timeout.
    pub fn new(name: impl Into<String>, credential: impl Into<String>) -> Arc<Self> {
        Self::with_relock_timeout(name, credential, RELOCK_TIMEOUT)
    }

    pub fn with_relock_timeout(
        name: impl Into<String>,
        credential: impl Into<String>,
        relock_timeout: Duration,
    ) -> Arc<Self> {
        let (protection, _) = watch::channel(true);
        Arc::new(Self {
            name: name.into(),
            credential: credential.into(),
            relock_timeout,
            state: RwLock::new(LockState {
                locked: true,
                open: false,
            }),
            protection,
            relock_task: Mutex::new(None),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Watch the protection state: `true` while protected entities
    /// must stay read-only.
    pub fn protection_watch(&self) -> watch::Receiver<bool> {
        self.protection.subscribe()
    }

    pub async fn state(&self) -> LockState {
        *self.state.read().await
    }

    pub async fn is_locked(&self) -> bool {
        self.state.read().await.locked
    }

    /// Lock and protect. Rejected without mutating state on a wrong
    /// credential.
    pub async fn lock(&self, code: &str) -> Result<(), DeviceError> {
        self.verify(code)?;
        self.engage().await;
        Ok(())
    }

    /// Unlock, unprotect, and arm the auto-relock timer.
    pub async fn unlock(self: &Arc<Self>, code: &str) -> Result<(), DeviceError> {
        self.verify(code)?;
        {
            let mut state = self.state.write().await;
            state.locked = false;
        }
        let _ = self.protection.send(false);
        self.arm_relock().await;
        Ok(())
    }

    /// Momentarily open the latch.
    pub async fn open(&self, code: &str) -> Result<(), DeviceError> {
        self.verify(code)?;
        self.state.write().await.open = true;
        Ok(())
    }

    fn verify(&self, code: &str) -> Result<(), DeviceError> {
        if code == self.credential {
            Ok(())
        } else {
            tracing::warn!(name = %self.name, "rejected lock operation: wrong credential");
            Err(DeviceError::InvalidCredential)
        }
    }

    async fn engage(&self) {
        {
            let mut state = self.state.write().await;
            state.locked = true;
            state.open = false;
        }
        let _ = self.protection.send(true);
    }

    /// Cancel-then-reschedule: a new unlock always replaces any armed
    /// timer, never queues a second one.
    async fn arm_relock(self: &Arc<Self>) {
        let this = Arc::clone(self);
        let mut slot = self.relock_task.lock().await;
        if let Some(previous) = slot.take() {
            previous.abort();
        }
        *slot = Some(tokio::spawn(async move {
            tokio::time::sleep(this.relock_timeout).await;
            tracing::debug!(name = %this.name, "auto-relock elapsed");
            this.engage().await;
        }));
    }
}
