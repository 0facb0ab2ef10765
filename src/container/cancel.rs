use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError, Weak};

/// Something that can release its container from another thread.
pub(crate) trait Teardown: Send + Sync {
    fn teardown(&self);
}

#[derive(Default)]
struct Inner {
    cancelled: AtomicBool,
    sessions: Mutex<Vec<Weak<dyn Teardown>>>,
}

/// Cooperative cancellation shared between a session and a signal handler.
///
/// Cancelling tears down every attached session that is still alive and makes
/// launches in progress kill their container on the next poll tick.
#[derive(Clone, Default)]
pub struct CancelToken(Arc<Inner>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    /// Signal cancellation and release attached sessions. Idempotent.
    pub fn cancel(&self) {
        self.0.cancelled.store(true, Ordering::Release);
        let sessions: Vec<_> = self
            .0
            .sessions
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .drain(..)
            .collect();
        for session in sessions.iter().filter_map(Weak::upgrade) {
            session.teardown();
        }
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.cancelled.load(Ordering::Acquire)
    }

    pub(crate) fn attach(&self, session: Weak<dyn Teardown>) {
        let mut sessions = self
            .0
            .sessions
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        sessions.retain(|s| s.strong_count() > 0);
        sessions.push(session);
        drop(sessions);

        // A session attached after cancellation is released right away.
        if self.is_cancelled()
            && let Some(session) = self
                .0
                .sessions
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .pop()
                .and_then(|s| s.upgrade())
        {
            session.teardown();
        }
    }
}
