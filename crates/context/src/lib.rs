//! # Context — Operation Context
//!
//! Every storage and pipeline operation in HarborKV's sideloading subsystem
//! takes an [`OpContext`]. It carries two things:
//!
//! 1. A **cancellation token**. The Raft processing loop cancels the context
//!    when a replica is being torn down; operations check it at their I/O
//!    boundaries and bail with [`Canceled`]. Partial writes left behind by a
//!    cancelled operation are cleaned up by later truncation.
//! 2. An optional **trace recorder**. Status tags emitted along the way
//!    (`using cache hit`, `writing payload`, ...) are collected so tests and
//!    diagnostics can assert on what a given operation actually did. Every
//!    recorded tag is also mirrored as a `tracing` event, so production logs
//!    see the same breadcrumbs.
//!
//! Contexts are cheap to clone; clones share the same token and recorder.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use thiserror::Error;

/// Returned by [`OpContext::check_canceled`] once the context is cancelled.
#[derive(Debug, Error, PartialEq, Eq)]
#[error("operation canceled")]
pub struct Canceled;

struct Inner {
    canceled: AtomicBool,
    /// `None` unless the context was created with [`OpContext::with_recording`].
    events: Option<Mutex<Vec<String>>>,
}

/// Cancellation token plus optional trace recorder, threaded by reference
/// through every sideloading operation.
#[derive(Clone)]
pub struct OpContext {
    inner: Arc<Inner>,
}

impl OpContext {
    /// A context that never records and is not cancelled.
    pub fn background() -> Self {
        Self {
            inner: Arc::new(Inner {
                canceled: AtomicBool::new(false),
                events: None,
            }),
        }
    }

    /// A context whose recorded tags can be read back via [`recorded`].
    ///
    /// [`recorded`]: OpContext::recorded
    pub fn with_recording() -> Self {
        Self {
            inner: Arc::new(Inner {
                canceled: AtomicBool::new(false),
                events: Some(Mutex::new(Vec::new())),
            }),
        }
    }

    /// Marks the context cancelled. Operations notice at their next I/O
    /// boundary; in-flight syscalls are not interrupted.
    pub fn cancel(&self) {
        self.inner.canceled.store(true, Ordering::Relaxed);
    }

    pub fn is_canceled(&self) -> bool {
        self.inner.canceled.load(Ordering::Relaxed)
    }

    /// Errors with [`Canceled`] if [`cancel`](OpContext::cancel) was called.
    pub fn check_canceled(&self) -> Result<(), Canceled> {
        if self.is_canceled() {
            Err(Canceled)
        } else {
            Ok(())
        }
    }

    /// Records a status tag on this operation and mirrors it to `tracing`.
    pub fn record(&self, msg: impl Into<String>) {
        let msg = msg.into();
        tracing::trace!(target: "harborkv::sideload", "{msg}");
        if let Some(events) = &self.inner.events {
            events.lock().expect("recorder poisoned").push(msg);
        }
    }

    /// Everything recorded so far. Empty for non-recording contexts.
    pub fn recorded(&self) -> Vec<String> {
        match &self.inner.events {
            Some(events) => events.lock().expect("recorder poisoned").clone(),
            None => Vec::new(),
        }
    }

    /// Whether any recorded tag contains `needle`.
    pub fn recorded_contains(&self, needle: &str) -> bool {
        self.recorded().iter().any(|e| e.contains(needle))
    }
}

impl Default for OpContext {
    fn default() -> Self {
        Self::background()
    }
}

impl std::fmt::Debug for OpContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OpContext")
            .field("canceled", &self.is_canceled())
            .field("recording", &self.inner.events.is_some())
            .finish()
    }
}
