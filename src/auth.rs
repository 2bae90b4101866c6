//! Browser-mediated authentication latch.
//!
//! Interactive sign-in happens outside the transport: [`AuthLatch::begin`]
//! hands the provider URL to an [`AuthOpener`] (typically the system
//! browser) and returns a latch the application polls plus a completer the
//! callback side resolves exactly once. The latch never blocks: the caller
//! reads [`AuthLatch::state`] until it leaves [`AuthState::Pending`], then
//! collects the result payload once with [`AuthLatch::take_data`].

use std::io;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::{Arc, Mutex};

use tracing::warn;

use crate::core::MAX_AUTH_RESULT_SIZE;

/// Opens an authentication URL for the user, e.g. in the system browser.
pub trait AuthOpener: Send + Sync {
    /// Present `url` to the user. Failure aborts the attempt before any
    /// latch exists.
    fn open(&self, url: &str) -> io::Result<()>;
}

impl<F> AuthOpener for F
where
    F: Fn(&str) -> io::Result<()> + Send + Sync,
{
    fn open(&self, url: &str) -> io::Result<()> {
        self(url)
    }
}

/// Observable progress of one authentication attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum AuthState {
    /// The user has not completed sign-in yet.
    Pending = 0,
    /// Sign-in succeeded; a result payload may be waiting.
    Success = 1,
    /// Sign-in failed or was abandoned.
    Failure = 2,
}

struct Shared {
    state: AtomicU8,
    data: Mutex<Option<Vec<u8>>>,
}

/// Poll side of one authentication attempt.
pub struct AuthLatch {
    shared: Arc<Shared>,
}

/// Resolution side of one authentication attempt.
///
/// Consumed by [`AuthCompleter::resolve`]; a latch whose completer is
/// dropped unresolved reads as [`AuthState::Failure`].
pub struct AuthCompleter {
    shared: Arc<Shared>,
    resolved: bool,
}

impl AuthLatch {
    /// Start an attempt: open `url` for the user and return the latch pair.
    pub fn begin<O: AuthOpener>(opener: &O, url: &str) -> io::Result<(AuthLatch, AuthCompleter)> {
        opener.open(url)?;
        let shared = Arc::new(Shared {
            state: AtomicU8::new(AuthState::Pending as u8),
            data: Mutex::new(None),
        });
        Ok((
            AuthLatch {
                shared: Arc::clone(&shared),
            },
            AuthCompleter {
                shared,
                resolved: false,
            },
        ))
    }

    /// Current state of the attempt. Pure read, never blocks.
    pub fn state(&self) -> AuthState {
        match self.shared.state.load(Ordering::Acquire) {
            1 => AuthState::Success,
            2 => AuthState::Failure,
            _ => AuthState::Pending,
        }
    }

    /// Take the result payload, if any. Yields it exactly once.
    pub fn take_data(&self) -> Option<Vec<u8>> {
        self.shared.data.lock().expect("latch lock").take()
    }
}

impl AuthCompleter {
    /// Resolve the attempt. Only the first resolution counts.
    ///
    /// An oversized payload downgrades the attempt to failure rather than
    /// letting an unbounded provider response through.
    pub fn resolve(mut self, success: bool, data: Option<Vec<u8>>) {
        self.resolved = true;
        let state = match &data {
            Some(payload) if payload.len() > MAX_AUTH_RESULT_SIZE => {
                warn!(
                    size = payload.len(),
                    limit = MAX_AUTH_RESULT_SIZE,
                    "auth result payload too large, treating as failure"
                );
                AuthState::Failure
            }
            _ if success => AuthState::Success,
            _ => AuthState::Failure,
        };
        if state == AuthState::Success {
            *self.shared.data.lock().expect("latch lock") = data;
        }
        self.shared.state.store(state as u8, Ordering::Release);
    }
}

impl Drop for AuthCompleter {
    fn drop(&mut self) {
        if !self.resolved {
            self.shared
                .state
                .store(AuthState::Failure as u8, Ordering::Release);
        }
    }
}
