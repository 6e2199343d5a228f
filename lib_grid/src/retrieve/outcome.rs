//! Result types shared by every fetch path.
//!
//! A fetch reports one of three things: it produced data, it failed in an
//! expected way (bad status, unreadable body), or it was cancelled. Those are
//! [`FetchOutcome`] values. An `Err(FetchError)` is reserved for misuse such
//! as an impossible argument, and only the orchestrator turns it into cell
//! state.

use thiserror::Error;

/// What a completed fetch produced.
#[derive(Debug, Clone, PartialEq)]
pub enum FetchOutcome<T> {
    Succeeded(T),
    /// Expected failure, with a human-readable message.
    Failed(String),
    /// The cancellation token fired first. Never an error.
    Cancelled,
}

impl<T> FetchOutcome<T> {
    pub fn is_succeeded(&self) -> bool {
        matches!(self, FetchOutcome::Succeeded(_))
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, FetchOutcome::Cancelled)
    }

    /// Transforms the success value, leaving failure and cancellation intact.
    pub fn map<U, F: FnOnce(T) -> U>(self, f: F) -> FetchOutcome<U> {
        match self {
            FetchOutcome::Succeeded(value) => FetchOutcome::Succeeded(f(value)),
            FetchOutcome::Failed(message) => FetchOutcome::Failed(message),
            FetchOutcome::Cancelled => FetchOutcome::Cancelled,
        }
    }

    /// Chains a step that may itself fail.
    pub fn and_then<U, F: FnOnce(T) -> FetchOutcome<U>>(self, f: F) -> FetchOutcome<U> {
        match self {
            FetchOutcome::Succeeded(value) => f(value),
            FetchOutcome::Failed(message) => FetchOutcome::Failed(message),
            FetchOutcome::Cancelled => FetchOutcome::Cancelled,
        }
    }

    /// The success value, if any.
    pub fn succeeded(self) -> Option<T> {
        match self {
            FetchOutcome::Succeeded(value) => Some(value),
            _ => None,
        }
    }

    /// The failure message, if any.
    pub fn failure(&self) -> Option<&str> {
        match self {
            FetchOutcome::Failed(message) => Some(message),
            _ => None,
        }
    }
}

/// Misuse of a fetch function; never produced for bad upstream data.
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("unexpected fetch failure: {0}")]
    Unexpected(#[from] anyhow::Error),
}

/// What every fetch function returns.
pub type FetchResult<T> = Result<FetchOutcome<T>, FetchError>;

/// Combines two outcomes: both must succeed; a cancellation wins over a
/// failure, and the first failure message is kept.
pub fn join_outcomes<A, B>(a: FetchOutcome<A>, b: FetchOutcome<B>) -> FetchOutcome<(A, B)> {
    match (a, b) {
        (FetchOutcome::Succeeded(a), FetchOutcome::Succeeded(b)) => {
            FetchOutcome::Succeeded((a, b))
        }
        (FetchOutcome::Cancelled, _) | (_, FetchOutcome::Cancelled) => FetchOutcome::Cancelled,
        (FetchOutcome::Failed(message), _) | (_, FetchOutcome::Failed(message)) => {
            FetchOutcome::Failed(message)
        }
    }
}
