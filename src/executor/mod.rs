//! Remote executor boundary.
//!
//! The reconciler never talks to the remote system directly. It hands each
//! [`Command`] to a [`RemoteExecutor`] and acts on the [`ExecOutcome`]:
//! - `Success` and `Absent` are definitive answers
//! - `Failure` means the command definitively did not take effect
//! - `Ambiguous` means nobody knows what happened remotely
//!
//! Transient transport errors are retried inside the executor, never by the
//! reconciler, so every outcome seen by the core is final.

mod cancel;
mod query_service;

use async_trait::async_trait;
use std::fmt;

use crate::planner::Command;
use crate::resource::AttributeSet;

pub use cancel::{CancelHandle, CancelSignal, cancel_pair};
pub use query_service::QueryServiceExecutor;

/// Result of executing one command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExecOutcome {
    /// The command took effect. Reads (and some creates) report attributes.
    Success(Option<AttributeSet>),
    /// The object does not exist.
    Absent,
    /// The command definitively did not take effect.
    Failure(String),
    /// The remote effect is unknown.
    Ambiguous(String),
}

/// Executes commands against the remote system.
#[async_trait]
pub trait RemoteExecutor: Send + Sync {
    /// Executes a single command.
    async fn execute(&self, command: &Command) -> ExecOutcome;

    /// Returns a short name for logs.
    fn name(&self) -> &'static str;
}

impl fmt::Display for ExecOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Success(Some(attrs)) => write!(f, "success ({} attributes)", attrs.len()),
            Self::Success(None) => write!(f, "success"),
            Self::Absent => write!(f, "absent"),
            Self::Failure(message) => write!(f, "failure: {message}"),
            Self::Ambiguous(message) => write!(f, "ambiguous: {message}"),
        }
    }
}
