//! Error classification shared by results and callers.

use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

/// Which part of the remote agent service failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display, EnumString)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum RemoteErrorKind {
    Authentication,
    NotFound,
    /// The service rejected the request itself (4xx other than auth/404/429).
    InvalidRequest,
    Network,
    Service,
}

/// Broad error category.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    Validation,
    Authentication,
    Network,
    Timeout,
    Remote,
    RunFailed,
    Budget,
    Cancelled,
    Persistence,
    Configuration,
}

/// Why a research attempt did not succeed.
///
/// Carried on a failed [`crate::types::ResearchResult`] so callers can tell a
/// remote-reported failure from an exhausted polling budget.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display, EnumString)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum FailureKind {
    Validation,
    RemoteService,
    RunTerminalFailure,
    RunBudgetExceeded,
    Cancelled,
    Timeout,
    NoContent,
    Persistence,
}

