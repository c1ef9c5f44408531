//! RelaxError: Unified error type for mgrit-relax public APIs
//!
//! Every fallible operation in the relaxation engine, the vector cache and the
//! message channel reports through this type. Transport failures and
//! collaborator failures are fatal at this layer; precondition violations are
//! programming errors that are surfaced instead of masked.

use crate::grid::TimeIndex;
use thiserror::Error;

/// Boxed error produced by a user collaborator (step, sum, solve, buffer routines).
pub type AppError = Box<dyn std::error::Error + Send + Sync>;

/// Unified error type for relaxation operations.
#[derive(Debug, Error)]
pub enum RelaxError {
    /// A post or wait on the message channel failed.
    #[error("communication with rank {neighbor} failed: {source}")]
    CommError {
        neighbor: usize,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },
    /// A received frame does not describe the value this process asked for.
    #[error("message from rank {neighbor} mismatched: expected {expected}, got {got}")]
    MessageMismatch {
        neighbor: usize,
        expected: String,
        got: String,
    },
    /// `get` of a time index that neither the cache nor a posted receive can resolve.
    #[error("time index {index} on level {level} was never resolved")]
    Unresolved { level: usize, index: TimeIndex },
    /// `free` of a time index that holds no resident vector.
    #[error("time index {index} on level {level} is not resident")]
    NotResident { level: usize, index: TimeIndex },
    /// Store of a time index outside the owned range and its ghosts.
    #[error("time index {index} is outside the range cached on level {level}")]
    OutOfRange { level: usize, index: TimeIndex },
    /// `initiate` called before the previous sweep's transfers were waited on.
    #[error("level {level} already has transfers in flight")]
    TransferInFlight { level: usize },
    /// Level index outside the configured hierarchy.
    #[error("level {level} out of range (nlevels = {nlevels})")]
    InvalidLevel { level: usize, nlevels: usize },
    /// Configuration rejected by validation.
    #[error("invalid relaxation config: {0}")]
    InvalidConfig(String),
    /// A user collaborator reported failure; the source is carried unchanged.
    #[error("{op} failed at level {level}, index {index}: {source}")]
    Collaborator {
        op: &'static str,
        level: usize,
        index: TimeIndex,
        #[source]
        source: AppError,
    },
}

impl RelaxError {
    pub(crate) fn collaborator(
        op: &'static str,
        level: usize,
        index: TimeIndex,
    ) -> impl FnOnce(AppError) -> RelaxError {
        move |source| RelaxError::Collaborator {
            op,
            level,
            index,
            source,
        }
    }
}

/// String-backed transport error used as a `CommError` source.
#[derive(Debug, Error)]
#[error("{0}")]
pub struct CommError(pub String);
