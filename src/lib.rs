#![cfg_attr(docsrs, feature(doc_cfg))]
//! # mgrit-relax
//!
//! mgrit-relax is the relaxation engine of a parallel-in-time multigrid solver.
//! The time axis of every level is split into contiguous blocks, one per
//! process, and each process smooths its block by alternating sequential time
//! stepping over F-points with single steps onto C-points. Values that cross a
//! block boundary travel through non-blocking point-to-point messages that
//! overlap with local computation; there are no barriers.
//!
//! ## Features
//! - F-then-C relaxation ([`Relaxer::fc_relax`]) with optional weighted
//!   C-relaxation on all but the coarsest level
//! - F-C-F relaxation for block lower-triangular systems
//!   ([`Relaxer::tri_fcf_relax`]) with interior/boundary overlap
//! - A per-level time-point vector cache with C-point or full storage
//! - Pluggable communication backends (serial, in-process threads, MPI)
//!
//! ## Usage
//! Implement [`App`](app::App) (and [`TriApp`](app::TriApp) for the triangular
//! sweep) for your state type, describe each level with a [`Grid`](grid::Grid)
//! (or let [`TimePartition`](grid::TimePartition) build them), then drive the
//! sweeps from your cycle:
//!
//! ```toml
//! [dependencies]
//! mgrit-relax = "0.1"
//! # features = ["mpi-support"]
//! ```
//!
//! ## Determinism
//!
//! Point ordering inside a sweep is fixed: intervals right to left, F-points
//! left to right. With a deterministic step, an F-C sweep produces the same
//! values regardless of how the axis is split across processes.

pub mod app;
pub mod cache;
pub mod comm;
pub mod config;
pub mod debug_invariants;
pub mod grid;
pub mod relax;
pub mod relax_error;

pub use debug_invariants::DebugInvariants;
pub use relax::{RelaxStats, Relaxer};

/// A convenient prelude to import the most-used traits & types:
pub mod prelude {
    pub use crate::app::{App, AppError, StepStatus, TriApp, TriStatus, TriStencil};
    pub use crate::cache::{Residency, Storage, VectorCache};
    #[cfg(feature = "mpi-support")]
    pub use crate::comm::MpiComm;
    pub use crate::comm::{CommTag, Communicator, LocalComm, NoComm, Wait};
    pub use crate::config::RelaxConfig;
    pub use crate::debug_invariants::DebugInvariants;
    pub use crate::grid::{Grid, Interval, PointKind, TimeIndex, TimePartition};
    pub use crate::relax::{RelaxStats, Relaxer};
    pub use crate::relax_error::RelaxError;
}
