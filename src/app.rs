//! Collaborator contracts the relaxation engine drives.
//!
//! The engine is generic over the state type the user's time stepper works on.
//! An [`App`] supplies the capability set the sweeps need: advance one vector
//! by one step, combine two vectors linearly, and move a vector through a byte
//! buffer so it can cross a process boundary. Cloning and releasing a vector
//! are `Clone` and `Drop`.
//!
//! The block-triangular sweep additionally needs a local implicit solve, see
//! [`TriApp`].

use crate::grid::TimeIndex;
pub use crate::relax_error::AppError;

/// Where a step lands: it advances a vector over `[tstart, tstop)` to `index`.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct StepStatus {
    pub level: usize,
    pub index: TimeIndex,
    pub tstart: f64,
    pub tstop: f64,
}

/// Context of one local implicit solve.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct TriStatus {
    pub level: usize,
    pub index: TimeIndex,
    pub time: f64,
    /// Set only during the unconditional closing pass of a triangular sweep.
    pub xrelax: bool,
}

/// Neighbourhood handed to a local implicit solve.
///
/// `left` and `right` are `None` at the ends of the global time axis.
#[derive(Debug)]
pub struct TriStencil<'a, V> {
    pub left: Option<&'a V>,
    pub center: &'a V,
    pub right: Option<&'a V>,
}

impl<V> Clone for TriStencil<'_, V> {
    fn clone(&self) -> Self {
        *self
    }
}
impl<V> Copy for TriStencil<'_, V> {}

pub trait App {
    type Vector: Clone;

    /// Initial guess at time `t`.
    fn init(&mut self, t: f64) -> Result<Self::Vector, AppError>;

    /// Advances `u` in place from `status.tstart` to `status.tstop`.
    ///
    /// Must be deterministic for a given seed and index.
    fn step(&mut self, status: &StepStatus, u: &mut Self::Vector) -> Result<(), AppError>;

    /// `y <- alpha * x + beta * y`.
    fn sum(
        &mut self,
        alpha: f64,
        x: &Self::Vector,
        beta: f64,
        y: &mut Self::Vector,
    ) -> Result<(), AppError>;

    /// Upper bound on the packed size of any vector, in bytes.
    fn buf_size(&self) -> usize;

    /// Packs `u` into `buf` and returns the number of bytes written.
    fn buf_pack(&self, u: &Self::Vector, buf: &mut [u8]) -> Result<usize, AppError>;

    fn buf_unpack(&self, buf: &[u8]) -> Result<Self::Vector, AppError>;
}

/// An [`App`] whose time points are coupled into one block lower-triangular
/// system.
pub trait TriApp: App {
    /// Solves for the value at `status.index` given its neighbourhood.
    ///
    /// The engine stores the returned vector at `status.index`.
    fn tri_solve(
        &mut self,
        status: &TriStatus,
        stencil: TriStencil<'_, Self::Vector>,
    ) -> Result<Self::Vector, AppError>;
}
