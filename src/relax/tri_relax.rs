//! F-C-F relaxation for block lower-triangular time systems.
//!
//! Every pass overlaps communication with computation: the boundary values
//! go out, all *interior* points matching the pass are solved, the transfers
//! are completed, and only then are the two boundary points solved against
//! the fresh ghosts.
//!
//! A call performs `nrelax + 1` F-passes with a C-pass after all but the
//! last, then one closing pass over every owned point with `xrelax` set.

use super::{LevelState, RelaxStats, Relaxer};
use crate::app::{TriApp, TriStatus, TriStencil};
use crate::cache::{Residency, Storage, VectorCache};
use crate::comm::communicator::{CommTag, Communicator};
use crate::comm::tri_channel::TriTransfer;
use crate::debug_invariants::DebugInvariants;
use crate::grid::{Grid, TimeIndex};
use crate::relax_error::RelaxError;

/// Points a pass solves.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
enum Pass {
    F,
    C,
    /// Closing pass: every owned point, `xrelax` set.
    All,
}

impl Pass {
    fn selects(self, grid: &Grid, index: TimeIndex) -> bool {
        match self {
            Pass::F => grid.is_fpoint(index),
            Pass::C => grid.is_cpoint(index),
            Pass::All => true,
        }
    }
}

impl<A: TriApp, C: Communicator> Relaxer<A, C> {
    /// Runs the triangular sweep on `level`; `nrelax` overrides the configured
    /// sweep count.
    ///
    /// A process owning no point on `level` returns immediately.
    ///
    /// # Errors
    /// `InvalidConfig` if the level does not store all points.
    pub fn tri_fcf_relax(&mut self, level: usize, nrelax: Option<usize>) -> Result<(), RelaxError> {
        self.check_level(level)?;
        if self.levels[level].grid.is_empty() {
            return Ok(());
        }
        if self.levels[level].cache.storage() != Storage::AllPoints {
            return Err(RelaxError::InvalidConfig(format!(
                "triangular relaxation needs every point stored on level {level}"
            )));
        }
        let nrelax = nrelax.unwrap_or(self.config.nrelax[level]);
        let tag = self.level_tag(level);

        let Relaxer {
            app,
            comm,
            levels,
            stats,
            ..
        } = self;
        let LevelState { grid, cache } = &mut levels[level];

        for nu in 0..=nrelax {
            log::debug!("tri_fcf_relax: level {level} iteration {nu}/{nrelax}");
            tri_pass(app, &*comm, grid, cache, tag, Pass::F, stats)?;
            if nu < nrelax {
                tri_pass(app, &*comm, grid, cache, tag, Pass::C, stats)?;
            }
        }

        log::debug!("tri_fcf_relax: level {level} closing pass");
        tri_pass(app, &*comm, grid, cache, tag, Pass::All, stats)?;
        stats.closing_passes += 1;
        cache.debug_assert_invariants();
        Ok(())
    }
}

fn tri_pass<A: TriApp, C: Communicator>(
    app: &mut A,
    comm: &C,
    grid: &Grid,
    cache: &mut VectorCache<A::Vector>,
    tag: CommTag,
    pass: Pass,
    stats: &mut RelaxStats,
) -> Result<(), RelaxError> {
    let xrelax = pass == Pass::All;
    let (ilower, iupper) = (grid.ilower(), grid.iupper());

    let xfer = TriTransfer::initiate(comm, app, grid, cache, tag)?;
    let interior = ((ilower + 1)..=(iupper - 1)).filter(|&i| pass.selects(grid, i));
    for i in interior {
        if let Err(e) = tri_solve(app, grid, cache, i, xrelax, stats) {
            xfer.cancel(cache);
            return Err(e);
        }
    }
    xfer.wait(app, cache)?;

    if pass.selects(grid, ilower) {
        tri_solve(app, grid, cache, ilower, xrelax, stats)?;
    }
    if iupper != ilower && pass.selects(grid, iupper) {
        tri_solve(app, grid, cache, iupper, xrelax, stats)?;
    }
    Ok(())
}

fn tri_solve<A: TriApp>(
    app: &mut A,
    grid: &Grid,
    cache: &mut VectorCache<A::Vector>,
    index: TimeIndex,
    xrelax: bool,
    stats: &mut RelaxStats,
) -> Result<(), RelaxError> {
    let left = if index > 0 {
        Some(cache.get_ref(index - 1)?)
    } else {
        None
    };
    let right = if index < grid.gupper() {
        Some(cache.get_ref(index + 1)?)
    } else {
        None
    };
    let stencil = TriStencil {
        left,
        center: cache.get_ref(index)?,
        right,
    };
    let status = TriStatus {
        level: grid.level(),
        index,
        time: grid.time(index),
        xrelax,
    };
    let u = app
        .tri_solve(&status, stencil)
        .map_err(RelaxError::collaborator("tri_solve", grid.level(), index))?;
    cache.set(index, u, Residency::Persistent)?;
    stats.solves += 1;
    Ok(())
}
