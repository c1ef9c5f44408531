//! F-then-C relaxation.
//!
//! Each sweep visits the intervals right to left. Every interval is seeded
//! from the value just left of it, steps through its F-points in increasing
//! time order, then steps once more onto its C-point, optionally blending the
//! result with the C-point's previous value:
//!
//! ```text
//! u_c <- (1 - CWt) * u_c_old + CWt * step(u_f_last)
//! ```
//!
//! Seeds left of an interval are read before that interval's neighbour to the
//! left has been relaxed, so every interval sees C-point values from the
//! previous sweep. The leftmost interval is visited last, which gives the
//! ghost receive the whole sweep to arrive.

use super::{LevelState, RelaxStats, Relaxer};
use crate::app::{App, StepStatus};
use crate::cache::VectorCache;
use crate::comm::channel::UTransfer;
use crate::comm::communicator::Communicator;
use crate::debug_invariants::DebugInvariants;
use crate::grid::{Grid, TimeIndex};
use crate::relax_error::RelaxError;

fn step_status(grid: &Grid, index: TimeIndex) -> StepStatus {
    StepStatus {
        level: grid.level(),
        index,
        tstart: grid.time(index - 1),
        tstop: grid.time(index),
    }
}

impl<A: App, C: Communicator> Relaxer<A, C> {
    /// Runs `nrelax[level]` F-C sweeps on `level`.
    ///
    /// The C-relaxation weight applies on every level except the coarsest.
    pub fn fc_relax(&mut self, level: usize) -> Result<(), RelaxError> {
        self.check_level(level)?;
        let nrelax = self.config.nrelax[level];
        let cwt = self.config.cwts[level];
        let weighted = cwt != 1.0 && !self.config.is_coarsest(level);
        if cwt != 1.0 && !weighted && nrelax > 0 {
            log::warn!("fc_relax: CWt = {cwt} ignored on coarsest level {level}");
        }
        let tag = self.level_tag(level).offset(UTransfer::<C>::LANE);

        let Relaxer {
            app,
            comm,
            levels,
            stats,
            ..
        } = self;
        let LevelState { grid, cache } = &mut levels[level];

        for nu in 0..nrelax {
            log::debug!("fc_relax: level {level} sweep {}/{nrelax}", nu + 1);
            let mut xfer = UTransfer::initiate(comm, app, grid, cache, tag)?;
            match fc_sweep(app, &mut xfer, grid, cache, weighted.then_some(cwt), stats) {
                Ok(()) => xfer.wait(app, cache)?,
                Err(e) => {
                    xfer.cancel(cache);
                    return Err(e);
                }
            }
            cache.debug_assert_invariants();
            stats.sweeps += 1;
        }
        Ok(())
    }
}

fn fc_sweep<A: App, C: Communicator>(
    app: &mut A,
    xfer: &mut UTransfer<'_, C>,
    grid: &Grid,
    cache: &mut VectorCache<A::Vector>,
    weight: Option<f64>,
    stats: &mut RelaxStats,
) -> Result<(), RelaxError> {
    let level = grid.level();
    for (_, interval) in grid.intervals_rev() {
        let ci = interval.relaxed_cpoint();
        let seed_index = if interval.has_fpoints() {
            interval.flo - 1
        } else if let Some(ci) = ci {
            ci - 1
        } else {
            continue;
        };
        let mut u = xfer.get(app, cache, seed_index)?;

        // F-relaxation
        for fi in interval.fpoints() {
            app.step(&step_status(grid, fi), &mut u)
                .map_err(RelaxError::collaborator("step", level, fi))?;
            xfer.store_transient(app, cache, fi, &u)?;
            stats.fsteps += 1;
        }

        // C-relaxation
        let Some(ci) = ci else {
            // seed was never persisted and nothing else consumes it
            drop(u);
            continue;
        };
        let u_old = match weight {
            Some(_) => Some(xfer.get(app, cache, ci)?),
            None => None,
        };
        app.step(&step_status(grid, ci), &mut u)
            .map_err(RelaxError::collaborator("step", level, ci))?;
        if let (Some(cwt), Some(u_old)) = (weight, u_old) {
            app.sum(1.0 - cwt, &u_old, cwt, &mut u)
                .map_err(RelaxError::collaborator("sum", level, ci))?;
            stats.combines += 1;
        }
        xfer.store(app, cache, ci, u)?;
        stats.crelax += 1;
    }
    Ok(())
}
