//! Block distribution of the time axis over processes.
//!
//! The fine axis `[0, ntime]` is cut into contiguous blocks, one per rank; the
//! first `(ntime + 1) % nprocs` ranks own one extra point. A coarse level with
//! stride `scale` owns exactly the fine indices of its rank that are multiples
//! of `scale`, so the owner of coarse index `j` is the owner of fine index
//! `j * scale`.

use super::{Grid, TimeIndex};
use crate::relax_error::RelaxError;

#[derive(Clone, Copy, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct TimePartition {
    pub tstart: f64,
    pub tstop: f64,
    /// Number of fine time steps; the fine axis has `ntime + 1` points.
    pub ntime: TimeIndex,
    pub nprocs: usize,
}

impl TimePartition {
    pub fn new(tstart: f64, tstop: f64, ntime: TimeIndex, nprocs: usize) -> Result<Self, RelaxError> {
        let part = Self {
            tstart,
            tstop,
            ntime,
            nprocs,
        };
        part.validate()?;
        Ok(part)
    }

    /// Checks a partition built from its public fields, e.g. one read from a
    /// config file.
    pub fn validate(&self) -> Result<(), RelaxError> {
        if self.ntime < 1 {
            return Err(RelaxError::InvalidConfig(format!(
                "ntime must be >= 1, got {}",
                self.ntime
            )));
        }
        if self.nprocs == 0 {
            return Err(RelaxError::InvalidConfig("nprocs must be >= 1".into()));
        }
        // also rejects NaN
        if !(self.tstart.is_finite() && self.tstop.is_finite() && self.tstop > self.tstart) {
            return Err(RelaxError::InvalidConfig(format!(
                "time span [{}, {}] must be finite with tstop > tstart",
                self.tstart, self.tstop
            )));
        }
        Ok(())
    }

    #[inline]
    pub fn npoints(&self) -> TimeIndex {
        self.ntime + 1
    }

    /// Fine time step.
    #[inline]
    pub fn dt(&self) -> f64 {
        (self.tstop - self.tstart) / self.ntime as f64
    }

    /// Owned fine range of `rank`; empty (`lower > upper`) when there are
    /// more ranks than points.
    pub fn fine_range(&self, rank: usize) -> (TimeIndex, TimeIndex) {
        let n = self.npoints();
        let p = self.nprocs as TimeIndex;
        let r = rank as TimeIndex;
        let (quo, rem) = (n / p, n % p);
        let lower = r * quo + r.min(rem);
        let upper = (r + 1) * quo + (r + 1).min(rem) - 1;
        (lower, upper)
    }

    /// Rank owning fine index `index`.
    pub fn owner(&self, index: TimeIndex) -> usize {
        let n = self.npoints();
        let p = self.nprocs as TimeIndex;
        let (quo, rem) = (n / p, n % p);
        let threshold = rem * (quo + 1);
        if index < threshold {
            (index / (quo + 1)) as usize
        } else {
            (rem + (index - threshold) / quo) as usize
        }
    }

    /// Descriptor of `level` for `rank`, where one coarse step spans `scale`
    /// fine steps and the level coarsens by `cfactor`.
    pub fn grid(
        &self,
        rank: usize,
        level: usize,
        scale: TimeIndex,
        cfactor: TimeIndex,
    ) -> Result<Grid, RelaxError> {
        self.validate()?;
        if scale < 1 {
            return Err(RelaxError::InvalidConfig(format!(
                "scale must be >= 1 on level {level}, got {scale}"
            )));
        }
        if rank >= self.nprocs {
            return Err(RelaxError::InvalidConfig(format!(
                "rank {rank} out of range for {} processes",
                self.nprocs
            )));
        }
        let (a, b) = self.fine_range(rank);
        let (ilower, iupper) = if a <= b {
            ((a + scale - 1) / scale, b / scale)
        } else {
            (a, b)
        };
        let gupper = self.ntime / scale;
        let grid = Grid::new(level, ilower, iupper, cfactor, gupper)?;
        let left = grid.left_ghost().map(|g| self.owner(g * scale));
        let right = grid.right_ghost().map(|g| self.owner(g * scale));
        Ok(grid
            .with_times(self.tstart, self.dt() * scale as f64)
            .with_neighbors(left, right))
    }

    /// One descriptor per level; level `l` coarsens by `cfactors[l]` and has
    /// stride `cfactors[0] * .. * cfactors[l-1]` relative to the fine axis.
    pub fn grids(&self, rank: usize, cfactors: &[TimeIndex]) -> Result<Vec<Grid>, RelaxError> {
        let mut scale = 1;
        let mut out = Vec::with_capacity(cfactors.len());
        for (level, &cf) in cfactors.iter().enumerate() {
            out.push(self.grid(rank, level, scale, cf)?);
            scale *= cf;
        }
        Ok(out)
    }
}
