//! Level descriptors for the time axis: point classification and intervals.
//!
//! A [`Grid`] describes the contiguous range of time indices `[ilower, iupper]`
//! one process owns on one level of the hierarchy, together with the
//! coarsening factor that splits the range into C-points and F-points.
//!
//! # Intervals
//!
//! Relaxation walks the owned range interval by interval. With
//! `ncpoints > 0` the intervals are
//!
//! | interval | F-points | C-point |
//! |---|---|---|
//! | `0` | `[ilower, clower-1]` | `clower` |
//! | `k` in `1..ncpoints` | `[clower+(k-1)cf+1, clower+k*cf-1]` | `clower+k*cf` |
//! | `ncpoints` | `[cupper+1, iupper]` | none |
//!
//! and with `ncpoints == 0` the single interval `0` covers the whole owned
//! range with no C-point. F-point ranges may be empty (`flo > fhi`).

pub mod partition;

use std::ops::RangeInclusive;

use crate::debug_invariants::DebugInvariants;
use crate::relax_error::RelaxError;

pub use partition::TimePartition;

/// Position on a level's global time axis.
pub type TimeIndex = i64;

/// Index of the initial condition; it is never relaxed.
pub const INITIAL_INDEX: TimeIndex = 0;

/// Classification of a time index with respect to a coarsening factor.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum PointKind {
    /// Coarse point: `index mod cfactor == 0`.
    C,
    /// Fine point: every other index.
    F,
}

impl PointKind {
    #[inline]
    pub fn of(index: TimeIndex, cfactor: TimeIndex) -> Self {
        if is_cpoint(index, cfactor) {
            PointKind::C
        } else {
            PointKind::F
        }
    }
}

#[inline]
pub fn is_cpoint(index: TimeIndex, cfactor: TimeIndex) -> bool {
    index.rem_euclid(cfactor) == 0
}

#[inline]
pub fn is_fpoint(index: TimeIndex, cfactor: TimeIndex) -> bool {
    !is_cpoint(index, cfactor)
}

/// One run of F-points plus the C-point that terminates it.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct Interval {
    pub flo: TimeIndex,
    pub fhi: TimeIndex,
    /// Terminating C-point, `None` for the trailing run after `cupper`.
    pub ci: Option<TimeIndex>,
}

impl Interval {
    #[inline]
    pub fn has_fpoints(&self) -> bool {
        self.flo <= self.fhi
    }

    /// F-points in ascending time order (empty when `flo > fhi`).
    #[inline]
    pub fn fpoints(&self) -> RangeInclusive<TimeIndex> {
        self.flo..=self.fhi
    }

    /// The C-point this interval relaxes, if any.
    ///
    /// The initial condition is a C-point but has no predecessor, so it is
    /// never relaxed.
    #[inline]
    pub fn relaxed_cpoint(&self) -> Option<TimeIndex> {
        self.ci.filter(|&ci| ci > INITIAL_INDEX)
    }
}

/// Per-process descriptor of one level.
#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct Grid {
    level: usize,
    ilower: TimeIndex,
    iupper: TimeIndex,
    cfactor: TimeIndex,
    clower: TimeIndex,
    cupper: TimeIndex,
    ncpoints: usize,
    gupper: TimeIndex,
    tstart: f64,
    dt: f64,
    left_rank: Option<usize>,
    right_rank: Option<usize>,
}

impl Grid {
    /// Builds the descriptor for the owned range `[ilower, iupper]` of a level
    /// whose global axis is `[0, gupper]`.
    ///
    /// An empty range (`ilower > iupper`) is allowed: the process owns nothing
    /// on this level.
    ///
    /// # Errors
    /// `InvalidConfig` if `cfactor < 1`, if `ilower < 0` or if a non-empty range
    /// reaches past `gupper`.
    pub fn new(
        level: usize,
        ilower: TimeIndex,
        iupper: TimeIndex,
        cfactor: TimeIndex,
        gupper: TimeIndex,
    ) -> Result<Self, RelaxError> {
        if cfactor < 1 {
            return Err(RelaxError::InvalidConfig(format!(
                "cfactor must be >= 1 on level {level}, got {cfactor}"
            )));
        }
        if ilower < 0 {
            return Err(RelaxError::InvalidConfig(format!(
                "ilower must be >= 0 on level {level}, got {ilower}"
            )));
        }
        if ilower <= iupper && iupper > gupper {
            return Err(RelaxError::InvalidConfig(format!(
                "owned range [{ilower}, {iupper}] exceeds global upper index {gupper} on level {level}"
            )));
        }
        let (clower, cupper, ncpoints) = if ilower <= iupper {
            let clower = ((ilower + cfactor - 1) / cfactor) * cfactor;
            let cupper = (iupper / cfactor) * cfactor;
            let ncpoints = if clower <= cupper {
                ((cupper - clower) / cfactor + 1) as usize
            } else {
                0
            };
            (clower, cupper, ncpoints)
        } else {
            (ilower, iupper, 0)
        };
        let grid = Grid {
            level,
            ilower,
            iupper,
            cfactor,
            clower,
            cupper,
            ncpoints,
            gupper,
            tstart: 0.0,
            dt: 1.0,
            left_rank: None,
            right_rank: None,
        };
        crate::debug_invariants!(grid.validate_invariants(), "Grid::new");
        Ok(grid)
    }

    /// Sets the time value of index 0 and the uniform step on this level.
    pub fn with_times(mut self, tstart: f64, dt: f64) -> Self {
        self.tstart = tstart;
        self.dt = dt;
        self
    }

    /// Sets the ranks owning `ilower-1` and `iupper+1`.
    pub fn with_neighbors(mut self, left: Option<usize>, right: Option<usize>) -> Self {
        self.left_rank = left;
        self.right_rank = right;
        self
    }

    #[inline]
    pub fn level(&self) -> usize {
        self.level
    }
    #[inline]
    pub fn ilower(&self) -> TimeIndex {
        self.ilower
    }
    #[inline]
    pub fn iupper(&self) -> TimeIndex {
        self.iupper
    }
    #[inline]
    pub fn cfactor(&self) -> TimeIndex {
        self.cfactor
    }
    #[inline]
    pub fn clower(&self) -> TimeIndex {
        self.clower
    }
    #[inline]
    pub fn cupper(&self) -> TimeIndex {
        self.cupper
    }
    #[inline]
    pub fn ncpoints(&self) -> usize {
        self.ncpoints
    }
    #[inline]
    pub fn gupper(&self) -> TimeIndex {
        self.gupper
    }
    #[inline]
    pub fn left_rank(&self) -> Option<usize> {
        self.left_rank
    }
    #[inline]
    pub fn right_rank(&self) -> Option<usize> {
        self.right_rank
    }

    /// True if this process owns no index on this level.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.ilower > self.iupper
    }

    #[inline]
    pub fn owns(&self, index: TimeIndex) -> bool {
        self.ilower <= index && index <= self.iupper
    }

    #[inline]
    pub fn owned(&self) -> RangeInclusive<TimeIndex> {
        self.ilower..=self.iupper
    }

    #[inline]
    pub fn is_cpoint(&self, index: TimeIndex) -> bool {
        is_cpoint(index, self.cfactor)
    }

    #[inline]
    pub fn is_fpoint(&self, index: TimeIndex) -> bool {
        is_fpoint(index, self.cfactor)
    }

    /// Time value at `index`.
    #[inline]
    pub fn time(&self, index: TimeIndex) -> f64 {
        self.tstart + self.dt * index as f64
    }

    /// Ghost index borrowed from the left neighbour, if one exists.
    pub fn left_ghost(&self) -> Option<TimeIndex> {
        (!self.is_empty() && self.ilower > INITIAL_INDEX).then(|| self.ilower - 1)
    }

    /// Ghost index borrowed from the right neighbour, if one exists.
    pub fn right_ghost(&self) -> Option<TimeIndex> {
        (!self.is_empty() && self.iupper < self.gupper).then(|| self.iupper + 1)
    }

    /// Interval number `k`, `0 <= k <= ncpoints`.
    pub fn interval(&self, k: usize) -> Interval {
        let cf = self.cfactor;
        let mut interval = Interval {
            flo: self.ilower,
            fhi: self.iupper,
            ci: None,
        };
        if self.ncpoints > 0 {
            if k == 0 {
                interval.fhi = self.clower - 1;
                interval.ci = Some(self.clower);
            } else if k == self.ncpoints {
                interval.flo = self.cupper + 1;
            } else {
                let k = k as TimeIndex;
                interval.flo = self.clower + (k - 1) * cf + 1;
                interval.fhi = self.clower + k * cf - 1;
                interval.ci = Some(self.clower + k * cf);
            }
        }
        interval
    }

    /// Intervals in relaxation order: `ncpoints` down to `0`.
    pub fn intervals_rev(&self) -> impl Iterator<Item = (usize, Interval)> + '_ {
        (0..=self.ncpoints).rev().map(move |k| (k, self.interval(k)))
    }
}

impl DebugInvariants for Grid {
    fn debug_assert_invariants(&self) {
        crate::debug_invariants!(self.validate_invariants(), "Grid");
    }

    fn validate_invariants(&self) -> Result<(), RelaxError> {
        if self.is_empty() {
            return Ok(());
        }
        let counted = self.owned().filter(|&i| self.is_cpoint(i)).count();
        if counted != self.ncpoints {
            return Err(RelaxError::InvalidConfig(format!(
                "level {}: ncpoints {} but {} C-points in [{}, {}]",
                self.level, self.ncpoints, counted, self.ilower, self.iupper
            )));
        }
        if self.ncpoints > 0
            && !(self.owns(self.clower)
                && self.owns(self.cupper)
                && self.is_cpoint(self.clower)
                && self.is_cpoint(self.cupper))
        {
            return Err(RelaxError::InvalidConfig(format!(
                "level {}: clower {} / cupper {} are not owned C-points",
                self.level, self.clower, self.cupper
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classification_uses_stride() {
        assert_eq!(PointKind::of(0, 3), PointKind::C);
        assert_eq!(PointKind::of(4, 3), PointKind::F);
        assert_eq!(PointKind::of(9, 3), PointKind::C);
        assert!(is_cpoint(5, 1));
    }

    #[test]
    fn intervals_for_zero_to_nine_cf3() {
        let g = Grid::new(0, 0, 9, 3, 9).unwrap();
        assert_eq!(g.ncpoints(), 4);
        let ivs: Vec<_> = g.intervals_rev().map(|(_, iv)| iv).collect();
        assert_eq!(ivs[0], Interval { flo: 10, fhi: 9, ci: None });
        assert_eq!(ivs[1], Interval { flo: 7, fhi: 8, ci: Some(9) });
        assert_eq!(ivs[2], Interval { flo: 4, fhi: 5, ci: Some(6) });
        assert_eq!(ivs[3], Interval { flo: 1, fhi: 2, ci: Some(3) });
        assert_eq!(ivs[4], Interval { flo: 0, fhi: -1, ci: Some(0) });
        assert_eq!(ivs[4].relaxed_cpoint(), None);
    }

    #[test]
    fn range_without_cpoints_is_one_interval() {
        let g = Grid::new(0, 4, 5, 3, 20).unwrap();
        assert_eq!(g.ncpoints(), 0);
        assert_eq!(g.interval(0), Interval { flo: 4, fhi: 5, ci: None });
        assert_eq!(g.left_ghost(), Some(3));
        assert_eq!(g.right_ghost(), Some(6));
    }

    #[test]
    fn empty_range_has_no_ghosts() {
        let g = Grid::new(2, 5, 4, 2, 10).unwrap();
        assert!(g.is_empty());
        assert_eq!(g.ncpoints(), 0);
        assert_eq!(g.left_ghost(), None);
        assert_eq!(g.right_ghost(), None);
    }

    #[test]
    fn rejects_bad_cfactor() {
        assert!(matches!(
            Grid::new(0, 0, 3, 0, 3),
            Err(RelaxError::InvalidConfig(_))
        ));
    }
}
