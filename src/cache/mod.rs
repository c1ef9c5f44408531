//! Time-point vector cache: the states one process holds on one level.
//!
//! The cache keeps the vectors at owned time indices that must survive between
//! sweeps (C-points, or every point when the level stores all points) plus the
//! ghost values borrowed from the neighbours at `ilower-1` and `iupper+1`.
//!
//! Ownership follows Rust moves: [`VectorCache::get`] hands the caller a fresh
//! copy, [`VectorCache::set`] moves a vector in, and a vector the caller never
//! stores is released when it is dropped.

use std::collections::BTreeMap;

use crate::debug_invariants::DebugInvariants;
use crate::grid::{Grid, TimeIndex, is_cpoint};
use crate::relax_error::RelaxError;

/// Which owned points a level keeps resident.
#[derive(Copy, Clone, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum Storage {
    /// Only C-points survive a sweep; transient F-point values are dropped.
    CPointsOnly,
    /// Every owned point survives.
    AllPoints,
}

/// Lifetime requested for a stored vector.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Residency {
    /// F-point value that may be released once propagated.
    Transient,
    /// Value that must stay resident for later intervals and sweeps.
    Persistent,
}

#[derive(Clone, Debug)]
pub struct VectorCache<V> {
    level: usize,
    ilower: TimeIndex,
    iupper: TimeIndex,
    cfactor: TimeIndex,
    storage: Storage,
    points: BTreeMap<TimeIndex, V>,
    in_flight: bool,
    epoch: u16,
}

impl<V: Clone> VectorCache<V> {
    pub fn new(grid: &Grid, storage: Storage) -> Self {
        Self {
            level: grid.level(),
            ilower: grid.ilower(),
            iupper: grid.iupper(),
            cfactor: grid.cfactor(),
            storage,
            points: BTreeMap::new(),
            in_flight: false,
            epoch: 0,
        }
    }

    #[inline]
    pub fn level(&self) -> usize {
        self.level
    }

    #[inline]
    pub fn storage(&self) -> Storage {
        self.storage
    }

    /// Returns a copy of the vector at `index`.
    ///
    /// # Errors
    /// `Unresolved` if nothing is resident at `index`. Values arriving from a
    /// neighbour are resolved by the transfer handle before they get here.
    pub fn get(&self, index: TimeIndex) -> Result<V, RelaxError> {
        self.get_ref(index).cloned()
    }

    /// Borrowing variant of [`get`](Self::get).
    pub fn get_ref(&self, index: TimeIndex) -> Result<&V, RelaxError> {
        self.points.get(&index).ok_or(RelaxError::Unresolved {
            level: self.level,
            index,
        })
    }

    /// True if a store at `index` with `residency` keeps the value.
    #[inline]
    pub fn retains(&self, index: TimeIndex, residency: Residency) -> bool {
        match residency {
            Residency::Persistent => true,
            Residency::Transient => {
                self.storage == Storage::AllPoints || is_cpoint(index, self.cfactor)
            }
        }
    }

    /// Stores `u` at the owned index `index`, replacing any previous value.
    ///
    /// A `Transient` F-point value is dropped unless the level stores all
    /// points.
    pub fn set(&mut self, index: TimeIndex, u: V, residency: Residency) -> Result<(), RelaxError> {
        if !(self.ilower <= index && index <= self.iupper) {
            return Err(RelaxError::OutOfRange {
                level: self.level,
                index,
            });
        }
        if self.retains(index, residency) {
            self.points.insert(index, u);
        }
        Ok(())
    }

    /// Releases the vector at `index`.
    ///
    /// # Errors
    /// `NotResident` if nothing is stored there (double free).
    pub fn free(&mut self, index: TimeIndex) -> Result<(), RelaxError> {
        self.points
            .remove(&index)
            .map(drop)
            .ok_or(RelaxError::NotResident {
                level: self.level,
                index,
            })
    }

    #[inline]
    pub fn is_resident(&self, index: TimeIndex) -> bool {
        self.points.contains_key(&index)
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    /// Resident `(index, vector)` pairs in ascending time order, ghosts included.
    pub fn iter(&self) -> impl Iterator<Item = (TimeIndex, &V)> {
        self.points.iter().map(|(&i, v)| (i, v))
    }

    /// True between a transfer's `initiate` and its `wait`.
    #[inline]
    pub fn in_flight(&self) -> bool {
        self.in_flight
    }

    /// Sequence number of the most recent transfer on this level (0 before
    /// the first). Every process relaxing the level advances it once per
    /// `initiate`, so neighbours agree on it even after a failed sweep.
    #[inline]
    pub fn epoch(&self) -> u16 {
        self.epoch
    }

    fn is_ghost(&self, index: TimeIndex) -> bool {
        index == self.ilower - 1 || index == self.iupper + 1
    }

    pub(crate) fn set_ghost(&mut self, index: TimeIndex, u: V) -> Result<(), RelaxError> {
        if !self.is_ghost(index) {
            return Err(RelaxError::OutOfRange {
                level: self.level,
                index,
            });
        }
        log::trace!("cache: level {} ghost {index} materialised", self.level);
        self.points.insert(index, u);
        Ok(())
    }

    /// Discards a stale ghost before a fresh receive is posted for it.
    pub(crate) fn drop_ghost(&mut self, index: TimeIndex) {
        if self.is_ghost(index) {
            self.points.remove(&index);
        }
    }

    /// Marks a transfer in flight and returns its sequence number.
    pub(crate) fn begin_transfer(&mut self) -> Result<u16, RelaxError> {
        if self.in_flight {
            return Err(RelaxError::TransferInFlight { level: self.level });
        }
        self.in_flight = true;
        self.epoch = self.epoch.wrapping_add(1);
        Ok(self.epoch)
    }

    pub(crate) fn end_transfer(&mut self) {
        self.in_flight = false;
    }
}

impl<V: Clone> DebugInvariants for VectorCache<V> {
    fn debug_assert_invariants(&self) {
        crate::debug_invariants!(self.validate_invariants(), "VectorCache");
    }

    fn validate_invariants(&self) -> Result<(), RelaxError> {
        for &index in self.points.keys() {
            if index < self.ilower - 1 || index > self.iupper + 1 {
                return Err(RelaxError::OutOfRange {
                    level: self.level,
                    index,
                });
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cache(storage: Storage) -> VectorCache<f64> {
        let grid = Grid::new(0, 3, 8, 3, 20).unwrap();
        VectorCache::new(&grid, storage)
    }

    #[test]
    fn transient_fpoint_dropped_under_c_storage() {
        let mut c = cache(Storage::CPointsOnly);
        c.set(4, 1.0, Residency::Transient).unwrap();
        c.set(6, 2.0, Residency::Transient).unwrap();
        assert!(!c.is_resident(4));
        assert_eq!(c.get(6).unwrap(), 2.0);
    }

    #[test]
    fn all_points_storage_keeps_fpoints() {
        let mut c = cache(Storage::AllPoints);
        c.set(4, 1.0, Residency::Transient).unwrap();
        assert_eq!(c.get(4).unwrap(), 1.0);
    }

    #[test]
    fn unresolved_get_and_double_free_error() {
        let mut c = cache(Storage::CPointsOnly);
        assert!(matches!(
            c.get(5),
            Err(RelaxError::Unresolved { level: 0, index: 5 })
        ));
        c.set(5, 1.0, Residency::Persistent).unwrap();
        c.free(5).unwrap();
        assert!(matches!(
            c.free(5),
            Err(RelaxError::NotResident { level: 0, index: 5 })
        ));
    }

    #[test]
    fn ghosts_live_outside_owned_range() {
        let mut c = cache(Storage::CPointsOnly);
        assert!(c.set(2, 0.5, Residency::Persistent).is_err());
        c.set_ghost(2, 0.5).unwrap();
        c.set_ghost(9, 0.25).unwrap();
        assert!(c.set_ghost(10, 0.0).is_err());
        assert_eq!(c.get(2).unwrap(), 0.5);
        c.drop_ghost(2);
        assert!(!c.is_resident(2));
        c.validate_invariants().unwrap();
    }

    #[test]
    fn second_transfer_rejected_until_first_ends() {
        let mut c = cache(Storage::CPointsOnly);
        assert_eq!(c.begin_transfer().unwrap(), 1);
        assert!(matches!(
            c.begin_transfer(),
            Err(RelaxError::TransferInFlight { level: 0 })
        ));
        assert_eq!(c.epoch(), 1);
        c.end_transfer();
        assert_eq!(c.begin_transfer().unwrap(), 2);
    }
}
