//! Relaxation engine: owns the collaborators and per-level state and runs the
//! F-C and block-triangular sweeps.
//!
//! One [`Relaxer`] lives on each process. It is single-threaded; parallelism
//! comes from the processes, which synchronise only through the matched
//! sends and receives of the message channel.

mod fc_relax;
mod tri_relax;

use crate::app::App;
use crate::cache::{Residency, Storage, VectorCache};
use crate::comm::communicator::{CommTag, Communicator};
use crate::config::RelaxConfig;
use crate::grid::{Grid, TimeIndex};
use crate::relax_error::RelaxError;

/// Counters of collaborator work performed by the engine.
#[derive(Clone, Debug, Default, PartialEq, Eq, serde::Serialize)]
pub struct RelaxStats {
    pub sweeps: u64,
    pub fsteps: u64,
    pub crelax: u64,
    pub combines: u64,
    pub solves: u64,
    pub closing_passes: u64,
}

pub(crate) struct LevelState<V> {
    pub(crate) grid: Grid,
    pub(crate) cache: VectorCache<V>,
}

pub struct Relaxer<A: App, C: Communicator> {
    app: A,
    comm: C,
    config: RelaxConfig,
    levels: Vec<LevelState<A::Vector>>,
    tag: CommTag,
    stats: RelaxStats,
}

impl<A: App, C: Communicator> Relaxer<A, C> {
    /// Builds the engine for one process from its level descriptors, one per
    /// configured level, finest first.
    pub fn new(app: A, comm: C, config: RelaxConfig, grids: Vec<Grid>) -> Result<Self, RelaxError> {
        config.validate()?;
        if grids.len() != config.nlevels {
            return Err(RelaxError::InvalidConfig(format!(
                "{} grids supplied for {} levels",
                grids.len(),
                config.nlevels
            )));
        }
        if let Some((l, g)) = grids.iter().enumerate().find(|(l, g)| g.level() != *l) {
            return Err(RelaxError::InvalidConfig(format!(
                "grid at position {l} describes level {}",
                g.level()
            )));
        }
        let levels = grids
            .into_iter()
            .map(|grid| {
                let cache = VectorCache::new(&grid, config.storage_for(grid.level()));
                LevelState { grid, cache }
            })
            .collect();
        Ok(Self {
            app,
            comm,
            config,
            levels,
            tag: CommTag::default(),
            stats: RelaxStats::default(),
        })
    }

    /// Base tag for this engine's messages; each level uses four tags above it.
    pub fn with_tag(mut self, tag: CommTag) -> Self {
        self.tag = tag;
        self
    }

    pub(crate) fn level_tag(&self, level: usize) -> CommTag {
        self.tag.offset((level as u16).wrapping_mul(4))
    }

    pub(crate) fn check_level(&self, level: usize) -> Result<(), RelaxError> {
        if level < self.levels.len() {
            Ok(())
        } else {
            Err(RelaxError::InvalidLevel {
                level,
                nlevels: self.levels.len(),
            })
        }
    }

    /// Fills every point the level keeps resident with the application's
    /// initial guess.
    pub fn initialize(&mut self, level: usize) -> Result<(), RelaxError> {
        self.check_level(level)?;
        let LevelState { grid, cache } = &mut self.levels[level];
        for index in grid.owned() {
            if cache.retains(index, Residency::Transient) {
                let u = self
                    .app
                    .init(grid.time(index))
                    .map_err(RelaxError::collaborator("init", level, index))?;
                cache.set(index, u, Residency::Persistent)?;
            }
        }
        log::debug!(
            "initialize: level {level} filled {} resident points",
            cache.len()
        );
        Ok(())
    }

    pub fn grid(&self, level: usize) -> Result<&Grid, RelaxError> {
        self.check_level(level)?;
        Ok(&self.levels[level].grid)
    }

    pub fn cache(&self, level: usize) -> Result<&VectorCache<A::Vector>, RelaxError> {
        self.check_level(level)?;
        Ok(&self.levels[level].cache)
    }

    pub fn cache_mut(&mut self, level: usize) -> Result<&mut VectorCache<A::Vector>, RelaxError> {
        self.check_level(level)?;
        Ok(&mut self.levels[level].cache)
    }

    /// Convenience accessor for a resident value.
    pub fn value(&self, level: usize, index: TimeIndex) -> Result<A::Vector, RelaxError> {
        self.cache(level)?.get(index)
    }

    pub fn storage(&self, level: usize) -> Result<Storage, RelaxError> {
        Ok(self.cache(level)?.storage())
    }

    pub fn config(&self) -> &RelaxConfig {
        &self.config
    }

    pub fn app(&self) -> &A {
        &self.app
    }

    pub fn app_mut(&mut self) -> &mut A {
        &mut self.app
    }

    pub fn comm(&self) -> &C {
        &self.comm
    }

    pub fn stats(&self) -> &RelaxStats {
        &self.stats
    }

    pub fn into_app(self) -> A {
        self.app
    }
}
