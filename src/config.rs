//! Relaxation schedule: sweep counts, C-point weights and storage policy.

use crate::cache::Storage;
use crate::relax_error::RelaxError;

/// Per-level relaxation parameters.
///
/// Setters taking `Option<usize>` apply to one level when given `Some(level)`
/// and to every level when given `None`.
#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct RelaxConfig {
    pub nlevels: usize,
    /// Sweeps per relaxation call, one entry per level.
    pub nrelax: Vec<usize>,
    /// C-relaxation weight in (0, 1], one entry per level.
    pub cwts: Vec<f64>,
    /// First level that stores every point; `None` keeps only C-points.
    #[serde(default)]
    pub storage: Option<usize>,
}

impl RelaxConfig {
    pub fn new(nlevels: usize) -> Self {
        Self {
            nlevels,
            nrelax: vec![1; nlevels],
            cwts: vec![1.0; nlevels],
            storage: None,
        }
    }

    pub fn set_nrelax(&mut self, level: Option<usize>, nrelax: usize) -> &mut Self {
        match level {
            Some(l) if l < self.nrelax.len() => self.nrelax[l] = nrelax,
            Some(_) => {}
            None => self.nrelax.iter_mut().for_each(|n| *n = nrelax),
        }
        self
    }

    pub fn set_crelax_wt(&mut self, level: Option<usize>, cwt: f64) -> &mut Self {
        match level {
            Some(l) if l < self.cwts.len() => self.cwts[l] = cwt,
            Some(_) => {}
            None => self.cwts.iter_mut().for_each(|w| *w = cwt),
        }
        self
    }

    pub fn set_storage(&mut self, storage: Option<usize>) -> &mut Self {
        self.storage = storage;
        self
    }

    #[inline]
    pub fn is_coarsest(&self, level: usize) -> bool {
        level + 1 == self.nlevels
    }

    pub fn storage_for(&self, level: usize) -> Storage {
        match self.storage {
            Some(first) if level >= first => Storage::AllPoints,
            _ => Storage::CPointsOnly,
        }
    }

    pub fn validate(&self) -> Result<(), RelaxError> {
        if self.nlevels == 0 {
            return Err(RelaxError::InvalidConfig("nlevels must be >= 1".into()));
        }
        if self.nrelax.len() != self.nlevels || self.cwts.len() != self.nlevels {
            return Err(RelaxError::InvalidConfig(format!(
                "expected {} per-level entries, got nrelax={} cwts={}",
                self.nlevels,
                self.nrelax.len(),
                self.cwts.len()
            )));
        }
        if let Some((level, w)) = self
            .cwts
            .iter()
            .enumerate()
            .find(|&(_, &w)| !(w > 0.0 && w <= 1.0))
        {
            return Err(RelaxError::InvalidConfig(format!(
                "CWt on level {level} must lie in (0, 1], got {w}"
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn setters_target_one_or_all_levels() {
        let mut cfg = RelaxConfig::new(3);
        cfg.set_nrelax(None, 2).set_nrelax(Some(2), 0);
        cfg.set_crelax_wt(Some(1), 0.5);
        assert_eq!(cfg.nrelax, vec![2, 2, 0]);
        assert_eq!(cfg.cwts, vec![1.0, 0.5, 1.0]);
        cfg.validate().unwrap();
    }

    #[test]
    fn rejects_weight_outside_unit_interval() {
        let mut cfg = RelaxConfig::new(2);
        cfg.set_crelax_wt(Some(0), 1.5);
        assert!(matches!(cfg.validate(), Err(RelaxError::InvalidConfig(_))));
        cfg.set_crelax_wt(Some(0), f64::NAN);
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn storage_level_switches_policy() {
        let mut cfg = RelaxConfig::new(3);
        cfg.set_storage(Some(1));
        assert_eq!(cfg.storage_for(0), Storage::CPointsOnly);
        assert_eq!(cfg.storage_for(2), Storage::AllPoints);
    }

    #[test]
    fn deserializes_without_storage_field() {
        let cfg: RelaxConfig =
            serde_json::from_str(r#"{"nlevels":2,"nrelax":[1,3],"cwts":[0.7,1.0]}"#).unwrap();
        assert_eq!(cfg.storage, None);
        assert_eq!(cfg.nrelax[1], 3);
        cfg.validate().unwrap();
    }
}
