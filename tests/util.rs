#![allow(dead_code)]
use mgrit_relax::prelude::*;

/// One collaborator call, as seen by the recording app.
#[derive(Clone, Debug, PartialEq)]
pub enum Event {
    Step {
        level: usize,
        index: TimeIndex,
        seed: f64,
        out: f64,
    },
    Sum {
        alpha: f64,
        x: f64,
        beta: f64,
        out: f64,
    },
    Solve {
        index: TimeIndex,
        xrelax: bool,
        left: Option<f64>,
        center: f64,
        right: Option<f64>,
        out: f64,
    },
}

/// Scalar app with a deterministic affine step `u <- u/2 + index` that
/// records every call.
pub struct ScalarApp {
    pub events: Vec<Event>,
    pub fail_at: Option<TimeIndex>,
    init: fn(f64) -> f64,
}

impl ScalarApp {
    pub fn new() -> Self {
        Self::with_init(|t| t)
    }

    pub fn with_init(init: fn(f64) -> f64) -> Self {
        Self {
            events: Vec::new(),
            fail_at: None,
            init,
        }
    }

    pub fn step_indices(&self) -> Vec<TimeIndex> {
        self.events
            .iter()
            .filter_map(|e| match e {
                Event::Step { index, .. } => Some(*index),
                _ => None,
            })
            .collect()
    }

    pub fn step_outputs_at(&self, at: TimeIndex) -> Vec<f64> {
        self.events
            .iter()
            .filter_map(|e| match e {
                Event::Step { index, out, .. } if *index == at => Some(*out),
                _ => None,
            })
            .collect()
    }

    pub fn sums(&self) -> usize {
        self.events
            .iter()
            .filter(|e| matches!(e, Event::Sum { .. }))
            .count()
    }

    /// `(index, xrelax)` of every solve, in call order.
    pub fn solves(&self) -> Vec<(TimeIndex, bool)> {
        self.events
            .iter()
            .filter_map(|e| match e {
                Event::Solve { index, xrelax, .. } => Some((*index, *xrelax)),
                _ => None,
            })
            .collect()
    }
}

impl App for ScalarApp {
    type Vector = f64;

    fn init(&mut self, t: f64) -> Result<f64, AppError> {
        Ok((self.init)(t))
    }

    fn step(&mut self, status: &StepStatus, u: &mut f64) -> Result<(), AppError> {
        if self.fail_at == Some(status.index) {
            return Err(format!("step diverged at {}", status.index).into());
        }
        let seed = *u;
        *u = 0.5 * seed + status.index as f64;
        self.events.push(Event::Step {
            level: status.level,
            index: status.index,
            seed,
            out: *u,
        });
        Ok(())
    }

    fn sum(&mut self, alpha: f64, x: &f64, beta: f64, y: &mut f64) -> Result<(), AppError> {
        *y = alpha * *x + beta * *y;
        self.events.push(Event::Sum {
            alpha,
            x: *x,
            beta,
            out: *y,
        });
        Ok(())
    }

    fn buf_size(&self) -> usize {
        std::mem::size_of::<f64>()
    }

    fn buf_pack(&self, u: &f64, buf: &mut [u8]) -> Result<usize, AppError> {
        buf[..8].copy_from_slice(&u.to_le_bytes());
        Ok(8)
    }

    fn buf_unpack(&self, buf: &[u8]) -> Result<f64, AppError> {
        let bytes: [u8; 8] = buf
            .get(..8)
            .and_then(|b| b.try_into().ok())
            .ok_or("short f64 buffer")?;
        Ok(f64::from_le_bytes(bytes))
    }
}

impl TriApp for ScalarApp {
    fn tri_solve(
        &mut self,
        status: &TriStatus,
        stencil: TriStencil<'_, f64>,
    ) -> Result<f64, AppError> {
        if self.fail_at == Some(status.index) {
            return Err(format!("solve failed at {}", status.index).into());
        }
        let left = stencil.left.copied();
        let right = stencil.right.copied();
        let out = 0.5 * *stencil.center
            + 0.25 * (left.unwrap_or(0.0) + right.unwrap_or(0.0))
            + if status.xrelax { 1.0 } else { 0.0 };
        self.events.push(Event::Solve {
            index: status.index,
            xrelax: status.xrelax,
            left,
            center: *stencil.center,
            right,
            out,
        });
        Ok(out)
    }
}

/// Single-process engine over one level `[0, iupper]`.
pub fn serial(iupper: TimeIndex, cfactor: TimeIndex, config: RelaxConfig) -> Relaxer<ScalarApp, NoComm> {
    let grids = (0..config.nlevels)
        .map(|l| Grid::new(l, 0, iupper, cfactor, iupper).unwrap())
        .collect();
    let mut relaxer = Relaxer::new(ScalarApp::new(), NoComm, config, grids).unwrap();
    relaxer.initialize(0).unwrap();
    relaxer
}

/// Resident `(index, value)` pairs of a level.
pub fn snapshot<C: Communicator>(r: &Relaxer<ScalarApp, C>, level: usize) -> Vec<(TimeIndex, f64)> {
    r.cache(level)
        .unwrap()
        .iter()
        .map(|(i, v)| (i, *v))
        .collect()
}
