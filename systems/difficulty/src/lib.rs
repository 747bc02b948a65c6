#![deny(
    unsafe_code,
    missing_docs,
    dead_code,
    unused_results,
    non_snake_case,
    unreachable_pub
)]

//! Progress-indexed difficulty curves.
//!
//! A curve maps level progress in `0.0..=1.0` onto a [`DifficultyLevel`]: the
//! scalar `k` consumed by color allocation plus the lock density knobs consumed
//! by the lock graph. Every curve built here is monotone non-decreasing in `k`;
//! profiles that would violate this are rejected with a [`DifficultyError`].

use std::fmt;

use screw_unlock_core::{DifficultyProfile, DifficultyStage};

const BASE_LOCK_PROBABILITY: f32 = 0.1;
const LOCK_PROBABILITY_SPAN: f32 = 0.8;

/// Difficulty knobs in effect at a given point of the level.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct DifficultyLevel {
    /// Difficulty scalar in `0.0..=1.0`; higher values mean less hand-holding.
    pub k: f32,
    /// Probability that a freshly revealed peg gets locked.
    pub lock_probability: f32,
    /// Expected number of controllers attached to each locked peg.
    pub connection_multiplier: f32,
}

impl DifficultyLevel {
    /// Derives lock knobs from a bare difficulty scalar.
    #[must_use]
    pub fn from_k(k: f32) -> Self {
        let k = clamp_unit(k);
        Self {
            k,
            lock_probability: BASE_LOCK_PROBABILITY + k * LOCK_PROBABILITY_SPAN,
            connection_multiplier: 1.0,
        }
    }

    /// Difficulty scalar expressed in thousandths, for integer-only consumers.
    #[must_use]
    pub fn k_permille(&self) -> u32 {
        (clamp_unit(self.k) * 1000.0).round() as u32
    }
}

/// Function from level progress to difficulty.
pub trait DifficultyCurve: fmt::Debug {
    /// Samples the curve. `progress` is clamped into `0.0..=1.0`.
    fn sample(&self, progress: f32) -> DifficultyLevel;
}

/// Reasons a difficulty profile may be rejected.
#[derive(Clone, Debug, PartialEq, thiserror::Error)]
pub enum DifficultyError {
    /// The profile contains no values.
    #[error("difficulty curve has no points")]
    Empty,
    /// A value lies outside the unit interval.
    #[error("difficulty value {value} at position {index} lies outside 0..=1")]
    OutOfRange {
        /// Position of the offending value.
        index: usize,
        /// Offending value.
        value: f32,
    },
    /// The curve decreases.
    #[error("difficulty curve decreases at position {index}")]
    NotMonotone {
        /// Position where the curve first decreases.
        index: usize,
    },
    /// Stage thresholds or spline abscissae do not strictly increase.
    #[error("progress thresholds must strictly increase; position {index} holds {value}")]
    UnorderedProgress {
        /// Position of the offending threshold.
        index: usize,
        /// Offending threshold.
        value: f32,
    },
}

/// Builds the curve described by the profile.
pub fn build_curve(profile: &DifficultyProfile) -> Result<Box<dyn DifficultyCurve>, DifficultyError> {
    Ok(match profile {
        DifficultyProfile::Cubic { floor, ceiling } => Box::new(CubicCurve::new(*floor, *ceiling)?),
        DifficultyProfile::Stages { stages } => Box::new(StepCurve::new(stages.clone())?),
        DifficultyProfile::Table { values } => Box::new(TableCurve::new(values.clone())?),
        DifficultyProfile::Spline { points } => Box::new(SplineCurve::new(points)?),
    })
}

/// Cubic "loose early, tight late" curve.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct CubicCurve {
    floor: f32,
    ceiling: f32,
}

impl CubicCurve {
    /// Creates a cubic curve rising from `floor` to `ceiling`.
    pub fn new(floor: f32, ceiling: f32) -> Result<Self, DifficultyError> {
        check_unit(0, floor)?;
        check_unit(1, ceiling)?;
        if ceiling < floor {
            return Err(DifficultyError::NotMonotone { index: 1 });
        }
        Ok(Self { floor, ceiling })
    }
}

impl DifficultyCurve for CubicCurve {
    fn sample(&self, progress: f32) -> DifficultyLevel {
        let p = clamp_unit(progress);
        DifficultyLevel::from_k(self.floor + p * p * p * (self.ceiling - self.floor))
    }
}

/// Step function over progress thresholds carrying explicit lock knobs.
#[derive(Clone, Debug, PartialEq)]
pub struct StepCurve {
    stages: Vec<DifficultyStage>,
}

impl StepCurve {
    /// Creates a staged curve.
    ///
    /// Stages must be ordered by `until`, and none of `k`, the lock
    /// probability, or the connection multiplier may drop from one stage to
    /// the next.
    pub fn new(stages: Vec<DifficultyStage>) -> Result<Self, DifficultyError> {
        if stages.is_empty() {
            return Err(DifficultyError::Empty);
        }

        let mut previous: Option<&DifficultyStage> = None;
        for (index, stage) in stages.iter().enumerate() {
            check_unit(index, stage.k)?;
            check_unit(index, stage.lock_probability_factor)?;
            if !(stage.connection_multiplier >= 0.0) {
                return Err(DifficultyError::OutOfRange {
                    index,
                    value: stage.connection_multiplier,
                });
            }
            if let Some(previous) = previous {
                if !(stage.until > previous.until) {
                    return Err(DifficultyError::UnorderedProgress {
                        index,
                        value: stage.until,
                    });
                }
                let eases = stage.k < previous.k
                    || stage.lock_probability_factor < previous.lock_probability_factor
                    || stage.connection_multiplier < previous.connection_multiplier;
                if eases {
                    return Err(DifficultyError::NotMonotone { index });
                }
            }
            previous = Some(stage);
        }

        Ok(Self { stages })
    }

    fn stage_at(&self, progress: f32) -> &DifficultyStage {
        let p = clamp_unit(progress);
        self.stages
            .iter()
            .find(|stage| p < stage.until)
            .or_else(|| self.stages.last())
            .unwrap_or(&self.stages[0])
    }
}

impl DifficultyCurve for StepCurve {
    fn sample(&self, progress: f32) -> DifficultyLevel {
        let stage = self.stage_at(progress);
        DifficultyLevel {
            k: stage.k,
            lock_probability: stage.lock_probability_factor,
            connection_multiplier: stage.connection_multiplier,
        }
    }
}

/// Sampled curve indexed by progress.
#[derive(Clone, Debug, PartialEq)]
pub struct TableCurve {
    values: Vec<f32>,
}

impl TableCurve {
    /// Creates a table curve from non-decreasing values in `0.0..=1.0`.
    pub fn new(values: Vec<f32>) -> Result<Self, DifficultyError> {
        if values.is_empty() {
            return Err(DifficultyError::Empty);
        }
        for (index, value) in values.iter().enumerate() {
            check_unit(index, *value)?;
            if index > 0 && *value < values[index - 1] {
                return Err(DifficultyError::NotMonotone { index });
            }
        }
        Ok(Self { values })
    }
}

impl DifficultyCurve for TableCurve {
    fn sample(&self, progress: f32) -> DifficultyLevel {
        let last = self.values.len() - 1;
        let index = ((clamp_unit(progress) * last as f32).floor() as usize).min(last);
        DifficultyLevel::from_k(self.values[index])
    }
}

/// Monotone cubic Hermite spline through control points (Fritsch–Carlson).
#[derive(Clone, Debug, PartialEq)]
pub struct SplineCurve {
    xs: Vec<f32>,
    ys: Vec<f32>,
    tangents: Vec<f32>,
}

impl SplineCurve {
    /// Creates a spline through `[progress, k]` points with strictly increasing progress.
    pub fn new(points: &[[f32; 2]]) -> Result<Self, DifficultyError> {
        if points.is_empty() {
            return Err(DifficultyError::Empty);
        }

        let mut xs = Vec::with_capacity(points.len());
        let mut ys = Vec::with_capacity(points.len());
        for (index, [x, y]) in points.iter().copied().enumerate() {
            check_unit(index, x)?;
            check_unit(index, y)?;
            if let (Some(&px), Some(&py)) = (xs.last(), ys.last()) {
                if !(x > px) {
                    return Err(DifficultyError::UnorderedProgress { index, value: x });
                }
                if y < py {
                    return Err(DifficultyError::NotMonotone { index });
                }
            }
            xs.push(x);
            ys.push(y);
        }

        let tangents = monotone_tangents(&xs, &ys);
        Ok(Self { xs, ys, tangents })
    }

    fn evaluate(&self, progress: f32) -> f32 {
        let count = self.xs.len();
        if count == 1 {
            return self.ys[0];
        }

        let x = clamp_unit(progress).clamp(self.xs[0], self.xs[count - 1]);
        let segment = self
            .xs
            .windows(2)
            .position(|pair| x <= pair[1])
            .unwrap_or(count - 2);

        let (x0, x1) = (self.xs[segment], self.xs[segment + 1]);
        let (y0, y1) = (self.ys[segment], self.ys[segment + 1]);
        let (m0, m1) = (self.tangents[segment], self.tangents[segment + 1]);
        let h = x1 - x0;
        let t = (x - x0) / h;
        let t2 = t * t;
        let t3 = t2 * t;

        let value = (2.0 * t3 - 3.0 * t2 + 1.0) * y0
            + (t3 - 2.0 * t2 + t) * h * m0
            + (-2.0 * t3 + 3.0 * t2) * y1
            + (t3 - t2) * h * m1;
        value.clamp(y0, y1)
    }
}

impl DifficultyCurve for SplineCurve {
    fn sample(&self, progress: f32) -> DifficultyLevel {
        DifficultyLevel::from_k(self.evaluate(progress))
    }
}

fn monotone_tangents(xs: &[f32], ys: &[f32]) -> Vec<f32> {
    let count = xs.len();
    if count < 2 {
        return vec![0.0; count];
    }

    let secants: Vec<f32> = (0..count - 1)
        .map(|i| (ys[i + 1] - ys[i]) / (xs[i + 1] - xs[i]))
        .collect();

    let mut tangents = vec![0.0; count];
    tangents[0] = secants[0];
    tangents[count - 1] = secants[count - 2];
    for i in 1..count - 1 {
        tangents[i] = if secants[i - 1] * secants[i] > 0.0 {
            (secants[i - 1] + secants[i]) / 2.0
        } else {
            0.0
        };
    }

    for (i, secant) in secants.iter().copied().enumerate() {
        if secant == 0.0 {
            tangents[i] = 0.0;
            tangents[i + 1] = 0.0;
            continue;
        }
        let a = tangents[i] / secant;
        let b = tangents[i + 1] / secant;
        let magnitude = a * a + b * b;
        if magnitude > 9.0 {
            let scale = 3.0 / magnitude.sqrt();
            tangents[i] = scale * a * secant;
            tangents[i + 1] = scale * b * secant;
        }
    }

    tangents
}

fn clamp_unit(value: f32) -> f32 {
    if value.is_nan() {
        0.0
    } else {
        value.clamp(0.0, 1.0)
    }
}

fn check_unit(index: usize, value: f32) -> Result<(), DifficultyError> {
    if (0.0..=1.0).contains(&value) {
        Ok(())
    } else {
        Err(DifficultyError::OutOfRange { index, value })
    }
}
