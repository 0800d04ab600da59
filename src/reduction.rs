use std::fmt;

use ndarray::ArrayView1;

use crate::projection::ProjectionError;

/// Collapses an intensity profile to a single value.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ReductionOperator {
    /// Largest sample of the profile.
    Maximum,
    /// Mean weighted by `exp(strength * value)`. Tends to [`Maximum`] as the
    /// strength grows and to [`Average`] as it approaches zero.
    ///
    /// [`Maximum`]: ReductionOperator::Maximum
    /// [`Average`]: ReductionOperator::Average
    SoftMaximum { strength: f64 },
    /// Arithmetic mean of the profile.
    Average,
}

impl ReductionOperator {
    pub fn soft_maximum(strength: f64) -> Self {
        Self::SoftMaximum { strength }
    }

    /// Check the operator parameters.
    ///
    /// # Errors
    ///
    /// Returns [`ProjectionError::InvalidParameter`] for a soft-maximum strength
    /// that is not a positive finite number.
    pub fn validate(&self) -> Result<(), ProjectionError> {
        match *self {
            Self::SoftMaximum { strength } if !(strength > 0.0 && strength.is_finite()) => Err(
                ProjectionError::invalid_parameter(format!(
                    "soft maximum strength must be positive, got {strength}"
                )),
            ),
            _ => Ok(()),
        }
    }

    /// Reduce a profile given in increasing index order.
    pub fn apply(&self, profile: ArrayView1<'_, f32>) -> Result<f32, ProjectionError> {
        self.validate()?;
        if profile.is_empty() {
            return Err(ProjectionError::EmptyProfile);
        }
        let value = match *self {
            Self::Maximum => profile.iter().copied().fold(f32::NEG_INFINITY, f32::max),
            Self::Average => {
                let sum: f64 = profile.iter().map(|&v| f64::from(v)).sum();
                (sum / profile.len() as f64) as f32
            }
            Self::SoftMaximum { strength } => soft_maximum(&profile, strength),
        };
        Ok(value)
    }

    /// Reduce a profile held in a plain slice.
    pub fn apply_slice(&self, profile: &[f32]) -> Result<f32, ProjectionError> {
        self.apply(ArrayView1::from(profile))
    }
}

// Weights are shifted by the profile maximum so `exp` never overflows.
fn soft_maximum(profile: &ArrayView1<'_, f32>, strength: f64) -> f32 {
    let peak = profile
        .iter()
        .map(|&v| f64::from(v))
        .fold(f64::NEG_INFINITY, f64::max);
    let (weighted, total) = profile.iter().fold((0.0, 0.0), |(weighted, total), &v| {
        let v = f64::from(v);
        let weight = (strength * (v - peak)).exp();
        (v.mul_add(weight, weighted), total + weight)
    });
    (weighted / total) as f32
}

impl fmt::Display for ReductionOperator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Maximum => write!(f, "maximum"),
            Self::SoftMaximum { strength } => write!(f, "soft maximum (strength {strength})"),
            Self::Average => write!(f, "average"),
        }
    }
}
