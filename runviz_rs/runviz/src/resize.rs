//! Fitting a run's footprint into the platform's display envelope.

use serde::{Deserialize, Serialize};

use super::RunVizError;

/// How a measured `(x, z)` extent is mapped onto the display envelope.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize, Default)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ResizePolicy {
    /// Linear interpolation anchored at 1, using `obj_max` and `scale_max`.
    #[default]
    Linear,
    /// Each axis grows with `ln(1 + d)` relative to the larger axis.
    Logarithmic { max_size: f64 },
    /// Each axis is normalised by the larger axis and raised to `exponent`.
    PowerLaw {
        min_size: f64,
        max_size: f64,
        exponent: f64,
    },
}

impl ResizePolicy {
    pub fn validate(&self) -> Result<(), RunVizError> {
        match *self {
            ResizePolicy::Linear => Ok(()),
            ResizePolicy::Logarithmic { max_size } => {
                if max_size > 0.0 {
                    Ok(())
                } else {
                    Err(RunVizError::InvalidParameter(format!(
                        "logarithmic max_size must be positive, got {max_size}"
                    )))
                }
            }
            ResizePolicy::PowerLaw {
                min_size,
                max_size,
                exponent,
            } => {
                if !(exponent > 0.0 && exponent <= 1.0) {
                    return Err(RunVizError::InvalidParameter(format!(
                        "power-law exponent must be in (0, 1], got {exponent}"
                    )));
                }
                if min_size > max_size {
                    return Err(RunVizError::InvalidParameter(format!(
                        "power-law min_size {min_size} exceeds max_size {max_size}"
                    )));
                }
                Ok(())
            }
        }
    }

    /// The same policy with its envelope upper bound replaced. `Linear` takes
    /// its bound from `Params::scale_max` and is returned unchanged.
    pub fn with_max_size(self, max: f64) -> Self {
        match self {
            ResizePolicy::Linear => ResizePolicy::Linear,
            ResizePolicy::Logarithmic { .. } => ResizePolicy::Logarithmic { max_size: max },
            ResizePolicy::PowerLaw {
                min_size, exponent, ..
            } => ResizePolicy::PowerLaw {
                min_size,
                max_size: max,
                exponent,
            },
        }
    }

    /// The same policy with a new exponent, or `None` when the policy has no
    /// exponent to set.
    pub fn with_exponent(self, exponent: f64) -> Option<Self> {
        match self {
            ResizePolicy::PowerLaw {
                min_size, max_size, ..
            } => Some(ResizePolicy::PowerLaw {
                min_size,
                max_size,
                exponent,
            }),
            _ => None,
        }
    }
}

/// Scale factor for one axis under the linear policy. A zero extent is left
/// unscaled.
pub fn resize_linear(original: f64, obj_max: f64, scale_max: f64) -> f64 {
    if original == 0.0 {
        return 1.0;
    }
    let scaled = 1.0 + ((original - 1.0) / (obj_max - 1.0)) * (scale_max - 1.0);
    scaled / original
}

/// Per-axis scale factors for a measured `(x, z)` extent.
pub fn resize_extent(
    extent: (f64, f64),
    policy: &ResizePolicy,
    obj_max: f64,
    scale_max: f64,
) -> (f64, f64) {
    let (x, z) = extent;
    match *policy {
        ResizePolicy::Linear => (
            resize_linear(x, obj_max, scale_max),
            resize_linear(z, obj_max, scale_max),
        ),
        ResizePolicy::Logarithmic { max_size } => {
            let largest = x.max(z);
            if largest == 0.0 {
                return (1.0, 1.0);
            }
            let log_max = largest.ln_1p();
            let axis = |d: f64| {
                if d == 0.0 {
                    1.0
                } else {
                    max_size * (d.ln_1p() / log_max) / d
                }
            };
            (axis(x), axis(z))
        }
        ResizePolicy::PowerLaw {
            min_size,
            max_size,
            exponent,
        } => {
            let largest = x.max(z);
            if largest == 0.0 {
                return (1.0, 1.0);
            }
            let axis = |d: f64| {
                if d == 0.0 {
                    1.0
                } else {
                    let scaled = min_size + (d / largest).powf(exponent) * (max_size - min_size);
                    scaled / d
                }
            };
            (axis(x), axis(z))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn linear_identity_at_anchor() {
        assert!((resize_linear(1.0, 300.0, 100.0) - 1.0).abs() < 1e-12);
    }

    #[test]
    fn linear_maps_obj_max_to_scale_max() {
        let factor = resize_linear(300.0, 300.0, 100.0);
        assert!((factor - 100.0 / 300.0).abs() < 1e-12);
        assert!((factor * 300.0 - 100.0).abs() < 1e-9);
    }

    #[test]
    fn linear_zero_extent_is_unscaled() {
        assert_eq!(resize_linear(0.0, 300.0, 100.0), 1.0);
        assert_eq!(
            resize_extent((0.0, 0.0), &ResizePolicy::Linear, 300.0, 100.0),
            (1.0, 1.0)
        );
    }

    #[test]
    fn linear_is_deterministic() {
        let a = resize_extent((42.0, 17.5), &ResizePolicy::Linear, 300.0, 100.0);
        let b = resize_extent((42.0, 17.5), &ResizePolicy::Linear, 300.0, 100.0);
        assert_eq!(a, b);
    }

    #[test]
    fn linear_preserves_size_ordering() {
        let mut prev = 0.0;
        for original in [1.0, 2.0, 10.0, 55.5, 120.0, 299.0, 300.0] {
            let size = original * resize_linear(original, 300.0, 100.0);
            assert!(size >= prev, "{original} shrank to {size}");
            assert!((1.0..=100.0 + 1e-9).contains(&size));
            prev = size;
        }
    }

    #[test]
    fn logarithmic_fits_larger_axis_to_max() {
        let (fx, fz) = resize_extent(
            (200.0, 50.0),
            &ResizePolicy::Logarithmic { max_size: 100.0 },
            300.0,
            100.0,
        );
        assert!((fx * 200.0 - 100.0).abs() < 1e-9);
        assert!(fz * 50.0 < 100.0);
        assert!(fz * 50.0 > 50.0 * (100.0 / 200.0));
    }

    #[test]
    fn power_law_bounds() {
        let policy = ResizePolicy::PowerLaw {
            min_size: 1.0,
            max_size: 100.0,
            exponent: 0.92,
        };
        let (fx, fz) = resize_extent((80.0, 0.0), &policy, 300.0, 100.0);
        assert!((fx * 80.0 - 100.0).abs() < 1e-9);
        assert_eq!(fz, 1.0);
    }

    #[test]
    fn envelope_overrides_reach_loaded_policies() {
        let log = ResizePolicy::Logarithmic { max_size: 100.0 }.with_max_size(40.0);
        assert_eq!(log, ResizePolicy::Logarithmic { max_size: 40.0 });
        assert_eq!(ResizePolicy::Linear.with_max_size(40.0), ResizePolicy::Linear);

        let power = ResizePolicy::PowerLaw {
            min_size: 2.0,
            max_size: 100.0,
            exponent: 0.5,
        };
        assert_eq!(
            power.with_max_size(60.0).with_exponent(0.8),
            Some(ResizePolicy::PowerLaw {
                min_size: 2.0,
                max_size: 60.0,
                exponent: 0.8,
            })
        );
        assert_eq!(ResizePolicy::Linear.with_exponent(0.8), None);
    }

    #[test]
    fn power_law_exponent_validated() {
        let policy = ResizePolicy::PowerLaw {
            min_size: 1.0,
            max_size: 100.0,
            exponent: 1.5,
        };
        assert!(matches!(
            policy.validate(),
            Err(RunVizError::InvalidParameter(_))
        ));
    }
}
