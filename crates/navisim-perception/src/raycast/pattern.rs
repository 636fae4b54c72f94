//! Structured scan patterns.
//!
//! [`generate_directions`] yields one ray direction per (horizontal step,
//! vertical angle) pair.  The horizontal sweep is count-based:
//! `ceil(2π / resolution)` steps at angles `i · resolution`, so the iterator
//! always terminates and can be cloned to restart it.

use std::f64::consts::TAU;

use navisim_types::SimError;

use crate::transform::Quaternion;

/// Upper bound on horizontal steps in one sweep.  A resolution finer than
/// `2π / MAX_HORIZONTAL_STEPS` is rejected.
pub const MAX_HORIZONTAL_STEPS: usize = 1_000_000;

/// Lazy, restartable sequence of scan directions.
///
/// Directions are emitted horizontal-major: every vertical angle for the
/// first horizontal step, then every vertical angle for the next, and so on.
#[derive(Debug, Clone)]
pub struct ScanPattern {
    horizontal_resolution: f64,
    horizontal_steps: usize,
    vertical_angles: Vec<f64>,
    index: usize,
}

impl ScanPattern {
    /// Number of horizontal steps in one sweep.
    pub fn horizontal_steps(&self) -> usize {
        self.horizontal_steps
    }

    /// Total number of directions in the full pattern, regardless of how
    /// far the iterator has advanced.
    pub fn total(&self) -> usize {
        self.horizontal_steps * self.vertical_angles.len()
    }
}

impl Iterator for ScanPattern {
    type Item = Quaternion;

    fn next(&mut self) -> Option<Quaternion> {
        if self.index >= self.total() {
            return None;
        }
        let per_step = self.vertical_angles.len();
        let step = self.index / per_step;
        let pitch = self.vertical_angles[self.index % per_step];
        self.index += 1;
        let yaw = step as f64 * self.horizontal_resolution;
        Some(Quaternion::from_rpy(0.0, pitch, yaw))
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let remaining = self.total() - self.index.min(self.total());
        (remaining, Some(remaining))
    }
}

impl ExactSizeIterator for ScanPattern {}

/// Build the direction set for a full 360° scan.
///
/// # Errors
///
/// [`SimError::InvalidSamplingParameter`] when `horizontal_resolution` is not
/// a finite positive number, when it would need more than
/// [`MAX_HORIZONTAL_STEPS`] steps, or when a vertical angle is not finite.
pub fn generate_directions(
    horizontal_resolution: f64,
    vertical_angles: &[f64],
) -> Result<ScanPattern, SimError> {
    if !horizontal_resolution.is_finite() || horizontal_resolution <= 0.0 {
        return Err(SimError::InvalidSamplingParameter(format!(
            "horizontal_resolution must be finite and positive, got {horizontal_resolution}"
        )));
    }
    let steps = (TAU / horizontal_resolution).ceil();
    if steps > MAX_HORIZONTAL_STEPS as f64 {
        return Err(SimError::InvalidSamplingParameter(format!(
            "horizontal_resolution {horizontal_resolution} needs {steps} steps, limit is {MAX_HORIZONTAL_STEPS}"
        )));
    }
    if let Some(bad) = vertical_angles.iter().find(|a| !a.is_finite()) {
        return Err(SimError::InvalidSamplingParameter(format!(
            "vertical angle {bad} is not finite"
        )));
    }
    Ok(ScanPattern {
        horizontal_resolution,
        horizontal_steps: steps as usize,
        vertical_angles: vertical_angles.to_vec(),
        index: 0,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::f64::consts::{FRAC_PI_2, PI};

    #[test]
    fn cardinality_is_ceil_of_sweep_times_vertical_count() {
        for (h, vertical) in [
            (0.1, vec![0.0]),
            (0.3, vec![-0.2, 0.0, 0.2]),
            (FRAC_PI_2, vec![0.1, 0.2]),
            (1.0, vec![0.0, 0.5, 1.0, 1.5]),
            (7.0, vec![0.0]),
        ] {
            let expected = (TAU / h).ceil() as usize * vertical.len();
            let pattern = generate_directions(h, &vertical).unwrap();
            assert_eq!(pattern.len(), expected, "h={h}");
            assert_eq!(pattern.count(), expected, "h={h}");
        }
    }

    #[test]
    fn empty_vertical_angles_yield_nothing() {
        let pattern = generate_directions(0.5, &[]).unwrap();
        assert_eq!(pattern.total(), 0);
        assert_eq!(pattern.count(), 0);
    }

    #[test]
    fn non_positive_and_non_finite_resolution_fail_fast() {
        for h in [0.0, -0.1, f64::NAN, f64::INFINITY] {
            assert!(
                matches!(
                    generate_directions(h, &[0.0]),
                    Err(SimError::InvalidSamplingParameter(_))
                ),
                "h={h} must be rejected"
            );
        }
    }

    #[test]
    fn tiny_resolution_hits_step_bound() {
        assert!(matches!(
            generate_directions(1e-9, &[0.0]),
            Err(SimError::InvalidSamplingParameter(_))
        ));
    }

    #[test]
    fn non_finite_vertical_angle_is_rejected() {
        assert!(generate_directions(0.5, &[0.0, f64::NAN]).is_err());
    }

    #[test]
    fn order_is_horizontal_major() {
        let dirs: Vec<_> = generate_directions(PI, &[0.1, -0.1]).unwrap().collect();
        assert_eq!(dirs.len(), 4);
        let rpy: Vec<_> = dirs.iter().map(|q| q.to_rpy()).collect();
        assert!((rpy[0].1 - 0.1).abs() < 1e-9 && rpy[0].2.abs() < 1e-9);
        assert!((rpy[1].1 + 0.1).abs() < 1e-9 && rpy[1].2.abs() < 1e-9);
        assert!((rpy[2].1 - 0.1).abs() < 1e-9 && (rpy[2].2.abs() - PI).abs() < 1e-9);
        assert!((rpy[3].1 + 0.1).abs() < 1e-9);
    }

    #[test]
    fn pattern_restarts_when_cloned() {
        let pattern = generate_directions(1.0, &[0.0, 0.3]).unwrap();
        let first: Vec<_> = pattern.clone().collect();
        let second: Vec<_> = pattern.collect();
        assert_eq!(first, second);
    }

    #[test]
    fn size_hint_shrinks_as_iterated() {
        let mut pattern = generate_directions(1.0, &[0.0]).unwrap();
        let total = pattern.len();
        pattern.next();
        assert_eq!(pattern.len(), total - 1);
        assert_eq!(pattern.total(), total);
    }
}
