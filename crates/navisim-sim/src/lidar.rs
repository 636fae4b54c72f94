//! Simulated spinning LiDAR.
//!
//! The sensor is rigidly mounted on the agent (`base_link` → `frame_id`).
//! Each [`LidarSimulator::scan`] looks up the sensor pose in `map` through
//! the most recent agent transform, casts one full structured sweep against
//! the shared [`RaycastEngine`], and returns the hits as a sensor-local
//! [`PointCloud`].

use std::sync::{Arc, PoisonError, RwLock};
use std::time::Duration;

use chrono::{DateTime, Utc};
use navisim_perception::raycast::{RaycastEngine, ScanPattern, generate_directions};
use navisim_perception::transform::{TfEngine, Transform3D};
use navisim_types::{
    AGENT_FRAME, Header, Point, PointCloud, Pose, SimError, TransformStamped, WORLD_FRAME,
};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

fn default_scan_rate_hz() -> f64 {
    10.0
}

fn default_horizontal_resolution() -> f64 {
    // One degree.
    0.0174533
}

fn default_vertical_angles() -> Vec<f64> {
    vec![-0.2618, -0.1309, 0.0, 0.1309, 0.2618]
}

fn default_min_distance() -> f64 {
    0.1
}

fn default_max_distance() -> f64 {
    100.0
}

fn default_mount() -> Pose {
    Pose {
        position: Point {
            x: 0.0,
            y: 0.0,
            z: 1.0,
        },
        ..Pose::default()
    }
}

fn default_frame_id() -> String {
    "lidar_link".to_string()
}

/// Scan geometry and mounting of the simulated sensor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LidarConfig {
    #[serde(default = "default_scan_rate_hz")]
    pub scan_rate_hz: f64,
    /// Horizontal step in radians.
    #[serde(default = "default_horizontal_resolution")]
    pub horizontal_resolution: f64,
    /// Beam elevations in radians.  Positive values point below the horizon.
    #[serde(default = "default_vertical_angles")]
    pub vertical_angles: Vec<f64>,
    #[serde(default = "default_min_distance")]
    pub min_distance: f64,
    #[serde(default = "default_max_distance")]
    pub max_distance: f64,
    #[serde(default = "default_frame_id")]
    pub frame_id: String,
    /// Sensor pose relative to `base_link`.
    #[serde(default = "default_mount")]
    pub mount: Pose,
}

impl Default for LidarConfig {
    fn default() -> Self {
        Self {
            scan_rate_hz: default_scan_rate_hz(),
            horizontal_resolution: default_horizontal_resolution(),
            vertical_angles: default_vertical_angles(),
            min_distance: default_min_distance(),
            max_distance: default_max_distance(),
            frame_id: default_frame_id(),
            mount: default_mount(),
        }
    }
}

impl LidarConfig {
    /// Time between scans, or `None` when the rate does not map to a
    /// representable, non-zero period.
    pub fn scan_period(&self) -> Option<Duration> {
        Duration::try_from_secs_f64(1.0 / self.scan_rate_hz)
            .ok()
            .filter(|period| !period.is_zero())
    }
}

/// Range-scan generator bound to a shared scene.
pub struct LidarSimulator {
    engine: Arc<RwLock<RaycastEngine>>,
    tf: TfEngine,
    pattern: ScanPattern,
    scan_period: Duration,
    config: LidarConfig,
}

impl LidarSimulator {
    /// Validate `config`, precompute the scan pattern and register the
    /// static mount transform.
    ///
    /// # Errors
    ///
    /// * [`SimError::InvalidSamplingParameter`] for a bad scan pattern.
    /// * [`SimError::Config`] for a scan rate that is not positive or whose
    ///   period rounds to zero, or a distance window that is empty or not
    ///   finite.
    pub fn new(engine: Arc<RwLock<RaycastEngine>>, config: LidarConfig) -> Result<Self, SimError> {
        if !config.scan_rate_hz.is_finite() || config.scan_rate_hz <= 0.0 {
            return Err(SimError::Config(format!(
                "scan_rate_hz must be positive, got {}",
                config.scan_rate_hz
            )));
        }
        let Some(scan_period) = config.scan_period() else {
            return Err(SimError::Config(format!(
                "scan_rate_hz {} gives no usable scan period",
                config.scan_rate_hz
            )));
        };
        if !config.min_distance.is_finite()
            || config.min_distance < 0.0
            || config.max_distance.is_nan()
            || config.max_distance < config.min_distance
        {
            return Err(SimError::Config(format!(
                "invalid range window [{}, {}]",
                config.min_distance, config.max_distance
            )));
        }
        let pattern = generate_directions(config.horizontal_resolution, &config.vertical_angles)?;

        let mut tf = TfEngine::new();
        tf.set_transform(AGENT_FRAME, &config.frame_id, Transform3D::from(config.mount));

        info!(
            frame_id = %config.frame_id,
            rays_per_scan = pattern.total(),
            scan_rate_hz = config.scan_rate_hz,
            "lidar simulator ready"
        );
        Ok(Self {
            engine,
            tf,
            pattern,
            scan_period,
            config,
        })
    }

    pub fn config(&self) -> &LidarConfig {
        &self.config
    }

    /// Validated time between scans.
    pub fn scan_period(&self) -> Duration {
        self.scan_period
    }

    pub fn engine(&self) -> &Arc<RwLock<RaycastEngine>> {
        &self.engine
    }

    /// Number of rays in one sweep.
    pub fn rays_per_scan(&self) -> usize {
        self.pattern.total()
    }

    /// Record the latest `map` → `base_link` transform.
    pub fn on_transform(&mut self, transform: &TransformStamped) {
        self.tf.set_transform_stamped(transform);
    }

    /// Sensor pose in `map`.
    ///
    /// # Errors
    ///
    /// [`SimError::NotFound`] until a transform connecting `map` to the
    /// sensor has been received.
    pub fn sensor_pose(&self) -> Result<Pose, SimError> {
        self.tf
            .lookup(WORLD_FRAME, &self.config.frame_id)
            .map(Pose::from)
            .ok_or_else(|| {
                SimError::NotFound(format!(
                    "transform {WORLD_FRAME} -> {}",
                    self.config.frame_id
                ))
            })
    }

    /// Cast one full sweep and stamp the result with `stamp`.
    ///
    /// # Errors
    ///
    /// [`SimError::NotFound`] before the first agent transform, otherwise
    /// whatever the cast reports.
    pub fn scan(&self, stamp: DateTime<Utc>) -> Result<PointCloud, SimError> {
        let origin = self.sensor_pose()?;
        let engine = self.engine.read().unwrap_or_else(PoisonError::into_inner);
        let points = engine.cast(
            &origin,
            self.pattern.clone(),
            self.config.max_distance,
            self.config.min_distance,
        )?;
        debug!(points = points.len(), "scan complete");
        Ok(PointCloud {
            header: Header::new(stamp, self.config.frame_id.clone()),
            points,
        })
    }
}
