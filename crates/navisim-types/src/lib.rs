//! `navisim-types` – shared message vocabulary for the NaviSim workspace.
//!
//! The message structs mirror the shape of the usual robotics geometry
//! messages (`Pose`, `Twist`, `TransformStamped`, point clouds) so that the
//! simulator can stand in for real hardware without consumers noticing.
//! Maths on these values lives in `navisim-perception::transform`; the types
//! here are plain, serialisable data.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

/// Fixed world frame every published pose is expressed in.
pub const WORLD_FRAME: &str = "map";

/// Frame attached to the simulated agent body.
pub const AGENT_FRAME: &str = "base_link";

// ────────────────────────────────────────────────────────────────────────────
// Geometry messages
// ────────────────────────────────────────────────────────────────────────────

/// Timestamp and reference frame carried by every stamped message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Header {
    pub stamp: DateTime<Utc>,
    pub frame_id: String,
}

impl Header {
    pub fn new(stamp: DateTime<Utc>, frame_id: impl Into<String>) -> Self {
        Self {
            stamp,
            frame_id: frame_id.into(),
        }
    }
}

/// A position in 3-D space (metres).
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Point {
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

/// A free 3-D vector, used for velocities and translations.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Vector3 {
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

/// Orientation as a quaternion in (x, y, z, w) message order.
///
/// The default value is the identity rotation, not the zero quaternion.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Quaternion {
    pub x: f64,
    pub y: f64,
    pub z: f64,
    pub w: f64,
}

impl Default for Quaternion {
    fn default() -> Self {
        Self {
            x: 0.0,
            y: 0.0,
            z: 0.0,
            w: 1.0,
        }
    }
}

/// Position plus orientation of the agent or of a sensor.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Pose {
    pub position: Point,
    pub orientation: Quaternion,
}

/// Linear and angular velocity.
///
/// The planar motion model reads only `linear.x`, `linear.y` and
/// `angular.z`; the remaining components are carried through untouched.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Twist {
    pub linear: Vector3,
    pub angular: Vector3,
}

impl Twist {
    /// Planar twist: forward/lateral speed (m/s) and yaw rate (rad/s).
    pub fn planar(linear_x: f64, linear_y: f64, angular_z: f64) -> Self {
        Self {
            linear: Vector3 {
                x: linear_x,
                y: linear_y,
                z: 0.0,
            },
            angular: Vector3 {
                x: 0.0,
                y: 0.0,
                z: angular_z,
            },
        }
    }
}

/// A pose expressed in `header.frame_id`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PoseStamped {
    pub header: Header,
    pub pose: Pose,
}

/// Rigid transform from `header.frame_id` (parent) to `child_frame_id`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransformStamped {
    pub header: Header,
    pub child_frame_id: String,
    pub translation: Vector3,
    pub rotation: Quaternion,
}

// ────────────────────────────────────────────────────────────────────────────
// Point cloud
// ────────────────────────────────────────────────────────────────────────────

/// One range sample.  `intensity` is not modelled and stays `0.0`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct PointXyzi {
    pub x: f32,
    pub y: f32,
    pub z: f32,
    pub intensity: f32,
}

impl PointXyzi {
    pub fn new(x: f32, y: f32, z: f32) -> Self {
        Self {
            x,
            y,
            z,
            intensity: 0.0,
        }
    }
}

/// Ordered list of range samples expressed in `header.frame_id`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PointCloud {
    pub header: Header,
    pub points: Vec<PointXyzi>,
}

impl PointCloud {
    pub fn new(header: Header) -> Self {
        Self {
            header,
            points: Vec::new(),
        }
    }

    pub fn push(&mut self, point: PointXyzi) {
        self.points.push(point);
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Bus envelope
// ────────────────────────────────────────────────────────────────────────────

/// Unified event wrapper for the simulator's event bus.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Event {
    pub id: Uuid,
    pub timestamp: DateTime<Utc>,
    /// e.g., "navisim-sim::integrator"
    pub source: String,
    pub payload: EventPayload,
}

impl Event {
    /// Wrap `payload` in a fresh event stamped with the current time.
    pub fn new(source: impl Into<String>, payload: EventPayload) -> Self {
        Self {
            id: Uuid::new_v4(),
            timestamp: Utc::now(),
            source: source.into(),
            payload,
        }
    }
}

/// Variants of data that can be routed over the event bus.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum EventPayload {
    /// Velocity command for the simulated agent.
    TargetTwist(Twist),
    /// Teleport request: replaces the pose and stops the agent.
    InitialPose(Pose),
    /// Integrated agent pose, published once per tick.
    Pose(PoseStamped),
    /// Velocity in effect during the published tick.
    Twist(Twist),
    /// World → agent frame transform, published once per tick.
    Transform(TransformStamped),
    /// Simulated range scan.
    PointCloud(PointCloud),
}

// ────────────────────────────────────────────────────────────────────────────
// Errors
// ────────────────────────────────────────────────────────────────────────────

/// Workspace-wide error type.
#[derive(Error, Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum SimError {
    #[error("Invalid sampling parameter: {0}")]
    InvalidSamplingParameter(String),

    #[error("Primitive '{0}' already exists")]
    AlreadyExists(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Scene construction failed: {0}")]
    SceneConstruction(String),

    #[error("Channel Error: {0}")]
    Channel(String),

    #[error("Configuration Error: {0}")]
    Config(String),

    #[error("Serialization Error: {0}")]
    Serialization(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_quaternion_is_identity() {
        let q = Quaternion::default();
        assert_eq!(q.w, 1.0);
        assert_eq!((q.x, q.y, q.z), (0.0, 0.0, 0.0));
        assert_eq!(Pose::default().orientation, q);
    }

    #[test]
    fn planar_twist_only_sets_planar_components() {
        let t = Twist::planar(1.0, -0.5, 0.25);
        assert_eq!(t.linear.x, 1.0);
        assert_eq!(t.linear.y, -0.5);
        assert_eq!(t.linear.z, 0.0);
        assert_eq!(t.angular.x, 0.0);
        assert_eq!(t.angular.y, 0.0);
        assert_eq!(t.angular.z, 0.25);
    }

    #[test]
    fn pose_deserializes_with_message_field_names() {
        let json = r#"{
            "position": {"x": 1.0, "y": 2.0, "z": 0.5},
            "orientation": {"x": 0.0, "y": 0.0, "z": 0.0, "w": 1.0}
        }"#;
        let pose: Pose = serde_json::from_str(json).unwrap();
        assert_eq!(pose.position.y, 2.0);
        assert_eq!(pose.orientation, Quaternion::default());
    }

    #[test]
    fn event_roundtrip() {
        let event = Event::new(
            "navisim-sim::integrator",
            EventPayload::Pose(PoseStamped {
                header: Header::new(Utc::now(), WORLD_FRAME),
                pose: Pose::default(),
            }),
        );
        let json = serde_json::to_string(&event).unwrap();
        let back: Event = serde_json::from_str(&json).unwrap();
        assert_eq!(event.id, back.id);
        assert_eq!(event.source, back.source);
        match back.payload {
            EventPayload::Pose(p) => assert_eq!(p.header.frame_id, "map"),
            other => panic!("unexpected payload: {other:?}"),
        }
    }

    #[test]
    fn point_cloud_push_and_len() {
        let mut cloud = PointCloud::new(Header::new(Utc::now(), "lidar_link"));
        assert!(cloud.is_empty());
        cloud.push(PointXyzi::new(1.0, 0.0, 0.0));
        assert_eq!(cloud.len(), 1);
        assert_eq!(cloud.points[0].intensity, 0.0);
    }

    #[test]
    fn sim_error_display() {
        let err = SimError::AlreadyExists("wall".to_string());
        assert!(err.to_string().contains("wall"));

        let err = SimError::InvalidSamplingParameter("horizontal_resolution must be > 0".into());
        assert!(err.to_string().contains("Invalid sampling parameter"));
    }
}
