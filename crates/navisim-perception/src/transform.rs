//! Transform Frame (TF) maths and engine.
//!
//! Provides the vector / quaternion / rotation-matrix primitives used by the
//! pose integrator and the raycaster, plus a directed graph of named
//! reference frames.  Given any two frame names the engine composes a chain
//! of transforms via BFS to produce the combined [`Transform3D`].
//!
//! Quaternions follow the Hamilton convention and Euler angles the usual
//! robotics Z-Y-X order (`q = yaw(z) · pitch(y) · roll(x)`).
//!
//! # Example
//!
//! ```rust
//! use navisim_perception::transform::{TfEngine, Transform3D, Vec3, Quaternion};
//!
//! let mut tf = TfEngine::new();
//!
//! // base_link is 1 m forward of the map origin, same orientation.
//! tf.set_transform("map", "base_link",
//!     Transform3D::new(Vec3::new(1.0, 0.0, 0.0), Quaternion::identity()));
//!
//! // the lidar is 0.5 m forward of base_link, same orientation.
//! tf.set_transform("base_link", "lidar_link",
//!     Transform3D::new(Vec3::new(0.5, 0.0, 0.0), Quaternion::identity()));
//!
//! let t = tf.lookup("map", "lidar_link").unwrap();
//! assert!((t.translation.x - 1.5).abs() < 1e-9);
//! ```

use std::collections::{HashMap, HashSet, VecDeque};

use navisim_types::{Point, Pose, TransformStamped, Vector3};

// ────────────────────────────────────────────────────────────────────────────
// Vec3
// ────────────────────────────────────────────────────────────────────────────

/// A 3-D vector or point.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Vec3 {
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

impl Vec3 {
    /// The canonical forward axis every ray direction is derived from.
    pub const FORWARD: Vec3 = Vec3 {
        x: 1.0,
        y: 0.0,
        z: 0.0,
    };

    /// Create a new vector.
    pub fn new(x: f64, y: f64, z: f64) -> Self {
        Self { x, y, z }
    }

    /// The zero vector.
    pub fn zero() -> Self {
        Self::new(0.0, 0.0, 0.0)
    }

    pub fn add(self, rhs: Self) -> Self {
        Self::new(self.x + rhs.x, self.y + rhs.y, self.z + rhs.z)
    }

    pub fn sub(self, rhs: Self) -> Self {
        Self::new(self.x - rhs.x, self.y - rhs.y, self.z - rhs.z)
    }

    pub fn scale(self, s: f64) -> Self {
        Self::new(self.x * s, self.y * s, self.z * s)
    }

    pub fn dot(self, rhs: Self) -> f64 {
        self.x * rhs.x + self.y * rhs.y + self.z * rhs.z
    }

    pub fn cross(self, rhs: Self) -> Self {
        Self::new(
            self.y * rhs.z - self.z * rhs.y,
            self.z * rhs.x - self.x * rhs.z,
            self.x * rhs.y - self.y * rhs.x,
        )
    }

    pub fn norm(self) -> f64 {
        self.dot(self).sqrt()
    }

    /// Unit vector in the same direction, or `None` for a (near-)zero vector.
    pub fn normalized(self) -> Option<Self> {
        let n = self.norm();
        if n > f64::EPSILON && n.is_finite() {
            Some(self.scale(1.0 / n))
        } else {
            None
        }
    }

    /// Component-wise minimum.
    pub fn min(self, rhs: Self) -> Self {
        Self::new(self.x.min(rhs.x), self.y.min(rhs.y), self.z.min(rhs.z))
    }

    /// Component-wise maximum.
    pub fn max(self, rhs: Self) -> Self {
        Self::new(self.x.max(rhs.x), self.y.max(rhs.y), self.z.max(rhs.z))
    }

    /// Component by axis index (0 = x, 1 = y, anything else = z).
    pub fn axis(self, i: usize) -> f64 {
        match i {
            0 => self.x,
            1 => self.y,
            _ => self.z,
        }
    }

    pub fn is_finite(self) -> bool {
        self.x.is_finite() && self.y.is_finite() && self.z.is_finite()
    }
}

impl From<Point> for Vec3 {
    fn from(p: Point) -> Self {
        Self::new(p.x, p.y, p.z)
    }
}

impl From<Vector3> for Vec3 {
    fn from(v: Vector3) -> Self {
        Self::new(v.x, v.y, v.z)
    }
}

impl From<Vec3> for Point {
    fn from(v: Vec3) -> Self {
        Point {
            x: v.x,
            y: v.y,
            z: v.z,
        }
    }
}

impl From<Vec3> for Vector3 {
    fn from(v: Vec3) -> Self {
        Vector3 {
            x: v.x,
            y: v.y,
            z: v.z,
        }
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Mat3
// ────────────────────────────────────────────────────────────────────────────

/// A row-major 3×3 rotation matrix.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Mat3 {
    pub rows: [[f64; 3]; 3],
}

impl Mat3 {
    /// Matrix–vector product.
    pub fn mul_vec(&self, v: Vec3) -> Vec3 {
        let r = &self.rows;
        Vec3::new(
            r[0][0] * v.x + r[0][1] * v.y + r[0][2] * v.z,
            r[1][0] * v.x + r[1][1] * v.y + r[1][2] * v.z,
            r[2][0] * v.x + r[2][1] * v.y + r[2][2] * v.z,
        )
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Quaternion
// ────────────────────────────────────────────────────────────────────────────

/// A unit quaternion representing a 3-D rotation (w, x, y, z convention).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Quaternion {
    pub w: f64,
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

impl Quaternion {
    /// Create a quaternion.  The caller is responsible for providing a unit
    /// quaternion (|q| = 1).
    pub fn new(w: f64, x: f64, y: f64, z: f64) -> Self {
        Self { w, x, y, z }
    }

    /// The identity rotation (no rotation).
    pub fn identity() -> Self {
        Self::new(1.0, 0.0, 0.0, 0.0)
    }

    /// Build a rotation from roll (about X), pitch (about Y) and yaw
    /// (about Z), applied in Z-Y-X order.
    ///
    /// Positive pitch tilts the forward axis towards −Z.
    pub fn from_rpy(roll: f64, pitch: f64, yaw: f64) -> Self {
        let (sr, cr) = (roll * 0.5).sin_cos();
        let (sp, cp) = (pitch * 0.5).sin_cos();
        let (sy, cy) = (yaw * 0.5).sin_cos();
        Self::new(
            cr * cp * cy + sr * sp * sy,
            sr * cp * cy - cr * sp * sy,
            cr * sp * cy + sr * cp * sy,
            cr * cp * sy - sr * sp * cy,
        )
    }

    /// Rotation of `yaw` radians about the Z axis.
    pub fn from_yaw(yaw: f64) -> Self {
        Self::from_rpy(0.0, 0.0, yaw)
    }

    /// Decompose into (roll, pitch, yaw).
    pub fn to_rpy(self) -> (f64, f64, f64) {
        let roll = (2.0 * (self.w * self.x + self.y * self.z))
            .atan2(1.0 - 2.0 * (self.x * self.x + self.y * self.y));
        let pitch = (2.0 * (self.w * self.y - self.z * self.x)).clamp(-1.0, 1.0).asin();
        (roll, pitch, self.yaw())
    }

    /// Heading about the Z axis, in `(-π, π]`.
    pub fn yaw(self) -> f64 {
        (2.0 * (self.w * self.z + self.x * self.y))
            .atan2(1.0 - 2.0 * (self.y * self.y + self.z * self.z))
    }

    /// Hamilton product: compose two rotations (`self` then `rhs` in the
    /// rotated frame).
    pub fn mul(self, rhs: Self) -> Self {
        Self::new(
            self.w * rhs.w - self.x * rhs.x - self.y * rhs.y - self.z * rhs.z,
            self.w * rhs.x + self.x * rhs.w + self.y * rhs.z - self.z * rhs.y,
            self.w * rhs.y - self.x * rhs.z + self.y * rhs.w + self.z * rhs.x,
            self.w * rhs.z + self.x * rhs.y - self.y * rhs.x + self.z * rhs.w,
        )
    }

    /// Conjugate (== inverse for a unit quaternion).
    pub fn conjugate(self) -> Self {
        Self::new(self.w, -self.x, -self.y, -self.z)
    }

    pub fn norm(self) -> f64 {
        (self.w * self.w + self.x * self.x + self.y * self.y + self.z * self.z).sqrt()
    }

    /// Rescale to unit length.  Already-unit quaternions are returned
    /// bit-for-bit; a zero or non-finite quaternion collapses to the identity.
    pub fn normalize(self) -> Self {
        let n = self.norm();
        if (n - 1.0).abs() <= f64::EPSILON {
            return self;
        }
        if n > f64::EPSILON && n.is_finite() {
            Self::new(self.w / n, self.x / n, self.y / n, self.z / n)
        } else {
            Self::identity()
        }
    }

    /// Rotate a vector by this quaternion: p' = q * p * q*.
    pub fn rotate(self, v: Vec3) -> Vec3 {
        let p = Self::new(0.0, v.x, v.y, v.z);
        let rotated = self.mul(p).mul(self.conjugate());
        Vec3::new(rotated.x, rotated.y, rotated.z)
    }

    /// Equivalent rotation matrix.
    pub fn rotation_matrix(self) -> Mat3 {
        let Self { w, x, y, z } = self;
        Mat3 {
            rows: [
                [
                    1.0 - 2.0 * (y * y + z * z),
                    2.0 * (x * y - w * z),
                    2.0 * (x * z + w * y),
                ],
                [
                    2.0 * (x * y + w * z),
                    1.0 - 2.0 * (x * x + z * z),
                    2.0 * (y * z - w * x),
                ],
                [
                    2.0 * (x * z - w * y),
                    2.0 * (y * z + w * x),
                    1.0 - 2.0 * (x * x + y * y),
                ],
            ],
        }
    }
}

impl From<navisim_types::Quaternion> for Quaternion {
    fn from(q: navisim_types::Quaternion) -> Self {
        Self::new(q.w, q.x, q.y, q.z)
    }
}

impl From<Quaternion> for navisim_types::Quaternion {
    fn from(q: Quaternion) -> Self {
        navisim_types::Quaternion {
            x: q.x,
            y: q.y,
            z: q.z,
            w: q.w,
        }
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Transform3D
// ────────────────────────────────────────────────────────────────────────────

/// A rigid-body 3-D transform: translation followed by rotation.
///
/// Represents the pose of frame B relative to frame A: to convert a point
/// expressed in frame B into frame A, rotate it by `rotation` then add
/// `translation`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Transform3D {
    pub translation: Vec3,
    pub rotation: Quaternion,
}

impl Transform3D {
    /// Create a transform from a translation and rotation.
    pub fn new(translation: Vec3, rotation: Quaternion) -> Self {
        Self {
            translation,
            rotation,
        }
    }

    /// The identity transform (no translation, no rotation).
    pub fn identity() -> Self {
        Self::new(Vec3::zero(), Quaternion::identity())
    }

    /// Compose two transforms: `self` applied first, then `other`.
    ///
    /// If `self` = T_A_B and `other` = T_B_C, the result is T_A_C.
    pub fn compose(self, other: Self) -> Self {
        let translated = self.translation.add(self.rotation.rotate(other.translation));
        let rotated = self.rotation.mul(other.rotation).normalize();
        Self::new(translated, rotated)
    }

    /// Map a point expressed in the child frame into the parent frame.
    pub fn apply(self, p: Vec3) -> Vec3 {
        self.translation.add(self.rotation.rotate(p))
    }
}

impl From<Pose> for Transform3D {
    fn from(pose: Pose) -> Self {
        Self::new(pose.position.into(), pose.orientation.into())
    }
}

impl From<Transform3D> for Pose {
    fn from(t: Transform3D) -> Self {
        Pose {
            position: t.translation.into(),
            orientation: t.rotation.into(),
        }
    }
}

impl From<&TransformStamped> for Transform3D {
    fn from(msg: &TransformStamped) -> Self {
        Self::new(msg.translation.into(), msg.rotation.into())
    }
}

// ────────────────────────────────────────────────────────────────────────────
// TfEngine
// ────────────────────────────────────────────────────────────────────────────

/// A directed graph of named reference frames and the [`Transform3D`]s that
/// relate them.
///
/// Frames are identified by arbitrary string names (e.g. `"map"`,
/// `"base_link"`, `"lidar_link"`).  Edges are directional: adding
/// `"A" → "B"` does not automatically create the inverse.
///
/// [`TfEngine::lookup`] performs BFS to find the shortest path from source
/// to target and returns the composed transform.
#[derive(Debug, Default)]
pub struct TfEngine {
    /// `edges[from][to] = Transform3D`
    edges: HashMap<String, HashMap<String, Transform3D>>,
}

impl TfEngine {
    /// Create an empty TF engine.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register or update the transform from `parent_frame` to `child_frame`.
    pub fn set_transform(
        &mut self,
        parent_frame: &str,
        child_frame: &str,
        transform: Transform3D,
    ) {
        self.edges
            .entry(parent_frame.to_string())
            .or_default()
            .insert(child_frame.to_string(), transform);
    }

    /// Register or update an edge from a stamped transform message.
    pub fn set_transform_stamped(&mut self, msg: &TransformStamped) {
        self.set_transform(&msg.header.frame_id, &msg.child_frame_id, msg.into());
    }

    /// Compute the composed [`Transform3D`] that maps points in `target_frame`
    /// into `source_frame`, i.e. the pose of `target_frame` seen from
    /// `source_frame`.
    ///
    /// Returns `None` if no path exists between the two frames.
    pub fn lookup(&self, source_frame: &str, target_frame: &str) -> Option<Transform3D> {
        if source_frame == target_frame {
            return Some(Transform3D::identity());
        }

        // Each queue item carries the transform accumulated from
        // source_frame to the current node.
        let mut queue: VecDeque<(String, Transform3D)> = VecDeque::new();
        let mut visited: HashSet<String> = HashSet::new();

        queue.push_back((source_frame.to_string(), Transform3D::identity()));
        visited.insert(source_frame.to_string());

        while let Some((current, accumulated)) = queue.pop_front() {
            if let Some(neighbours) = self.edges.get(&current) {
                for (next, edge_tf) in neighbours {
                    if visited.contains(next) {
                        continue;
                    }
                    let composed = accumulated.compose(*edge_tf);
                    if next == target_frame {
                        return Some(composed);
                    }
                    visited.insert(next.clone());
                    queue.push_back((next.clone(), composed));
                }
            }
        }

        None
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Tests
// ────────────────────────────────────────────────────────────────────────────
