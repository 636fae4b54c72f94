//! Scene primitives.
//!
//! A [`Primitive`] knows how to attach its shapes to a [`SceneBuilder`] and
//! how to describe itself for diagnostics.  The set is open: anything that
//! implements the trait can be registered with a
//! [`RaycastEngine`][super::RaycastEngine].
//!
//! The built-in primitives ([`Plane`], [`BoxPrimitive`], [`Sphere`]) are all
//! described by a [`PrimitiveSpec`], which is also the format of scene
//! object files, so `dump_primitives()` output can be loaded back.

use std::fmt;

use navisim_types::{Point, Pose, SimError, Vector3};
use serde::{Deserialize, Serialize};
use tracing::warn;

use super::scene::{GeometryId, SceneBuilder};
use crate::transform::{Transform3D, Vec3};

/// Capability interface every registered primitive exposes.
pub trait Primitive: Send + Sync + fmt::Debug {
    /// Attach this primitive's shapes to a freshly started scene and return
    /// the geometry id they were attached under.
    ///
    /// # Errors
    ///
    /// [`SimError::SceneConstruction`] when the geometry is degenerate.
    fn register_into(&self, scene: &mut SceneBuilder) -> Result<GeometryId, SimError>;

    /// JSON description used by registry dumps.
    fn describe(&self) -> serde_json::Value;
}

// ────────────────────────────────────────────────────────────────────────────
// PrimitiveSpec
// ────────────────────────────────────────────────────────────────────────────

/// Serialisable description of a built-in primitive.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum PrimitiveSpec {
    Plane(Plane),
    Box(BoxPrimitive),
    Sphere(Sphere),
}

impl PrimitiveSpec {
    /// Turn the description into a registrable primitive.
    pub fn into_primitive(self) -> Box<dyn Primitive> {
        match self {
            PrimitiveSpec::Plane(p) => Box::new(p),
            PrimitiveSpec::Box(b) => Box::new(b),
            PrimitiveSpec::Sphere(s) => Box::new(s),
        }
    }

    /// Tagged JSON form.  A failed conversion is logged and reported as an
    /// `{"error": ...}` object rather than dropped.
    fn to_json(&self) -> serde_json::Value {
        match serde_json::to_value(self) {
            Ok(json) => json,
            Err(e) => {
                warn!(error = %e, spec = ?self, "primitive description failed");
                serde_json::json!({ "error": e.to_string() })
            }
        }
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Plane
// ────────────────────────────────────────────────────────────────────────────

/// Infinite plane through `point`, facing `normal`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Plane {
    pub point: Point,
    pub normal: Vector3,
}

impl Plane {
    /// The ground plane `z = height`.
    pub fn horizontal(height: f64) -> Self {
        Self {
            point: Point {
                x: 0.0,
                y: 0.0,
                z: height,
            },
            normal: Vector3 {
                x: 0.0,
                y: 0.0,
                z: 1.0,
            },
        }
    }
}

impl Primitive for Plane {
    fn register_into(&self, scene: &mut SceneBuilder) -> Result<GeometryId, SimError> {
        let id = scene.begin_geometry();
        scene.attach_plane(id, self.point.into(), self.normal.into())?;
        Ok(id)
    }

    fn describe(&self) -> serde_json::Value {
        PrimitiveSpec::Plane(self.clone()).to_json()
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Box
// ────────────────────────────────────────────────────────────────────────────

/// Oriented box centred on `pose`.  `depth`, `width` and `height` are the
/// full extents along the box's local x, y and z axes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BoxPrimitive {
    #[serde(default)]
    pub pose: Pose,
    pub depth: f64,
    pub width: f64,
    pub height: f64,
}

/// Corner indices of the twelve box faces, wound outwards.
const BOX_TRIANGLES: [[usize; 3]; 12] = [
    [0, 2, 1],
    [0, 3, 2],
    [4, 5, 6],
    [4, 6, 7],
    [0, 1, 5],
    [0, 5, 4],
    [1, 2, 6],
    [1, 6, 5],
    [2, 3, 7],
    [2, 7, 6],
    [3, 0, 4],
    [3, 4, 7],
];

impl BoxPrimitive {
    pub fn new(pose: Pose, depth: f64, width: f64, height: f64) -> Self {
        Self {
            pose,
            depth,
            width,
            height,
        }
    }

    /// World-frame corners: bottom face counter-clockwise, then top face.
    pub fn vertices(&self) -> [Vec3; 8] {
        let (dx, dy, dz) = (self.depth * 0.5, self.width * 0.5, self.height * 0.5);
        let local = [
            Vec3::new(-dx, -dy, -dz),
            Vec3::new(dx, -dy, -dz),
            Vec3::new(dx, dy, -dz),
            Vec3::new(-dx, dy, -dz),
            Vec3::new(-dx, -dy, dz),
            Vec3::new(dx, -dy, dz),
            Vec3::new(dx, dy, dz),
            Vec3::new(-dx, dy, dz),
        ];
        let tf = Transform3D::from(self.pose);
        let tf = Transform3D::new(tf.translation, tf.rotation.normalize());
        local.map(|v| tf.apply(v))
    }
}

impl Primitive for BoxPrimitive {
    fn register_into(&self, scene: &mut SceneBuilder) -> Result<GeometryId, SimError> {
        let id = scene.begin_geometry();
        let v = self.vertices();
        for [a, b, c] in BOX_TRIANGLES {
            scene.attach_triangle(id, v[a], v[b], v[c])?;
        }
        Ok(id)
    }

    fn describe(&self) -> serde_json::Value {
        PrimitiveSpec::Box(self.clone()).to_json()
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Sphere
// ────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Sphere {
    pub center: Point,
    pub radius: f64,
}

impl Primitive for Sphere {
    fn register_into(&self, scene: &mut SceneBuilder) -> Result<GeometryId, SimError> {
        let id = scene.begin_geometry();
        scene.attach_sphere(id, self.center.into(), self.radius)?;
        Ok(id)
    }

    fn describe(&self) -> serde_json::Value {
        PrimitiveSpec::Sphere(self.clone()).to_json()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::raycast::scene::{Device, Ray};
    use crate::transform::Quaternion;

    #[test]
    fn box_registers_twelve_triangles_under_one_id() {
        let mut builder = Device::default().new_scene();
        let b = BoxPrimitive::new(Pose::default(), 2.0, 2.0, 2.0);
        let id = b.register_into(&mut builder).unwrap();
        assert_eq!(builder.geometry_count(), 1);
        let scene = builder.commit();

        let ray = Ray::new(Vec3::new(-10.0, 0.3, 0.2), Vec3::new(1.0, 0.0, 0.0), 0.0, 100.0);
        let hit = scene.intersect(&ray).unwrap();
        assert_eq!(hit.geometry_id, id);
        assert!((hit.distance - 9.0).abs() < 1e-9);
    }

    #[test]
    fn box_vertices_follow_pose() {
        let pose = Pose {
            position: Point {
                x: 5.0,
                y: 0.0,
                z: 0.0,
            },
            orientation: Quaternion::from_yaw(std::f64::consts::FRAC_PI_2).into(),
        };
        let v = BoxPrimitive::new(pose, 4.0, 2.0, 2.0).vertices();
        // Local (+2, -1, -1) rotated 90° about Z lands at (1, 2, -1) + (5, 0, 0).
        assert!((v[1].x - 6.0).abs() < 1e-9);
        assert!((v[1].y - 2.0).abs() < 1e-9);
        assert!((v[1].z + 1.0).abs() < 1e-9);
    }

    #[test]
    fn flat_box_is_rejected_as_degenerate() {
        let mut builder = Device::default().new_scene();
        let b = BoxPrimitive::new(Pose::default(), 1.0, 1.0, 0.0);
        assert!(matches!(
            b.register_into(&mut builder),
            Err(SimError::SceneConstruction(_))
        ));
    }

    #[test]
    fn describe_is_tagged_and_loads_back() {
        let sphere = Sphere {
            center: Point {
                x: 1.0,
                y: 2.0,
                z: 3.0,
            },
            radius: 0.5,
        };
        let json = sphere.describe();
        assert_eq!(json["type"], "sphere");
        assert_eq!(json["radius"], 0.5);

        let spec: PrimitiveSpec = serde_json::from_value(json).unwrap();
        assert_eq!(spec, PrimitiveSpec::Sphere(sphere));
    }

    #[test]
    fn box_spec_pose_defaults_to_origin() {
        let spec: PrimitiveSpec =
            serde_json::from_str(r#"{"type": "box", "depth": 1.0, "width": 2.0, "height": 3.0}"#)
                .unwrap();
        match spec {
            PrimitiveSpec::Box(b) => {
                assert_eq!(b.pose, Pose::default());
                assert_eq!(b.width, 2.0);
            }
            other => panic!("unexpected spec: {other:?}"),
        }
    }

    #[test]
    fn every_builtin_describes_as_tagged_object() {
        let builtins: [(Box<dyn Primitive>, &str); 3] = [
            (Box::new(Plane::horizontal(0.0)), "plane"),
            (Box::new(BoxPrimitive::new(Pose::default(), 1.0, 1.0, 1.0)), "box"),
            (
                Box::new(Sphere {
                    center: Point::default(),
                    radius: 1.0,
                }),
                "sphere",
            ),
        ];
        for (primitive, tag) in builtins {
            let json = primitive.describe();
            assert!(json.is_object(), "{tag} described as {json}");
            assert_eq!(json["type"], tag);
            assert!(json.get("error").is_none());
        }

        // Non-finite numbers have no JSON form; the entry keeps its tag.
        let broken = Sphere {
            center: Point::default(),
            radius: f64::NAN,
        }
        .describe();
        assert_eq!(broken["type"], "sphere");
        assert!(broken["radius"].is_null());
    }

    #[test]
    fn horizontal_plane_describes_its_height() {
        let json = Plane::horizontal(1.5).describe();
        assert_eq!(json["type"], "plane");
        assert_eq!(json["point"]["z"], 1.5);
    }
}
