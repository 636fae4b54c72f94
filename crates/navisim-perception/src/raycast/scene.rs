//! Ray–scene intersection oracle.
//!
//! A [`Device`] holds the acceleration-structure settings.  Each cast asks
//! it for a fresh [`SceneBuilder`], lets every primitive attach its shapes,
//! then [`commit`][SceneBuilder::commit]s the builder into an immutable
//! [`Scene`]: a bounding-volume hierarchy over the bounded shapes plus a
//! flat list of infinite planes.  [`Scene::intersect`] answers nearest-hit
//! queries; dropping the scene releases it.
//!
//! # Key types
//!
//! | Type | Role |
//! |------|------|
//! | [`Aabb`]         | Axis-aligned bounding box, slab ray test. |
//! | [`Ray`]          | Origin, unit direction, `near..=far` range. |
//! | [`Hit`]          | Geometry id and distance of the nearest hit. |
//! | [`SceneBuilder`] | Collects shapes before commit. |
//! | [`Scene`]        | Committed BVH, queried per ray. |

use navisim_types::SimError;
use tracing::trace;

use crate::transform::Vec3;

/// Identifier handed out by [`SceneBuilder::begin_geometry`].  All shapes
/// attached under one id report that id when hit.
pub type GeometryId = u32;

const PARALLEL_EPSILON: f64 = 1e-12;

// ────────────────────────────────────────────────────────────────────────────
// Aabb
// ────────────────────────────────────────────────────────────────────────────

/// An axis-aligned bounding box, defined by its minimum and maximum corners.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Aabb {
    pub min: Vec3,
    pub max: Vec3,
}

impl Aabb {
    /// Create a bounding box from its two opposite corners.
    ///
    /// The constructor normalises the corners so that `min ≤ max` per axis.
    pub fn new(a: Vec3, b: Vec3) -> Self {
        Self {
            min: a.min(b),
            max: a.max(b),
        }
    }

    /// Smallest box containing both `self` and `other`.
    pub fn union(&self, other: &Aabb) -> Self {
        Self {
            min: self.min.min(other.min),
            max: self.max.max(other.max),
        }
    }

    /// Return the centre point of the box.
    pub fn centre(&self) -> Vec3 {
        self.min.add(self.max).scale(0.5)
    }

    /// Index of the longest axis (0 = x, 1 = y, 2 = z).
    pub fn longest_axis(&self) -> usize {
        let ext = self.max.sub(self.min);
        if ext.x >= ext.y && ext.x >= ext.z {
            0
        } else if ext.y >= ext.z {
            1
        } else {
            2
        }
    }

    /// Slab test.  Returns the parameter interval where the ray is inside
    /// the box, clipped to the ray's `near..=far` range.
    pub fn ray_interval(&self, ray: &Ray) -> Option<(f64, f64)> {
        let mut t_min = ray.near;
        let mut t_max = ray.far;
        for axis in 0..3 {
            let o = ray.origin.axis(axis);
            let d = ray.direction.axis(axis);
            let lo = self.min.axis(axis);
            let hi = self.max.axis(axis);
            if d.abs() < PARALLEL_EPSILON {
                if o < lo || o > hi {
                    return None;
                }
                continue;
            }
            let inv = 1.0 / d;
            let (t0, t1) = {
                let a = (lo - o) * inv;
                let b = (hi - o) * inv;
                if a <= b { (a, b) } else { (b, a) }
            };
            t_min = t_min.max(t0);
            t_max = t_max.min(t1);
            if t_min > t_max {
                return None;
            }
        }
        Some((t_min, t_max))
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Ray / Hit
// ────────────────────────────────────────────────────────────────────────────

/// A query ray.  Hits are reported for parameters `t` with
/// `near ≤ t ≤ far`, measured along `direction`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Ray {
    pub origin: Vec3,
    pub direction: Vec3,
    pub near: f64,
    pub far: f64,
}

impl Ray {
    pub fn new(origin: Vec3, direction: Vec3, near: f64, far: f64) -> Self {
        Self {
            origin,
            direction,
            near,
            far,
        }
    }
}

/// Nearest intersection found by [`Scene::intersect`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Hit {
    pub geometry_id: GeometryId,
    pub distance: f64,
}

// ────────────────────────────────────────────────────────────────────────────
// Shapes
// ────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy)]
enum Shape {
    Plane { point: Vec3, normal: Vec3 },
    Triangle { a: Vec3, b: Vec3, c: Vec3 },
    Sphere { center: Vec3, radius: f64 },
}

impl Shape {
    fn intersect(&self, ray: &Ray) -> Option<f64> {
        let in_range = |t: f64| t >= ray.near && t <= ray.far;
        match *self {
            Shape::Plane { point, normal } => {
                let denom = ray.direction.dot(normal);
                if denom.abs() < PARALLEL_EPSILON {
                    return None;
                }
                let t = point.sub(ray.origin).dot(normal) / denom;
                in_range(t).then_some(t)
            }
            // Möller–Trumbore, two-sided.
            Shape::Triangle { a, b, c } => {
                let e1 = b.sub(a);
                let e2 = c.sub(a);
                let p = ray.direction.cross(e2);
                let det = e1.dot(p);
                if det.abs() < PARALLEL_EPSILON {
                    return None;
                }
                let inv_det = 1.0 / det;
                let s = ray.origin.sub(a);
                let u = s.dot(p) * inv_det;
                if !(0.0..=1.0).contains(&u) {
                    return None;
                }
                let q = s.cross(e1);
                let v = ray.direction.dot(q) * inv_det;
                if v < 0.0 || u + v > 1.0 {
                    return None;
                }
                let t = e2.dot(q) * inv_det;
                in_range(t).then_some(t)
            }
            Shape::Sphere { center, radius } => {
                let oc = ray.origin.sub(center);
                let a = ray.direction.dot(ray.direction);
                let half_b = oc.dot(ray.direction);
                let c = oc.dot(oc) - radius * radius;
                let disc = half_b * half_b - a * c;
                if disc < 0.0 {
                    return None;
                }
                let sqrt_d = disc.sqrt();
                let t0 = (-half_b - sqrt_d) / a;
                let t1 = (-half_b + sqrt_d) / a;
                if in_range(t0) {
                    Some(t0)
                } else if in_range(t1) {
                    Some(t1)
                } else {
                    None
                }
            }
        }
    }

    /// `None` for unbounded shapes.
    fn bounds(&self) -> Option<Aabb> {
        match *self {
            Shape::Plane { .. } => None,
            Shape::Triangle { a, b, c } => Some(Aabb::new(a.min(b).min(c), a.max(b).max(c))),
            Shape::Sphere { center, radius } => {
                let r = Vec3::new(radius, radius, radius);
                Some(Aabb::new(center.sub(r), center.add(r)))
            }
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct Entry {
    geometry_id: GeometryId,
    shape: Shape,
}

#[derive(Debug, Clone, Copy)]
struct BoundedEntry {
    entry: Entry,
    bounds: Aabb,
    centroid: Vec3,
}

// ────────────────────────────────────────────────────────────────────────────
// Device
// ────────────────────────────────────────────────────────────────────────────

/// Acceleration-structure settings shared by every scene a device builds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeviceConfig {
    /// Maximum number of shapes stored in one BVH leaf.
    pub max_leaf_size: usize,
    /// Depth at which BVH subdivision stops regardless of leaf size.
    pub max_depth: usize,
}

impl Default for DeviceConfig {
    fn default() -> Self {
        Self {
            max_leaf_size: 4,
            max_depth: 32,
        }
    }
}

/// Factory for scenes.
#[derive(Debug, Clone, Default)]
pub struct Device {
    config: DeviceConfig,
}

impl Device {
    /// Validate `config` and create a device.
    ///
    /// # Errors
    ///
    /// [`SimError::SceneConstruction`] when either limit is zero.
    pub fn new(config: DeviceConfig) -> Result<Self, SimError> {
        if config.max_leaf_size == 0 {
            return Err(SimError::SceneConstruction(
                "device max_leaf_size must be at least 1".to_string(),
            ));
        }
        if config.max_depth == 0 {
            return Err(SimError::SceneConstruction(
                "device max_depth must be at least 1".to_string(),
            ));
        }
        Ok(Self { config })
    }

    pub fn config(&self) -> DeviceConfig {
        self.config
    }

    /// Start an empty scene.
    pub fn new_scene(&self) -> SceneBuilder {
        SceneBuilder {
            config: self.config,
            entries: Vec::new(),
            next_geometry_id: 0,
        }
    }
}

// ────────────────────────────────────────────────────────────────────────────
// SceneBuilder
// ────────────────────────────────────────────────────────────────────────────

/// Mutable scene under construction.  Shapes can only be attached before
/// [`commit`][Self::commit].
#[derive(Debug)]
pub struct SceneBuilder {
    config: DeviceConfig,
    entries: Vec<Entry>,
    next_geometry_id: GeometryId,
}

impl SceneBuilder {
    /// Reserve a new geometry id.
    pub fn begin_geometry(&mut self) -> GeometryId {
        let id = self.next_geometry_id;
        self.next_geometry_id += 1;
        id
    }

    /// Number of geometry ids handed out so far.
    pub fn geometry_count(&self) -> usize {
        self.next_geometry_id as usize
    }

    /// Attach an infinite plane through `point` with the given `normal`.
    pub fn attach_plane(
        &mut self,
        geometry_id: GeometryId,
        point: Vec3,
        normal: Vec3,
    ) -> Result<(), SimError> {
        self.check_id(geometry_id)?;
        check_finite("plane point", point)?;
        let normal = normal.normalized().ok_or_else(|| {
            SimError::SceneConstruction(format!("plane normal {normal:?} has zero length"))
        })?;
        self.push(geometry_id, Shape::Plane { point, normal });
        Ok(())
    }

    /// Attach a triangle.  Degenerate (zero-area) triangles are rejected.
    pub fn attach_triangle(
        &mut self,
        geometry_id: GeometryId,
        a: Vec3,
        b: Vec3,
        c: Vec3,
    ) -> Result<(), SimError> {
        self.check_id(geometry_id)?;
        for v in [a, b, c] {
            check_finite("triangle vertex", v)?;
        }
        if b.sub(a).cross(c.sub(a)).norm() <= PARALLEL_EPSILON {
            return Err(SimError::SceneConstruction(format!(
                "degenerate triangle {a:?} {b:?} {c:?}"
            )));
        }
        self.push(geometry_id, Shape::Triangle { a, b, c });
        Ok(())
    }

    /// Attach a sphere.  The radius must be finite and positive.
    pub fn attach_sphere(
        &mut self,
        geometry_id: GeometryId,
        center: Vec3,
        radius: f64,
    ) -> Result<(), SimError> {
        self.check_id(geometry_id)?;
        check_finite("sphere center", center)?;
        if radius <= 0.0 || !radius.is_finite() {
            return Err(SimError::SceneConstruction(format!(
                "sphere radius must be finite and positive, got {radius}"
            )));
        }
        self.push(geometry_id, Shape::Sphere { center, radius });
        Ok(())
    }

    /// Build the acceleration structure and freeze the scene.
    pub fn commit(self) -> Scene {
        let mut bounded = Vec::new();
        let mut unbounded = Vec::new();
        for entry in self.entries {
            match entry.shape.bounds() {
                Some(bounds) => bounded.push(BoundedEntry {
                    entry,
                    bounds,
                    centroid: bounds.centre(),
                }),
                None => unbounded.push(entry),
            }
        }

        let mut nodes = Vec::new();
        if !bounded.is_empty() {
            let len = bounded.len();
            build_node(&mut bounded, &mut nodes, 0, len, 0, &self.config);
        }
        trace!(
            bounded = bounded.len(),
            unbounded = unbounded.len(),
            nodes = nodes.len(),
            "scene committed"
        );
        Scene {
            bounded,
            nodes,
            unbounded,
            geometry_count: self.next_geometry_id as usize,
        }
    }

    fn check_id(&self, geometry_id: GeometryId) -> Result<(), SimError> {
        if geometry_id >= self.next_geometry_id {
            return Err(SimError::SceneConstruction(format!(
                "geometry id {geometry_id} was never reserved"
            )));
        }
        Ok(())
    }

    fn push(&mut self, geometry_id: GeometryId, shape: Shape) {
        self.entries.push(Entry { geometry_id, shape });
    }
}

fn check_finite(what: &str, v: Vec3) -> Result<(), SimError> {
    if v.is_finite() {
        Ok(())
    } else {
        Err(SimError::SceneConstruction(format!("{what} {v:?} is not finite")))
    }
}

// ────────────────────────────────────────────────────────────────────────────
// BVH
// ────────────────────────────────────────────────────────────────────────────

#[derive(Debug)]
enum BvhNode {
    Leaf { bounds: Aabb, start: usize, count: usize },
    Inner { bounds: Aabb, left: usize, right: usize },
}

impl BvhNode {
    fn bounds(&self) -> &Aabb {
        match self {
            BvhNode::Leaf { bounds, .. } | BvhNode::Inner { bounds, .. } => bounds,
        }
    }
}

/// Median split on the longest centroid axis.  Returns the index of the
/// node created for `items[start..end]`.
fn build_node(
    items: &mut [BoundedEntry],
    nodes: &mut Vec<BvhNode>,
    start: usize,
    end: usize,
    depth: usize,
    config: &DeviceConfig,
) -> usize {
    let slice = &mut items[start..end];
    let bounds = slice
        .iter()
        .skip(1)
        .fold(slice[0].bounds, |acc, e| acc.union(&e.bounds));
    let count = end - start;

    if count <= config.max_leaf_size || depth >= config.max_depth {
        nodes.push(BvhNode::Leaf {
            bounds,
            start,
            count,
        });
        return nodes.len() - 1;
    }

    let centroid_bounds = slice
        .iter()
        .skip(1)
        .fold(Aabb::new(slice[0].centroid, slice[0].centroid), |acc, e| {
            acc.union(&Aabb::new(e.centroid, e.centroid))
        });
    let axis = centroid_bounds.longest_axis();
    slice.sort_by(|a, b| a.centroid.axis(axis).total_cmp(&b.centroid.axis(axis)));
    let mid = start + count / 2;

    // Reserve the slot so the parent precedes its children.
    let index = nodes.len();
    nodes.push(BvhNode::Leaf {
        bounds,
        start,
        count,
    });
    let left = build_node(items, nodes, start, mid, depth + 1, config);
    let right = build_node(items, nodes, mid, end, depth + 1, config);
    nodes[index] = BvhNode::Inner {
        bounds,
        left,
        right,
    };
    index
}

// ────────────────────────────────────────────────────────────────────────────
// Scene
// ────────────────────────────────────────────────────────────────────────────

/// A committed, read-only scene.
#[derive(Debug)]
pub struct Scene {
    bounded: Vec<BoundedEntry>,
    nodes: Vec<BvhNode>,
    unbounded: Vec<Entry>,
    geometry_count: usize,
}

impl Scene {
    /// Number of geometries registered before commit.
    pub fn geometry_count(&self) -> usize {
        self.geometry_count
    }

    /// Nearest hit along `ray`, or `None` when nothing is struck inside
    /// `near..=far`.
    pub fn intersect(&self, ray: &Ray) -> Option<Hit> {
        let mut best: Option<Hit> = None;
        let consider = |entry: &Entry, best: &mut Option<Hit>| {
            if let Some(t) = entry.shape.intersect(ray)
                && best.is_none_or(|b| t < b.distance)
            {
                *best = Some(Hit {
                    geometry_id: entry.geometry_id,
                    distance: t,
                });
            }
        };

        for entry in &self.unbounded {
            consider(entry, &mut best);
        }

        if self.nodes.is_empty() {
            return best;
        }
        let mut stack = vec![0usize];
        while let Some(index) = stack.pop() {
            let node = &self.nodes[index];
            let Some((t_enter, _)) = node.bounds().ray_interval(ray) else {
                continue;
            };
            if best.is_some_and(|b| t_enter > b.distance) {
                continue;
            }
            match *node {
                BvhNode::Leaf { start, count, .. } => {
                    for item in &self.bounded[start..start + count] {
                        consider(&item.entry, &mut best);
                    }
                }
                BvhNode::Inner { left, right, .. } => {
                    stack.push(right);
                    stack.push(left);
                }
            }
        }
        best
    }
}

impl Drop for Scene {
    fn drop(&mut self) {
        trace!(geometries = self.geometry_count, "scene released");
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Tests
// ────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn down_ray(x: f64, y: f64, far: f64) -> Ray {
        Ray::new(Vec3::new(x, y, 10.0), Vec3::new(0.0, 0.0, -1.0), 0.0, far)
    }

    #[test]
    fn device_rejects_zero_limits() {
        let bad_leaf = DeviceConfig {
            max_leaf_size: 0,
            ..DeviceConfig::default()
        };
        assert!(matches!(Device::new(bad_leaf), Err(SimError::SceneConstruction(_))));
        let bad_depth = DeviceConfig {
            max_depth: 0,
            ..DeviceConfig::default()
        };
        assert!(matches!(Device::new(bad_depth), Err(SimError::SceneConstruction(_))));
        assert!(Device::new(DeviceConfig::default()).is_ok());
    }

    #[test]
    fn empty_scene_never_hits() {
        let scene = Device::default().new_scene().commit();
        assert!(scene.intersect(&down_ray(0.0, 0.0, 100.0)).is_none());
        assert_eq!(scene.geometry_count(), 0);
    }

    #[test]
    fn plane_hit_respects_range() {
        let mut builder = Device::default().new_scene();
        let id = builder.begin_geometry();
        builder
            .attach_plane(id, Vec3::zero(), Vec3::new(0.0, 0.0, 1.0))
            .unwrap();
        let scene = builder.commit();

        let hit = scene.intersect(&down_ray(3.0, -2.0, 20.0)).unwrap();
        assert_eq!(hit.geometry_id, id);
        assert!((hit.distance - 10.0).abs() < 1e-9);
        assert!(scene.intersect(&down_ray(3.0, -2.0, 9.5)).is_none());

        let parallel = Ray::new(Vec3::new(0.0, 0.0, 1.0), Vec3::new(1.0, 0.0, 0.0), 0.0, 100.0);
        assert!(scene.intersect(&parallel).is_none());
    }

    #[test]
    fn triangle_hit_inside_and_miss_outside() {
        let mut builder = Device::default().new_scene();
        let id = builder.begin_geometry();
        builder
            .attach_triangle(
                id,
                Vec3::new(0.0, 0.0, 0.0),
                Vec3::new(2.0, 0.0, 0.0),
                Vec3::new(0.0, 2.0, 0.0),
            )
            .unwrap();
        let scene = builder.commit();
        assert!(scene.intersect(&down_ray(0.5, 0.5, 100.0)).is_some());
        assert!(scene.intersect(&down_ray(1.5, 1.5, 100.0)).is_none());
    }

    #[test]
    fn sphere_hit_from_outside_and_inside() {
        let mut builder = Device::default().new_scene();
        let id = builder.begin_geometry();
        builder.attach_sphere(id, Vec3::zero(), 1.0).unwrap();
        let scene = builder.commit();

        let hit = scene.intersect(&down_ray(0.0, 0.0, 100.0)).unwrap();
        assert!((hit.distance - 9.0).abs() < 1e-9);

        let inside = Ray::new(Vec3::zero(), Vec3::new(1.0, 0.0, 0.0), 0.0, 10.0);
        let hit = scene.intersect(&inside).unwrap();
        assert!((hit.distance - 1.0).abs() < 1e-9);
    }

    #[test]
    fn nearest_of_overlapping_geometries_wins() {
        let mut builder = Device::default().new_scene();
        let ground = builder.begin_geometry();
        builder
            .attach_plane(ground, Vec3::zero(), Vec3::new(0.0, 0.0, 1.0))
            .unwrap();
        let ball = builder.begin_geometry();
        builder
            .attach_sphere(ball, Vec3::new(0.0, 0.0, 2.0), 1.0)
            .unwrap();
        let scene = builder.commit();

        let hit = scene.intersect(&down_ray(0.0, 0.0, 100.0)).unwrap();
        assert_eq!(hit.geometry_id, ball);
        assert!((hit.distance - 7.0).abs() < 1e-9);

        let hit = scene.intersect(&down_ray(5.0, 0.0, 100.0)).unwrap();
        assert_eq!(hit.geometry_id, ground);
    }

    #[test]
    fn bvh_finds_hits_among_many_shapes() {
        let config = DeviceConfig {
            max_leaf_size: 1,
            max_depth: 16,
        };
        let mut builder = Device::new(config).unwrap().new_scene();
        for i in 0..50 {
            let id = builder.begin_geometry();
            builder
                .attach_sphere(id, Vec3::new(i as f64 * 3.0, 0.0, 0.0), 1.0)
                .unwrap();
        }
        let scene = builder.commit();
        for i in 0..50 {
            let hit = scene.intersect(&down_ray(i as f64 * 3.0, 0.0, 100.0)).unwrap();
            assert_eq!(hit.geometry_id, i as GeometryId);
        }
        assert!(scene.intersect(&down_ray(1.5, 0.0, 100.0)).is_none());
    }

    #[test]
    fn invalid_shapes_are_rejected() {
        let mut builder = Device::default().new_scene();
        let id = builder.begin_geometry();
        assert!(builder.attach_plane(id, Vec3::zero(), Vec3::zero()).is_err());
        assert!(builder.attach_sphere(id, Vec3::zero(), 0.0).is_err());
        assert!(builder.attach_sphere(id, Vec3::zero(), f64::NAN).is_err());
        assert!(
            builder
                .attach_triangle(id, Vec3::zero(), Vec3::new(1.0, 0.0, 0.0), Vec3::new(2.0, 0.0, 0.0))
                .is_err()
        );
        assert!(
            builder
                .attach_sphere(id + 1, Vec3::zero(), 1.0)
                .is_err(),
            "unreserved ids must be rejected"
        );
    }

    #[test]
    fn aabb_slab_test_handles_axis_parallel_rays() {
        let b = Aabb::new(Vec3::new(1.0, 1.0, 1.0), Vec3::new(-1.0, -1.0, -1.0));
        assert_eq!(b.min, Vec3::new(-1.0, -1.0, -1.0));
        assert_eq!(b.max, Vec3::new(1.0, 1.0, 1.0));
        let through = Ray::new(Vec3::new(-5.0, 0.0, 0.0), Vec3::new(1.0, 0.0, 0.0), 0.0, 100.0);
        let (t0, t1) = b.ray_interval(&through).unwrap();
        assert!((t0 - 4.0).abs() < 1e-9 && (t1 - 6.0).abs() < 1e-9);
        let beside = Ray::new(Vec3::new(-5.0, 2.0, 0.0), Vec3::new(1.0, 0.0, 0.0), 0.0, 100.0);
        assert!(b.ray_interval(&beside).is_none());
    }
}
