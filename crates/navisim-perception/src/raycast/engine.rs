//! [`RaycastEngine`] – primitive registry plus the cast pipeline.
//!
//! Every cast builds its own [`Scene`] from the registry, queries it once
//! per direction and drops it before returning, so the engine holds no
//! scene state between calls and `cast` only needs `&self`.

use std::collections::HashMap;

use navisim_types::{Pose, PointXyzi, SimError};
use tracing::{debug, instrument};

use super::pattern::{ScanPattern, generate_directions};
use super::primitive::Primitive;
use super::scene::{Device, DeviceConfig, Ray, Scene};
use crate::transform::{Quaternion, Vec3};

/// Keyed registry of scene primitives and the ray-cast entry points.
///
/// Keys are unique: [`add_primitive`][Self::add_primitive] refuses to
/// overwrite and [`remove_primitive`][Self::remove_primitive] reports
/// unknown keys.  Both failures are recoverable.
#[derive(Debug, Default)]
pub struct RaycastEngine {
    device: Device,
    primitives: HashMap<String, Box<dyn Primitive>>,
}

impl RaycastEngine {
    /// Create an engine with the default device settings.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an engine whose scenes are built with `config`.
    ///
    /// # Errors
    ///
    /// [`SimError::SceneConstruction`] when the device rejects `config`.
    pub fn with_device_config(config: DeviceConfig) -> Result<Self, SimError> {
        Ok(Self {
            device: Device::new(config)?,
            primitives: HashMap::new(),
        })
    }

    /// Register `primitive` under `key`.
    ///
    /// # Errors
    ///
    /// [`SimError::AlreadyExists`] when `key` is taken; the existing
    /// primitive is left in place.
    pub fn add_primitive(
        &mut self,
        key: impl Into<String>,
        primitive: Box<dyn Primitive>,
    ) -> Result<(), SimError> {
        let key = key.into();
        if self.primitives.contains_key(&key) {
            return Err(SimError::AlreadyExists(key));
        }
        debug!(key = %key, "primitive added");
        self.primitives.insert(key, primitive);
        Ok(())
    }

    /// Remove and return the primitive registered under `key`.
    ///
    /// # Errors
    ///
    /// [`SimError::NotFound`] when no primitive has that key.
    pub fn remove_primitive(&mut self, key: &str) -> Result<Box<dyn Primitive>, SimError> {
        let removed = self
            .primitives
            .remove(key)
            .ok_or_else(|| SimError::NotFound(format!("primitive '{key}'")))?;
        debug!(key, "primitive removed");
        Ok(removed)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.primitives.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.primitives.len()
    }

    pub fn is_empty(&self) -> bool {
        self.primitives.is_empty()
    }

    /// Serialise the registry as a JSON object `{key: description}`.
    pub fn dump_primitives(&self) -> serde_json::Value {
        let map = self
            .primitives
            .iter()
            .map(|(key, primitive)| (key.clone(), primitive.describe()))
            .collect::<serde_json::Map<_, _>>();
        serde_json::Value::Object(map)
    }

    /// See [`generate_directions`].
    pub fn generate_directions(
        &self,
        horizontal_resolution: f64,
        vertical_angles: &[f64],
    ) -> Result<ScanPattern, SimError> {
        generate_directions(horizontal_resolution, vertical_angles)
    }

    /// Build and commit a scene holding every registered primitive.
    ///
    /// # Errors
    ///
    /// [`SimError::SceneConstruction`] when any primitive fails to register.
    pub fn build_scene(&self) -> Result<Scene, SimError> {
        let mut builder = self.device.new_scene();
        for (key, primitive) in &self.primitives {
            primitive.register_into(&mut builder).map_err(|e| match e {
                SimError::SceneConstruction(msg) => {
                    SimError::SceneConstruction(format!("primitive '{key}': {msg}"))
                }
                other => other,
            })?;
        }
        Ok(builder.commit())
    }

    /// Cast one ray per entry of `directions` from `origin`.
    ///
    /// Each ray is tested in the world frame: its direction is
    /// `origin.orientation ∘ direction` applied to the forward axis
    /// `(1, 0, 0)`, it starts at `origin.position`, and hits are accepted
    /// between `min_distance` and `max_distance`.
    ///
    /// The returned points are **sensor-local**: each one is the
    /// *uncomposed* `direction` applied to the forward axis, scaled by the
    /// hit distance.  Neither the origin position nor its orientation is
    /// applied to the output.
    ///
    /// Output order follows `directions`; rays that miss contribute nothing.
    ///
    /// # Errors
    ///
    /// [`SimError::SceneConstruction`] when the scene cannot be built.
    #[instrument(level = "debug", skip_all, fields(primitives = self.primitives.len()))]
    pub fn cast<I>(
        &self,
        origin: &Pose,
        directions: I,
        max_distance: f64,
        min_distance: f64,
    ) -> Result<Vec<PointXyzi>, SimError>
    where
        I: IntoIterator<Item = Quaternion>,
    {
        let scene = self.build_scene()?;

        let origin_position = Vec3::from(origin.position);
        let origin_rotation = Quaternion::from(origin.orientation);
        let directions = directions.into_iter();
        let mut points = Vec::with_capacity(directions.size_hint().0);
        let mut rays = 0usize;

        for direction in directions {
            rays += 1;
            let world = origin_rotation.mul(direction).normalize();
            let ray = Ray::new(
                origin_position,
                world.rotation_matrix().mul_vec(Vec3::FORWARD),
                min_distance,
                max_distance,
            );
            if let Some(hit) = scene.intersect(&ray) {
                let local = direction
                    .rotation_matrix()
                    .mul_vec(Vec3::FORWARD)
                    .scale(hit.distance);
                points.push(PointXyzi::new(local.x as f32, local.y as f32, local.z as f32));
            }
        }

        debug!(rays, hits = points.len(), "cast complete");
        Ok(points)
    }

    /// [`generate_directions`] followed by [`cast`][Self::cast].
    ///
    /// # Errors
    ///
    /// [`SimError::InvalidSamplingParameter`] for a bad pattern, otherwise as
    /// [`cast`][Self::cast].
    pub fn cast_scan(
        &self,
        origin: &Pose,
        horizontal_resolution: f64,
        vertical_angles: &[f64],
        max_distance: f64,
        min_distance: f64,
    ) -> Result<Vec<PointXyzi>, SimError> {
        let directions = generate_directions(horizontal_resolution, vertical_angles)?;
        self.cast(origin, directions, max_distance, min_distance)
    }
}
