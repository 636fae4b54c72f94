//! Simulated range sensing.
//!
//! - [`scene`] – the intersection oracle: [`Device`], [`SceneBuilder`],
//!   committed [`Scene`] with a BVH, [`Ray`] / [`Hit`].
//! - [`primitive`] – the [`Primitive`] capability trait and the built-in
//!   plane, box and sphere primitives.
//! - [`pattern`] – bounded, restartable scan-direction generation.
//! - [`engine`] – [`RaycastEngine`]: primitive registry and cast pipeline.

pub mod engine;
pub mod pattern;
pub mod primitive;
pub mod scene;

pub use engine::RaycastEngine;
pub use pattern::{MAX_HORIZONTAL_STEPS, ScanPattern, generate_directions};
pub use primitive::{BoxPrimitive, Plane, Primitive, PrimitiveSpec, Sphere};
pub use scene::{Aabb, Device, DeviceConfig, GeometryId, Hit, Ray, Scene, SceneBuilder};
