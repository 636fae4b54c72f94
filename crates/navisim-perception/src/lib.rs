//! `navisim-perception` – frame maths and simulated range sensing.
//!
//! # Modules
//!
//! - [`transform`] – [`Vec3`][transform::Vec3],
//!   [`Quaternion`][transform::Quaternion], [`Mat3`][transform::Mat3],
//!   [`Transform3D`][transform::Transform3D] and the
//!   [`TfEngine`][transform::TfEngine] frame graph.
//! - [`raycast`] – [`RaycastEngine`][raycast::RaycastEngine]: keeps a
//!   registry of named scene primitives and turns a sensor pose plus a set of
//!   ray directions into sensor-local point samples.

pub mod raycast;
pub mod transform;
