//! `navisim-sim` – the simulated agent and its LiDAR.
//!
//! | Module | Contents |
//! |---|---|
//! | [`integrator`] | [`PoseIntegrator`]: fixed-step planar motion model |
//! | [`publisher`] | [`BusPublisher`]: routes integrator output onto the event bus |
//! | [`lidar`] | [`LidarSimulator`]: structured range scans against the scene |
//! | [`objects`] | scene-object files (`{key: PrimitiveSpec}` JSON) |

pub mod integrator;
pub mod lidar;
pub mod objects;
pub mod publisher;

pub use integrator::{PoseIntegrator, SimulationState, StatePublisher};
pub use lidar::{LidarConfig, LidarSimulator};
pub use objects::{load_objects, parse_objects};
pub use publisher::BusPublisher;
