//! `navisim-middleware` – message transport between the simulator parts.
//!
//! Routes asynchronous data between the pose integrator, the LiDAR simulator
//! and external clients without caring about the data's meaning.
//!
//! # Modules
//!
//! - [`bus`] – Headless, typed, topic-based publish/subscribe event bus built
//!   on Tokio broadcast channels.

pub mod bus;

pub use bus::{EventBus, Topic, TopicReceiver};
