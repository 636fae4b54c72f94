//! Fixed-step planar motion model for the simulated agent.
//!
//! [`PoseIntegrator`] owns the agent's [`SimulationState`] behind a single
//! mutex.  Velocity commands, pose resets and ticks all take that lock, and
//! a tick publishes its results before releasing it, so every published
//! (transform, pose, twist) triple belongs to exactly one tick.
//!
//! # Example
//!
//! ```rust
//! use std::sync::Mutex;
//! use navisim_sim::integrator::{PoseIntegrator, StatePublisher};
//! use navisim_types::{PoseStamped, SimError, TransformStamped, Twist};
//!
//! #[derive(Default)]
//! struct LastPose(Mutex<Option<PoseStamped>>);
//!
//! impl StatePublisher for LastPose {
//!     fn publish_transform(&self, _: TransformStamped) -> Result<(), SimError> { Ok(()) }
//!     fn publish_pose(&self, pose: PoseStamped) -> Result<(), SimError> {
//!         *self.0.lock().unwrap() = Some(pose);
//!         Ok(())
//!     }
//!     fn publish_twist(&self, _: Twist) -> Result<(), SimError> { Ok(()) }
//! }
//!
//! let integrator = PoseIntegrator::new(LastPose::default());
//! integrator.on_velocity_command(Twist::planar(1.0, 0.0, 0.0));
//! integrator.on_tick().unwrap();
//! assert!((integrator.pose().position.x - 0.01).abs() < 1e-12);
//! ```

use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use chrono::{DateTime, Utc};
use navisim_perception::transform::{Quaternion, Vec3};
use navisim_types::{
    AGENT_FRAME, Event, EventPayload, Header, Pose, PoseStamped, SimError, TransformStamped, Twist,
    Vector3, WORLD_FRAME,
};
use tracing::{debug, info};

/// Integration step used when none is configured.
pub const DEFAULT_TICK_PERIOD: Duration = Duration::from_millis(10);

/// Sink for the three messages emitted on every tick.
///
/// Implementations are called while the integrator's state lock is held and
/// must not call back into the integrator.
pub trait StatePublisher: Send + Sync {
    /// `map` → `base_link` transform.
    fn publish_transform(&self, transform: TransformStamped) -> Result<(), SimError>;
    /// Agent pose in `map`.
    fn publish_pose(&self, pose: PoseStamped) -> Result<(), SimError>;
    /// Twist that produced the published pose.
    fn publish_twist(&self, twist: Twist) -> Result<(), SimError>;
}

/// Pose and velocity of the agent.  The default is the origin at rest.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct SimulationState {
    pub pose: Pose,
    pub twist: Twist,
}

/// Integrates the commanded twist into the agent pose at a fixed period.
pub struct PoseIntegrator<P: StatePublisher> {
    state: Mutex<SimulationState>,
    publisher: P,
    tick_period: Duration,
}

impl<P: StatePublisher> PoseIntegrator<P> {
    /// Create an integrator at the origin, at rest, ticking every
    /// [`DEFAULT_TICK_PERIOD`].
    pub fn new(publisher: P) -> Self {
        Self::with_tick_period(publisher, DEFAULT_TICK_PERIOD)
    }

    pub fn with_tick_period(publisher: P, tick_period: Duration) -> Self {
        info!(tick_period_ms = tick_period.as_millis() as u64, "pose integrator ready");
        Self {
            state: Mutex::new(SimulationState::default()),
            publisher,
            tick_period,
        }
    }

    pub fn tick_period(&self) -> Duration {
        self.tick_period
    }

    pub fn publisher(&self) -> &P {
        &self.publisher
    }

    /// Replace the commanded twist.  Values are taken as-is.
    pub fn on_velocity_command(&self, twist: Twist) {
        debug!(
            linear_x = twist.linear.x,
            linear_y = twist.linear.y,
            angular_z = twist.angular.z,
            "velocity command"
        );
        self.lock().twist = twist;
    }

    /// Teleport to `pose` and stop.
    pub fn on_pose_reset(&self, pose: Pose) {
        info!(
            x = pose.position.x,
            y = pose.position.y,
            z = pose.position.z,
            "pose reset"
        );
        let mut state = self.lock();
        state.pose = pose;
        state.twist = Twist::default();
    }

    /// Dispatch an inbound bus event.  Returns `false` for payloads the
    /// integrator does not consume.
    pub fn handle_event(&self, event: &Event) -> bool {
        match &event.payload {
            EventPayload::TargetTwist(twist) => {
                self.on_velocity_command(*twist);
                true
            }
            EventPayload::InitialPose(pose) => {
                self.on_pose_reset(*pose);
                true
            }
            _ => false,
        }
    }

    /// Advance one period, stamped with the current time.
    ///
    /// # Errors
    ///
    /// Propagates the first publisher failure.  The state has already been
    /// advanced when that happens.
    pub fn on_tick(&self) -> Result<(), SimError> {
        self.on_tick_at(Utc::now())
    }

    /// Advance one period and publish with `stamp`.
    pub fn on_tick_at(&self, stamp: DateTime<Utc>) -> Result<(), SimError> {
        let dt = self.tick_period.as_secs_f64();
        let mut state = self.lock();
        let twist = state.twist;

        let yaw_delta = twist.angular.z * dt;
        let orientation = Quaternion::from(state.pose.orientation)
            .mul(Quaternion::from_yaw(yaw_delta))
            .normalize();

        // Body-frame step, rotated with the orientation at the end of the tick.
        let step = Vec3::new(twist.linear.x * dt, twist.linear.y * dt, 0.0);
        let displacement = orientation.rotation_matrix().mul_vec(step);

        state.pose.orientation = orientation.into();
        state.pose.position.x += displacement.x;
        state.pose.position.y += displacement.y;
        let pose = state.pose;

        self.publisher.publish_transform(TransformStamped {
            header: Header::new(stamp, WORLD_FRAME),
            child_frame_id: AGENT_FRAME.to_string(),
            translation: Vector3 {
                x: pose.position.x,
                y: pose.position.y,
                z: 0.0,
            },
            rotation: pose.orientation,
        })?;
        self.publisher.publish_pose(PoseStamped {
            header: Header::new(stamp, WORLD_FRAME),
            pose,
        })?;
        self.publisher.publish_twist(twist)?;
        Ok(())
    }

    /// Copy of the current state.
    pub fn state(&self) -> SimulationState {
        *self.lock()
    }

    pub fn pose(&self) -> Pose {
        self.lock().pose
    }

    pub fn twist(&self) -> Twist {
        self.lock().twist
    }

    // A panicking publisher leaves the state consistent, so a poisoned lock
    // is still usable.
    fn lock(&self) -> MutexGuard<'_, SimulationState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
