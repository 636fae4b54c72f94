//! [`BusPublisher`] – integrator output onto the event bus.
//!
//! | Message | Topic |
//! |---|---|
//! | `map` → `base_link` transform | [`Topic::Tf`] |
//! | agent pose | [`Topic::CurrentPose`] |
//! | twist in effect | [`Topic::CurrentTwist`] |

use navisim_middleware::{EventBus, Topic};
use navisim_types::{Event, EventPayload, PoseStamped, SimError, TransformStamped, Twist};

use crate::integrator::StatePublisher;

/// Source tag stamped on every event this publisher emits.
pub const SOURCE: &str = "navisim-sim::integrator";

/// [`StatePublisher`] that forwards each message to its bus topic.
#[derive(Clone, Debug)]
pub struct BusPublisher {
    bus: EventBus,
}

impl BusPublisher {
    pub fn new(bus: EventBus) -> Self {
        Self { bus }
    }

    pub fn bus(&self) -> &EventBus {
        &self.bus
    }

    fn send(&self, topic: Topic, payload: EventPayload) -> Result<(), SimError> {
        self.bus.publish_to(topic, Event::new(SOURCE, payload))?;
        Ok(())
    }
}

impl StatePublisher for BusPublisher {
    fn publish_transform(&self, transform: TransformStamped) -> Result<(), SimError> {
        self.send(Topic::Tf, EventPayload::Transform(transform))
    }

    fn publish_pose(&self, pose: PoseStamped) -> Result<(), SimError> {
        self.send(Topic::CurrentPose, EventPayload::Pose(pose))
    }

    fn publish_twist(&self, twist: Twist) -> Result<(), SimError> {
        self.send(Topic::CurrentTwist, EventPayload::Twist(twist))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::integrator::PoseIntegrator;

    #[tokio::test]
    async fn tick_reaches_all_three_topics() {
        let bus = EventBus::default();
        let mut tf_rx = bus.subscribe_to(Topic::Tf);
        let mut pose_rx = bus.subscribe_to(Topic::CurrentPose);
        let mut twist_rx = bus.subscribe_to(Topic::CurrentTwist);

        let integrator = PoseIntegrator::new(BusPublisher::new(bus));
        integrator.on_velocity_command(Twist::planar(1.0, 0.0, 0.0));
        integrator.on_tick().unwrap();

        let tf = tf_rx.recv().await.unwrap();
        assert_eq!(tf.source, SOURCE);
        match tf.payload {
            EventPayload::Transform(t) => assert_eq!(t.child_frame_id, "base_link"),
            other => panic!("unexpected payload: {other:?}"),
        }

        let pose = pose_rx.recv().await.unwrap();
        match pose.payload {
            EventPayload::Pose(p) => assert!((p.pose.position.x - 0.01).abs() < 1e-9),
            other => panic!("unexpected payload: {other:?}"),
        }

        let twist = twist_rx.recv().await.unwrap();
        match twist.payload {
            EventPayload::Twist(t) => assert_eq!(t.linear.x, 1.0),
            other => panic!("unexpected payload: {other:?}"),
        }
    }

    #[test]
    fn tick_without_listeners_succeeds() {
        let integrator = PoseIntegrator::new(BusPublisher::new(EventBus::default()));
        assert!(integrator.on_tick().is_ok());
    }
}
