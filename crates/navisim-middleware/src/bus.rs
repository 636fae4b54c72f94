//! Headless, typed, topic-based publish/subscribe event bus.
//!
//! Uses [`tokio::sync::broadcast`] channels under the hood so that every
//! subscriber receives every message without any single subscriber blocking
//! the others.
//!
//! # Topics
//!
//! | Topic | Direction | Traffic |
//! |---|---|---|
//! | [`Topic::TargetTwist`] | inbound | velocity commands for the simulated agent |
//! | [`Topic::InitialPose`] | inbound | teleport / pose-reset requests |
//! | [`Topic::CurrentPose`] | outbound | integrated pose, once per tick |
//! | [`Topic::CurrentTwist`] | outbound | velocity in effect, once per tick |
//! | [`Topic::Tf`] | outbound | `map` → `base_link` transform, once per tick |
//! | [`Topic::PointCloud`] | outbound | simulated LiDAR scans |

use navisim_types::{Event, SimError};
use tokio::sync::broadcast;
use tracing::{trace, warn};

/// Default channel capacity (number of buffered events before old ones are
/// dropped for slow subscribers).
const DEFAULT_CAPACITY: usize = 256;

/// Enumeration of all routing topics on the event bus.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Topic {
    /// Velocity commands consumed by the pose integrator.
    TargetTwist,
    /// Pose-reset requests consumed by the pose integrator.
    InitialPose,
    /// Integrated agent pose.
    CurrentPose,
    /// Velocity paired with the pose of the same tick.
    CurrentTwist,
    /// Coordinate-frame transforms.
    Tf,
    /// Range scans produced by the LiDAR simulator.
    PointCloud,
}

impl Topic {
    /// Wire name of the topic, as a ROS graph would spell it.
    pub fn name(self) -> &'static str {
        match self {
            Topic::TargetTwist => "target_twist",
            Topic::InitialPose => "initialpose",
            Topic::CurrentPose => "current_pose",
            Topic::CurrentTwist => "current_twist",
            Topic::Tf => "tf",
            Topic::PointCloud => "points",
        }
    }
}

/// Shared event bus. Clone it cheaply – all clones share the same underlying
/// broadcast channels.
#[derive(Clone, Debug)]
pub struct EventBus {
    target_twist: broadcast::Sender<Event>,
    initial_pose: broadcast::Sender<Event>,
    current_pose: broadcast::Sender<Event>,
    current_twist: broadcast::Sender<Event>,
    tf: broadcast::Sender<Event>,
    point_cloud: broadcast::Sender<Event>,
}

impl EventBus {
    /// Create a new bus with the given channel capacity.
    ///
    /// The `capacity` is applied to every topic channel independently.
    ///
    /// # Panics
    ///
    /// Panics when `capacity` is zero, like [`broadcast::channel`].
    pub fn new(capacity: usize) -> Self {
        let (target_twist, _) = broadcast::channel(capacity);
        let (initial_pose, _) = broadcast::channel(capacity);
        let (current_pose, _) = broadcast::channel(capacity);
        let (current_twist, _) = broadcast::channel(capacity);
        let (tf, _) = broadcast::channel(capacity);
        let (point_cloud, _) = broadcast::channel(capacity);
        Self {
            target_twist,
            initial_pose,
            current_pose,
            current_twist,
            tf,
            point_cloud,
        }
    }

    /// Publish `event` to the given [`Topic`] channel.
    ///
    /// Returns the number of active receivers that were handed the event.
    /// Returns `Ok(0)` when no subscribers are currently listening on the
    /// topic (this is a normal condition, not an error).
    pub fn publish_to(&self, topic: Topic, event: Event) -> Result<usize, SimError> {
        match self.topic_sender(topic).send(event) {
            Ok(n) => Ok(n),
            Err(broadcast::error::SendError(_)) => {
                trace!(topic = topic.name(), "no subscribers; event dropped");
                Ok(0)
            }
        }
    }

    /// Subscribe to a specific [`Topic`] channel.
    pub fn subscribe_to(&self, topic: Topic) -> TopicReceiver {
        TopicReceiver {
            topic,
            receiver: self.topic_sender(topic).subscribe(),
        }
    }

    /// Number of receivers currently subscribed to `topic`.
    pub fn subscriber_count(&self, topic: Topic) -> usize {
        self.topic_sender(topic).receiver_count()
    }

    fn topic_sender(&self, topic: Topic) -> &broadcast::Sender<Event> {
        match topic {
            Topic::TargetTwist => &self.target_twist,
            Topic::InitialPose => &self.initial_pose,
            Topic::CurrentPose => &self.current_pose,
            Topic::CurrentTwist => &self.current_twist,
            Topic::Tf => &self.tf,
            Topic::PointCloud => &self.point_cloud,
        }
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

// ---------------------------------------------------------------------------
// Topic-based receiver
// ---------------------------------------------------------------------------

/// An async receiver bound to a single [`Topic`] channel.
///
/// Obtained via [`EventBus::subscribe_to`].
pub struct TopicReceiver {
    topic: Topic,
    receiver: broadcast::Receiver<Event>,
}

impl TopicReceiver {
    /// Wait for the next event on this topic.
    ///
    /// Returns:
    /// * `Ok(event)` – a successfully received event.
    /// * `Err(broadcast::error::RecvError::Lagged(n))` – the subscriber fell
    ///   behind and `n` messages were dropped.
    /// * `Err(broadcast::error::RecvError::Closed)` – the bus has shut down.
    pub async fn recv(&mut self) -> Result<Event, broadcast::error::RecvError> {
        self.receiver.recv().await
    }

    /// Wait for the next event, skipping over lag gaps.
    ///
    /// Returns `None` once the bus is closed.
    pub async fn next_event(&mut self) -> Option<Event> {
        loop {
            match self.receiver.recv().await {
                Ok(event) => return Some(event),
                Err(broadcast::error::RecvError::Lagged(n)) => {
                    warn!(topic = self.topic.name(), lagged_by = n, "TopicReceiver lagged");
                    continue;
                }
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }

    /// The [`Topic`] this receiver is bound to.
    pub fn topic(&self) -> Topic {
        self.topic
    }
}
