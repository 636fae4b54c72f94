//! Runtime wiring: integrator, command intake and LiDAR on one event bus.
//!
//! [`Node::run`] drives three tasks until the shutdown flag flips:
//!
//! | Task | Consumes | Produces |
//! |---|---|---|
//! | tick | timer (`tick_period_ms`) | `tf`, `current_pose`, `current_twist` |
//! | commands | `target_twist`, `initialpose` | integrator state |
//! | lidar | `tf`, timer (`scan_rate_hz`) | `points` |

use std::sync::{Arc, PoisonError, RwLock};
use std::time::Duration;

use chrono::Utc;
use navisim_middleware::{EventBus, Topic, TopicReceiver};
use navisim_perception::raycast::RaycastEngine;
use navisim_sim::{BusPublisher, LidarSimulator, PoseIntegrator, load_objects};
use navisim_types::{Event, EventPayload, SimError};
use tokio::sync::watch;
use tokio::time::{self, MissedTickBehavior};
use tracing::{debug, info, warn};

use crate::config::Config;

const LIDAR_SOURCE: &str = "navisim-sim::lidar";

/// The assembled simulator, ready to run.
pub struct Node {
    bus: EventBus,
    engine: Arc<RwLock<RaycastEngine>>,
    integrator: Arc<PoseIntegrator<BusPublisher>>,
    lidar: LidarSimulator,
}

impl Node {
    /// Build the bus, load scene objects and construct both simulators.
    pub fn new(cfg: &Config) -> Result<Self, SimError> {
        let bus = EventBus::new(cfg.bus_capacity);

        let mut engine = RaycastEngine::new();
        if let Some(path) = &cfg.objects_path {
            load_objects(&mut engine, path)?;
        }
        let engine = Arc::new(RwLock::new(engine));

        let integrator = Arc::new(PoseIntegrator::with_tick_period(
            BusPublisher::new(bus.clone()),
            cfg.tick_period(),
        ));
        let lidar = LidarSimulator::new(Arc::clone(&engine), cfg.lidar.clone())?;

        Ok(Self {
            bus,
            engine,
            integrator,
            lidar,
        })
    }

    pub fn bus(&self) -> &EventBus {
        &self.bus
    }

    pub fn engine(&self) -> Arc<RwLock<RaycastEngine>> {
        Arc::clone(&self.engine)
    }

    /// Run until `shutdown` becomes `true` (or its sender is dropped), then
    /// return the primitive registry dump.
    pub async fn run(self, shutdown: watch::Receiver<bool>) -> serde_json::Value {
        // Subscribe before spawning so nothing published from here on is lost.
        let twist_rx = self.bus.subscribe_to(Topic::TargetTwist);
        let pose_rx = self.bus.subscribe_to(Topic::InitialPose);
        let tf_rx = self.bus.subscribe_to(Topic::Tf);

        let tick = tokio::spawn(tick_loop(Arc::clone(&self.integrator), shutdown.clone()));
        let commands = tokio::spawn(command_loop(
            Arc::clone(&self.integrator),
            twist_rx,
            pose_rx,
            shutdown.clone(),
        ));
        let scans = tokio::spawn(lidar_loop(self.lidar, self.bus.clone(), tf_rx, shutdown));

        for (name, result) in [
            ("tick", tick.await),
            ("commands", commands.await),
            ("lidar", scans.await),
        ] {
            if let Err(e) = result {
                warn!(task = name, error = %e, "task ended abnormally");
            }
        }

        let dump = self
            .engine
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .dump_primitives();
        info!(primitives = %dump, "primitive registry at shutdown");
        dump
    }
}

/// Resolves once shutdown has been requested.
async fn stopped(shutdown: &mut watch::Receiver<bool>) {
    while !*shutdown.borrow_and_update() {
        if shutdown.changed().await.is_err() {
            return;
        }
    }
}

fn interval(period: Duration) -> time::Interval {
    let mut interval = time::interval(period);
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
    interval
}

async fn tick_loop(
    integrator: Arc<PoseIntegrator<BusPublisher>>,
    mut shutdown: watch::Receiver<bool>,
) {
    let mut ticker = interval(integrator.tick_period());
    loop {
        tokio::select! {
            _ = stopped(&mut shutdown) => break,
            _ = ticker.tick() => {
                if let Err(e) = integrator.on_tick() {
                    warn!(error = %e, "tick publish failed");
                }
            }
        }
    }
    debug!("tick loop stopped");
}

async fn command_loop(
    integrator: Arc<PoseIntegrator<BusPublisher>>,
    mut twist_rx: TopicReceiver,
    mut pose_rx: TopicReceiver,
    mut shutdown: watch::Receiver<bool>,
) {
    loop {
        let event = tokio::select! {
            _ = stopped(&mut shutdown) => break,
            event = twist_rx.next_event() => event,
            event = pose_rx.next_event() => event,
        };
        let Some(event) = event else { break };
        if !integrator.handle_event(&event) {
            debug!(source = %event.source, "ignored command payload");
        }
    }
    debug!("command loop stopped");
}

async fn lidar_loop(
    mut lidar: LidarSimulator,
    bus: EventBus,
    mut tf_rx: TopicReceiver,
    mut shutdown: watch::Receiver<bool>,
) {
    let mut ticker = interval(lidar.scan_period());
    loop {
        tokio::select! {
            _ = stopped(&mut shutdown) => break,
            event = tf_rx.next_event() => match event {
                Some(Event { payload: EventPayload::Transform(tf), .. }) => lidar.on_transform(&tf),
                Some(_) => {}
                None => break,
            },
            _ = ticker.tick() => {
                // Scans are CPU-bound; keep them off the async worker.
                match tokio::task::block_in_place(|| lidar.scan(Utc::now())) {
                    Ok(cloud) => {
                        let event = Event::new(LIDAR_SOURCE, EventPayload::PointCloud(cloud));
                        if let Err(e) = bus.publish_to(Topic::PointCloud, event) {
                            warn!(error = %e, "point cloud publish failed");
                        }
                    }
                    Err(SimError::NotFound(what)) => debug!(%what, "no sensor pose yet"),
                    Err(e) => warn!(error = %e, "scan failed"),
                }
            }
        }
    }
    debug!("lidar loop stopped");
}

#[cfg(test)]
mod tests {
    use super::*;
    use navisim_perception::raycast::Plane;
    use navisim_types::Twist;
    use std::f64::consts::{FRAC_PI_2, PI};

    const TIMEOUT: Duration = Duration::from_secs(5);

    fn fast_config() -> Config {
        let mut cfg = Config {
            tick_period_ms: 1,
            ..Config::default()
        };
        cfg.lidar.scan_rate_hz = 100.0;
        cfg.lidar.horizontal_resolution = PI;
        cfg.lidar.vertical_angles = vec![FRAC_PI_2];
        cfg
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn velocity_command_moves_published_pose() {
        let node = Node::new(&fast_config()).unwrap();
        let bus = node.bus().clone();
        let mut pose_rx = bus.subscribe_to(Topic::CurrentPose);
        let (stop_tx, stop_rx) = watch::channel(false);
        let running = tokio::spawn(node.run(stop_rx));

        let command = Event::new("test", EventPayload::TargetTwist(Twist::planar(1.0, 0.0, 0.0)));
        let moved = time::timeout(TIMEOUT, async {
            loop {
                // Re-send until the command task has picked it up.
                bus.publish_to(Topic::TargetTwist, command.clone()).unwrap();
                if let Some(Event {
                    payload: EventPayload::Pose(p),
                    ..
                }) = pose_rx.next_event().await
                    && p.pose.position.x > 0.0
                {
                    return p.pose.position.x;
                }
            }
        })
        .await
        .expect("pose never moved");
        assert!(moved > 0.0);

        stop_tx.send(true).unwrap();
        time::timeout(TIMEOUT, running).await.unwrap().unwrap();
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn lidar_publishes_sensor_local_cloud() {
        let node = Node::new(&fast_config()).unwrap();
        node.engine()
            .write()
            .unwrap()
            .add_primitive("ground", Box::new(Plane::horizontal(0.0)))
            .unwrap();
        let mut cloud_rx = node.bus().subscribe_to(Topic::PointCloud);
        let (stop_tx, stop_rx) = watch::channel(false);
        let running = tokio::spawn(node.run(stop_rx));

        let cloud = time::timeout(TIMEOUT, async {
            loop {
                if let Some(Event {
                    payload: EventPayload::PointCloud(cloud),
                    ..
                }) = cloud_rx.next_event().await
                {
                    return cloud;
                }
            }
        })
        .await
        .expect("no point cloud published");

        assert_eq!(cloud.header.frame_id, "lidar_link");
        assert_eq!(cloud.len(), 2);
        for p in &cloud.points {
            assert!((p.z + 1.0).abs() < 1e-4);
        }

        stop_tx.send(true).unwrap();
        let dump = time::timeout(TIMEOUT, running).await.unwrap().unwrap();
        assert_eq!(dump["ground"]["type"], "plane");
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn dropped_shutdown_sender_stops_the_node() {
        let node = Node::new(&fast_config()).unwrap();
        let (stop_tx, stop_rx) = watch::channel(false);
        drop(stop_tx);
        let dump = time::timeout(TIMEOUT, node.run(stop_rx)).await.unwrap();
        assert_eq!(dump, serde_json::json!({}));
    }

    #[test]
    fn missing_objects_file_fails_startup() {
        let dir = tempfile::tempdir().unwrap();
        let cfg = Config {
            objects_path: Some(dir.path().join("absent.json")),
            ..Config::default()
        };
        assert!(matches!(Node::new(&cfg), Err(SimError::Config(_))));
    }
}
