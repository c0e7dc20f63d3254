use std::time::Duration;

use chrono::{DateTime, Utc};
use rand::Rng;
use tokio::sync::{broadcast, mpsc};
use tracing::{debug, info};

use crate::models::location::GeoPoint;
use crate::models::wire::InboundEvent;

/// Degrees moved toward the rider per simulation tick.
const SIM_STEP_DEG: f64 = 0.0003;
/// Simulated driver spawns within this many degrees of the rider.
const SIM_SPAWN_RADIUS_DEG: f64 = 0.005;
/// Movement stops once both axes are within this threshold.
const SIM_STOP_THRESHOLD_DEG: f64 = 0.0005;

const FIX_BUFFER_SIZE: usize = 64;

/// One observed driver position.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DriverFix {
    pub point: GeoPoint,
    pub at: DateTime<Utc>,
}

/// A source of driver positions. The live feed is the only production path;
/// the simulated feed exists for demos and must be selected explicitly.
pub trait DriverFeed: Send {
    fn into_fixes(self: Box<Self>) -> mpsc::Receiver<DriverFix>;
}

/// Bridges driver-location events from the ride channel into a fix stream.
pub struct LiveDriverFeed {
    fixes: mpsc::Receiver<DriverFix>,
}

impl LiveDriverFeed {
    pub fn new(mut events: broadcast::Receiver<InboundEvent>) -> Self {
        let (tx, rx) = mpsc::channel(FIX_BUFFER_SIZE);

        tokio::spawn(async move {
            loop {
                match events.recv().await {
                    Ok(InboundEvent::DriverLocation(point)) => {
                        let fix = DriverFix {
                            point,
                            at: Utc::now(),
                        };
                        if tx.send(fix).await.is_err() {
                            break;
                        }
                    }
                    Ok(_) => {}
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        debug!(skipped, "driver feed lagged; continuing with latest");
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        });

        Self { fixes: rx }
    }
}

impl DriverFeed for LiveDriverFeed {
    fn into_fixes(self: Box<Self>) -> mpsc::Receiver<DriverFix> {
        self.fixes
    }
}

/// Demo-only synthetic telemetry: a driver spawns near the rider and walks
/// toward them one step per tick until close enough, then stops.
pub struct SimulatedDriverFeed {
    fixes: mpsc::Receiver<DriverFix>,
}

impl SimulatedDriverFeed {
    pub fn new(rider: GeoPoint) -> Self {
        Self::with_tick(rider, Duration::from_secs(1))
    }

    pub fn with_tick(rider: GeoPoint, tick: Duration) -> Self {
        let (tx, rx) = mpsc::channel(FIX_BUFFER_SIZE);

        tokio::spawn(async move {
            let mut current = spawn_point(rider);
            info!(lat = current.lat, lng = current.lng, "simulated driver started");

            let mut interval = tokio::time::interval(tick);
            loop {
                interval.tick().await;

                let fix = DriverFix {
                    point: current,
                    at: Utc::now(),
                };
                if tx.send(fix).await.is_err() {
                    break;
                }

                if arrived(&current, &rider) {
                    info!("simulated driver arrived");
                    break;
                }
                current = step_toward(&current, &rider);
            }
        });

        Self { fixes: rx }
    }
}

impl DriverFeed for SimulatedDriverFeed {
    fn into_fixes(self: Box<Self>) -> mpsc::Receiver<DriverFix> {
        self.fixes
    }
}

fn spawn_point(rider: GeoPoint) -> GeoPoint {
    let mut rng = rand::thread_rng();
    GeoPoint {
        lat: rider.lat + rng.gen_range(-SIM_SPAWN_RADIUS_DEG..=SIM_SPAWN_RADIUS_DEG),
        lng: rider.lng + rng.gen_range(-SIM_SPAWN_RADIUS_DEG..=SIM_SPAWN_RADIUS_DEG),
    }
}

/// One simulation step: each axis moves up to `SIM_STEP_DEG` toward the
/// target, never overshooting.
pub fn step_toward(current: &GeoPoint, target: &GeoPoint) -> GeoPoint {
    GeoPoint {
        lat: step_axis(current.lat, target.lat),
        lng: step_axis(current.lng, target.lng),
    }
}

fn step_axis(current: f64, target: f64) -> f64 {
    let delta = target - current;
    if delta.abs() <= SIM_STEP_DEG {
        target
    } else {
        current + SIM_STEP_DEG * delta.signum()
    }
}

pub fn arrived(current: &GeoPoint, target: &GeoPoint) -> bool {
    (target.lat - current.lat).abs() < SIM_STOP_THRESHOLD_DEG
        && (target.lng - current.lng).abs() < SIM_STOP_THRESHOLD_DEG
}
