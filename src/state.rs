use std::sync::Arc;

use tokio::sync::Mutex;

use crate::channel::backoff::Backoff;
use crate::channel::{ChannelConfig, RideChannel};
use crate::config::Config;
use crate::map::{self, MapRenderer};
use crate::models::location::NamedLocation;
use crate::notify::{NotificationStore, TracingSink};
use crate::observability::metrics::Metrics;
use crate::rides::{HttpRideApi, RideBoard};

/// Everything the daemon's tasks share. Cloned via `Arc`.
pub struct AppState {
    pub channel: RideChannel,
    pub notifications: Mutex<NotificationStore>,
    pub board: Mutex<RideBoard<HttpRideApi>>,
    pub renderer: Box<dyn MapRenderer>,
    pub metrics: Arc<Metrics>,
}

impl AppState {
    pub fn new(config: &Config) -> Self {
        let metrics = Arc::new(Metrics::new());

        let identity = config
            .user_id
            .map(|user_id| (config.user_type, user_id));

        let channel = RideChannel::new(
            ChannelConfig {
                ws_url: config.ws_url.clone(),
                identity,
                backoff: Backoff::new(config.backoff_base, config.backoff_max),
                event_buffer_size: config.event_buffer_size,
            },
            metrics.clone(),
        );

        let notifications = Mutex::new(NotificationStore::new(
            Box::new(TracingSink),
            metrics.clone(),
        ));

        let mut board = RideBoard::with_staleness(
            HttpRideApi::new(config.api_base_url.clone()),
            metrics.clone(),
            config.route_staleness,
            config.offers_staleness,
        );

        // The render loop is only reachable once the board has a route.
        match (config.pickup.clone(), config.destination.clone()) {
            (Some(pickup), Some(destination)) => board.set_route(pickup, destination),
            _ if config.demo_driver => {
                let (pickup, destination) = demo_route();
                board.set_route(pickup, destination);
            }
            _ => {}
        }

        Self {
            channel,
            notifications,
            board: Mutex::new(board),
            renderer: map::select_renderer(config),
            metrics,
        }
    }
}

/// Built-in route the demo path runs against when no endpoints are
/// configured.
pub fn demo_route() -> (NamedLocation, NamedLocation) {
    (
        NamedLocation::with_address(51.5074, -0.1278, "Trafalgar Square"),
        NamedLocation::with_address(51.5174, -0.1378, "Regent's Park"),
    )
}
