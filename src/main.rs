mod channel;
mod config;
mod error;
mod geo;
mod map;
mod models;
mod notify;
mod observability;
mod rides;
mod state;
mod telemetry;

use std::sync::Arc;

use tracing_subscriber::EnvFilter;

use crate::geo::RouteEstimate;
use crate::models::wire::InboundEvent;
use crate::telemetry::{DriverFeed, LiveDriverFeed, SimulatedDriverFeed};

#[tokio::main]
async fn main() -> Result<(), error::AppError> {
    let config = config::Config::from_env()?;

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(config.log_level.clone()))
        .with_target(false)
        .compact()
        .init();

    let shared_state = Arc::new(state::AppState::new(&config));

    shared_state.channel.connect();

    tokio::spawn(run_event_loop(shared_state.clone()));

    let feed: Box<dyn DriverFeed> = if config.demo_driver {
        tracing::warn!("demo driver feed enabled; positions are synthetic");
        // The synthetic driver walks toward the board's pickup point.
        let rider = config
            .pickup
            .clone()
            .map(|pickup| pickup.point)
            .unwrap_or_else(|| state::demo_route().0.point);
        Box::new(SimulatedDriverFeed::new(rider))
    } else {
        Box::new(LiveDriverFeed::new(shared_state.channel.subscribe_events()))
    };
    tokio::spawn(run_driver_loop(shared_state.clone(), feed));

    tracing::info!("ride-sync started");
    shutdown_signal().await;

    shared_state.channel.disconnect();
    tracing::info!("ride-sync stopped");
    Ok(())
}

/// Reflects channel events into the notification store.
async fn run_event_loop(state: Arc<state::AppState>) {
    let mut events = state.channel.subscribe_events();

    loop {
        match events.recv().await {
            Ok(InboundEvent::BookingConfirmed { booking_id }) => {
                let mut notifications = state.notifications.lock().await;
                notifications.booking_confirmed("your ride", &booking_id);
            }
            Ok(InboundEvent::RideStatus { status }) => {
                tracing::info!(status = %status, "ride status changed");
            }
            Ok(_) => {}
            Err(tokio::sync::broadcast::error::RecvError::Lagged(skipped)) => {
                tracing::debug!(skipped, "event loop lagged");
            }
            Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
        }
    }
}

/// Turns driver fixes into derived distance/ETA and a fresh map frame.
async fn run_driver_loop(state: Arc<state::AppState>, feed: Box<dyn DriverFeed>) {
    let mut fixes = feed.into_fixes();
    let mut last_eta: Option<u32> = None;

    while let Some(fix) = fixes.recv().await {
        let board = state.board.lock().await;
        let Ok(ticket) = board.begin_fetch() else {
            // No route set yet; nothing to render against.
            continue;
        };
        drop(board);

        let estimate = RouteEstimate::between(&fix.point, &ticket.origin.point);
        if last_eta != Some(estimate.eta_min) {
            last_eta = Some(estimate.eta_min);
            if estimate.eta_min <= 2 {
                let mut notifications = state.notifications.lock().await;
                notifications.driver_arrival("Your driver", estimate.eta_min);
            }
        }

        match state
            .renderer
            .render_locations(&ticket.origin, &ticket.destination, Some(&fix.point))
        {
            Ok(view) => tracing::debug!(
                backend = view.backend,
                markers = view.markers.len(),
                degraded = view.degraded,
                eta_min = estimate.eta_min,
                "map frame rendered"
            ),
            Err(err) => tracing::warn!(error = %err, "map render failed"),
        }
    }
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %err, "failed to listen for shutdown signal");
    }
}
