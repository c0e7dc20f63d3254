use std::sync::Arc;
use std::time::Duration;

use reqwest::Client;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::error::AppError;
use crate::models::location::NamedLocation;
use crate::models::ride::{BookingReceipt, BookingRequest, RideOption, RouteSummary, SortKey};
use crate::observability::metrics::Metrics;

/// Route geometry changes rarely; prices move fast. Offers get the tighter
/// window.
pub const ROUTE_STALENESS: Duration = Duration::from_secs(300);
pub const OFFERS_STALENESS: Duration = Duration::from_secs(60);

/// Backend the board fetches from. The HTTP implementation talks to the
/// ride-comparison REST API; tests substitute a fake.
pub trait RideApi {
    fn fetch_route(
        &self,
        origin: &NamedLocation,
        destination: &NamedLocation,
    ) -> impl Future<Output = Result<RouteSummary, AppError>> + Send;

    fn fetch_offers(
        &self,
        origin: &NamedLocation,
        destination: &NamedLocation,
    ) -> impl Future<Output = Result<Vec<RideOption>, AppError>> + Send;

    fn book(
        &self,
        request: &BookingRequest,
    ) -> impl Future<Output = Result<BookingReceipt, AppError>> + Send;
}

pub struct HttpRideApi {
    client: Client,
    base_url: String,
}

impl HttpRideApi {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            client: Client::new(),
            base_url: base_url.into(),
        }
    }
}

impl RideApi for HttpRideApi {
    async fn fetch_route(
        &self,
        origin: &NamedLocation,
        destination: &NamedLocation,
    ) -> Result<RouteSummary, AppError> {
        let url = format!("{}/api/route", self.base_url);
        let response = self
            .client
            .get(&url)
            .query(&[
                ("fromLat", origin.point.lat),
                ("fromLng", origin.point.lng),
                ("toLat", destination.point.lat),
                ("toLng", destination.point.lng),
            ])
            .send()
            .await?
            .error_for_status()?;

        Ok(response.json().await?)
    }

    async fn fetch_offers(
        &self,
        origin: &NamedLocation,
        destination: &NamedLocation,
    ) -> Result<Vec<RideOption>, AppError> {
        let url = format!("{}/api/rides", self.base_url);
        let response = self
            .client
            .get(&url)
            .query(&[
                ("fromLat", origin.point.lat),
                ("fromLng", origin.point.lng),
                ("toLat", destination.point.lat),
                ("toLng", destination.point.lng),
            ])
            .send()
            .await?
            .error_for_status()?;

        Ok(response.json().await?)
    }

    async fn book(&self, request: &BookingRequest) -> Result<BookingReceipt, AppError> {
        let url = format!("{}/api/bookings", self.base_url);
        let response = self
            .client
            .post(&url)
            .json(request)
            .send()
            .await?
            .error_for_status()?;

        Ok(response.json().await?)
    }
}

#[derive(Debug, Clone)]
struct Cached<T> {
    value: T,
    fetched_at: Instant,
}

impl<T> Cached<T> {
    fn fresh(&self, staleness: Duration) -> bool {
        self.fetched_at.elapsed() < staleness
    }
}

/// Ticket tagging an in-flight fetch with the inputs it was issued for. A
/// response whose ticket no longer matches the board's generation is
/// discarded rather than applied.
#[derive(Debug, Clone)]
pub struct FetchTicket {
    generation: u64,
    pub origin: NamedLocation,
    pub destination: NamedLocation,
}

/// Aggregates candidate ride offers for the current route: fetch with
/// staleness windows, pure sorting, selection, and booking submission.
pub struct RideBoard<A> {
    api: A,
    metrics: Arc<Metrics>,
    route_staleness: Duration,
    offers_staleness: Duration,
    origin: Option<NamedLocation>,
    destination: Option<NamedLocation>,
    route: Option<Cached<RouteSummary>>,
    offers: Option<Cached<Vec<RideOption>>>,
    selected: Option<String>,
    generation: u64,
}

impl<A: RideApi> RideBoard<A> {
    pub fn new(api: A, metrics: Arc<Metrics>) -> Self {
        Self::with_staleness(api, metrics, ROUTE_STALENESS, OFFERS_STALENESS)
    }

    pub fn with_staleness(
        api: A,
        metrics: Arc<Metrics>,
        route_staleness: Duration,
        offers_staleness: Duration,
    ) -> Self {
        Self {
            api,
            metrics,
            route_staleness,
            offers_staleness,
            origin: None,
            destination: None,
            route: None,
            offers: None,
            selected: None,
            generation: 0,
        }
    }

    /// Sets the route endpoints. Any change clears the selection so a stale
    /// offer can never be submitted against a new route, and invalidates
    /// in-flight fetches.
    pub fn set_route(&mut self, origin: NamedLocation, destination: NamedLocation) {
        let unchanged =
            self.origin.as_ref() == Some(&origin) && self.destination.as_ref() == Some(&destination);
        if unchanged {
            return;
        }

        debug!("route changed; clearing selection and caches");
        self.origin = Some(origin);
        self.destination = Some(destination);
        self.route = None;
        self.offers = None;
        self.selected = None;
        self.generation += 1;
    }

    pub fn route(&self) -> Option<&RouteSummary> {
        self.route.as_ref().map(|cached| &cached.value)
    }

    pub fn offers(&self) -> Option<&[RideOption]> {
        self.offers.as_ref().map(|cached| cached.value.as_slice())
    }

    pub fn selected(&self) -> Option<&RideOption> {
        let id = self.selected.as_deref()?;
        self.offers()?.iter().find(|offer| offer.id == id)
    }

    /// Issues a ticket for the current inputs, or a validation error when
    /// either endpoint is missing.
    pub fn begin_fetch(&self) -> Result<FetchTicket, AppError> {
        let origin = self
            .origin
            .clone()
            .ok_or_else(|| AppError::Validation("pickup location is not set".to_string()))?;
        let destination = self
            .destination
            .clone()
            .ok_or_else(|| AppError::Validation("destination is not set".to_string()))?;

        Ok(FetchTicket {
            generation: self.generation,
            origin,
            destination,
        })
    }

    /// Applies a fetched route summary unless the inputs changed while the
    /// fetch was in flight.
    pub fn apply_route(&mut self, ticket: &FetchTicket, route: RouteSummary) -> bool {
        if ticket.generation != self.generation {
            debug!("discarding stale route response");
            return false;
        }
        self.route = Some(Cached {
            value: route,
            fetched_at: Instant::now(),
        });
        true
    }

    /// Applies fetched offers unless the inputs changed while the fetch was
    /// in flight. The offer list is replaced wholesale.
    pub fn apply_offers(&mut self, ticket: &FetchTicket, offers: Vec<RideOption>) -> bool {
        if ticket.generation != self.generation {
            debug!("discarding stale offers response");
            return false;
        }
        self.offers = Some(Cached {
            value: offers,
            fetched_at: Instant::now(),
        });
        true
    }

    fn route_fresh(&self) -> bool {
        self.route
            .as_ref()
            .is_some_and(|cached| cached.fresh(self.route_staleness))
    }

    fn offers_fresh(&self) -> bool {
        self.offers
            .as_ref()
            .is_some_and(|cached| cached.fresh(self.offers_staleness))
    }

    /// Refreshes whatever is stale, in dependency order: offers are only
    /// fetched once route data exists.
    pub async fn refresh(&mut self) -> Result<(), AppError> {
        let ticket = self.begin_fetch()?;

        if !self.route_fresh() {
            let route = self
                .api
                .fetch_route(&ticket.origin, &ticket.destination)
                .await?;
            if !self.apply_route(&ticket, route) {
                return Ok(());
            }
        }

        if self.route.is_some() && !self.offers_fresh() {
            let started = Instant::now();
            let fetched = self
                .api
                .fetch_offers(&ticket.origin, &ticket.destination)
                .await;
            let elapsed = started.elapsed().as_secs_f64();

            match fetched {
                Ok(offers) => {
                    self.metrics
                        .offer_fetch_seconds
                        .with_label_values(&["success"])
                        .observe(elapsed);
                    info!(count = offers.len(), "ride offers refreshed");
                    self.apply_offers(&ticket, offers);
                }
                Err(err) => {
                    self.metrics
                        .offer_fetch_seconds
                        .with_label_values(&["error"])
                        .observe(elapsed);
                    return Err(err);
                }
            }
        }

        Ok(())
    }

    /// A pure sort: returns a new ordering, never touching the fetched list.
    /// Stable, so equal keys keep their input order.
    pub fn sorted_offers(&self, key: SortKey) -> Vec<RideOption> {
        let mut sorted: Vec<RideOption> = self.offers().unwrap_or_default().to_vec();
        match key {
            SortKey::Price => sorted.sort_by(|a, b| a.price.total_cmp(&b.price)),
            SortKey::PickupTime => {
                sorted.sort_by_key(|offer| offer.estimated_pickup_min);
            }
        }
        sorted
    }

    pub fn select(&mut self, offer_id: &str) -> Result<(), AppError> {
        let known = self
            .offers()
            .is_some_and(|offers| offers.iter().any(|offer| offer.id == offer_id));
        if !known {
            return Err(AppError::Validation(format!(
                "unknown ride option: {offer_id}"
            )));
        }
        self.selected = Some(offer_id.to_string());
        Ok(())
    }

    pub fn clear_selection(&mut self) {
        self.selected = None;
    }

    /// Submits the selected offer. Missing selection or endpoints is a local
    /// validation failure; no network call is made. A `redirect_url` in the
    /// receipt is a hand-off to the partner's checkout, not an error.
    pub async fn book(&self) -> Result<BookingReceipt, AppError> {
        let offer = self
            .selected()
            .ok_or_else(|| AppError::Validation("no ride selected".to_string()))?;
        let origin = self
            .origin
            .as_ref()
            .ok_or_else(|| AppError::Validation("pickup location is not set".to_string()))?;
        let destination = self
            .destination
            .as_ref()
            .ok_or_else(|| AppError::Validation("destination is not set".to_string()))?;

        let request = BookingRequest {
            ride_option_id: offer.id.clone(),
            pickup_address: origin.display_address(),
            destination_address: destination.display_address(),
            price: offer.price,
            currency: offer.currency.clone(),
        };

        let receipt = self.api.book(&request).await?;
        if receipt.redirect_url.is_some() {
            warn!(booking_id = %receipt.booking_id, "booking hands off to partner checkout");
        }
        Ok(receipt)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use super::*;

    #[derive(Default)]
    struct FakeApi {
        route_calls: Mutex<u32>,
        offer_calls: Mutex<u32>,
        offers: Vec<RideOption>,
    }

    impl RideApi for FakeApi {
        async fn fetch_route(
            &self,
            _origin: &NamedLocation,
            _destination: &NamedLocation,
        ) -> Result<RouteSummary, AppError> {
            *self.route_calls.lock().unwrap() += 1;
            Ok(RouteSummary {
                distance_km: 3.4,
                duration_min: 12,
            })
        }

        async fn fetch_offers(
            &self,
            _origin: &NamedLocation,
            _destination: &NamedLocation,
        ) -> Result<Vec<RideOption>, AppError> {
            *self.offer_calls.lock().unwrap() += 1;
            Ok(self.offers.clone())
        }

        async fn book(&self, request: &BookingRequest) -> Result<BookingReceipt, AppError> {
            Ok(BookingReceipt {
                booking_id: format!("bk-{}", request.ride_option_id),
                redirect_url: Some("https://partner.example/checkout".to_string()),
            })
        }
    }

    fn offer(id: &str, price: f64, pickup: u32) -> RideOption {
        RideOption {
            id: id.to_string(),
            service_id: "svc".to_string(),
            service_name: "Svc".to_string(),
            price,
            currency: "GBP".to_string(),
            estimated_pickup_min: pickup,
            estimated_trip_min: 15,
            estimated_distance_km: 3.4,
            tag: None,
        }
    }

    fn locations() -> (NamedLocation, NamedLocation) {
        (
            NamedLocation::with_address(51.5074, -0.1278, "Trafalgar Square"),
            NamedLocation::with_address(51.5174, -0.1378, "Regent's Park"),
        )
    }

    fn board_with(offers: Vec<RideOption>) -> RideBoard<FakeApi> {
        let api = FakeApi {
            offers,
            ..Default::default()
        };
        RideBoard::new(api, Arc::new(Metrics::new()))
    }

    #[tokio::test]
    async fn refresh_without_route_is_a_validation_error() {
        let mut board = board_with(vec![]);
        let err = board.refresh().await.unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));
    }

    #[tokio::test]
    async fn offers_fetch_only_after_route_exists() {
        let mut board = board_with(vec![offer("a", 10.0, 5)]);
        let (origin, destination) = locations();
        board.set_route(origin, destination);

        board.refresh().await.unwrap();

        assert_eq!(*board.api.route_calls.lock().unwrap(), 1);
        assert_eq!(*board.api.offer_calls.lock().unwrap(), 1);
        assert!(board.route().is_some());
        assert_eq!(board.offers().unwrap().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn staleness_windows_favor_offer_freshness() {
        let mut board = board_with(vec![offer("a", 10.0, 5)]);
        let (origin, destination) = locations();
        board.set_route(origin, destination);

        board.refresh().await.unwrap();
        board.refresh().await.unwrap();
        // Both caches fresh: nothing refetched.
        assert_eq!(*board.api.route_calls.lock().unwrap(), 1);
        assert_eq!(*board.api.offer_calls.lock().unwrap(), 1);

        tokio::time::advance(Duration::from_secs(90)).await;
        board.refresh().await.unwrap();
        // Offers (1 min window) went stale; route (5 min) did not.
        assert_eq!(*board.api.route_calls.lock().unwrap(), 1);
        assert_eq!(*board.api.offer_calls.lock().unwrap(), 2);

        tokio::time::advance(Duration::from_secs(300)).await;
        board.refresh().await.unwrap();
        assert_eq!(*board.api.route_calls.lock().unwrap(), 2);
    }

    #[tokio::test]
    async fn sort_by_price_is_non_decreasing_and_pure() {
        let fetched = vec![offer("a", 12.0, 3), offer("b", 8.0, 9), offer("c", 10.0, 1)];
        let mut board = board_with(fetched);
        let (origin, destination) = locations();
        board.set_route(origin, destination);
        board.refresh().await.unwrap();

        let by_price = board.sorted_offers(SortKey::Price);
        assert!(by_price.windows(2).all(|w| w[0].price <= w[1].price));

        let by_pickup = board.sorted_offers(SortKey::PickupTime);
        assert!(
            by_pickup
                .windows(2)
                .all(|w| w[0].estimated_pickup_min <= w[1].estimated_pickup_min)
        );

        // The fetched list keeps its original order.
        let ids: Vec<&str> = board.offers().unwrap().iter().map(|o| o.id.as_str()).collect();
        assert_eq!(ids, vec!["a", "b", "c"]);
    }

    #[tokio::test]
    async fn changing_destination_clears_selection() {
        let mut board = board_with(vec![offer("a", 10.0, 5)]);
        let (origin, destination) = locations();
        board.set_route(origin.clone(), destination);
        board.refresh().await.unwrap();

        board.select("a").unwrap();
        assert!(board.selected().is_some());

        board.set_route(origin, NamedLocation::new(51.6, -0.2));
        assert!(board.selected().is_none());
    }

    #[tokio::test]
    async fn stale_response_is_discarded_after_route_change() {
        let mut board = board_with(vec![offer("a", 10.0, 5)]);
        let (origin, destination) = locations();
        board.set_route(origin.clone(), destination);

        let ticket = board.begin_fetch().unwrap();
        // Inputs change while the fetch is in flight.
        board.set_route(origin, NamedLocation::new(51.6, -0.2));

        let applied = board.apply_offers(&ticket, vec![offer("late", 1.0, 1)]);
        assert!(!applied);
        assert!(board.offers().is_none());
    }

    #[tokio::test]
    async fn booking_requires_selection_and_endpoints() {
        let board = board_with(vec![]);
        let err = board.book().await.unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));
    }

    #[tokio::test]
    async fn booking_success_hands_back_redirect_url() {
        let mut board = board_with(vec![offer("a", 10.0, 5)]);
        let (origin, destination) = locations();
        board.set_route(origin, destination);
        board.refresh().await.unwrap();
        board.select("a").unwrap();

        let receipt = board.book().await.unwrap();
        assert_eq!(receipt.booking_id, "bk-a");
        assert!(receipt.redirect_url.is_some());
    }

    #[tokio::test]
    async fn selecting_unknown_offer_fails_validation() {
        let mut board = board_with(vec![offer("a", 10.0, 5)]);
        let (origin, destination) = locations();
        board.set_route(origin, destination);
        board.refresh().await.unwrap();

        assert!(board.select("zzz").is_err());
    }
}
