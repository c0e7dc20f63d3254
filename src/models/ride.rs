use serde::{Deserialize, Serialize};

/// One candidate offer from a ride provider. Offers are replaced wholesale
/// on refetch, never mutated in place.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RideOption {
    pub id: String,
    pub service_id: String,
    pub service_name: String,
    pub price: f64,
    pub currency: String,
    /// Minutes until the driver reaches the pickup point.
    pub estimated_pickup_min: u32,
    /// Minutes for the trip itself.
    pub estimated_trip_min: u32,
    pub estimated_distance_km: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tag: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortKey {
    Price,
    PickupTime,
}

/// Route summary as returned by the routing backend. Supersedes the local
/// haversine estimate once available.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RouteSummary {
    pub distance_km: f64,
    pub duration_min: u32,
}

#[derive(Debug, Clone, Serialize)]
pub struct BookingRequest {
    pub ride_option_id: String,
    pub pickup_address: String,
    pub destination_address: String,
    pub price: f64,
    pub currency: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct BookingReceipt {
    pub booking_id: String,
    /// Partner checkout hand-off. Opening it is the embedder's job.
    #[serde(default)]
    pub redirect_url: Option<String>,
}
