use serde::{Deserialize, Serialize};

/// Immutable coordinate pair. Identity is the coordinates themselves.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoPoint {
    pub lat: f64,
    pub lng: f64,
}

/// A coordinate with an optional human-readable address, as produced by
/// device geolocation or reverse geocoding.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NamedLocation {
    #[serde(flatten)]
    pub point: GeoPoint,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub address: Option<String>,
}

impl NamedLocation {
    pub fn new(lat: f64, lng: f64) -> Self {
        Self {
            point: GeoPoint { lat, lng },
            address: None,
        }
    }

    pub fn with_address(lat: f64, lng: f64, address: impl Into<String>) -> Self {
        Self {
            point: GeoPoint { lat, lng },
            address: Some(address.into()),
        }
    }

    /// Address if known, otherwise "lat, lng" for display in the fallback
    /// view.
    pub fn display_address(&self) -> String {
        match &self.address {
            Some(address) => address.clone(),
            None => format!("{:.4}, {:.4}", self.point.lat, self.point.lng),
        }
    }
}
