use tracing::{info, warn};

use crate::config::{Config, MapBackend};
use crate::error::AppError;
use crate::models::location::{GeoPoint, NamedLocation};

/// What a backend produced for the current frame. Render targets are
/// descriptive here; the embedding UI owns the pixels.
#[derive(Debug, Clone, PartialEq)]
pub struct RenderedView {
    pub backend: &'static str,
    pub markers: Vec<Marker>,
    /// Tile or static-map URLs the embedder should load, when applicable.
    pub layers: Vec<String>,
    /// True when the view is the non-map fallback (plain address cards).
    pub degraded: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Marker {
    pub role: MarkerRole,
    pub point: GeoPoint,
    pub label: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MarkerRole {
    Origin,
    Destination,
    Driver,
}

/// The single rendering seam: every backend consumes the same location data
/// and differs only in rendering technology.
pub trait MapRenderer: Send + Sync {
    fn name(&self) -> &'static str;

    fn render_locations(
        &self,
        origin: &NamedLocation,
        destination: &NamedLocation,
        driver: Option<&GeoPoint>,
    ) -> Result<RenderedView, AppError>;
}

fn markers(
    origin: &NamedLocation,
    destination: &NamedLocation,
    driver: Option<&GeoPoint>,
) -> Vec<Marker> {
    let mut markers = vec![
        Marker {
            role: MarkerRole::Origin,
            point: origin.point,
            label: origin.display_address(),
        },
        Marker {
            role: MarkerRole::Destination,
            point: destination.point,
            label: destination.display_address(),
        },
    ];
    if let Some(point) = driver {
        markers.push(Marker {
            role: MarkerRole::Driver,
            point: *point,
            label: "Driver".to_string(),
        });
    }
    markers
}

/// Tile-based backend: needs no credentials, emits tile URLs covering the
/// bounding box of all markers.
pub struct TileRenderer {
    pub tile_url_template: String,
    pub zoom: u8,
}

impl Default for TileRenderer {
    fn default() -> Self {
        Self {
            tile_url_template: "https://tile.openstreetmap.org/{z}/{x}/{y}.png".to_string(),
            zoom: 14,
        }
    }
}

impl TileRenderer {
    fn tile_for(&self, point: &GeoPoint) -> String {
        let n = f64::from(1u32 << self.zoom);
        let x = ((point.lng + 180.0) / 360.0 * n).floor() as i64;
        let lat_rad = point.lat.to_radians();
        let y = ((1.0 - lat_rad.tan().asinh() / std::f64::consts::PI) / 2.0 * n).floor() as i64;

        self.tile_url_template
            .replace("{z}", &self.zoom.to_string())
            .replace("{x}", &x.to_string())
            .replace("{y}", &y.to_string())
    }
}

impl MapRenderer for TileRenderer {
    fn name(&self) -> &'static str {
        "tile"
    }

    fn render_locations(
        &self,
        origin: &NamedLocation,
        destination: &NamedLocation,
        driver: Option<&GeoPoint>,
    ) -> Result<RenderedView, AppError> {
        let markers = markers(origin, destination, driver);
        let mut layers: Vec<String> = markers
            .iter()
            .map(|marker| self.tile_for(&marker.point))
            .collect();
        layers.dedup();

        Ok(RenderedView {
            backend: self.name(),
            markers,
            layers,
            degraded: false,
        })
    }
}

/// Hosted-provider backend: builds a static-map request against the
/// provider's API. Construction fails without credentials; callers degrade
/// to the fallback instead of erroring.
pub struct HostedRenderer {
    api_key: String,
}

impl HostedRenderer {
    pub fn new(api_key: Option<String>) -> Result<Self, AppError> {
        match api_key {
            Some(key) if !key.is_empty() => Ok(Self { api_key: key }),
            _ => Err(AppError::Provider(
                "map provider key is not configured".to_string(),
            )),
        }
    }
}

impl MapRenderer for HostedRenderer {
    fn name(&self) -> &'static str {
        "hosted"
    }

    fn render_locations(
        &self,
        origin: &NamedLocation,
        destination: &NamedLocation,
        driver: Option<&GeoPoint>,
    ) -> Result<RenderedView, AppError> {
        let markers = markers(origin, destination, driver);
        let pins: Vec<String> = markers
            .iter()
            .map(|marker| format!("{:.5},{:.5}", marker.point.lat, marker.point.lng))
            .collect();
        let layer = format!(
            "https://maps.provider.example/static?markers={}&path={},{}&key={}",
            pins.join("|"),
            pins[0],
            pins[1],
            self.api_key
        );

        Ok(RenderedView {
            backend: self.name(),
            markers,
            layers: vec![layer],
            degraded: false,
        })
    }
}

/// The non-map fallback: the same location data as plain address cards. A
/// first-class supported state, not an error page.
pub struct FallbackRenderer;

impl MapRenderer for FallbackRenderer {
    fn name(&self) -> &'static str {
        "fallback"
    }

    fn render_locations(
        &self,
        origin: &NamedLocation,
        destination: &NamedLocation,
        driver: Option<&GeoPoint>,
    ) -> Result<RenderedView, AppError> {
        Ok(RenderedView {
            backend: self.name(),
            markers: markers(origin, destination, driver),
            layers: Vec::new(),
            degraded: true,
        })
    }
}

/// Picks a backend from configuration. A hosted backend that cannot
/// initialize degrades to the fallback.
pub fn select_renderer(config: &Config) -> Box<dyn MapRenderer> {
    match config.map_backend {
        MapBackend::Tile => Box::new(TileRenderer::default()),
        MapBackend::Fallback => Box::new(FallbackRenderer),
        MapBackend::Hosted => match HostedRenderer::new(config.map_provider_key.clone()) {
            Ok(renderer) => {
                info!("hosted map backend ready");
                Box::new(renderer)
            }
            Err(err) => {
                warn!(error = %err, "falling back to address cards");
                Box::new(FallbackRenderer)
            }
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn route() -> (NamedLocation, NamedLocation) {
        (
            NamedLocation::with_address(51.5074, -0.1278, "Trafalgar Square"),
            NamedLocation::new(51.5174, -0.1378),
        )
    }

    #[test]
    fn every_backend_renders_the_same_markers() {
        let (origin, destination) = route();
        let driver = GeoPoint {
            lat: 51.51,
            lng: -0.13,
        };

        let renderers: Vec<Box<dyn MapRenderer>> = vec![
            Box::new(TileRenderer::default()),
            Box::new(HostedRenderer::new(Some("key".to_string())).unwrap()),
            Box::new(FallbackRenderer),
        ];

        for renderer in renderers {
            let view = renderer
                .render_locations(&origin, &destination, Some(&driver))
                .unwrap();
            assert_eq!(view.markers.len(), 3);
            assert_eq!(view.markers[0].role, MarkerRole::Origin);
            assert_eq!(view.markers[0].label, "Trafalgar Square");
            assert_eq!(view.markers[2].role, MarkerRole::Driver);
        }
    }

    #[test]
    fn fallback_presents_addresses_without_layers() {
        let (origin, destination) = route();
        let view = FallbackRenderer
            .render_locations(&origin, &destination, None)
            .unwrap();

        assert!(view.degraded);
        assert!(view.layers.is_empty());
        // Missing address falls back to coordinates.
        assert_eq!(view.markers[1].label, "51.5174, -0.1378");
    }

    #[test]
    fn hosted_requires_a_key() {
        assert!(HostedRenderer::new(None).is_err());
        assert!(HostedRenderer::new(Some(String::new())).is_err());
    }

    #[test]
    fn missing_key_selects_the_fallback() {
        let config = Config {
            map_backend: MapBackend::Hosted,
            map_provider_key: None,
            ..Config::default()
        };

        let renderer = select_renderer(&config);
        assert_eq!(renderer.name(), "fallback");
    }

    #[test]
    fn tile_backend_needs_no_credentials() {
        let config = Config {
            map_backend: MapBackend::Tile,
            ..Config::default()
        };

        let renderer = select_renderer(&config);
        assert_eq!(renderer.name(), "tile");

        let (origin, destination) = route();
        let view = renderer
            .render_locations(&origin, &destination, None)
            .unwrap();
        assert!(!view.layers.is_empty());
        assert!(view.layers[0].contains("openstreetmap"));
    }
}
