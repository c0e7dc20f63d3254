use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::models::location::GeoPoint;

/// Role sent in the registration handshake.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UserType {
    Passenger,
    Driver,
}

impl std::str::FromStr for UserType {
    type Err = String;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        match raw {
            "passenger" => Ok(UserType::Passenger),
            "driver" => Ok(UserType::Driver),
            other => Err(format!("unknown user type: {other}")),
        }
    }
}

/// Any client-to-server frame. The envelope is `{"type": ..., "data": ...}`.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", content = "data")]
pub enum OutboundMessage {
    #[serde(rename = "register")]
    Register {
        #[serde(rename = "userType")]
        user_type: UserType,
        #[serde(rename = "userId")]
        user_id: u64,
    },
    #[serde(rename = "booking_request")]
    BookingRequest(BookingEnvelope),
    #[serde(rename = "driver_location")]
    DriverLocation {
        #[serde(rename = "driverId")]
        driver_id: u64,
        location: GeoPoint,
    },
}

/// The fixed booking_request payload shape the server expects.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BookingEnvelope {
    pub passenger_id: u64,
    pub passenger_name: String,
    pub passenger_phone: String,
    pub pickup_address: String,
    pub destination_address: String,
    pub estimated_fare: f64,
    pub distance: f64,
    pub service_type: String,
    pub timestamp: DateTime<Utc>,
}

/// Caller-supplied part of a ride request; the channel fills in the fixed
/// envelope fields.
#[derive(Debug, Clone)]
pub struct RideRequest {
    pub passenger_id: u64,
    pub passenger_name: String,
    pub pickup_address: String,
    pub destination_address: String,
    pub estimated_fare: f64,
    pub distance: f64,
}

/// Raw server-to-client frame: an open tagged union. Unrecognized tags are
/// passed through generically rather than rejected.
#[derive(Debug, Clone, Deserialize)]
pub struct InboundFrame {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub data: Value,
}

/// Recognized inbound events, decoded from `InboundFrame`.
#[derive(Debug, Clone, PartialEq)]
pub enum InboundEvent {
    DriverLocation(GeoPoint),
    RideStatus { status: String },
    BookingConfirmed { booking_id: String },
    Other { kind: String, data: Value },
}

impl InboundEvent {
    /// Decoding is best-effort: a recognized tag whose payload does not
    /// parse falls back to `Other` so the frame is still observable.
    pub fn from_frame(frame: InboundFrame) -> Self {
        match frame.kind.as_str() {
            "driver_location" => match serde_json::from_value::<GeoPoint>(frame.data.clone()) {
                Ok(point) => InboundEvent::DriverLocation(point),
                Err(_) => InboundEvent::Other {
                    kind: frame.kind,
                    data: frame.data,
                },
            },
            "ride_status" => match frame.data.get("status").and_then(Value::as_str) {
                Some(status) => InboundEvent::RideStatus {
                    status: status.to_string(),
                },
                None => InboundEvent::Other {
                    kind: frame.kind,
                    data: frame.data,
                },
            },
            "booking_confirmed" => match frame.data.get("bookingId").and_then(Value::as_str) {
                Some(id) => InboundEvent::BookingConfirmed {
                    booking_id: id.to_string(),
                },
                None => InboundEvent::Other {
                    kind: frame.kind,
                    data: frame.data,
                },
            },
            _ => InboundEvent::Other {
                kind: frame.kind,
                data: frame.data,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn user_type_parses_known_roles_only() {
        assert_eq!("passenger".parse::<UserType>().unwrap(), UserType::Passenger);
        assert_eq!("driver".parse::<UserType>().unwrap(), UserType::Driver);
        assert!("robot".parse::<UserType>().is_err());
    }

    #[test]
    fn register_envelope_matches_wire_format() {
        let msg = OutboundMessage::Register {
            user_type: UserType::Passenger,
            user_id: 42,
        };

        let value = serde_json::to_value(&msg).unwrap();
        assert_eq!(
            value,
            json!({
                "type": "register",
                "data": { "userType": "passenger", "userId": 42 }
            })
        );
    }

    #[test]
    fn booking_request_envelope_is_camel_case() {
        let msg = OutboundMessage::BookingRequest(BookingEnvelope {
            passenger_id: 7,
            passenger_name: "Ada".to_string(),
            passenger_phone: "+000000000".to_string(),
            pickup_address: "A".to_string(),
            destination_address: "B".to_string(),
            estimated_fare: 12.5,
            distance: 3.2,
            service_type: "standard".to_string(),
            timestamp: Utc::now(),
        });

        let value = serde_json::to_value(&msg).unwrap();
        assert_eq!(value["type"], "booking_request");
        assert_eq!(value["data"]["passengerId"], 7);
        assert_eq!(value["data"]["serviceType"], "standard");
        assert!(value["data"]["pickupAddress"].is_string());
    }

    #[test]
    fn driver_location_frame_decodes_to_event() {
        let frame: InboundFrame = serde_json::from_str(
            r#"{"type":"driver_location","data":{"lat":51.5,"lng":-0.12}}"#,
        )
        .unwrap();

        let event = InboundEvent::from_frame(frame);
        assert_eq!(
            event,
            InboundEvent::DriverLocation(GeoPoint {
                lat: 51.5,
                lng: -0.12
            })
        );
    }

    #[test]
    fn unknown_tag_passes_through_generically() {
        let frame: InboundFrame =
            serde_json::from_str(r#"{"type":"surge_update","data":{"factor":1.4}}"#).unwrap();

        match InboundEvent::from_frame(frame) {
            InboundEvent::Other { kind, data } => {
                assert_eq!(kind, "surge_update");
                assert_eq!(data["factor"], 1.4);
            }
            other => panic!("expected Other, got {other:?}"),
        }
    }

    #[test]
    fn recognized_tag_with_bad_payload_degrades_to_other() {
        let frame: InboundFrame =
            serde_json::from_str(r#"{"type":"driver_location","data":{"lat":"oops"}}"#).unwrap();

        assert!(matches!(
            InboundEvent::from_frame(frame),
            InboundEvent::Other { .. }
        ));
    }
}
