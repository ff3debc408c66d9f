use std::pin::Pin;
use std::sync::Arc;

use serde_json::Value;
use tokio_stream::Stream;
use tokio_stream::StreamExt;
use tonic::{Request, Response, Status};
use uuid::Uuid;

use crate::engine::bookings::lookup_booking;
use crate::engine::ingest::{IngestRequest, ingest_location};
use crate::models::booking::Booking;
use crate::state::AppState;

pub mod pb {
    #[derive(Clone, PartialEq, ::prost::Message)]
    pub struct IngestLocationRequest {
        #[prost(string, tag = "1")]
        pub booking_identifier: String,
        #[prost(double, optional, tag = "2")]
        pub lat: Option<f64>,
        #[prost(double, optional, tag = "3")]
        pub lng: Option<f64>,
        #[prost(string, optional, tag = "4")]
        pub status: Option<String>,
        #[prost(double, optional, tag = "5")]
        pub eta_minutes: Option<f64>,
    }

    #[derive(Clone, PartialEq, ::prost::Message)]
    pub struct IngestLocationResponse {
        #[prost(bool, tag = "1")]
        pub success: bool,
        #[prost(string, tag = "2")]
        pub booking_identifier: String,
        #[prost(string, tag = "3")]
        pub status: String,
        #[prost(double, tag = "4")]
        pub lat: f64,
        #[prost(double, tag = "5")]
        pub lng: f64,
        #[prost(uint32, optional, tag = "6")]
        pub eta_minutes: Option<u32>,
    }

    #[derive(Clone, PartialEq, ::prost::Message)]
    pub struct LookupBookingRequest {
        #[prost(string, tag = "1")]
        pub booking_identifier: String,
    }

    #[derive(Clone, PartialEq, ::prost::Message)]
    pub struct WatchBookingRequest {
        /// Internal booking id, not the shareable code.
        #[prost(string, tag = "1")]
        pub booking_id: String,
    }

    #[derive(Clone, PartialEq, ::prost::Message)]
    pub struct BookingSnapshot {
        #[prost(string, tag = "1")]
        pub id: String,
        #[prost(string, tag = "2")]
        pub booking_identifier: String,
        #[prost(string, tag = "3")]
        pub status: String,
        #[prost(double, optional, tag = "4")]
        pub lat: Option<f64>,
        #[prost(double, optional, tag = "5")]
        pub lng: Option<f64>,
        #[prost(uint32, optional, tag = "6")]
        pub eta_minutes: Option<u32>,
        #[prost(bool, tag = "7")]
        pub tracking_enabled: bool,
        #[prost(string, optional, tag = "8")]
        pub position_updated_at: Option<String>,
        #[prost(string, tag = "9")]
        pub scheduled_date: String,
        #[prost(string, tag = "10")]
        pub scheduled_time: String,
        #[prost(uint64, tag = "11")]
        pub total_cents: u64,
    }

    include!(concat!(env!("OUT_DIR"), "/tracking.TrackingService.rs"));
}

use pb::tracking_service_server::TrackingService;
use pb::{
    BookingSnapshot, IngestLocationRequest, IngestLocationResponse, LookupBookingRequest,
    WatchBookingRequest,
};

pub struct GrpcTrackingService {
    state: Arc<AppState>,
}

impl GrpcTrackingService {
    pub fn new(state: Arc<AppState>) -> Self {
        Self { state }
    }
}

fn booking_to_proto(b: &Booking) -> BookingSnapshot {
    BookingSnapshot {
        id: b.id.to_string(),
        booking_identifier: b.code.clone(),
        status: b.status.as_str().to_string(),
        lat: b.lat,
        lng: b.lng,
        eta_minutes: b.eta_minutes,
        tracking_enabled: b.tracking_enabled,
        position_updated_at: b.position_updated_at.map(|at| at.to_rfc3339()),
        scheduled_date: b.scheduled_date.to_string(),
        scheduled_time: b.scheduled_time.format("%H:%M").to_string(),
        total_cents: b.total_cents,
    }
}

fn ingest_from_proto(req: IngestLocationRequest) -> IngestRequest {
    IngestRequest {
        booking_identifier: Some(Value::from(req.booking_identifier)),
        lat: req.lat.map(Value::from),
        lng: req.lng.map(Value::from),
        status: req.status.map(Value::from),
        eta_minutes: req.eta_minutes.map(Value::from),
    }
}

#[tonic::async_trait]
impl TrackingService for GrpcTrackingService {
    async fn ingest_location(
        &self,
        request: Request<IngestLocationRequest>,
    ) -> Result<Response<IngestLocationResponse>, Status> {
        let response = ingest_location(&self.state, ingest_from_proto(request.into_inner()))?;

        Ok(Response::new(IngestLocationResponse {
            success: response.success,
            booking_identifier: response.booking_identifier,
            status: response.status.as_str().to_string(),
            lat: response.lat,
            lng: response.lng,
            eta_minutes: response.eta_minutes,
        }))
    }

    async fn lookup_booking(
        &self,
        request: Request<LookupBookingRequest>,
    ) -> Result<Response<BookingSnapshot>, Status> {
        let req = request.into_inner();
        let booking = lookup_booking(&self.state, &req.booking_identifier)?;
        Ok(Response::new(booking_to_proto(&booking)))
    }

    type WatchBookingStream = Pin<Box<dyn Stream<Item = Result<BookingSnapshot, Status>> + Send>>;

    async fn watch_booking(
        &self,
        request: Request<WatchBookingRequest>,
    ) -> Result<Response<Self::WatchBookingStream>, Status> {
        let req = request.into_inner();
        let booking_id = Uuid::parse_str(&req.booking_id)
            .map_err(|err| Status::invalid_argument(format!("invalid booking_id: {err}")))?;
        self.state.store.get_by_id(booking_id)?;

        let stream = self
            .state
            .notifier
            .subscribe(booking_id)
            .into_stream()
            .map(|booking| Ok(booking_to_proto(&booking)));

        Ok(Response::new(Box::pin(stream)))
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use chrono::{NaiveDate, NaiveTime};
    use tokio_stream::StreamExt;
    use tonic::{Code, Request};

    use super::GrpcTrackingService;
    use super::pb::tracking_service_server::TrackingService;
    use super::pb::{IngestLocationRequest, LookupBookingRequest, WatchBookingRequest};
    use crate::engine::bookings::{CreateBookingRequest, create_booking};
    use crate::models::booking::{CustomerContact, ServiceLine};
    use crate::state::AppState;

    fn seeded() -> (GrpcTrackingService, Arc<AppState>, String, String) {
        let state = Arc::new(AppState::new(16));
        let booking = create_booking(
            &state,
            CreateBookingRequest {
                customer: CustomerContact {
                    name: "Robin".to_string(),
                    email: "robin@example.com".to_string(),
                    phone: "555-0104".to_string(),
                    address: "3 Canal St".to_string(),
                },
                scheduled_date: NaiveDate::from_ymd_opt(2026, 9, 1).unwrap(),
                scheduled_time: NaiveTime::from_hms_opt(11, 0, 0).unwrap(),
                services: vec![ServiceLine {
                    name: "Pool deck".to_string(),
                    price_cents: 19_900,
                }],
                notes: None,
            },
        )
        .unwrap();
        (
            GrpcTrackingService::new(state.clone()),
            state,
            booking.code,
            booking.id.to_string(),
        )
    }

    fn ingest(code: &str, lat: f64) -> Request<IngestLocationRequest> {
        Request::new(IngestLocationRequest {
            booking_identifier: code.to_string(),
            lat: Some(lat),
            lng: Some(-80.1373),
            status: Some("on-the-way".to_string()),
            eta_minutes: Some(9.4),
        })
    }

    #[tokio::test]
    async fn ingest_then_lookup() {
        let (svc, _state, code, _id) = seeded();

        let resp = svc.ingest_location(ingest(&code, 26.1224)).await.unwrap();
        let resp = resp.into_inner();
        assert!(resp.success);
        assert_eq!(resp.status, "on-the-way");
        assert_eq!(resp.eta_minutes, Some(9));

        let snapshot = svc
            .lookup_booking(Request::new(LookupBookingRequest {
                booking_identifier: code,
            }))
            .await
            .unwrap()
            .into_inner();
        assert_eq!(snapshot.lat, Some(26.1224));
        assert!(snapshot.tracking_enabled);
    }

    #[tokio::test]
    async fn errors_map_to_status_codes() {
        let (svc, state, code, _id) = seeded();

        let err = svc.ingest_location(ingest("RW-NOPE00", 1.0)).await.unwrap_err();
        assert_eq!(err.code(), Code::NotFound);

        let err = svc.ingest_location(ingest("RW-NOPE00", 95.0)).await.unwrap_err();
        assert_eq!(err.code(), Code::InvalidArgument);

        let err = svc
            .ingest_location(Request::new(IngestLocationRequest {
                booking_identifier: code.clone(),
                lng: Some(-80.0),
                ..Default::default()
            }))
            .await
            .unwrap_err();
        assert_eq!(err.code(), Code::InvalidArgument);
        assert_eq!(err.message(), "lat/lng must be numeric");
        assert_eq!(state.store.get(&code).unwrap().lat, None);

        let err = svc
            .watch_booking(Request::new(WatchBookingRequest {
                booking_id: "not-a-uuid".to_string(),
            }))
            .await
            .err()
            .unwrap();
        assert_eq!(err.code(), Code::InvalidArgument);
    }

    #[tokio::test]
    async fn watch_streams_updates() {
        let (svc, state, code, id) = seeded();

        let mut stream = svc
            .watch_booking(Request::new(WatchBookingRequest { booking_id: id }))
            .await
            .unwrap()
            .into_inner();

        svc.ingest_location(ingest(&code, 26.0)).await.unwrap();
        let first = stream.next().await.unwrap().unwrap();
        assert_eq!(first.lat, Some(26.0));

        drop(stream);
        assert_eq!(state.metrics.active_subscriptions.get(), 0);
    }
}
