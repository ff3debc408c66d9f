use tonic_build::manual::{Builder, Method, Service};

const CODEC: &str = "tonic::codec::ProstCodec";

fn main() {
    let tracking = Service::builder()
        .name("TrackingService")
        .package("tracking")
        .method(
            Method::builder()
                .name("ingest_location")
                .route_name("IngestLocation")
                .input_type("crate::api::grpc::pb::IngestLocationRequest")
                .output_type("crate::api::grpc::pb::IngestLocationResponse")
                .codec_path(CODEC)
                .build(),
        )
        .method(
            Method::builder()
                .name("lookup_booking")
                .route_name("LookupBooking")
                .input_type("crate::api::grpc::pb::LookupBookingRequest")
                .output_type("crate::api::grpc::pb::BookingSnapshot")
                .codec_path(CODEC)
                .build(),
        )
        .method(
            Method::builder()
                .name("watch_booking")
                .route_name("WatchBooking")
                .input_type("crate::api::grpc::pb::WatchBookingRequest")
                .output_type("crate::api::grpc::pb::BookingSnapshot")
                .codec_path(CODEC)
                .server_streaming()
                .build(),
        )
        .build();

    Builder::new().compile(&[tracking]);
}
