use std::sync::Arc;

use tonic::transport::Server as TonicServer;
use tower_http::services::ServeDir;
use tracing_subscriber::EnvFilter;

use tracking_relay::api;
use tracking_relay::api::grpc::GrpcTrackingService;
use tracking_relay::api::grpc::pb::tracking_service_server::TrackingServiceServer;
use tracking_relay::config::{Config, LogFormat};
use tracking_relay::error::AppError;
use tracking_relay::state::{AppState, TrackingSettings};

#[tokio::main]
async fn main() -> Result<(), AppError> {
    let config = Config::from_env()?;

    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(config.log_level.clone()))
        .with_target(false);
    match config.log_format {
        LogFormat::Compact => subscriber.compact().init(),
        LogFormat::Json => subscriber.json().init(),
    }

    let app_state = AppState::new(config.event_buffer_size).with_settings(TrackingSettings {
        resend_interval: config.resend_interval,
        simulation_speed_kmh: config.simulation_speed_kmh,
    });
    let shared_state = Arc::new(app_state);

    let app = api::rest::router(shared_state.clone())
        .fallback_service(ServeDir::new(&config.static_dir));

    let grpc_addr = format!("0.0.0.0:{}", config.grpc_port)
        .parse()
        .map_err(|err| AppError::Internal(format!("invalid grpc address: {err}")))?;
    let grpc_service = GrpcTrackingService::new(shared_state.clone());

    tokio::spawn(async move {
        tracing::info!(grpc_port = %grpc_addr, "grpc server started");
        if let Err(err) = TonicServer::builder()
            .add_service(TrackingServiceServer::new(grpc_service))
            .serve(grpc_addr)
            .await
        {
            tracing::error!(error = %err, "grpc server failed");
        }
    });

    let bind_addr = format!("0.0.0.0:{}", config.http_port);
    let listener = tokio::net::TcpListener::bind(&bind_addr)
        .await
        .map_err(|err| AppError::Internal(format!("failed to bind {bind_addr}: {err}")))?;

    tracing::info!(http_port = config.http_port, "http server started");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .map_err(|err| AppError::Internal(format!("server error: {err}")))?;

    Ok(())
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %err, "failed to listen for shutdown signal");
    }
}
