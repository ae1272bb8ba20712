//! `orchestrion-gateway`: stands up the Tool Gateway Router's HTTP surface
//! and its background health monitor.

use orchestrion::config::GatewayConfig;
use orchestrion::gateway::{server, GatewayState};
use std::sync::Arc;

#[tokio::main]
async fn main() {
    env_logger::init();

    let config = GatewayConfig::from_env();
    let state = Arc::new(GatewayState::new(config));

    tokio::spawn(Arc::clone(&state).run_health_monitor());

    let bind_addr = std::env::var("GATEWAY_BIND_ADDR").unwrap_or_else(|_| "0.0.0.0:8088".to_string());
    let listener = tokio::net::TcpListener::bind(&bind_addr)
        .await
        .unwrap_or_else(|e| panic!("failed to bind {bind_addr}: {e}"));
    log::info!("tool gateway listening on {bind_addr}");

    axum::serve(listener, server::router(state))
        .await
        .unwrap_or_else(|e| panic!("gateway server exited: {e}"));
}
