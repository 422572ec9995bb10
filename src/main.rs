use anyhow::Result;
use tracing::{info, warn};
use waterscope_bridge::{api, config, controller, telemetry};
use config::Config;
use telemetry::init_tracing;

#[tokio::main]
async fn main() -> Result<()> {
    let cfg = Config::load()?;
    init_tracing(&cfg.telemetry);

    info!(waterscope = ?cfg.waterscope, "configuration loaded");

    let app_state = controller::AppState::new(cfg.clone())?;
    let app = api::router(app_state.clone(), &cfg);

    let addr = cfg.server.socket_addr()?;
    if cfg.server.host == "0.0.0.0" {
        warn!("binding to 0.0.0.0: the sensor API has no authentication");
    }
    info!(%addr, account = %waterscope_bridge::mask_username(&app_state.account), "starting Waterscope bridge");

    let poller = controller::spawn_poller(&app_state);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(telemetry::shutdown_signal())
        .await?;

    poller.abort();
    warn!("shutdown complete");
    Ok(())
}
