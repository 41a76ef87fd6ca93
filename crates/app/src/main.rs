mod links;
mod payroll;
mod problem;
mod router;
mod signals;
mod telemetry;

use std::net::SocketAddr;

use backoffice_core::PayPeriodCalendar;
use backoffice_util::{load_env_file, AppConfig};
use tracing::info;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    load_env_file();
    let config = AppConfig::from_env()?;

    telemetry::init_tracing(&config)?;
    let metrics = telemetry::init_metrics()?;

    let calendar = PayPeriodCalendar::new(config.payroll_timezone, config.payroll_anchor);
    let signals = signals::SignalHub::new(config.signal_buffer);
    let state = router::AppState::new(metrics, signals, calendar);

    let addr: SocketAddr = config.bind_addr;
    info!(
        stage = "app",
        %addr,
        env = %config.environment.as_str(),
        payroll_tz = calendar.timezone().name(),
        payroll_anchor = %calendar.anchor(),
        "starting HTTP server"
    );

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, router::app_router(state))
        .await
        .map_err(|err| err.into())
}
