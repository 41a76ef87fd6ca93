use std::sync::Arc;

use axum::{
    extract::{Query, State},
    http::{header, StatusCode},
    response::{sse::Sse, IntoResponse},
    routing::{get, post},
    Json, Router,
};
use backoffice_core::PayPeriodCalendar;
use chrono::{DateTime, Utc};
use metrics_exporter_prometheus::PrometheusHandle;
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::debug;

use crate::problem::ProblemResponse;
use crate::signals::{
    parse_topic_list, signal_keep_alive, signal_stream, Signal, SignalAction, SignalFilter,
    SignalHub, SignalTopic,
};
use crate::{links, payroll, telemetry};

#[derive(Clone)]
pub struct AppState {
    metrics: PrometheusHandle,
    signals: SignalHub,
    calendar: PayPeriodCalendar,
    clock: Arc<dyn Fn() -> DateTime<Utc> + Send + Sync>,
}

impl AppState {
    pub fn new(metrics: PrometheusHandle, signals: SignalHub, calendar: PayPeriodCalendar) -> Self {
        Self {
            metrics,
            signals,
            calendar,
            clock: Arc::new(Utc::now),
        }
    }

    #[cfg(test)]
    pub fn with_clock(mut self, clock: Arc<dyn Fn() -> DateTime<Utc> + Send + Sync>) -> Self {
        self.clock = clock;
        self
    }

    pub fn metrics(&self) -> &PrometheusHandle {
        &self.metrics
    }

    pub fn signals(&self) -> &SignalHub {
        &self.signals
    }

    pub fn calendar(&self) -> &PayPeriodCalendar {
        &self.calendar
    }

    pub fn now(&self) -> DateTime<Utc> {
        (self.clock)()
    }
}

pub fn app_router(state: AppState) -> Router {
    Router::new()
        .route("/healthz", get(healthz))
        .route("/metrics", get(metrics))
        .route("/api/pay-periods", get(payroll::pay_period))
        .route("/api/pay-periods/year/:year", get(payroll::pay_periods_for_year))
        .route("/api/iso-week", get(payroll::iso_week))
        .route("/api/links/resolve", post(links::resolve_link))
        .route("/api/signals", post(publish_signal))
        .route("/api/signals/stream", get(signal_sse))
        .with_state(state)
}

async fn healthz() -> StatusCode {
    StatusCode::OK
}

async fn metrics(State(state): State<AppState>) -> impl IntoResponse {
    let body = telemetry::render_metrics(state.metrics());
    (
        StatusCode::OK,
        [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
        body,
    )
}

#[derive(Debug, Deserialize)]
struct SignalQuery {
    #[serde(default)]
    topics: Option<String>,
}

#[derive(Debug, Deserialize)]
struct PublishSignal {
    topic: String,
    action: SignalAction,
    #[serde(default)]
    entity_id: Option<String>,
    #[serde(default)]
    payload: Value,
}

async fn publish_signal(
    State(state): State<AppState>,
    Json(body): Json<PublishSignal>,
) -> Result<(StatusCode, Json<Value>), ProblemResponse> {
    let topic = body
        .topic
        .parse::<SignalTopic>()
        .map_err(|err| ProblemResponse::bad_request("invalid_topic", err))?;

    let receivers = state.signals().publish(Signal {
        ts: state.now(),
        topic,
        action: body.action,
        entity_id: body.entity_id,
        payload: body.payload,
    });

    Ok((StatusCode::ACCEPTED, Json(json!({ "receivers": receivers }))))
}

async fn signal_sse(
    State(state): State<AppState>,
    Query(query): Query<SignalQuery>,
) -> Result<
    Sse<impl tokio_stream::Stream<Item = Result<axum::response::sse::Event, serde_json::Error>>>,
    ProblemResponse,
> {
    let topics = parse_topic_list(query.topics)
        .map_err(|err| ProblemResponse::bad_request("invalid_topic", err))?;
    let stream = signal_stream(state.signals(), SignalFilter::from_topics(topics));
    debug!(
        stage = "signals",
        subscribers = state.signals().subscriber_count(),
        "signal stream opened"
    );

    Ok(Sse::new(stream).keep_alive(signal_keep_alive()))
}

#[cfg(test)]
pub(crate) fn test_state() -> AppState {
    let metrics = telemetry::init_metrics().expect("metrics init");
    AppState::new(metrics, SignalHub::new(16), PayPeriodCalendar::default())
}
