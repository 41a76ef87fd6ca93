use axum::{
    extract::{Path, Query, State},
    Json,
};
use backoffice_core::pay_period::{parse_instant, parse_timezone};
use backoffice_core::{PayPeriod, PayPeriodCalendar, PayPeriodError};
use metrics::counter;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::problem::ProblemResponse;
use crate::router::AppState;

#[derive(Debug, Deserialize)]
pub struct PayPeriodQuery {
    #[serde(default)]
    date: Option<String>,
    #[serde(default)]
    tz: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct YearQuery {
    #[serde(default)]
    tz: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct IsoWeekQuery {
    #[serde(default)]
    at: Option<String>,
    #[serde(default)]
    tz: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct YearPeriods {
    year: i32,
    timezone: &'static str,
    periods: Vec<PayPeriod>,
}

#[derive(Debug, Serialize)]
pub struct IsoWeek {
    week: u32,
    timezone: &'static str,
}

/// `GET /api/pay-periods`: period containing `date`, or today when omitted.
pub async fn pay_period(
    State(state): State<AppState>,
    Query(query): Query<PayPeriodQuery>,
) -> Result<Json<PayPeriod>, ProblemResponse> {
    let result = calendar_for(&state, query.tz.as_deref()).and_then(|calendar| {
        match query.date.as_deref() {
            Some(raw) => calendar.period_for_str(raw),
            None => calendar.period_containing(state.now()),
        }
    });
    record("period", &result);

    let period = result?;
    debug!(stage = "payroll", period = %period.name, "pay period resolved");
    Ok(Json(period))
}

/// `GET /api/pay-periods/year/:year`: every period numbered within a year.
pub async fn pay_periods_for_year(
    State(state): State<AppState>,
    Path(year): Path<i32>,
    Query(query): Query<YearQuery>,
) -> Result<Json<YearPeriods>, ProblemResponse> {
    let calendar = calendar_for(&state, query.tz.as_deref());
    let result = calendar.and_then(|calendar| {
        calendar
            .periods_in_year(year)
            .map(|periods| (calendar, periods))
    });
    record("year", &result);

    let (calendar, periods) = result?;
    Ok(Json(YearPeriods {
        year,
        timezone: calendar.timezone().name(),
        periods,
    }))
}

/// `GET /api/iso-week`: ISO week number of an instant in the payroll zone.
pub async fn iso_week(
    State(state): State<AppState>,
    Query(query): Query<IsoWeekQuery>,
) -> Result<Json<IsoWeek>, ProblemResponse> {
    let calendar = calendar_for(&state, query.tz.as_deref())?;
    let instant = match query.at.as_deref() {
        Some(raw) => parse_instant(raw)?,
        None => state.now(),
    };

    let week = calendar.iso_week(instant)?;
    Ok(Json(IsoWeek {
        week,
        timezone: calendar.timezone().name(),
    }))
}

fn calendar_for(state: &AppState, tz: Option<&str>) -> Result<PayPeriodCalendar, PayPeriodError> {
    let calendar = *state.calendar();
    match tz {
        Some(name) if !name.trim().is_empty() => {
            Ok(calendar.with_timezone(parse_timezone(name.trim())?))
        }
        _ => Ok(calendar),
    }
}

fn record<T>(kind: &'static str, result: &Result<T, PayPeriodError>) {
    let outcome = match result {
        Ok(_) => "ok",
        Err(err) => {
            warn!(stage = "payroll", kind, error = %err, "pay period request rejected");
            "rejected"
        }
    };
    counter!("pay_period_requests_total", "kind" => kind, "result" => outcome).increment(1);
}
