use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use backoffice_core::{PayPeriodError, SearchParamError};
use serde::Serialize;

#[derive(Debug, Serialize)]
struct ProblemDetails {
    #[serde(rename = "type")]
    problem_type: &'static str,
    title: &'static str,
    detail: String,
}

#[derive(Debug)]
pub struct ProblemResponse {
    status: StatusCode,
    body: ProblemDetails,
}

impl ProblemResponse {
    pub fn new<S: Into<String>>(status: StatusCode, problem_type: &'static str, detail: S) -> Self {
        Self {
            status,
            body: ProblemDetails {
                problem_type,
                title: status.canonical_reason().unwrap_or("error"),
                detail: detail.into(),
            },
        }
    }

    pub fn bad_request<S: Into<String>>(problem_type: &'static str, detail: S) -> Self {
        Self::new(StatusCode::BAD_REQUEST, problem_type, detail)
    }
}

impl From<PayPeriodError> for ProblemResponse {
    fn from(err: PayPeriodError) -> Self {
        let problem_type = match err {
            PayPeriodError::InvalidDate(_) => "invalid_date",
            PayPeriodError::InvalidTimezone(_) => "invalid_timezone",
            PayPeriodError::NonexistentLocalTime { .. } => "nonexistent_local_time",
        };
        Self::bad_request(problem_type, err.to_string())
    }
}

impl From<SearchParamError> for ProblemResponse {
    fn from(err: SearchParamError) -> Self {
        let problem_type = match err {
            SearchParamError::MalformedUrl { .. } => "invalid_url",
            SearchParamError::MalformedTarget(_) => "invalid_target",
        };
        Self::bad_request(problem_type, err.to_string())
    }
}

impl IntoResponse for ProblemResponse {
    fn into_response(self) -> Response {
        let mut response = Json(self.body).into_response();
        *response.status_mut() = self.status;
        response.headers_mut().insert(
            axum::http::header::CONTENT_TYPE,
            axum::http::HeaderValue::from_static("application/problem+json"),
        );
        response
    }
}
