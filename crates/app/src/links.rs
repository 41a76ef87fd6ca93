use std::collections::BTreeSet;

use axum::Json;
use backoffice_core::{NavigationRequest, PreservationPolicy, QueryMap, ResolvedNavigation};
use metrics::counter;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::problem::ProblemResponse;

/// Which current parameters survive: `"all"`, `"none"`, or a list of keys.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum Preserve {
    Keyword(String),
    Keys(Vec<String>),
}

impl Default for Preserve {
    fn default() -> Self {
        Self::Keyword("all".to_string())
    }
}

impl TryFrom<Preserve> for PreservationPolicy {
    type Error = ProblemResponse;

    fn try_from(value: Preserve) -> Result<Self, Self::Error> {
        match value {
            Preserve::Keys(keys) => Ok(PreservationPolicy::allow(keys)),
            Preserve::Keyword(keyword) => match keyword.as_str() {
                "all" => Ok(PreservationPolicy::All),
                "none" => Ok(PreservationPolicy::None),
                other => Err(ProblemResponse::bad_request(
                    "invalid_policy",
                    format!("preserve must be \"all\", \"none\", or a list of keys (got {other})"),
                )),
            },
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResolveLinkRequest {
    current_href: String,
    #[serde(default)]
    target_path: String,
    #[serde(default)]
    params: QueryMap,
    #[serde(default)]
    remove: BTreeSet<String>,
    #[serde(default)]
    preserve: Preserve,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ResolveLinkResponse {
    #[serde(flatten)]
    resolved: ResolvedNavigation,
    requires_navigation: bool,
}

/// `POST /api/links/resolve`: merges a link's parameters with the caller's
/// current location.
pub async fn resolve_link(
    Json(request): Json<ResolveLinkRequest>,
) -> Result<Json<ResolveLinkResponse>, ProblemResponse> {
    let policy = PreservationPolicy::try_from(request.preserve)?;
    let navigation = NavigationRequest {
        target_path: request.target_path,
        set: request.params,
        remove: request.remove,
        policy,
    };

    let resolved = match navigation.resolve(&request.current_href) {
        Ok(resolved) => resolved,
        Err(err) => {
            warn!(stage = "links", error = %err, "link resolution rejected");
            counter!("link_resolve_requests_total", "result" => "rejected").increment(1);
            return Err(err.into());
        }
    };

    let requires_navigation = resolved.requires_navigation();
    let result = if requires_navigation { "changed" } else { "unchanged" };
    counter!("link_resolve_requests_total", "result" => result).increment(1);
    debug!(
        stage = "links",
        href = %resolved.href,
        changed = resolved.changed.len(),
        "link resolved"
    );

    Ok(Json(ResolveLinkResponse {
        resolved,
        requires_navigation,
    }))
}
