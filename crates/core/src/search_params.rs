use std::collections::{btree_map, BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use url::{form_urlencoded, Url};

/// Base used to resolve origin-relative hrefs such as `/jobs?id=4`.
const RELATIVE_BASE: &str = "http://localhost/";

/// Single-valued query parameters keyed by name.
///
/// Iteration follows key order so serialized query strings and diffs are
/// deterministic regardless of how the map was built.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct QueryMap(BTreeMap<String, String>);

impl QueryMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Decodes an `application/x-www-form-urlencoded` query string.
    ///
    /// A leading `?` is ignored. Repeated keys keep their last value.
    pub fn parse(query: &str) -> Self {
        let query = query.strip_prefix('?').unwrap_or(query);
        form_urlencoded::parse(query.as_bytes())
            .map(|(key, value)| (key.into_owned(), value.into_owned()))
            .collect()
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.0.get(key).map(String::as_str)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.0.contains_key(key)
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<String>) -> Option<String> {
        self.0.insert(key.into(), value.into())
    }

    pub fn remove(&mut self, key: &str) -> Option<String> {
        self.0.remove(key)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.0.keys().map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(key, value)| (key.as_str(), value.as_str()))
    }

    /// Encodes the map as a query string without the leading `?`.
    pub fn to_query_string(&self) -> String {
        let mut serializer = form_urlencoded::Serializer::new(String::new());
        for (key, value) in self.iter() {
            serializer.append_pair(key, value);
        }
        serializer.finish()
    }

    fn retain(&mut self, mut keep: impl FnMut(&str) -> bool) {
        self.0.retain(|key, _| keep(key));
    }

    fn extend_from(&mut self, other: &QueryMap) {
        for (key, value) in other.iter() {
            self.0.insert(key.to_string(), value.to_string());
        }
    }
}

impl<K, V> FromIterator<(K, V)> for QueryMap
where
    K: Into<String>,
    V: Into<String>,
{
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self(
            iter.into_iter()
                .map(|(key, value)| (key.into(), value.into()))
                .collect(),
        )
    }
}

impl IntoIterator for QueryMap {
    type Item = (String, String);
    type IntoIter = btree_map::IntoIter<String, String>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.into_iter()
    }
}

/// Decides which parameters of the current URL survive a navigation.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum PreservationPolicy {
    None,
    #[default]
    All,
    AllowList(BTreeSet<String>),
}

impl PreservationPolicy {
    pub fn allow<I, S>(keys: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::AllowList(keys.into_iter().map(Into::into).collect())
    }

    fn apply(&self, current: &QueryMap) -> QueryMap {
        match self {
            Self::None => QueryMap::new(),
            Self::All => current.clone(),
            Self::AllowList(keys) => {
                let mut preserved = current.clone();
                preserved.retain(|key| keys.contains(key));
                preserved
            }
        }
    }
}

/// Outcome of reconciling a link with the current location.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ResolvedNavigation {
    pub href: String,
    pub params: QueryMap,
    /// Keys whose value differs from the current location, in key order.
    pub changed: Vec<String>,
    pub path_changed: bool,
}

impl ResolvedNavigation {
    /// Returns `false` when following the link would land on the location the
    /// caller is already showing.
    pub fn requires_navigation(&self) -> bool {
        self.path_changed || !self.changed.is_empty()
    }

    pub fn is_changed(&self, key: &str) -> bool {
        self.changed.iter().any(|changed| changed == key)
    }
}

/// A link target plus the parameters it forces, drops, and preserves.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NavigationRequest {
    pub target_path: String,
    pub set: QueryMap,
    pub remove: BTreeSet<String>,
    pub policy: PreservationPolicy,
}

impl NavigationRequest {
    pub fn to(target_path: impl Into<String>) -> Self {
        Self {
            target_path: target_path.into(),
            ..Self::default()
        }
    }

    pub fn set(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.set.insert(key, value);
        self
    }

    pub fn remove(mut self, key: impl Into<String>) -> Self {
        self.remove.insert(key.into());
        self
    }

    pub fn policy(mut self, policy: PreservationPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn resolve(&self, current_href: &str) -> Result<ResolvedNavigation, SearchParamError> {
        let current_url = parse_href(current_href)?;
        let (path, fragment) = split_target(&self.target_path)?;
        let current = QueryMap::parse(current_url.query().unwrap_or_default());

        let mut merged = self.policy.apply(&current);
        merged.retain(|key| !self.remove.contains(key));
        merged.extend_from(&self.set);

        let path = if path.is_empty() {
            current_url.path()
        } else {
            path
        };

        let mut href = path.to_string();
        if !merged.is_empty() {
            href.push('?');
            href.push_str(&merged.to_query_string());
        }
        if let Some(fragment) = fragment {
            href.push('#');
            href.push_str(fragment);
        }

        Ok(ResolvedNavigation {
            href,
            changed: diff(&current, &merged),
            path_changed: normalized_path(&current_url, path) != current_url.path(),
            params: merged,
        })
    }
}

/// Computes the href a link should point at given the current location.
///
/// `current_href` is supplied by the caller instead of being read from any
/// ambient browser state.
pub fn resolve(
    current_href: &str,
    target_path: &str,
    explicit: &QueryMap,
    policy: &PreservationPolicy,
) -> Result<ResolvedNavigation, SearchParamError> {
    NavigationRequest {
        target_path: target_path.to_string(),
        set: explicit.clone(),
        remove: BTreeSet::new(),
        policy: policy.clone(),
    }
    .resolve(current_href)
}

/// Keys present in exactly one map or mapped to different values.
pub fn diff(before: &QueryMap, after: &QueryMap) -> Vec<String> {
    let keys: BTreeSet<&str> = before.keys().chain(after.keys()).collect();
    keys.into_iter()
        .filter(|key| before.get(key) != after.get(key))
        .map(str::to_string)
        .collect()
}

fn parse_href(href: &str) -> Result<Url, SearchParamError> {
    let malformed = |reason: String| SearchParamError::MalformedUrl {
        href: href.to_string(),
        reason,
    };

    match Url::parse(href) {
        Ok(url) => Ok(url),
        Err(url::ParseError::RelativeUrlWithoutBase) if href.starts_with('/') => {
            let base = Url::parse(RELATIVE_BASE).map_err(|err| malformed(err.to_string()))?;
            Url::options()
                .base_url(Some(&base))
                .parse(href)
                .map_err(|err| malformed(err.to_string()))
        }
        Err(err) => Err(malformed(err.to_string())),
    }
}

/// Target path as `Url` would percent-encode it, resolved against the current
/// location.
fn normalized_path(current: &Url, path: &str) -> String {
    current
        .join(path)
        .map(|joined| joined.path().to_string())
        .unwrap_or_else(|_| path.to_string())
}

fn split_target(target: &str) -> Result<(&str, Option<&str>), SearchParamError> {
    let (path, fragment) = match target.split_once('#') {
        Some((path, fragment)) => (path, Some(fragment)),
        None => (target, None),
    };
    if path.contains('?') {
        return Err(SearchParamError::MalformedTarget(target.to_string()));
    }
    Ok((path, fragment))
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum SearchParamError {
    #[error("current href '{href}' is not a valid URL: {reason}")]
    MalformedUrl { href: String, reason: String },
    #[error("target path '{0}' must not carry its own query string")]
    MalformedTarget(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    fn params(pairs: &[(&str, &str)]) -> QueryMap {
        pairs.iter().copied().collect()
    }

    #[test]
    fn preserves_everything_by_default() {
        let resolved = resolve(
            "https://office.example.com/employees?tab=active&page=2",
            "/employees",
            &params(&[("id", "42")]),
            &PreservationPolicy::default(),
        )
        .expect("resolve");

        assert_eq!(resolved.href, "/employees?id=42&page=2&tab=active");
        assert_eq!(resolved.changed, vec!["id".to_string()]);
        assert!(!resolved.path_changed);
        assert!(resolved.requires_navigation());
    }

    #[test]
    fn explicit_values_win_over_preserved_ones() {
        let resolved = resolve(
            "/jobs?status=open&page=3",
            "/jobs",
            &params(&[("page", "1")]),
            &PreservationPolicy::All,
        )
        .expect("resolve");

        assert_eq!(resolved.params.get("page"), Some("1"));
        assert_eq!(resolved.params.get("status"), Some("open"));
        assert_eq!(resolved.changed, vec!["page".to_string()]);
    }

    #[test]
    fn policy_none_ignores_current_params() {
        let explicit = params(&[("customer", "7")]);
        let resolved = resolve(
            "/customers?search=acme&page=4",
            "/customers",
            &explicit,
            &PreservationPolicy::None,
        )
        .expect("resolve");

        assert_eq!(resolved.params, explicit);
        assert_eq!(
            resolved.changed,
            vec!["customer".to_string(), "page".to_string(), "search".to_string()]
        );
    }

    #[test]
    fn allow_list_keeps_only_named_keys() {
        let resolved = resolve(
            "/positions?dept=ops&sort=name&id=3",
            "/positions",
            &QueryMap::new(),
            &PreservationPolicy::allow(["dept", "missing"]),
        )
        .expect("resolve");

        assert_eq!(resolved.href, "/positions?dept=ops");
        assert_eq!(resolved.changed, vec!["id".to_string(), "sort".to_string()]);
    }

    #[test]
    fn empty_merge_omits_question_mark() {
        let resolved = resolve(
            "/payroll?period=2025-PP3",
            "/payroll",
            &QueryMap::new(),
            &PreservationPolicy::None,
        )
        .expect("resolve");

        assert_eq!(resolved.href, "/payroll");
        assert!(resolved.params.is_empty());
    }

    #[test]
    fn empty_string_is_distinct_from_absent() {
        let resolved = resolve(
            "/jobs",
            "/jobs",
            &params(&[("filter", "")]),
            &PreservationPolicy::All,
        )
        .expect("resolve");

        assert_eq!(resolved.href, "/jobs?filter=");
        assert_eq!(resolved.changed, vec!["filter".to_string()]);

        let cleared = resolve(
            "/jobs?filter=",
            "/jobs",
            &QueryMap::new(),
            &PreservationPolicy::None,
        )
        .expect("resolve");
        assert_eq!(cleared.changed, vec!["filter".to_string()]);
    }

    #[test]
    fn unchanged_state_needs_no_navigation() {
        let resolved = resolve(
            "/employees?id=42",
            "/employees",
            &params(&[("id", "42")]),
            &PreservationPolicy::All,
        )
        .expect("resolve");

        assert!(resolved.changed.is_empty());
        assert!(!resolved.requires_navigation());
    }

    #[test]
    fn resolving_from_the_produced_href_is_idempotent() {
        let explicit = params(&[("q", "smith & sons"), ("tab", "notes")]);
        let policies = [
            PreservationPolicy::All,
            PreservationPolicy::None,
            PreservationPolicy::allow(["page"]),
        ];

        for policy in policies {
            let first = resolve(
                "https://office.example.com/customers?page=2&sort=name",
                "/customers",
                &explicit,
                &policy,
            )
            .expect("first resolve");
            let second =
                resolve(&first.href, "/customers", &explicit, &policy).expect("second resolve");

            assert_eq!(first.href, second.href, "policy {policy:?}");
            assert!(second.changed.is_empty(), "policy {policy:?}");
        }
    }

    #[test]
    fn values_are_percent_encoded_and_decoded() {
        let resolved = resolve(
            "/customers?q=a%20b%26c",
            "/customers",
            &params(&[("note", "50%/100%")]),
            &PreservationPolicy::All,
        )
        .expect("resolve");

        assert_eq!(resolved.params.get("q"), Some("a b&c"));
        assert_eq!(resolved.href, "/customers?note=50%25%2F100%25&q=a+b%26c");
    }

    #[test]
    fn repeated_keys_keep_the_last_value() {
        let map = QueryMap::parse("?page=1&page=5");
        assert_eq!(map.get("page"), Some("5"));
        assert_eq!(map.len(), 1);
    }

    #[test]
    fn remove_drops_preserved_keys_but_not_explicit_ones() {
        let resolved = NavigationRequest::to("/jobs")
            .set("id", "9")
            .remove("id")
            .remove("page")
            .resolve("/jobs?page=2&id=1&status=open")
            .expect("resolve");

        assert_eq!(resolved.href, "/jobs?id=9&status=open");
        assert!(resolved.is_changed("page"));
        assert!(resolved.is_changed("id"));
        assert!(!resolved.is_changed("status"));
    }

    #[test]
    fn empty_target_path_stays_on_current_path() {
        let resolved = NavigationRequest::to("")
            .set("tab", "history")
            .resolve("https://office.example.com/employees/12?tab=info")
            .expect("resolve");

        assert_eq!(resolved.href, "/employees/12?tab=history");
        assert!(!resolved.path_changed);
    }

    #[test]
    fn fragment_follows_query() {
        let resolved = NavigationRequest::to("/payroll#summary")
            .set("period", "2025-PP15")
            .policy(PreservationPolicy::None)
            .resolve("/dashboard")
            .expect("resolve");

        assert_eq!(resolved.href, "/payroll?period=2025-PP15#summary");
        assert!(resolved.path_changed);
    }

    #[test]
    fn encoded_and_raw_paths_compare_equal() {
        let resolved = NavigationRequest::to("/jobs/a b")
            .resolve("/jobs/a%20b?status=open")
            .expect("resolve");

        assert!(!resolved.path_changed);
        assert!(!resolved.requires_navigation());

        let moved = NavigationRequest::to("/jobs/a c")
            .resolve("/jobs/a%20b?status=open")
            .expect("resolve");
        assert!(moved.path_changed);
    }

    #[test]
    fn rejects_unparseable_current_href() {
        for href in ["", "employees?id=1", "http://[::1", "?tab=1"] {
            let err = resolve(
                href,
                "/employees",
                &QueryMap::new(),
                &PreservationPolicy::All,
            )
            .expect_err("malformed href");
            assert!(
                matches!(err, SearchParamError::MalformedUrl { .. }),
                "href {href:?}"
            );
        }
    }

    #[test]
    fn rejects_target_with_query() {
        let err = resolve(
            "/jobs",
            "/jobs?id=1",
            &QueryMap::new(),
            &PreservationPolicy::All,
        )
        .expect_err("target with query");
        assert_eq!(err, SearchParamError::MalformedTarget("/jobs?id=1".into()));
    }

    #[test]
    fn serializes_for_the_wire() {
        let resolved = resolve(
            "/jobs?page=2",
            "/jobs",
            &params(&[("id", "3")]),
            &PreservationPolicy::All,
        )
        .expect("resolve");
        let json = serde_json::to_value(&resolved).expect("serialize");
        assert_eq!(json["href"], "/jobs?id=3&page=2");
        assert_eq!(json["params"]["page"], "2");
        assert_eq!(json["changed"][0], "id");
        assert_eq!(json["pathChanged"], false);
    }
}
