// src/core/classifier.rs

//! Request admission: decides whether a request may be served from cache.
//!
//! The classifier is a pure rule chain over a request view. Rules are
//! evaluated in a fixed priority order and the first match decides; it
//! reads no state and has no side effects.

use std::collections::HashMap;
use wildmatch::WildMatch;

/// Marketing / attribution query parameters that never change the
/// rendered page. A query consisting solely of these is ignored for
/// cache keying instead of bypassing the cache.
const TRACKING_PARAMS: &[&str] = &[
    "utm_source",
    "utm_medium",
    "utm_campaign",
    "utm_term",
    "utm_content",
    "gclid",
    "fbclid",
    "msclkid",
];

/// A classifier-facing view of an HTTP request. Header names and cookie
/// names are expected lowercased by the caller.
#[derive(Debug, Clone, Default)]
pub struct RequestView {
    pub method: String,
    pub path: String,
    pub headers: HashMap<String, String>,
    pub cookies: HashMap<String, String>,
    pub query: Vec<(String, String)>,
}

impl RequestView {
    /// Convenience constructor for a plain GET with no headers, cookies
    /// or query, the common case in tests and internal calls.
    pub fn get(path: impl Into<String>) -> Self {
        Self {
            method: "GET".to_string(),
            path: path.into(),
            ..Default::default()
        }
    }
}

/// The admission decision plus the rule that produced it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Decision {
    pub cacheable: bool,
    pub reason: String,
    pub rule_triggered: String,
    /// Set by the tracking-only rule: the query must not participate in
    /// cache key derivation.
    pub strip_query_for_key: bool,
}

impl Decision {
    fn cacheable(rule: &str, reason: impl Into<String>) -> Self {
        Self {
            cacheable: true,
            reason: reason.into(),
            rule_triggered: rule.to_string(),
            strip_query_for_key: false,
        }
    }

    fn bypass(rule: &str, reason: impl Into<String>) -> Self {
        Self {
            cacheable: false,
            reason: reason.into(),
            rule_triggered: rule.to_string(),
            strip_query_for_key: false,
        }
    }
}

/// Rule-based request classifier. Construction compiles the configured
/// cookie patterns once; classification itself allocates only the
/// decision.
#[derive(Debug)]
pub struct RequestClassifier {
    auth_cookie_patterns: Vec<WildMatch>,
    bypass_header: String,
}

impl Default for RequestClassifier {
    fn default() -> Self {
        Self::new(
            &[
                "*logged_in*".to_string(),
                "*session*".to_string(),
                "auth_token".to_string(),
            ],
            "x-isr-bypass",
        )
    }
}

impl RequestClassifier {
    pub fn new(auth_cookie_patterns: &[String], bypass_header: &str) -> Self {
        Self {
            auth_cookie_patterns: auth_cookie_patterns
                .iter()
                .map(|p| WildMatch::new(p))
                .collect(),
            bypass_header: bypass_header.to_ascii_lowercase(),
        }
    }

    /// Runs the rule chain. Order is fixed: method, authenticated cookie,
    /// tracking-only query, cache-bust header, default.
    pub fn classify(&self, request: &RequestView) -> Decision {
        if !request.method.eq_ignore_ascii_case("GET") {
            return Decision::bypass(
                "non_get_method",
                format!("{} requests are never cached", request.method),
            );
        }

        for name in request.cookies.keys() {
            if self
                .auth_cookie_patterns
                .iter()
                .any(|p| p.matches(&name.to_ascii_lowercase()))
            {
                return Decision::bypass(
                    "logged_in_cookie",
                    format!("cookie '{name}' marks an authenticated user"),
                );
            }
        }

        if !request.query.is_empty()
            && request
                .query
                .iter()
                .all(|(name, _)| TRACKING_PARAMS.contains(&name.to_ascii_lowercase().as_str()))
        {
            let mut decision = Decision::cacheable(
                "tracking_only_query",
                "query carries only tracking parameters; ignored for keying",
            );
            decision.strip_query_for_key = true;
            return decision;
        }

        if request.headers.contains_key(&self.bypass_header) {
            return Decision::bypass(
                "cache_bust_header",
                format!("request carries the '{}' marker", self.bypass_header),
            );
        }

        Decision::cacheable("default", "GET request with no disqualifying markers")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn classifier() -> RequestClassifier {
        RequestClassifier::default()
    }

    #[test]
    fn plain_get_is_cacheable() {
        let decision = classifier().classify(&RequestView::get("/a"));
        assert!(decision.cacheable);
        assert_eq!(decision.rule_triggered, "default");
    }

    #[test]
    fn post_is_not_cacheable() {
        let mut request = RequestView::get("/a");
        request.method = "POST".to_string();
        let decision = classifier().classify(&request);
        assert!(!decision.cacheable);
        assert_eq!(decision.rule_triggered, "non_get_method");
    }

    #[test]
    fn session_cookie_bypasses() {
        let mut request = RequestView::get("/a");
        request
            .cookies
            .insert("wp_session_id".to_string(), "abc".to_string());
        let decision = classifier().classify(&request);
        assert!(!decision.cacheable);
        assert_eq!(decision.rule_triggered, "logged_in_cookie");
    }

    #[test]
    fn tracking_only_query_is_cacheable_without_key_impact() {
        let mut request = RequestView::get("/a");
        request.query = vec![
            ("utm_source".to_string(), "newsletter".to_string()),
            ("utm_campaign".to_string(), "spring".to_string()),
        ];
        let decision = classifier().classify(&request);
        assert!(decision.cacheable);
        assert!(decision.strip_query_for_key);
        assert_eq!(decision.rule_triggered, "tracking_only_query");
    }

    #[test]
    fn mixed_query_is_cacheable_with_key_impact() {
        let mut request = RequestView::get("/a");
        request.query = vec![
            ("utm_source".to_string(), "newsletter".to_string()),
            ("page".to_string(), "2".to_string()),
        ];
        let decision = classifier().classify(&request);
        assert!(decision.cacheable);
        assert!(!decision.strip_query_for_key);
        assert_eq!(decision.rule_triggered, "default");
    }

    #[test]
    fn bypass_header_wins_over_default() {
        let mut request = RequestView::get("/a");
        request
            .headers
            .insert("x-isr-bypass".to_string(), "1".to_string());
        let decision = classifier().classify(&request);
        assert!(!decision.cacheable);
        assert_eq!(decision.rule_triggered, "cache_bust_header");
    }

    #[test]
    fn cookie_rule_outranks_bypass_header() {
        let mut request = RequestView::get("/a");
        request
            .headers
            .insert("x-isr-bypass".to_string(), "1".to_string());
        request
            .cookies
            .insert("session".to_string(), "abc".to_string());
        let decision = classifier().classify(&request);
        assert_eq!(decision.rule_triggered, "logged_in_cookie");
    }
}
