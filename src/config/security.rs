use axum::http::{header, HeaderName, HeaderValue};
use std::env;

const NOSNIFF: &str = "nosniff";
const DENY: &str = "DENY";
const HSTS_VALUE: &str = "max-age=31536000; includeSubDomains";
const CSP_API_VALUE: &str = "default-src 'none'; frame-ancestors 'none'";
const REFERRER_POLICY_VALUE: &str = "strict-origin-when-cross-origin";

/// Static response headers applied to every route. HSTS is appended only in
/// production (HTTPS environments).
pub fn security_headers() -> Vec<(HeaderName, HeaderValue)> {
    let mut headers = vec![
        (
            header::X_CONTENT_TYPE_OPTIONS,
            HeaderValue::from_static(NOSNIFF),
        ),
        (header::X_FRAME_OPTIONS, HeaderValue::from_static(DENY)),
        (
            header::CONTENT_SECURITY_POLICY,
            HeaderValue::from_static(CSP_API_VALUE),
        ),
        (
            header::REFERRER_POLICY,
            HeaderValue::from_static(REFERRER_POLICY_VALUE),
        ),
    ];

    if hsts_enabled() {
        tracing::info!("Security: HSTS header enabled (production mode)");
        headers.push((
            header::STRICT_TRANSPORT_SECURITY,
            HeaderValue::from_static(HSTS_VALUE),
        ));
    }

    headers
}

fn hsts_enabled() -> bool {
    env::var("RUST_ENV")
        .map(|v| v.to_lowercase() == "production")
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_headers_without_hsts_by_default() {
        std::env::remove_var("RUST_ENV");
        let headers = security_headers();
        assert!(headers
            .iter()
            .all(|(name, _)| *name != header::STRICT_TRANSPORT_SECURITY));
        assert!(headers
            .iter()
            .any(|(name, _)| *name == header::X_CONTENT_TYPE_OPTIONS));
    }
}
