// src/services/http.rs
use crate::errors::DesignError;
use log::warn;
use reqwest::{Client, Response, Url};
use std::time::Duration;

pub fn build_client(timeout: Duration) -> Result<Client, DesignError> {
    Client::builder()
        .timeout(timeout)
        .build()
        .map_err(|e| DesignError::Config(format!("Failed to build HTTP client: {}", e)))
}

pub fn parse_base_url(raw: &str) -> Result<Url, DesignError> {
    // Without the trailing slash `join` would drop the last path segment.
    let normalized = if raw.ends_with('/') {
        raw.to_string()
    } else {
        format!("{}/", raw)
    };
    Url::parse(&normalized).map_err(|e| DesignError::Config(format!("Invalid URL {}: {}", raw, e)))
}

pub fn endpoint(base: &Url, path: &str) -> Result<Url, DesignError> {
    base.join(path.trim_start_matches('/'))
        .map_err(|e| DesignError::Config(format!("Invalid endpoint {}: {}", path, e)))
}

/// Passes 2xx responses through and turns everything else into a
/// `Service` (body carried a `detail`) or `ServiceUnstructured` error.
pub async fn check_status(response: Response, context: &str) -> Result<Response, DesignError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let body = response.text().await.unwrap_or_default();
    warn!("{} failed with {}: {}", context, status, body);

    let detail = serde_json::from_str::<serde_json::Value>(&body)
        .ok()
        .and_then(|value| match value.get("detail") {
            Some(serde_json::Value::String(detail)) => Some(detail.clone()),
            Some(serde_json::Value::Null) | None => None,
            Some(other) => Some(other.to_string()),
        });

    match detail {
        Some(detail) => Err(DesignError::Service {
            status: status.as_u16(),
            detail,
        }),
        None => Err(DesignError::ServiceUnstructured {
            status: status.as_u16(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn endpoints_keep_base_path() {
        let base = parse_base_url("http://localhost:8000/api").unwrap();
        assert_eq!(
            endpoint(&base, "/status/abc").unwrap().as_str(),
            "http://localhost:8000/api/status/abc"
        );
        assert_eq!(
            endpoint(&base, "images/x.webp").unwrap().as_str(),
            "http://localhost:8000/api/images/x.webp"
        );
    }

    #[test]
    fn rejects_garbage_base_url() {
        assert!(matches!(
            parse_base_url("not a url"),
            Err(DesignError::Config(_))
        ));
    }
}
