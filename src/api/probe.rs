//! One-shot connection tests used by the admin surface.

use serde::Serialize;
use serde_json::Value;
use std::time::Duration;

use crate::api::{qbittorrent, unifi};
use crate::models::{Profile, ServiceType};
use crate::upstream::{Upstream, UpstreamError, UpstreamRequest, UpstreamResponse};

pub const PROBE_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProbeResult {
    pub success: bool,
    pub message: String,
}

impl ProbeResult {
    fn ok(message: impl Into<String>) -> Self {
        Self {
            success: true,
            message: message.into(),
        }
    }

    fn fail(message: impl Into<String>) -> Self {
        Self {
            success: false,
            message: message.into(),
        }
    }
}

/// What a healthy reply looks like.
#[derive(Debug, Clone, Copy)]
enum Expect {
    Field(&'static str),
    TautulliSuccess,
    LoginOk,
}

fn build(service_type: ServiceType, profile: &Profile) -> (UpstreamRequest, Expect) {
    let url = &profile.url;
    let key = profile.api_key().unwrap_or_default();
    match service_type {
        ServiceType::Plex => (
            UpstreamRequest::get(format!("{url}/"))
                .header("Accept", "application/json")
                .header("X-Plex-Token", profile.token().unwrap_or_default()),
            Expect::Field("MediaContainer"),
        ),
        ServiceType::Sonarr | ServiceType::Radarr => (
            UpstreamRequest::get(format!("{url}/api/v3/system/status")).header("X-Api-Key", key),
            Expect::Field("version"),
        ),
        ServiceType::Prowlarr => (
            UpstreamRequest::get(format!("{url}/api/v1/system/status")).header("X-Api-Key", key),
            Expect::Field("version"),
        ),
        ServiceType::Sabnzbd => (
            UpstreamRequest::get(format!(
                "{url}/api?mode=version&output=json&apikey={}",
                urlencoding::encode(key)
            )),
            Expect::Field("version"),
        ),
        ServiceType::Overseerr | ServiceType::Jellyseerr => (
            UpstreamRequest::get(format!("{url}/api/v1/status")).header("X-Api-Key", key),
            Expect::Field("version"),
        ),
        ServiceType::Jellyfin => (
            UpstreamRequest::get(format!("{url}/System/Info")).header("X-Emby-Token", key),
            Expect::Field("Version"),
        ),
        ServiceType::Bazarr => (
            UpstreamRequest::get(format!("{url}/api/system/status")).header("X-API-KEY", key),
            Expect::Field("data"),
        ),
        ServiceType::Tautulli => (
            UpstreamRequest::get(format!(
                "{url}/api/v2?apikey={}&cmd=get_server_info",
                urlencoding::encode(key)
            )),
            Expect::TautulliSuccess,
        ),
        ServiceType::Unifi => {
            let request = match profile.site_manager_key() {
                Some(manager) => UpstreamRequest::get(format!("{}/ea/hosts", unifi::SITE_MANAGER_URL))
                    .header("X-API-KEY", manager),
                None => UpstreamRequest::get(format!("{url}/proxy/network/integration/v1/sites"))
                    .header(
                        "X-API-KEY",
                        profile.credentials.site_keys().first().copied().unwrap_or_default(),
                    ),
            };
            (request.header("Accept", "application/json"), Expect::Field("data"))
        }
        ServiceType::Qbittorrent => {
            let (username, password) = profile.login().unwrap_or_default();
            (qbittorrent::login_request(url, username, password), Expect::LoginOk)
        }
    }
}

/// Upper bound for one connection test. The shared transport may cut a call
/// off sooner, so callers pass the smaller of the two to [`test_connection`].
pub fn time_limit(transport_timeout: Duration) -> Duration {
    PROBE_TIMEOUT.min(transport_timeout)
}

/// Tests connectivity with exactly one upstream request, bounded by `limit`.
/// Missing fields fail without touching the network.
pub async fn test_connection(
    upstream: &Upstream,
    service_type: ServiceType,
    profile: &Profile,
    limit: Duration,
) -> ProbeResult {
    if profile.url.is_empty() {
        return ProbeResult::fail("URL is required");
    }
    if let Some(missing) = profile.credentials.missing_for(service_type) {
        return ProbeResult::fail(format!("{missing} is required"));
    }

    let timed_out = || {
        ProbeResult::fail(format!(
            "Connection timed out after {} seconds",
            limit.as_secs_f64()
        ))
    };
    let (request, expect) = build(service_type, profile);
    let resp = match tokio::time::timeout(limit, upstream.raw(request)).await {
        Err(_) | Ok(Err(UpstreamError::Timeout(_))) => return timed_out(),
        Ok(Err(UpstreamError::Transport(detail))) => {
            return ProbeResult::fail(format!("Connection failed: {detail}"))
        }
        Ok(Err(e)) => return ProbeResult::fail(format!("Connection failed: {e}")),
        Ok(Ok(resp)) => resp,
    };
    interpret(service_type, expect, &resp)
}

fn interpret(service_type: ServiceType, expect: Expect, resp: &UpstreamResponse) -> ProbeResult {
    match resp.status {
        401 | 403 => {
            return ProbeResult::fail(format!(
                "Authentication failed (HTTP {}): check the credentials",
                resp.status
            ))
        }
        404 => return ProbeResult::fail("Endpoint not found (HTTP 404): check the URL"),
        _ if !resp.is_success() => return ProbeResult::fail(format!("HTTP {}", resp.status)),
        _ => {}
    }

    match expect {
        Expect::LoginOk if resp.body.trim() == "Ok." => ProbeResult::ok("Connected to qbittorrent"),
        Expect::LoginOk => ProbeResult::fail("Login failed: invalid username or password"),
        Expect::Field(field) => json_outcome(service_type, resp, |body| body.get(field).is_some()),
        Expect::TautulliSuccess => json_outcome(service_type, resp, |body| {
            body["response"]["result"] == "success"
        }),
    }
}

fn json_outcome(
    service_type: ServiceType,
    resp: &UpstreamResponse,
    healthy: impl Fn(&Value) -> bool,
) -> ProbeResult {
    if resp.looks_like_html() {
        return ProbeResult::fail(
            "Received HTML instead of JSON: check the URL and any reverse proxy configuration",
        );
    }
    let Ok(body) = serde_json::from_str::<Value>(&resp.body) else {
        return ProbeResult::fail("Unexpected response: body is not JSON");
    };
    if !healthy(&body) {
        return ProbeResult::fail("Unexpected response: check the URL and credentials");
    }

    match version_of(&body) {
        Some(version) => ProbeResult::ok(format!("Connected to {service_type} ({version})")),
        None => ProbeResult::ok(format!("Connected to {service_type}")),
    }
}

fn version_of(body: &Value) -> Option<&str> {
    body.get("version")
        .or_else(|| body.get("Version"))
        .or_else(|| body["MediaContainer"].get("version"))
        .or_else(|| body["response"]["data"].get("pms_version"))
        .or_else(|| body["data"].get("bazarr_version"))
        .and_then(Value::as_str)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Credentials;
    use crate::upstream::mock::MockTransport;
    use serde_json::json;

    fn with_key(url: &str) -> Profile {
        Profile {
            url: url.into(),
            credentials: Credentials {
                api_key: Some("k".into()),
                ..Default::default()
            },
        }
    }

    fn qbit() -> Profile {
        Profile {
            url: "http://qbit:8080".into(),
            credentials: Credentials {
                username: Some("admin".into()),
                password: Some("pw".into()),
                ..Default::default()
            },
        }
    }

    #[tokio::test]
    async fn qbittorrent_requires_exact_ok_body() {
        let (upstream, mock) = MockTransport::new()
            .text("/api/v2/auth/login", 200, "Ok.")
            .into_upstream();
        let result = test_connection(&upstream, ServiceType::Qbittorrent, &qbit(), PROBE_TIMEOUT).await;
        assert!(result.success);
        assert_eq!(mock.call_count(), 1);

        let (upstream, _) = MockTransport::new()
            .text("/api/v2/auth/login", 200, "Fails.")
            .into_upstream();
        let result = test_connection(&upstream, ServiceType::Qbittorrent, &qbit(), PROBE_TIMEOUT).await;
        assert!(!result.success);
    }

    #[tokio::test]
    async fn sonarr_probe_reports_version() {
        let (upstream, mock) = MockTransport::new()
            .json("/api/v3/system/status", json!({"version": "4.0.1"}))
            .into_upstream();
        let result =
            test_connection(&upstream, ServiceType::Sonarr, &with_key("http://sonarr:8989"), PROBE_TIMEOUT).await;
        assert_eq!(result, ProbeResult::ok("Connected to sonarr (4.0.1)"));
        assert_eq!(mock.call_count(), 1);
    }

    #[tokio::test]
    async fn status_codes_map_to_messages() {
        let (upstream, _) = MockTransport::new()
            .status("/api/v3/system/status", 401, json!({}))
            .into_upstream();
        let result =
            test_connection(&upstream, ServiceType::Radarr, &with_key("http://radarr:7878"), PROBE_TIMEOUT).await;
        assert!(result.message.contains("Authentication failed"));

        let (upstream, _) = MockTransport::new().into_upstream();
        let result =
            test_connection(&upstream, ServiceType::Radarr, &with_key("http://radarr:7878"), PROBE_TIMEOUT).await;
        assert!(result.message.contains("check the URL"));

        let (upstream, _) = MockTransport::new()
            .status("/System/Info", 502, json!({}))
            .into_upstream();
        let result =
            test_connection(&upstream, ServiceType::Jellyfin, &with_key("http://jf:8096"), PROBE_TIMEOUT).await;
        assert_eq!(result.message, "HTTP 502");
    }

    #[tokio::test]
    async fn html_reply_points_at_reverse_proxy() {
        let (upstream, _) = MockTransport::new()
            .text("/api/v1/status", 200, "<!DOCTYPE html><html>login</html>")
            .into_upstream();
        let result =
            test_connection(&upstream, ServiceType::Overseerr, &with_key("http://seerr"), PROBE_TIMEOUT).await;
        assert!(!result.success);
        assert!(result.message.contains("reverse proxy"));
    }

    #[tokio::test]
    async fn tautulli_needs_success_result() {
        let (upstream, _) = MockTransport::new()
            .json("cmd=get_server_info", json!({"response": {"result": "error"}}))
            .into_upstream();
        let result =
            test_connection(&upstream, ServiceType::Tautulli, &with_key("http://tautulli"), PROBE_TIMEOUT).await;
        assert!(!result.success);
    }

    #[tokio::test]
    async fn transport_failure_and_missing_fields() {
        let (upstream, _) = MockTransport::new().fail("/api/system/status").into_upstream();
        let result = test_connection(&upstream, ServiceType::Bazarr, &with_key("http://bazarr"), PROBE_TIMEOUT).await;
        assert!(result.message.starts_with("Connection failed"));

        let (upstream, mock) = MockTransport::new().into_upstream();
        let result = test_connection(&upstream, ServiceType::Plex, &with_key("http://plex"), PROBE_TIMEOUT).await;
        assert_eq!(result, ProbeResult::fail("token is required"));
        assert_eq!(mock.call_count(), 0);
    }

    #[tokio::test]
    async fn timeout_message_reports_the_bound_in_force() {
        assert_eq!(time_limit(Duration::from_secs(3)), Duration::from_secs(3));
        assert_eq!(time_limit(Duration::from_secs(30)), PROBE_TIMEOUT);

        let (upstream, mock) = MockTransport::new().timeout("/api/v3/system/status").into_upstream();
        let result = test_connection(
            &upstream,
            ServiceType::Sonarr,
            &with_key("http://sonarr:8989"),
            time_limit(Duration::from_secs(3)),
        )
        .await;
        assert_eq!(result, ProbeResult::fail("Connection timed out after 3 seconds"));
        assert_eq!(mock.call_count(), 1);
    }
}
