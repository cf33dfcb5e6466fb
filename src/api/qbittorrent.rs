use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::api::{lenient_f64, null_default};
use crate::error::ServiceError;
use crate::models::Profile;
use crate::upstream::{settled, settled_or_default, Upstream, UpstreamError, UpstreamRequest};

const DOWNLOADING: &[&str] = &[
    "downloading",
    "forcedDL",
    "metaDL",
    "stalledDL",
    "queuedDL",
    "checkingDL",
    "allocating",
];
const SEEDING: &[&str] = &["uploading", "forcedUP", "stalledUP", "queuedUP", "checkingUP"];
const PAUSED: &[&str] = &["pausedDL", "pausedUP", "stoppedDL", "stoppedUP"];
const ERRORED: &[&str] = &["error", "missingFiles"];

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TransferInfo {
    #[serde(deserialize_with = "null_default")]
    pub dl_info_speed: i64,
    #[serde(deserialize_with = "null_default")]
    pub up_info_speed: i64,
    #[serde(deserialize_with = "null_default")]
    pub dl_info_data: i64,
    #[serde(deserialize_with = "null_default")]
    pub up_info_data: i64,
    pub connection_status: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Torrent {
    pub hash: Option<String>,
    pub name: Option<String>,
    pub state: Option<String>,
    pub category: Option<String>,
    #[serde(deserialize_with = "lenient_f64")]
    pub progress: f64,
    #[serde(deserialize_with = "null_default")]
    pub size: i64,
    #[serde(deserialize_with = "null_default")]
    pub dlspeed: i64,
    #[serde(deserialize_with = "null_default")]
    pub upspeed: i64,
    #[serde(deserialize_with = "null_default")]
    pub eta: i64,
    #[serde(deserialize_with = "lenient_f64")]
    pub ratio: f64,
    pub added_on: Option<i64>,
}

impl Torrent {
    fn in_state(&self, states: &[&str]) -> bool {
        self.state.as_deref().is_some_and(|s| states.contains(&s))
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct QbittorrentStats {
    pub total_torrents: i64,
    pub downloading: i64,
    pub seeding: i64,
    pub paused: i64,
    pub completed: i64,
    pub errored: i64,
    pub download_speed: i64,
    pub upload_speed: i64,
}

impl QbittorrentStats {
    pub fn derive(torrents: &[Torrent], transfer: &TransferInfo) -> Self {
        let count = |states: &[&str]| torrents.iter().filter(|t| t.in_state(states)).count() as i64;
        Self {
            total_torrents: torrents.len() as i64,
            downloading: count(DOWNLOADING),
            seeding: count(SEEDING),
            paused: count(PAUSED),
            completed: torrents.iter().filter(|t| t.progress >= 1.0).count() as i64,
            errored: count(ERRORED),
            download_speed: transfer.dl_info_speed,
            upload_speed: transfer.up_info_speed,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct QbittorrentOverview {
    pub version: Option<String>,
    pub stats: QbittorrentStats,
    pub transfer: TransferInfo,
    pub torrents: Vec<Torrent>,
}

/// The login form. qBittorrent rejects it without a matching `Referer`.
pub fn login_request(base: &str, username: &str, password: &str) -> UpstreamRequest {
    UpstreamRequest::post_form(
        format!("{base}/api/v2/auth/login"),
        vec![
            ("username", username.to_string()),
            ("password", password.to_string()),
        ],
    )
    .header("Referer", base)
}

/// Pulls `SID=...` out of a `Set-Cookie` header value.
fn session_cookie(set_cookie: &str) -> Option<String> {
    set_cookie
        .split(';')
        .map(str::trim)
        .find(|part| part.starts_with("SID="))
        .map(str::to_string)
}

/// Client holding an authenticated session.
pub struct QbittorrentClient<'a> {
    http: &'a Upstream,
    base: &'a str,
    cookie: Option<String>,
}

impl<'a> QbittorrentClient<'a> {
    /// Logs in. A body other than `Ok.` is a failed login even on HTTP 200.
    pub async fn login(http: &'a Upstream, profile: &'a Profile) -> Result<Self, LoginError> {
        let (username, password) = profile
            .login()
            .ok_or_else(|| LoginError::MissingCredentials(missing_login_field(profile)))?;
        let resp = http
            .send(login_request(&profile.url, username, password))
            .await
            .map_err(LoginError::Upstream)?;
        if resp.body.trim() != "Ok." {
            return Err(LoginError::Rejected);
        }
        let cookie = resp.header("set-cookie").and_then(session_cookie);
        Ok(Self {
            http,
            base: &profile.url,
            cookie,
        })
    }

    fn request(&self, path: &str) -> UpstreamRequest {
        let req = UpstreamRequest::get(format!("{}/api/v2/{path}", self.base))
            .header("Referer", self.base);
        match &self.cookie {
            Some(cookie) => req.header("Cookie", cookie.clone()),
            None => req,
        }
    }

    pub async fn get<T: DeserializeOwned>(&self, path: &str) -> Result<T, UpstreamError> {
        self.http.get_json(self.request(path)).await
    }

    pub async fn version(&self) -> Result<String, UpstreamError> {
        Ok(self.http.get_text(self.request("app/version")).await?.trim().to_string())
    }
}

fn missing_login_field(profile: &Profile) -> &'static str {
    if profile.credentials.username.as_deref().map_or(true, |u| u.trim().is_empty()) {
        "username"
    } else {
        "password"
    }
}

#[derive(thiserror::Error, Debug)]
pub enum LoginError {
    #[error("missing credential '{0}'")]
    MissingCredentials(&'static str),

    #[error("login rejected")]
    Rejected,

    #[error(transparent)]
    Upstream(UpstreamError),
}

pub async fn overview(
    upstream: &Upstream,
    instance: &str,
    profile: &Profile,
) -> Result<QbittorrentOverview, ServiceError> {
    let client = match QbittorrentClient::login(upstream, profile).await {
        Ok(client) => client,
        Err(LoginError::MissingCredentials(field)) => {
            return Err(ServiceError::MissingCredentials(field))
        }
        Err(e) => {
            tracing::warn!(instance, error = %e, "qbittorrent login failed, using defaults");
            return Ok(QbittorrentOverview {
                version: None,
                stats: QbittorrentStats::default(),
                transfer: TransferInfo::default(),
                torrents: Vec::new(),
            });
        }
    };

    let (version, transfer, torrents) = tokio::join!(
        client.version(),
        client.get::<TransferInfo>("transfer/info"),
        client.get::<Vec<Torrent>>("torrents/info"),
    );

    let version = settled(instance, "app/version", version);
    let transfer = settled_or_default(instance, "transfer/info", transfer);
    let torrents = settled_or_default(instance, "torrents/info", torrents);

    Ok(QbittorrentOverview {
        version,
        stats: QbittorrentStats::derive(&torrents, &transfer),
        transfer,
        torrents,
    })
}
