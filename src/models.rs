use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::config::{layered, EnvSource};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ServiceType {
    Sonarr,
    Radarr,
    Plex,
    Tautulli,
    Sabnzbd,
    Prowlarr,
    Qbittorrent,
    Overseerr,
    Jellyfin,
    Jellyseerr,
    Bazarr,
    Unifi,
}

impl ServiceType {
    pub const ALL: [ServiceType; 12] = [
        ServiceType::Sonarr,
        ServiceType::Radarr,
        ServiceType::Plex,
        ServiceType::Tautulli,
        ServiceType::Sabnzbd,
        ServiceType::Prowlarr,
        ServiceType::Qbittorrent,
        ServiceType::Overseerr,
        ServiceType::Jellyfin,
        ServiceType::Jellyseerr,
        ServiceType::Bazarr,
        ServiceType::Unifi,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ServiceType::Sonarr => "sonarr",
            ServiceType::Radarr => "radarr",
            ServiceType::Plex => "plex",
            ServiceType::Tautulli => "tautulli",
            ServiceType::Sabnzbd => "sabnzbd",
            ServiceType::Prowlarr => "prowlarr",
            ServiceType::Qbittorrent => "qbittorrent",
            ServiceType::Overseerr => "overseerr",
            ServiceType::Jellyfin => "jellyfin",
            ServiceType::Jellyseerr => "jellyseerr",
            ServiceType::Bazarr => "bazarr",
            ServiceType::Unifi => "unifi",
        }
    }

    /// Prefix of the legacy environment variables for this type, e.g. `SONARR`.
    pub fn env_prefix(&self) -> String {
        self.as_str().to_ascii_uppercase()
    }
}

impl fmt::Display for ServiceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ServiceType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let lowered = s.trim().to_ascii_lowercase();
        ServiceType::ALL
            .into_iter()
            .find(|t| t.as_str() == lowered)
            .ok_or_else(|| s.to_string())
    }
}

/// Credential fields. Which ones matter depends on the service type.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Credentials {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key1: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key2: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key3: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key4: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key5: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub site_manager_api_key: Option<String>,
}

impl Credentials {
    /// Local UniFi keys in slot order (`apiKey`, then `apiKey1..5`), skipping empty slots.
    pub fn site_keys(&self) -> Vec<&str> {
        [
            &self.api_key,
            &self.api_key1,
            &self.api_key2,
            &self.api_key3,
            &self.api_key4,
            &self.api_key5,
        ]
        .into_iter()
        .filter_map(|k| present(k))
        .collect()
    }

    /// Returns the name of the first missing credential for `service_type`, if any.
    pub fn missing_for(&self, service_type: ServiceType) -> Option<&'static str> {
        match service_type {
            ServiceType::Plex => present(&self.token).is_none().then_some("token"),
            ServiceType::Qbittorrent => {
                if present(&self.username).is_none() {
                    Some("username")
                } else if present(&self.password).is_none() {
                    Some("password")
                } else {
                    None
                }
            }
            ServiceType::Unifi => {
                let any = present(&self.site_manager_api_key).is_some()
                    || !self.site_keys().is_empty();
                (!any).then_some("apiKey")
            }
            _ => present(&self.api_key).is_none().then_some("apiKey"),
        }
    }
}

fn present(value: &Option<String>) -> Option<&str> {
    value.as_deref().map(str::trim).filter(|v| !v.is_empty())
}

fn default_enabled() -> bool {
    true
}

/// One configured connection to an upstream service deployment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServiceInstance {
    pub id: String,
    #[serde(rename = "type")]
    pub service_type: ServiceType,
    #[serde(default)]
    pub display_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(flatten)]
    pub credentials: Credentials,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    #[serde(default)]
    pub order: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_saved: Option<DateTime<Utc>>,
}

impl ServiceInstance {
    pub fn is_configured(&self) -> bool {
        present(&self.url).is_some() && self.credentials.missing_for(self.service_type).is_none()
    }

    pub fn to_public(&self) -> PublicInstance {
        PublicInstance {
            id: self.id.clone(),
            service_type: self.service_type,
            display_name: self.display_name.clone(),
            url: self.url.clone(),
            enabled: self.enabled,
            order: self.order,
        }
    }
}

/// Body accepted by the admin write surface. The id and type come from the path.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InstanceInput {
    #[serde(default)]
    pub display_name: String,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(flatten)]
    pub credentials: Credentials,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    #[serde(default)]
    pub order: i64,
}

impl InstanceInput {
    pub fn into_instance(self, id: String, service_type: ServiceType) -> ServiceInstance {
        ServiceInstance {
            id,
            service_type,
            display_name: self.display_name,
            url: self.url,
            credentials: self.credentials,
            enabled: self.enabled,
            order: self.order,
            last_saved: None,
        }
    }
}

/// Credential-free view of an instance, safe to expose without authentication.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PublicInstance {
    pub id: String,
    #[serde(rename = "type")]
    pub service_type: ServiceType,
    pub display_name: String,
    pub url: Option<String>,
    pub enabled: bool,
    pub order: i64,
}

/// Resolved connection details handed to service clients.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Profile {
    pub url: String,
    pub credentials: Credentials,
}

impl Profile {
    /// Layers store values over `<TYPE>_*` environment variables. The url is
    /// trimmed of trailing slashes; an empty url means "not configured".
    pub fn resolve(instance: &ServiceInstance, env: &dyn EnvSource) -> Profile {
        let prefix = instance.service_type.env_prefix();
        let c = &instance.credentials;
        let var = |suffix: &str| format!("{prefix}_{suffix}");

        let url = layered(&instance.url, env, &var("URL"))
            .map(|u| u.trim_end_matches('/').to_string())
            .unwrap_or_default();

        Profile {
            url,
            credentials: Credentials {
                api_key: layered(&c.api_key, env, &var("API_KEY")),
                token: layered(&c.token, env, &var("TOKEN")),
                username: layered(&c.username, env, &var("USERNAME")),
                password: layered(&c.password, env, &var("PASSWORD")),
                api_key1: layered(&c.api_key1, env, &var("API_KEY_1")),
                api_key2: layered(&c.api_key2, env, &var("API_KEY_2")),
                api_key3: layered(&c.api_key3, env, &var("API_KEY_3")),
                api_key4: layered(&c.api_key4, env, &var("API_KEY_4")),
                api_key5: layered(&c.api_key5, env, &var("API_KEY_5")),
                site_manager_api_key: layered(
                    &c.site_manager_api_key,
                    env,
                    &var("SITE_MANAGER_API_KEY"),
                ),
            },
        }
    }

    pub fn api_key(&self) -> Option<&str> {
        present(&self.credentials.api_key)
    }

    pub fn token(&self) -> Option<&str> {
        present(&self.credentials.token)
    }

    pub fn login(&self) -> Option<(&str, &str)> {
        Some((
            present(&self.credentials.username)?,
            present(&self.credentials.password)?,
        ))
    }

    pub fn site_manager_key(&self) -> Option<&str> {
        present(&self.credentials.site_manager_api_key)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn instance(service_type: ServiceType) -> ServiceInstance {
        ServiceInstance {
            id: format!("{service_type}1"),
            service_type,
            display_name: "Test".into(),
            url: Some("http://x/".into()),
            credentials: Credentials::default(),
            enabled: true,
            order: 0,
            last_saved: None,
        }
    }

    #[test]
    fn parses_service_types_case_insensitively() {
        assert_eq!("Sonarr".parse::<ServiceType>(), Ok(ServiceType::Sonarr));
        assert_eq!("qbittorrent".parse::<ServiceType>(), Ok(ServiceType::Qbittorrent));
        assert!("transmission".parse::<ServiceType>().is_err());
    }

    #[test]
    fn configured_depends_on_type_credentials() {
        let mut plex = instance(ServiceType::Plex);
        plex.credentials.api_key = Some("k".into());
        assert!(!plex.is_configured());
        plex.credentials.token = Some("t".into());
        assert!(plex.is_configured());

        let mut qbit = instance(ServiceType::Qbittorrent);
        qbit.credentials.username = Some("admin".into());
        assert_eq!(qbit.credentials.missing_for(ServiceType::Qbittorrent), Some("password"));
        qbit.credentials.password = Some("secret".into());
        assert!(qbit.is_configured());

        let mut unifi = instance(ServiceType::Unifi);
        assert!(!unifi.is_configured());
        unifi.credentials.api_key3 = Some("k3".into());
        assert!(unifi.is_configured());

        let mut sonarr = instance(ServiceType::Sonarr);
        sonarr.credentials.api_key = Some("   ".into());
        assert!(!sonarr.is_configured());
    }

    #[test]
    fn profile_prefers_store_then_environment() {
        let mut sonarr = instance(ServiceType::Sonarr);
        sonarr.credentials.api_key = Some("from-store".into());
        let env: HashMap<String, String> = [
            ("SONARR_API_KEY".to_string(), "from-env".to_string()),
            ("SONARR_URL".to_string(), "http://env".to_string()),
        ]
        .into_iter()
        .collect();

        let profile = Profile::resolve(&sonarr, &env);
        assert_eq!(profile.url, "http://x");
        assert_eq!(profile.api_key(), Some("from-store"));

        sonarr.credentials.api_key = Some(String::new());
        sonarr.url = None;
        let profile = Profile::resolve(&sonarr, &env);
        assert_eq!(profile.url, "http://env");
        assert_eq!(profile.api_key(), Some("from-env"));
    }

    #[test]
    fn serialized_instance_uses_camel_case_fields() {
        let mut unifi = instance(ServiceType::Unifi);
        unifi.credentials.site_manager_api_key = Some("sm".into());
        unifi.credentials.api_key1 = Some("k1".into());
        let json = serde_json::to_value(&unifi).unwrap();
        assert_eq!(json["type"], "unifi");
        assert_eq!(json["displayName"], "Test");
        assert_eq!(json["siteManagerApiKey"], "sm");
        assert_eq!(json["apiKey1"], "k1");
        assert!(json.get("token").is_none());
    }
}
