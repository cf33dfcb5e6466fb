use std::collections::HashMap;
use std::env;
use std::path::PathBuf;
use std::time::Duration;

/// Process-level configuration read once at startup.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub port: u16,
    pub database_path: String,
    pub log_file: PathBuf,
    pub static_dir: PathBuf,
    /// Bound applied to every outbound upstream call.
    pub upstream_timeout: Duration,
    /// Admin surface requires `Authorization: Bearer <token>` when set.
    pub admin_token: Option<String>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            port: 7778,
            database_path: "data/dasharr.db".to_string(),
            log_file: PathBuf::from("data/app.log"),
            static_dir: PathBuf::from("static"),
            upstream_timeout: Duration::from_secs(10),
            admin_token: None,
        }
    }
}

impl AppConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        Self::from_source(&ProcessEnv)
    }

    pub fn from_source(env: &dyn EnvSource) -> anyhow::Result<Self> {
        let defaults = Self::default();

        let port = match env.var("DASHARR_PORT") {
            Some(raw) => raw
                .parse()
                .map_err(|e| anyhow::anyhow!("invalid DASHARR_PORT '{raw}': {e}"))?,
            None => defaults.port,
        };
        let upstream_timeout = match env.var("DASHARR_UPSTREAM_TIMEOUT_SECS") {
            Some(raw) => {
                let secs: u64 = raw.trim().parse().map_err(|e| {
                    anyhow::anyhow!("invalid DASHARR_UPSTREAM_TIMEOUT_SECS '{raw}': {e}")
                })?;
                if secs == 0 {
                    anyhow::bail!("invalid DASHARR_UPSTREAM_TIMEOUT_SECS '{raw}': must be at least 1");
                }
                Duration::from_secs(secs)
            }
            None => defaults.upstream_timeout,
        };

        Ok(Self {
            port,
            database_path: env.var("DATABASE_PATH").unwrap_or(defaults.database_path),
            log_file: env
                .var("DASHARR_LOG_FILE")
                .map(PathBuf::from)
                .unwrap_or(defaults.log_file),
            static_dir: env
                .var("DASHARR_STATIC_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.static_dir),
            upstream_timeout,
            admin_token: env.var("DASHARR_ADMIN_TOKEN"),
        })
    }
}

/// Lookup of environment-style variables. Empty values count as unset.
pub trait EnvSource: Send + Sync {
    fn var(&self, key: &str) -> Option<String>;
}

/// The real process environment.
#[derive(Debug, Clone, Copy, Default)]
pub struct ProcessEnv;

impl EnvSource for ProcessEnv {
    fn var(&self, key: &str) -> Option<String> {
        env::var(key).ok().filter(|v| !v.trim().is_empty())
    }
}

impl EnvSource for HashMap<String, String> {
    fn var(&self, key: &str) -> Option<String> {
        self.get(key).filter(|v| !v.trim().is_empty()).cloned()
    }
}

/// Store value, then environment variable `key`. Blank values fall through.
pub fn layered(stored: &Option<String>, env: &dyn EnvSource, key: &str) -> Option<String> {
    stored
        .as_deref()
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
        .or_else(|| env.var(key))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn env(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn defaults_apply_without_environment() {
        let cfg = AppConfig::from_source(&env(&[])).unwrap();
        assert_eq!(cfg.port, 7778);
        assert_eq!(cfg.database_path, "data/dasharr.db");
        assert_eq!(cfg.upstream_timeout, Duration::from_secs(10));
        assert_eq!(cfg.admin_token, None);
    }

    #[test]
    fn environment_overrides_defaults() {
        let cfg = AppConfig::from_source(&env(&[
            ("DASHARR_PORT", "9000"),
            ("DASHARR_UPSTREAM_TIMEOUT_SECS", "3"),
            ("DASHARR_ADMIN_TOKEN", "s3cret"),
            ("DATABASE_PATH", "/tmp/d.db"),
        ]))
        .unwrap();
        assert_eq!(cfg.port, 9000);
        assert_eq!(cfg.upstream_timeout, Duration::from_secs(3));
        assert_eq!(cfg.admin_token.as_deref(), Some("s3cret"));
        assert_eq!(cfg.database_path, "/tmp/d.db");
    }

    #[test]
    fn rejects_unparsable_port() {
        assert!(AppConfig::from_source(&env(&[("DASHARR_PORT", "seventy")])).is_err());
    }

    #[test]
    fn rejects_zero_upstream_timeout() {
        let err = AppConfig::from_source(&env(&[("DASHARR_UPSTREAM_TIMEOUT_SECS", "0")]))
            .unwrap_err();
        assert!(err.to_string().contains("DASHARR_UPSTREAM_TIMEOUT_SECS"));
        assert!(AppConfig::from_source(&env(&[("DASHARR_UPSTREAM_TIMEOUT_SECS", "soon")])).is_err());
    }

    #[test]
    fn layered_lookup_precedence() {
        let e = env(&[("X_KEY", "env"), ("BLANK", " ")]);
        assert_eq!(layered(&Some("store".into()), &e, "X_KEY").as_deref(), Some("store"));
        assert_eq!(layered(&Some("".into()), &e, "X_KEY").as_deref(), Some("env"));
        assert_eq!(layered(&None, &e, "BLANK"), None);
        assert_eq!(layered(&None, &e, "MISSING"), None);
    }
}
