//! Configuration types and loading
//!
//! Config precedence: CLI args > env vars > config file > defaults.
//! `API_BASE_URL` replaces `api.base_url` so one file can serve every
//! environment.

use serde::Deserialize;
use session::SessionPolicy;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Root configuration
#[derive(Debug, Deserialize)]
pub struct Config {
    pub server: ServerConfig,
    pub api: ApiConfig,
    #[serde(default)]
    pub session: SessionConfig,
}

/// Listener settings
#[derive(Debug, Deserialize)]
pub struct ServerConfig {
    pub listen_addr: SocketAddr,
    #[serde(default = "default_max_connections")]
    pub max_connections: usize,
}

/// Remote REST API settings
#[derive(Debug, Deserialize)]
pub struct ApiConfig {
    pub base_url: String,
    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,
}

/// Session cookie and navigation settings
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    pub login_path: String,
    pub home_path: String,
    /// Set on deployments served over HTTPS
    pub secure_cookies: bool,
    /// Cookie lifetime; absent means cookies end with the browser session
    pub max_age_secs: Option<u64>,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            login_path: "/auth/login".to_string(),
            home_path: "/dashboard".to_string(),
            secure_cookies: false,
            max_age_secs: None,
        }
    }
}

impl SessionConfig {
    pub fn policy(&self) -> SessionPolicy {
        SessionPolicy::new(
            self.secure_cookies,
            self.max_age_secs.map(Duration::from_secs),
        )
    }
}

fn default_timeout() -> u64 {
    10
}

fn default_max_connections() -> usize {
    1000
}

impl Config {
    /// Load configuration from a TOML file, then overlay environment variables.
    pub fn load(path: &Path) -> common::Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        let mut config: Config = toml::from_str(&contents)?;

        if let Ok(base_url) = std::env::var("API_BASE_URL") {
            config.api.base_url = base_url;
        }

        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> common::Result<()> {
        if !self.api.base_url.starts_with("http://") && !self.api.base_url.starts_with("https://") {
            return Err(common::Error::Config(format!(
                "base_url must start with http:// or https://, got: {}",
                self.api.base_url
            )));
        }
        url::Url::parse(&self.api.base_url)?;

        if self.api.timeout_secs == 0 {
            return Err(common::Error::Config(
                "timeout_secs must be greater than 0".into(),
            ));
        }

        if self.server.max_connections == 0 {
            return Err(common::Error::Config(
                "max_connections must be greater than 0".into(),
            ));
        }

        for (name, path) in [
            ("login_path", &self.session.login_path),
            ("home_path", &self.session.home_path),
        ] {
            if !path.starts_with('/') {
                return Err(common::Error::Config(format!(
                    "{name} must start with '/', got: {path}"
                )));
            }
        }

        Ok(())
    }

    /// Resolve config file path from CLI arg or CONFIG_PATH env var.
    pub fn resolve_path(cli_path: Option<&str>) -> PathBuf {
        if let Some(p) = cli_path {
            return PathBuf::from(p);
        }
        if let Ok(p) = std::env::var("CONFIG_PATH") {
            return PathBuf::from(p);
        }
        PathBuf::from("storefront-bff.toml")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    /// Serializes tests that touch environment variables.
    static ENV_MUTEX: Mutex<()> = Mutex::new(());

    /// SAFETY: Callers must hold ENV_MUTEX to prevent concurrent env mutation.
    unsafe fn set_env(key: &str, val: &str) {
        unsafe { std::env::set_var(key, val) };
    }

    unsafe fn remove_env(key: &str) {
        unsafe { std::env::remove_var(key) };
    }

    fn valid_toml() -> &'static str {
        r#"
[server]
listen_addr = "127.0.0.1:3000"

[api]
base_url = "http://202.155.95.111/api/v1"
"#
    }

    fn write_config(dir: &tempfile::TempDir, contents: &str) -> PathBuf {
        let path = dir.path().join("storefront-bff.toml");
        std::fs::write(&path, contents).unwrap();
        path
    }

    #[test]
    fn load_applies_defaults() {
        let _lock = ENV_MUTEX.lock().unwrap();
        unsafe { remove_env("API_BASE_URL") };
        let dir = tempfile::tempdir().unwrap();
        let path = write_config(&dir, valid_toml());

        let config = Config::load(&path).unwrap();
        assert_eq!(config.server.listen_addr.port(), 3000);
        assert_eq!(config.server.max_connections, 1000);
        assert_eq!(config.api.base_url, "http://202.155.95.111/api/v1");
        assert_eq!(config.api.timeout_secs, 10);
        assert_eq!(config.session.login_path, "/auth/login");
        assert_eq!(config.session.home_path, "/dashboard");
        assert!(!config.session.secure_cookies);
        assert!(config.session.max_age_secs.is_none());
    }

    #[test]
    fn session_section_overrides_defaults() {
        let _lock = ENV_MUTEX.lock().unwrap();
        unsafe { remove_env("API_BASE_URL") };
        let dir = tempfile::tempdir().unwrap();
        let path = write_config(
            &dir,
            r#"
[server]
listen_addr = "0.0.0.0:8080"
max_connections = 64

[api]
base_url = "https://api.example.test"
timeout_secs = 3

[session]
login_path = "/masuk"
secure_cookies = true
max_age_secs = 604800
"#,
        );

        let config = Config::load(&path).unwrap();
        assert_eq!(config.server.max_connections, 64);
        assert_eq!(config.api.timeout_secs, 3);
        assert_eq!(config.session.login_path, "/masuk");
        assert_eq!(config.session.home_path, "/dashboard");

        let policy = config.session.policy();
        assert!(policy.secure);
        assert_eq!(policy.max_age, Some(Duration::from_secs(604_800)));
    }

    #[test]
    fn base_url_from_env_overrides_file() {
        let _lock = ENV_MUTEX.lock().unwrap();
        let dir = tempfile::tempdir().unwrap();
        let path = write_config(&dir, valid_toml());

        unsafe { set_env("API_BASE_URL", "https://staging.example.test/api/v1") };
        let config = Config::load(&path).unwrap();
        unsafe { remove_env("API_BASE_URL") };

        assert_eq!(config.api.base_url, "https://staging.example.test/api/v1");
    }

    #[test]
    fn invalid_base_url_from_env_is_rejected() {
        let _lock = ENV_MUTEX.lock().unwrap();
        let dir = tempfile::tempdir().unwrap();
        let path = write_config(&dir, valid_toml());

        unsafe { set_env("API_BASE_URL", "ftp://files.example.test") };
        let result = Config::load(&path);
        unsafe { remove_env("API_BASE_URL") };

        let err = result.unwrap_err().to_string();
        assert!(err.contains("base_url must start with http"), "got: {err}");
    }

    #[test]
    fn unparseable_base_url_is_rejected() {
        let _lock = ENV_MUTEX.lock().unwrap();
        unsafe { remove_env("API_BASE_URL") };
        let dir = tempfile::tempdir().unwrap();
        let path = write_config(
            &dir,
            r#"
[server]
listen_addr = "127.0.0.1:3000"

[api]
base_url = "http://"
"#,
        );

        let err = Config::load(&path).unwrap_err();
        assert!(matches!(err, common::Error::Url(_)), "got: {err:?}");
    }

    #[test]
    fn zero_timeout_rejected() {
        let _lock = ENV_MUTEX.lock().unwrap();
        unsafe { remove_env("API_BASE_URL") };
        let dir = tempfile::tempdir().unwrap();
        let path = write_config(
            &dir,
            r#"
[server]
listen_addr = "127.0.0.1:3000"

[api]
base_url = "http://localhost:9000"
timeout_secs = 0
"#,
        );

        assert!(Config::load(&path).is_err(), "timeout_secs = 0 must be rejected");
    }

    #[test]
    fn zero_max_connections_rejected() {
        let _lock = ENV_MUTEX.lock().unwrap();
        unsafe { remove_env("API_BASE_URL") };
        let dir = tempfile::tempdir().unwrap();
        let path = write_config(
            &dir,
            r#"
[server]
listen_addr = "127.0.0.1:3000"
max_connections = 0

[api]
base_url = "http://localhost:9000"
"#,
        );

        assert!(Config::load(&path).is_err(), "max_connections = 0 must be rejected");
    }

    #[test]
    fn relative_login_path_rejected() {
        let _lock = ENV_MUTEX.lock().unwrap();
        unsafe { remove_env("API_BASE_URL") };
        let dir = tempfile::tempdir().unwrap();
        let path = write_config(
            &dir,
            r#"
[server]
listen_addr = "127.0.0.1:3000"

[api]
base_url = "http://localhost:9000"

[session]
login_path = "auth/login"
"#,
        );

        let err = Config::load(&path).unwrap_err().to_string();
        assert!(err.contains("login_path must start with '/'"), "got: {err}");
    }

    #[test]
    fn missing_file_and_bad_toml_fail() {
        assert!(matches!(
            Config::load(Path::new("/nonexistent/storefront-bff.toml")),
            Err(common::Error::Io(_))
        ));

        let dir = tempfile::tempdir().unwrap();
        let path = write_config(&dir, "not valid {{{{ toml");
        assert!(matches!(Config::load(&path), Err(common::Error::Toml(_))));
    }

    #[test]
    fn resolve_path_cli_arg() {
        let path = Config::resolve_path(Some("/custom/path.toml"));
        assert_eq!(path, PathBuf::from("/custom/path.toml"));
    }

    #[test]
    fn resolve_path_env_var() {
        let _lock = ENV_MUTEX.lock().unwrap();
        unsafe { set_env("CONFIG_PATH", "/env/path.toml") };
        let path = Config::resolve_path(None);
        unsafe { remove_env("CONFIG_PATH") };
        assert_eq!(path, PathBuf::from("/env/path.toml"));
    }

    #[test]
    fn resolve_path_default() {
        let _lock = ENV_MUTEX.lock().unwrap();
        unsafe { remove_env("CONFIG_PATH") };
        assert_eq!(Config::resolve_path(None), PathBuf::from("storefront-bff.toml"));
    }

    #[test]
    fn resolve_path_cli_overrides_env() {
        let _lock = ENV_MUTEX.lock().unwrap();
        unsafe { set_env("CONFIG_PATH", "/env/should-lose.toml") };
        let path = Config::resolve_path(Some("/cli/wins.toml"));
        unsafe { remove_env("CONFIG_PATH") };
        assert_eq!(path, PathBuf::from("/cli/wins.toml"));
    }
}
