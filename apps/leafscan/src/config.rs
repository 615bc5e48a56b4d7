use std::{
    fs,
    path::{Path, PathBuf},
    time::Duration,
};

use anyhow::Context;
use client_core::{
    ApiEndpoint, ClientError, ClientOptions, Deployment, DEFAULT_MAX_UPLOAD_BYTES,
    DEFAULT_REQUEST_TIMEOUT,
};
use serde::Deserialize;

const CONFIG_FILE_NAME: &str = "leafscan.toml";
const CONFIG_DIR_NAME: &str = "leafscan";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Settings {
    /// Explicit base URL; takes precedence over `deployment`.
    pub api_url: Option<String>,
    pub deployment: Deployment,
    pub request_timeout_secs: u64,
    pub max_upload_bytes: usize,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            api_url: None,
            deployment: Deployment::default(),
            request_timeout_secs: DEFAULT_REQUEST_TIMEOUT.as_secs(),
            max_upload_bytes: DEFAULT_MAX_UPLOAD_BYTES,
        }
    }
}

impl Settings {
    pub fn endpoint(&self) -> Result<ApiEndpoint, ClientError> {
        match self.api_url.as_deref() {
            Some(url) => ApiEndpoint::parse(url),
            None => ApiEndpoint::for_deployment(self.deployment),
        }
    }

    pub fn client_options(&self) -> ClientOptions {
        ClientOptions {
            request_timeout: Duration::from_secs(self.request_timeout_secs.max(1)),
            max_upload_bytes: self.max_upload_bytes,
        }
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct FileConfig {
    api_url: Option<String>,
    deployment: Option<String>,
    request_timeout_secs: Option<u64>,
    max_upload_bytes: Option<usize>,
}

/// Defaults, then the config file, then the process environment.
pub fn load_settings(explicit_path: Option<&Path>) -> anyhow::Result<Settings> {
    let mut settings = Settings::default();

    match explicit_path {
        Some(path) => {
            let raw = fs::read_to_string(path)
                .with_context(|| format!("failed to read config file {}", path.display()))?;
            apply_file(&mut settings, &raw)
                .with_context(|| format!("invalid config file {}", path.display()))?;
        }
        None => {
            if let Some(path) = discover_config_file() {
                let raw = fs::read_to_string(&path)
                    .with_context(|| format!("failed to read config file {}", path.display()))?;
                apply_file(&mut settings, &raw)
                    .with_context(|| format!("invalid config file {}", path.display()))?;
                tracing::debug!(path = %path.display(), "loaded config file");
            }
        }
    }

    apply_env(&mut settings, |key| std::env::var(key).ok());
    Ok(settings)
}

fn discover_config_file() -> Option<PathBuf> {
    let local = PathBuf::from(CONFIG_FILE_NAME);
    if local.is_file() {
        return Some(local);
    }
    let user = dirs::config_dir()?
        .join(CONFIG_DIR_NAME)
        .join(CONFIG_FILE_NAME);
    user.is_file().then_some(user)
}

fn apply_file(settings: &mut Settings, raw: &str) -> anyhow::Result<()> {
    let file_cfg: FileConfig = toml::from_str(raw)?;

    if let Some(v) = file_cfg.api_url.filter(|v| !v.trim().is_empty()) {
        settings.api_url = Some(v);
    }
    if let Some(v) = file_cfg.deployment {
        settings.deployment = v.parse().map_err(anyhow::Error::msg)?;
    }
    if let Some(v) = file_cfg.request_timeout_secs {
        settings.request_timeout_secs = v;
    }
    if let Some(v) = file_cfg.max_upload_bytes {
        settings.max_upload_bytes = v;
    }
    Ok(())
}

fn apply_env(settings: &mut Settings, lookup: impl Fn(&str) -> Option<String>) {
    let var = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

    if let Some(v) = var("API_URL") {
        settings.api_url = Some(v);
    }
    if let Some(v) = var("APP__API_URL") {
        settings.api_url = Some(v);
    }

    if let Some(v) = var("APP__DEPLOYMENT") {
        match v.parse() {
            Ok(deployment) => settings.deployment = deployment,
            Err(err) => tracing::warn!("ignoring APP__DEPLOYMENT: {err}"),
        }
    }

    if let Some(v) = var("APP__REQUEST_TIMEOUT_SECS") {
        match v.trim().parse::<u64>() {
            Ok(parsed) => settings.request_timeout_secs = parsed,
            Err(_) => tracing::warn!(value = %v, "ignoring APP__REQUEST_TIMEOUT_SECS"),
        }
    }

    if let Some(v) = var("APP__MAX_UPLOAD_BYTES") {
        match v.trim().parse::<usize>() {
            Ok(parsed) => settings.max_upload_bytes = parsed,
            Err(_) => tracing::warn!(value = %v, "ignoring APP__MAX_UPLOAD_BYTES"),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn defaults_target_local_service() {
        let settings = Settings::default();
        assert_eq!(
            settings.endpoint().expect("endpoint").base(),
            "http://localhost:8000"
        );
        assert_eq!(settings.client_options().request_timeout, Duration::from_secs(30));
        assert_eq!(settings.max_upload_bytes, 10 * 1024 * 1024);
    }

    #[test]
    fn file_values_override_defaults() {
        let mut settings = Settings::default();
        apply_file(
            &mut settings,
            r#"
deployment = "android-emulator"
request_timeout_secs = 5
max_upload_bytes = 2048
"#,
        )
        .expect("apply");

        assert_eq!(settings.deployment, Deployment::AndroidEmulator);
        assert_eq!(
            settings.endpoint().expect("endpoint").base(),
            "http://10.0.2.2:8000"
        );
        assert_eq!(settings.request_timeout_secs, 5);
        assert_eq!(settings.max_upload_bytes, 2048);
    }

    #[test]
    fn unknown_file_keys_and_deployments_are_errors() {
        let mut settings = Settings::default();
        assert!(apply_file(&mut settings, "bind_addr = \"0.0.0.0\"").is_err());
        assert!(apply_file(&mut settings, "deployment = \"staging\"").is_err());
    }

    #[test]
    fn prefixed_env_wins_over_plain_and_file() {
        let mut settings = Settings::default();
        apply_file(&mut settings, "api_url = \"http://file:8000\"").expect("apply");
        apply_env(
            &mut settings,
            env(&[
                ("API_URL", "http://plain:8000"),
                ("APP__API_URL", "http://prefixed:8000"),
            ]),
        );
        assert_eq!(settings.api_url.as_deref(), Some("http://prefixed:8000"));
    }

    #[test]
    fn explicit_url_beats_deployment_preset() {
        let mut settings = Settings::default();
        apply_env(
            &mut settings,
            env(&[
                ("APP__DEPLOYMENT", "production"),
                ("API_URL", "http://192.168.1.20:8000/"),
            ]),
        );
        assert_eq!(settings.deployment, Deployment::Production);
        assert_eq!(
            settings.endpoint().expect("endpoint").base(),
            "http://192.168.1.20:8000"
        );
    }

    #[test]
    fn malformed_env_values_are_ignored() {
        let mut settings = Settings::default();
        apply_env(
            &mut settings,
            env(&[
                ("APP__REQUEST_TIMEOUT_SECS", "soon"),
                ("APP__MAX_UPLOAD_BYTES", "-1"),
                ("APP__DEPLOYMENT", "mars"),
                ("API_URL", "   "),
            ]),
        );
        assert_eq!(settings, Settings::default());
    }

    #[test]
    fn zero_timeout_is_raised_to_one_second() {
        let settings = Settings {
            request_timeout_secs: 0,
            ..Settings::default()
        };
        assert_eq!(settings.client_options().request_timeout, Duration::from_secs(1));
    }

    #[test]
    fn missing_explicit_config_file_is_an_error() {
        let path = std::env::temp_dir().join("leafscan-missing-config-for-test.toml");
        let err = load_settings(Some(&path)).expect_err("missing file");
        assert!(err.to_string().contains("failed to read config file"));
    }
}
