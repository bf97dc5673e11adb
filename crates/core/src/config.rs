use serde::Deserialize;

/// Root application configuration. Loaded from environment variables
/// with the prefix `FUNNEL_BUILDER__`.
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub api: ApiConfig,
    #[serde(default)]
    pub metrics: MetricsConfig,
    #[serde(default)]
    pub editor: EditorConfig,
    #[serde(default)]
    pub store: StoreConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ApiConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_http_port")]
    pub http_port: u16,
}

#[derive(Debug, Clone, Deserialize)]
pub struct MetricsConfig {
    #[serde(default = "default_metrics_enabled")]
    pub enabled: bool,
    #[serde(default = "default_metrics_port")]
    pub port: u16,
}

// ─── Editor Config ──────────────────────────────────────────────────────

/// Editor policies that live outside the pure editing functions.
#[derive(Debug, Clone, Deserialize)]
pub struct EditorConfig {
    /// Upper bound on variants per A/B test. Enforced by the editor session,
    /// not by the allocator.
    #[serde(default = "default_max_variants")]
    pub max_variants: usize,
    #[serde(default = "default_autosave_interval_secs")]
    pub autosave_interval_secs: u64,
}

// ─── Store Config ───────────────────────────────────────────────────────

#[derive(Debug, Clone, Deserialize)]
pub struct StoreConfig {
    #[serde(default = "default_seed_demo_data")]
    pub seed_demo_data: bool,
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}
fn default_http_port() -> u16 {
    8080
}
fn default_metrics_enabled() -> bool {
    true
}
fn default_metrics_port() -> u16 {
    9091
}
fn default_max_variants() -> usize { 4 }
fn default_autosave_interval_secs() -> u64 { 30 }
fn default_seed_demo_data() -> bool { true }

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            http_port: default_http_port(),
        }
    }
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            enabled: default_metrics_enabled(),
            port: default_metrics_port(),
        }
    }
}

impl Default for EditorConfig {
    fn default() -> Self {
        Self {
            max_variants: default_max_variants(),
            autosave_interval_secs: default_autosave_interval_secs(),
        }
    }
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            seed_demo_data: default_seed_demo_data(),
        }
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            api: ApiConfig::default(),
            metrics: MetricsConfig::default(),
            editor: EditorConfig::default(),
            store: StoreConfig::default(),
        }
    }
}

impl AppConfig {
    /// Load configuration from environment variables.
    pub fn load() -> Result<Self, config::ConfigError> {
        let builder = config::Config::builder().add_source(
            config::Environment::with_prefix("FUNNEL_BUILDER")
                .separator("__")
                .try_parsing(true)
                .list_separator(","),
        );

        let config = builder.build()?;
        config.try_deserialize()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = AppConfig::default();
        assert_eq!(config.api.http_port, 8080);
        assert_eq!(config.editor.max_variants, 4);
        assert!(config.store.seed_demo_data);
    }

    #[test]
    fn test_partial_deserialize_fills_defaults() {
        let config: AppConfig =
            serde_json::from_str(r#"{"api": {"http_port": 3000}}"#).unwrap();
        assert_eq!(config.api.http_port, 3000);
        assert_eq!(config.api.host, "0.0.0.0");
        assert_eq!(config.metrics.port, 9091);
    }

    #[test]
    fn test_editor_section() {
        let config: AppConfig =
            serde_json::from_str(r#"{"editor": {"max_variants": 3}}"#).unwrap();
        assert_eq!(config.editor.max_variants, 3);
        assert_eq!(config.editor.autosave_interval_secs, 30);
    }
}
