//! Loader for workspace configuration with YAML + environment overlays.
//!
//! Sources merge in order: the YAML file, then `BROADSHEET_`-prefixed
//! environment variables (`BROADSHEET_CASCADE__REQUEST_DEADLINE_SECONDS=30`),
//! then `${VAR}` placeholders are expanded recursively before the typed
//! config materialises.
use broadsheet_drivers::StealthProfile;
use broadsheet_llm::LlmConfig;
use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;
use serde_json::Value;
use std::path::Path;

const MAXIMUM_ENV_EXPANSION_DEPTH: usize = 8;

#[derive(Debug, Deserialize)]
pub struct BroadsheetConfig {
    pub version: Option<String>,
    #[serde(default)]
    pub pipeline: PipelineSettings,
    #[serde(default)]
    pub cascade: CascadeSettings,
    #[serde(default)]
    pub validation: ValidationSettings,
    #[serde(default)]
    pub cache: CacheSettings,
    #[serde(default)]
    pub session: SessionSettings,
    #[serde(default)]
    pub rate: RateSettings,
    /// SQLite URL for selector snapshots and session state.
    #[serde(default = "default_state_db")]
    pub state_db: String,
    /// Selector-synthesis model; absent means the synthesis strategy is off.
    #[serde(default)]
    pub llm: Option<LlmConfig>,
    /// Archival mirror; absent means no last-resort fallback.
    #[serde(default)]
    pub archive: Option<ArchiveSettings>,
    /// Browser automation for session renewal; absent means paywalled
    /// domains degrade to stale credentials and unauthenticated fetches.
    #[serde(default)]
    pub browser: Option<BrowserSettings>,
}

fn default_state_db() -> String {
    "sqlite://broadsheet.db".to_string()
}

#[derive(Debug, Deserialize)]
pub struct PipelineSettings {
    /// Worker pool size for concurrent requests.
    pub workers: usize,
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Self { workers: 8 }
    }
}

#[derive(Debug, Deserialize)]
pub struct CascadeSettings {
    pub request_deadline_seconds: u64,
    pub per_domain_concurrency_limit: usize,
    pub max_network_retries: usize,
}

impl Default for CascadeSettings {
    fn default() -> Self {
        Self {
            request_deadline_seconds: 90,
            per_domain_concurrency_limit: 2,
            max_network_retries: 2,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct ValidationSettings {
    pub min_word_count: usize,
}

impl Default for ValidationSettings {
    fn default() -> Self {
        Self {
            min_word_count: 120,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct CacheSettings {
    pub selector_cache_max_entries: usize,
    pub selector_cache_ttl_days: i64,
}

impl Default for CacheSettings {
    fn default() -> Self {
        Self {
            selector_cache_max_entries: 512,
            selector_cache_ttl_days: 14,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct SessionSettings {
    pub session_renewal_threshold_days: i64,
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            session_renewal_threshold_days: 7,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct RateSettings {
    /// Steady direct-fetch rate per origin domain.
    pub per_domain_qps: f64,
    pub per_domain_burst: u32,
}

impl Default for RateSettings {
    fn default() -> Self {
        Self {
            per_domain_qps: 0.5,
            per_domain_burst: 2,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct ArchiveSettings {
    pub endpoint: String,
    #[serde(default)]
    pub token: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct BrowserSettings {
    #[serde(default = "default_webdriver_url")]
    pub webdriver_url: String,
    #[serde(default = "default_headless")]
    pub headless: bool,
    #[serde(default)]
    pub stealth: StealthProfile,
}

fn default_webdriver_url() -> String {
    "http://localhost:9515".to_string()
}

fn default_headless() -> bool {
    true
}

fn expand_env_in_value(v: &mut Value) {
    match v {
        Value::String(s) => {
            if s.contains('$') {
                let mut cur = std::mem::take(s);
                for _ in 0..MAXIMUM_ENV_EXPANSION_DEPTH {
                    let expanded = match shellexpand::env(&cur) {
                        Ok(cow) => cow.into_owned(),
                        Err(_) => cur.clone(),
                    };
                    if expanded == cur {
                        break;
                    }
                    cur = expanded;
                }
                *s = cur;
            }
        }
        Value::Array(arr) => arr.iter_mut().for_each(expand_env_in_value),
        Value::Object(obj) => obj.values_mut().for_each(expand_env_in_value),
        _ => {}
    }
}

/// Builder hides the `config` crate wiring (YAML + env overrides).
pub struct BroadsheetConfigLoader {
    builder: config::ConfigBuilder<config::builder::DefaultState>,
}

impl Default for BroadsheetConfigLoader {
    fn default() -> Self {
        Self::new()
    }
}

impl BroadsheetConfigLoader {
    /// Start with sensible defaults: YAML file + `BROADSHEET_` env overrides.
    ///
    /// ```
    /// use broadsheet_config::BroadsheetConfigLoader;
    ///
    /// let config = BroadsheetConfigLoader::new()
    ///     .with_yaml_str("version: '1'")
    ///     .load()
    ///     .expect("valid config");
    ///
    /// assert_eq!(config.version.as_deref(), Some("1"));
    /// assert_eq!(config.cascade.request_deadline_seconds, 90);
    /// assert!(config.llm.is_none());
    /// ```
    pub fn new() -> Self {
        let builder =
            Config::builder().add_source(Environment::with_prefix("BROADSHEET").separator("__"));
        Self { builder }
    }

    /// Attach a YAML/TOML/JSON file; the `config` crate infers format by suffix.
    pub fn with_file<P: AsRef<Path>>(mut self, path: P) -> Self {
        self.builder = self
            .builder
            .add_source(File::from(path.as_ref()).required(true));
        self
    }

    /// Allow tests/CLI to merge inline YAML snippets.
    pub fn with_yaml_str(mut self, yaml: &str) -> Self {
        self.builder = self
            .builder
            .add_source(File::from_str(yaml, config::FileFormat::Yaml));
        self
    }

    /// Consume the builder and deserialize the merged sources into strongly
    /// typed config, expanding `${VAR}` placeholders first.
    ///
    /// ```
    /// use broadsheet_config::BroadsheetConfigLoader;
    /// use broadsheet_llm::LlmConfig;
    ///
    /// unsafe { std::env::set_var("SYNTH_KEY", "injected-from-env"); }
    ///
    /// let config = BroadsheetConfigLoader::new()
    ///     .with_yaml_str(r#"
    /// version: "1"
    /// llm:
    ///   provider: "openai"
    ///   model: "gpt-4o-mini"
    ///   api_key: "${SYNTH_KEY}"
    /// "#)
    ///     .load()
    ///     .expect("valid configuration");
    ///
    /// match config.llm {
    ///     Some(LlmConfig::Openai { api_key, model, .. }) => {
    ///         assert_eq!(api_key, "injected-from-env");
    ///         assert_eq!(model, "gpt-4o-mini");
    ///     }
    ///     other => panic!("expected OpenAI configuration, got {other:?}"),
    /// }
    ///
    /// unsafe { std::env::remove_var("SYNTH_KEY"); }
    /// ```
    pub fn load(self) -> Result<BroadsheetConfig, ConfigError> {
        let cfg = self.builder.build()?;

        // Convert to serde_json::Value first
        let mut v: Value = cfg.try_deserialize()?;
        // Recursively expand environment variables
        expand_env_in_value(&mut v);

        // Deserialize into the strongly-typed config
        let typed: BroadsheetConfig =
            serde_json::from_value(v).map_err(|e| ConfigError::Message(e.to_string()))?;

        Ok(typed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn expands_simple_string() {
        temp_env::with_var("FOO", Some("bar"), || {
            let mut v = json!("prefix-${FOO}-suffix");
            expand_env_in_value(&mut v);
            assert_eq!(v, json!("prefix-bar-suffix"));
        });
    }

    #[test]
    fn expands_in_array_and_object() {
        temp_env::with_vars([("CITY", Some("Duluth")), ("STATE", Some("MN"))], || {
            let mut v = json!([
                "hello-$CITY",
                { "loc": "${CITY}-${STATE}" },
                42,
                true,
                null
            ]);
            expand_env_in_value(&mut v);
            assert_eq!(
                v,
                json!(["hello-Duluth", { "loc": "Duluth-MN" }, 42, true, null])
            );
        });
    }

    #[test]
    fn expands_recursively_across_env_values() {
        temp_env::with_vars(
            [
                ("BAZ", Some("qux")),
                ("BAR", Some("mid-${BAZ}")),
                ("FOO", Some("start-${BAR}-end")),
            ],
            || {
                let mut v = json!("X=${FOO}");
                expand_env_in_value(&mut v);
                assert_eq!(v, json!("X=start-mid-qux-end"));
            },
        );
    }

    #[test]
    fn stops_on_cycles_and_leaves_value_reasonable() {
        temp_env::with_vars([("A", Some("${B}")), ("B", Some("${A}"))], || {
            let mut v = json!("x=${A}-y");
            // With the depth cap this terminates instead of looping forever.
            expand_env_in_value(&mut v);
            let s = v.as_str().unwrap();
            assert!(s.starts_with("x=") && s.ends_with("-y"));
            assert!(s.contains("${"));
        });
    }

    #[test]
    fn unknown_vars_are_left_as_is() {
        let mut v = json!("hi-${DOES_NOT_EXIST}");
        expand_env_in_value(&mut v);
        assert_eq!(v, json!("hi-${DOES_NOT_EXIST}"));
    }
}
