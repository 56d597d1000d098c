// Harness configuration: backend chain, capability tables, poll policy
use anyhow::{bail, Context, Result};
use serde::{Deserialize, Deserializer, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::fs;
use std::path::Path;

pub const DEFAULT_CONFIG_PATH: &str = "config/backends.json";
pub const DEFAULT_CONCURRENCY_LIMIT: usize = 3;
pub const DEFAULT_REQUEST_TIMEOUT_MS: u64 = 10_000;
pub const DEFAULT_POLL_INTERVAL_MS: u64 = 100;
pub const DEFAULT_POLL_MAX_ATTEMPTS: u32 = 50;

const PLACEHOLDER_API_KEY: &str = "PLACEHOLDER_RAPIDAPI_KEY";

/// Per-backend mapping from canonical language id to the backend's own
/// identifier. A missing key means the backend cannot run that language.
///
/// Keys are stored lowercase; lookups are case-insensitive.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(transparent)]
pub struct CapabilityTable<T> {
    entries: BTreeMap<String, T>,
}

impl<T> CapabilityTable<T> {
    pub fn get(&self, language: &str) -> Option<&T> {
        self.entries.get(&language.trim().to_lowercase())
    }

    pub fn supports(&self, language: &str) -> bool {
        self.get(language).is_some()
    }

    pub fn languages(&self) -> Vec<String> {
        self.entries.keys().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl<T> FromIterator<(String, T)> for CapabilityTable<T> {
    fn from_iter<I: IntoIterator<Item = (String, T)>>(iter: I) -> Self {
        Self {
            entries: iter
                .into_iter()
                .map(|(lang, id)| (lang.trim().to_lowercase(), id))
                .collect(),
        }
    }
}

impl<'de, T: Deserialize<'de>> Deserialize<'de> for CapabilityTable<T> {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let entries = BTreeMap::<String, T>::deserialize(deserializer)?;
        Ok(entries.into_iter().collect())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PollConfig {
    #[serde(default = "default_poll_interval")]
    pub interval_ms: u64,
    #[serde(default = "default_poll_attempts")]
    pub max_attempts: u32,
}

impl Default for PollConfig {
    fn default() -> Self {
        Self {
            interval_ms: DEFAULT_POLL_INTERVAL_MS,
            max_attempts: DEFAULT_POLL_MAX_ATTEMPTS,
        }
    }
}

/// RapidAPI credentials for a hosted Judge0 instance
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RapidApiAuth {
    /// Environment variable holding the key
    #[serde(default = "default_key_env")]
    pub key_env: String,
    pub host: String,
    #[serde(default, skip_serializing)]
    pub key: Option<String>,
}

impl RapidApiAuth {
    /// Inline key or the env var; placeholders and blanks count as absent
    pub fn resolved_key(&self) -> Option<String> {
        self.key
            .clone()
            .or_else(|| std::env::var(&self.key_env).ok())
            .filter(|k| !k.trim().is_empty() && k != PLACEHOLDER_API_KEY)
    }
}

/// Resource limits forwarded with each Judge0 submission
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Judge0Limits {
    /// Kilobytes
    pub memory_limit: Option<u64>,
    /// Seconds
    pub cpu_time_limit: Option<f64>,
    /// Seconds
    pub wall_time_limit: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Judge0Config {
    pub name: String,
    pub base_url: String,
    #[serde(default)]
    pub auth: Option<RapidApiAuth>,
    #[serde(default)]
    pub limits: Option<Judge0Limits>,
    pub languages: CapabilityTable<u32>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PistonRuntime {
    pub language: String,
    /// `*` resolves to the newest runtime the instance advertises
    #[serde(default = "any_version")]
    pub version: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PistonConfig {
    pub name: String,
    pub base_url: String,
    pub languages: CapabilityTable<PistonRuntime>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum BackendConfig {
    Judge0(Judge0Config),
    Piston(PistonConfig),
}

impl BackendConfig {
    pub fn name(&self) -> &str {
        match self {
            BackendConfig::Judge0(c) => &c.name,
            BackendConfig::Piston(c) => &c.name,
        }
    }

    pub fn base_url(&self) -> &str {
        match self {
            BackendConfig::Judge0(c) => &c.base_url,
            BackendConfig::Piston(c) => &c.base_url,
        }
    }

    pub fn languages(&self) -> Vec<String> {
        match self {
            BackendConfig::Judge0(c) => c.languages.languages(),
            BackendConfig::Piston(c) => c.languages.languages(),
        }
    }
}

/// Complete harness configuration.
///
/// `backends` is ordered by priority: the first entry is tried first.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HarnessConfig {
    #[serde(default = "default_concurrency")]
    pub concurrency_limit: usize,
    #[serde(default = "default_request_timeout")]
    pub request_timeout_ms: u64,
    #[serde(default)]
    pub poll: PollConfig,
    pub backends: Vec<BackendConfig>,
}

impl Default for HarnessConfig {
    /// Self-hosted Judge0, then public Piston, then RapidAPI Judge0
    fn default() -> Self {
        Self {
            concurrency_limit: DEFAULT_CONCURRENCY_LIMIT,
            request_timeout_ms: DEFAULT_REQUEST_TIMEOUT_MS,
            poll: PollConfig::default(),
            backends: vec![
                BackendConfig::Judge0(Judge0Config {
                    name: "judge0-self-hosted".to_string(),
                    base_url: "http://localhost:2358".to_string(),
                    auth: None,
                    limits: Some(Judge0Limits {
                        memory_limit: Some(256_000),
                        cpu_time_limit: Some(5.0),
                        wall_time_limit: Some(10.0),
                    }),
                    languages: default_judge0_languages(),
                }),
                BackendConfig::Piston(PistonConfig {
                    name: "piston".to_string(),
                    base_url: "https://emkc.org/api/v2/piston".to_string(),
                    languages: default_piston_languages(),
                }),
                BackendConfig::Judge0(Judge0Config {
                    name: "judge0-rapidapi".to_string(),
                    base_url: "https://judge0-ce.p.rapidapi.com".to_string(),
                    auth: Some(RapidApiAuth {
                        key_env: default_key_env(),
                        host: "judge0-ce.p.rapidapi.com".to_string(),
                        key: None,
                    }),
                    limits: None,
                    languages: default_judge0_languages(),
                }),
            ],
        }
    }
}

impl HarnessConfig {
    /// Load configuration from a JSON file
    pub fn load(config_path: &Path) -> Result<Self> {
        if !config_path.exists() {
            bail!("Backend config file not found: {}", config_path.display());
        }

        let content = fs::read_to_string(config_path)
            .with_context(|| format!("Failed to read {}", config_path.display()))?;

        let config: HarnessConfig = serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse {}", config_path.display()))?;

        config.validate()?;
        Ok(config)
    }

    /// `CASCADE_CONFIG`, then `config/backends.json`, then built-in defaults.
    /// Environment overrides are applied in every case.
    pub fn load_default() -> Result<Self> {
        let mut config = match std::env::var("CASCADE_CONFIG") {
            Ok(path) => Self::load(Path::new(&path))?,
            Err(_) => {
                let default_path = Path::new(DEFAULT_CONFIG_PATH);
                if default_path.exists() {
                    Self::load(default_path)?
                } else {
                    tracing::info!("No backend config file found, using built-in defaults");
                    Self::default()
                }
            }
        };
        config.apply_overrides(|key| std::env::var(key).ok());
        config.validate()?;
        Ok(config)
    }

    /// Apply `JUDGE0_URL`, `PISTON_URL` and `RAPIDAPI_KEY` overrides
    pub fn apply_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let judge0_url = lookup("JUDGE0_URL").filter(|v| !v.is_empty());
        let piston_url = lookup("PISTON_URL").filter(|v| !v.is_empty());
        let rapidapi_key = lookup("RAPIDAPI_KEY").filter(|v| !v.is_empty());

        if let Some(url) = judge0_url {
            let self_hosted = self.backends.iter_mut().find_map(|b| match b {
                BackendConfig::Judge0(c) if c.auth.is_none() => Some(c),
                _ => None,
            });
            if let Some(c) = self_hosted {
                c.base_url = url;
            }
        }

        if let Some(url) = piston_url {
            let piston = self.backends.iter_mut().find_map(|b| match b {
                BackendConfig::Piston(c) => Some(c),
                _ => None,
            });
            if let Some(c) = piston {
                c.base_url = url;
            }
        }

        if let Some(key) = rapidapi_key {
            for backend in &mut self.backends {
                if let BackendConfig::Judge0(Judge0Config { auth: Some(auth), .. }) = backend {
                    if auth.key.is_none() {
                        auth.key = Some(key.clone());
                    }
                }
            }
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.concurrency_limit == 0 {
            bail!("concurrency_limit must be at least 1");
        }
        if self.poll.max_attempts == 0 {
            bail!("poll.max_attempts must be at least 1");
        }
        if self.backends.is_empty() {
            bail!("No execution backends configured");
        }

        let mut seen = HashSet::new();
        for backend in &self.backends {
            if !seen.insert(backend.name()) {
                bail!("Duplicate backend name: {}", backend.name());
            }
            if backend.base_url().trim().is_empty() {
                bail!("Backend '{}' has an empty base_url", backend.name());
            }
        }
        Ok(())
    }

    pub fn backend_names(&self) -> Vec<String> {
        self.backends.iter().map(|b| b.name().to_string()).collect()
    }
}

fn default_concurrency() -> usize {
    DEFAULT_CONCURRENCY_LIMIT
}

fn default_request_timeout() -> u64 {
    DEFAULT_REQUEST_TIMEOUT_MS
}

fn default_poll_interval() -> u64 {
    DEFAULT_POLL_INTERVAL_MS
}

fn default_poll_attempts() -> u32 {
    DEFAULT_POLL_MAX_ATTEMPTS
}

fn default_key_env() -> String {
    "RAPIDAPI_KEY".to_string()
}

fn any_version() -> String {
    "*".to_string()
}

/// Judge0 CE language ids
pub fn default_judge0_languages() -> CapabilityTable<u32> {
    [
        ("c", 50),
        ("cpp", 54),
        ("java", 62),
        ("python", 71),
        ("javascript", 63),
        ("typescript", 74),
        ("csharp", 51),
        ("go", 60),
        ("rust", 73),
        ("swift", 83),
        ("ruby", 72),
        ("php", 68),
        ("sql", 82),
        ("kotlin", 78),
        ("r", 80),
        ("perl", 85),
    ]
    .into_iter()
    .map(|(lang, id)| (lang.to_string(), id))
    .collect()
}

/// Piston runtime names; versions resolve at first use
pub fn default_piston_languages() -> CapabilityTable<PistonRuntime> {
    [
        ("c", "c"),
        ("cpp", "cpp"),
        ("java", "java"),
        ("python", "python3"),
        ("javascript", "javascript"),
        ("typescript", "typescript"),
        ("csharp", "csharp"),
        ("go", "go"),
        ("rust", "rust"),
        ("swift", "swift"),
        ("ruby", "ruby"),
        ("php", "php"),
        ("kotlin", "kotlin"),
        ("perl", "perl"),
    ]
    .into_iter()
    .map(|(lang, runtime)| {
        (
            lang.to_string(),
            PistonRuntime {
                language: runtime.to_string(),
                version: any_version(),
            },
        )
    })
    .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_default_chain_order() {
        let config = HarnessConfig::default();
        assert_eq!(
            config.backend_names(),
            vec!["judge0-self-hosted", "piston", "judge0-rapidapi"]
        );
        assert_eq!(config.concurrency_limit, 3);
        assert_eq!(config.poll.interval_ms, 100);
        assert_eq!(config.poll.max_attempts, 50);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_capability_lookup_is_case_insensitive() {
        let table = default_judge0_languages();
        assert_eq!(table.get("C"), Some(&50));
        assert_eq!(table.get(" python "), Some(&71));
        assert!(table.get("brainfuck").is_none());

        let piston = default_piston_languages();
        assert_eq!(piston.get("python").map(|r| r.language.as_str()), Some("python3"));
        // sql and r are Judge0-only
        assert!(!piston.supports("sql"));
        assert!(!piston.supports("r"));
    }

    #[test]
    fn test_capability_table_lowercases_keys_on_parse() {
        let table: CapabilityTable<u32> = serde_json::from_str(r#"{"C": 50, "Python": 71}"#).unwrap();
        assert_eq!(table.languages(), vec!["c".to_string(), "python".to_string()]);
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"{{
                "concurrency_limit": 2,
                "backends": [
                    {{"kind": "piston", "name": "p", "base_url": "http://p",
                      "languages": {{"python": {{"language": "python3"}}}}}},
                    {{"kind": "judge0", "name": "j", "base_url": "http://j",
                      "languages": {{"c": 50}}}}
                ]
            }}"#
        )
        .unwrap();

        let config = HarnessConfig::load(file.path()).unwrap();
        assert_eq!(config.concurrency_limit, 2);
        assert_eq!(config.request_timeout_ms, DEFAULT_REQUEST_TIMEOUT_MS);
        assert_eq!(config.poll, PollConfig::default());
        assert_eq!(config.backend_names(), vec!["p", "j"]);

        match &config.backends[0] {
            BackendConfig::Piston(p) => {
                assert_eq!(p.languages.get("python").unwrap().version, "*");
            }
            other => panic!("unexpected backend: {:?}", other),
        }
    }

    #[test]
    fn test_load_missing_file_fails() {
        let result = HarnessConfig::load(Path::new("/nonexistent/backends.json"));
        assert!(result.is_err());
    }

    #[test]
    fn test_validate_rejects_duplicates_and_zero_limits() {
        let mut config = HarnessConfig::default();
        config.concurrency_limit = 0;
        assert!(config.validate().is_err());

        let mut config = HarnessConfig::default();
        let first = config.backends[0].clone();
        config.backends.push(first);
        assert!(config.validate().is_err());

        let mut config = HarnessConfig::default();
        config.backends.clear();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_env_overrides() {
        let mut config = HarnessConfig::default();
        config.apply_overrides(|key| match key {
            "JUDGE0_URL" => Some("http://judge0.internal:2358".to_string()),
            "PISTON_URL" => Some("http://piston.internal".to_string()),
            "RAPIDAPI_KEY" => Some("secret".to_string()),
            _ => None,
        });

        assert_eq!(config.backends[0].base_url(), "http://judge0.internal:2358");
        assert_eq!(config.backends[1].base_url(), "http://piston.internal");
        match &config.backends[2] {
            BackendConfig::Judge0(c) => {
                // RapidAPI url is not touched by JUDGE0_URL
                assert_eq!(c.base_url, "https://judge0-ce.p.rapidapi.com");
                let auth = c.auth.as_ref().unwrap();
                assert_eq!(auth.resolved_key().as_deref(), Some("secret"));
            }
            other => panic!("unexpected backend: {:?}", other),
        }
    }

    #[test]
    fn test_placeholder_key_counts_as_missing() {
        let auth = RapidApiAuth {
            key_env: "CASCADE_TEST_UNSET_KEY_VAR".to_string(),
            host: "h".to_string(),
            key: Some(PLACEHOLDER_API_KEY.to_string()),
        };
        assert!(auth.resolved_key().is_none());
    }
}
