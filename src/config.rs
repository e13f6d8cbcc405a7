//! Application configuration
//!
//! Loaded from a TOML file (missing file means defaults) and then
//! overridden by environment variables for secrets and assistant ids.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("failed to parse config {path}: {source}")]
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },
    #[error("missing required setting: {0}")]
    Missing(&'static str),
}

/// Top-level configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub openai: OpenAiConfig,
    pub assistants: AssistantIds,
    pub ledger: LedgerConfig,
    pub storage: StorageConfig,
    pub sharing: SharingConfig,
    pub driver: DriverSettings,
    pub telemetry: TelemetryConfig,
    pub eval: EvalConfig,
    /// Directory for saved sessions (defaults to ~/.medshare/sessions)
    pub sessions_dir: Option<PathBuf>,
}

/// Hosted assistant API settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OpenAiConfig {
    pub api_key: String,
    pub base_url: String,
    /// Model used for the web-search calls
    pub search_model: String,
}

impl Default for OpenAiConfig {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            base_url: "https://api.openai.com/v1".to_string(),
            search_model: "gpt-4o".to_string(),
        }
    }
}

/// Ids of the hosted assistants, one per agent
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AssistantIds {
    pub orchestrator: String,
    pub regulation: String,
    pub consent: String,
    pub filtering: String,
    /// Vector store backing the regulation assistant's file search
    pub vector_store: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LedgerConfig {
    pub rpc_url: String,
    /// Hex private key of the sending account
    pub sender_key: String,
    pub consent_contract: String,
    pub data_contract: String,
    /// Wait for a receipt after submitting transactions
    pub await_confirmation: bool,
    pub confirmation_poll_ms: u64,
    pub confirmation_attempts: u32,
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            rpc_url: String::new(),
            sender_key: String::new(),
            consent_contract: "0x39daf39dc5999B19fc737AfF18B1513B477f4BFf".to_string(),
            data_contract: "0xb9cf17726836E7c067124F947255329c31D23429".to_string(),
            await_confirmation: false,
            confirmation_poll_ms: 2000,
            confirmation_attempts: 30,
        }
    }
}

impl LedgerConfig {
    pub fn confirmation_poll(&self) -> Duration {
        Duration::from_millis(self.confirmation_poll_ms)
    }
}

/// Content-addressed storage (Pinata) credentials
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    pub endpoint: String,
    pub api_key: String,
    pub secret_api_key: String,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            endpoint: "https://api.pinata.cloud".to_string(),
            api_key: String::new(),
            secret_api_key: String::new(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SharingConfig {
    /// Base64 pre-shared AES key (16, 24 or 32 bytes decoded)
    pub aes_key: String,
    /// Where the filtering agent writes the filtered patient file
    pub output_path: PathBuf,
}

impl Default for SharingConfig {
    fn default() -> Self {
        Self {
            aes_key: String::new(),
            output_path: PathBuf::from("filtered_file.txt"),
        }
    }
}

/// Run polling behaviour
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DriverSettings {
    pub poll_interval_ms: u64,
    /// Upper bound on polls per run (unbounded when absent)
    pub max_polls: Option<usize>,
}

impl Default for DriverSettings {
    fn default() -> Self {
        Self {
            poll_interval_ms: 500,
            max_polls: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TelemetryConfig {
    pub service_name: String,
    /// OTLP collector endpoint; spans are only exported when set
    pub otlp_endpoint: Option<String>,
    pub log_filter: String,
    /// Emit log lines as JSON objects instead of human-readable text
    pub json_logs: bool,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            service_name: "medshare".to_string(),
            otlp_endpoint: None,
            log_filter: "info,medshare=debug".to_string(),
            json_logs: false,
        }
    }
}

/// Provider credentials and model names for the evaluation harness
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EvalConfig {
    pub openai_model: String,
    pub anthropic_api_key: String,
    pub anthropic_model: String,
    pub gemini_api_key: String,
    pub gemini_model: String,
    pub together_api_key: String,
    pub deepseek_model: String,
    pub mistral_model: String,
    pub qwen_model: String,
}

impl Default for EvalConfig {
    fn default() -> Self {
        Self {
            openai_model: "gpt-4.1".to_string(),
            anthropic_api_key: String::new(),
            anthropic_model: "claude-sonnet-4-20250514".to_string(),
            gemini_api_key: String::new(),
            gemini_model: "gemini-2.5-pro".to_string(),
            together_api_key: String::new(),
            deepseek_model: "deepseek-ai/DeepSeek-V3".to_string(),
            mistral_model: "mistralai/Mistral-7B-Instruct-v0.3".to_string(),
            qwen_model: "Qwen/Qwen3-235B-A22B-fp8-tput".to_string(),
        }
    }
}

impl AppConfig {
    /// Default config file location (~/.medshare/config.toml)
    pub fn default_path() -> PathBuf {
        base_dir().join("config.toml")
    }

    /// Load from `path`, falling back to defaults when the file does not
    /// exist, then apply environment overrides
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let path = path.map(Path::to_path_buf).unwrap_or_else(Self::default_path);
        let mut config = if path.exists() {
            let text = std::fs::read_to_string(&path).map_err(|source| ConfigError::Read {
                path: path.clone(),
                source,
            })?;
            Self::from_toml(&text).map_err(|source| ConfigError::Parse { path, source })?
        } else {
            Self::default()
        };
        config.apply_env(|key| std::env::var(key).ok());
        Ok(config)
    }

    pub fn from_toml(text: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(text)
    }

    /// Override settings from environment variables
    ///
    /// `lookup` is injected so tests don't touch the process environment.
    pub fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        let set = |target: &mut String, keys: &[&str]| {
            if let Some(v) = keys.iter().find_map(|k| lookup(*k)).filter(|v| !v.is_empty()) {
                *target = v;
            }
        };
        set(&mut self.openai.api_key, &["MEDSHARE_OPENAI_API_KEY", "OPENAI_API_KEY"]);
        set(&mut self.openai.base_url, &["MEDSHARE_OPENAI_BASE_URL"]);
        set(&mut self.assistants.orchestrator, &["MEDSHARE_ORCHESTRATOR_ASSISTANT_ID"]);
        set(&mut self.assistants.regulation, &["MEDSHARE_REGULATION_ASSISTANT_ID"]);
        set(&mut self.assistants.consent, &["MEDSHARE_CONSENT_ASSISTANT_ID"]);
        set(&mut self.assistants.filtering, &["MEDSHARE_FILTERING_ASSISTANT_ID"]);
        set(&mut self.assistants.vector_store, &["MEDSHARE_VECTOR_STORE_ID"]);
        set(&mut self.ledger.rpc_url, &["MEDSHARE_RPC_URL"]);
        set(&mut self.ledger.sender_key, &["MEDSHARE_SENDER_KEY"]);
        set(&mut self.storage.api_key, &["PINATA_API_KEY"]);
        set(&mut self.storage.secret_api_key, &["PINATA_SECRET_API_KEY"]);
        set(&mut self.sharing.aes_key, &["MEDSHARE_AES_KEY"]);
        set(&mut self.eval.anthropic_api_key, &["ANTHROPIC_API_KEY"]);
        set(&mut self.eval.gemini_api_key, &["GOOGLE_API_KEY"]);
        set(&mut self.eval.together_api_key, &["TOGETHER_API_KEY"]);
    }

    pub fn sessions_dir(&self) -> PathBuf {
        self.sessions_dir
            .clone()
            .unwrap_or_else(|| base_dir().join("sessions"))
    }

    /// Ensure everything the chat pipeline needs is present
    pub fn validate_for_chat(&self) -> Result<(), ConfigError> {
        let required: [(&str, &'static str); 7] = [
            (&self.openai.api_key, "openai.api_key"),
            (&self.assistants.orchestrator, "assistants.orchestrator"),
            (&self.assistants.regulation, "assistants.regulation"),
            (&self.assistants.consent, "assistants.consent"),
            (&self.assistants.filtering, "assistants.filtering"),
            (&self.ledger.rpc_url, "ledger.rpc_url"),
            (&self.ledger.sender_key, "ledger.sender_key"),
        ];
        match required.iter().find(|(v, _)| v.trim().is_empty()) {
            Some((_, name)) => Err(ConfigError::Missing(name)),
            None => Ok(()),
        }
    }
}

fn base_dir() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".medshare")
}
