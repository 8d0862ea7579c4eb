//! Configuration management for the smmaker pipeline
//!
//! Secrets and endpoints come from environment variables with sensible
//! defaults; prompt templates and schedule definitions come from a TOML
//! document loaded once at process start. The loaded configuration is
//! immutable for the process lifetime.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;

use crate::cache::{DEFAULT_MAXSIZE, DEFAULT_TTL_SECS};
use crate::models::{GenerationParams, ScheduleDefinition};

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Google Sheets content source
    pub sheets: SheetsConfig,

    /// OpenAI text/image generation
    pub openai: OpenAiConfig,

    /// YandexGPT text generation
    pub yandex: YandexConfig,

    /// Image generation selection
    pub image: ImageConfig,

    /// FusionBrain image generation
    pub fusionbrain: FusionBrainConfig,

    /// VK publishing channel
    pub vk: VkConfig,

    /// Telegram publishing channel
    pub telegram: TelegramConfig,

    /// Vector archive (post history / style examples)
    pub archive: ArchiveConfig,

    /// Generation deduplication cache
    pub cache: CacheConfig,

    /// Logging configuration
    pub logging: LoggingConfig,

    /// Prompt key used for immediate runs not tied to a schedule
    pub default_prompt_key: String,

    /// Prompt templates keyed by prompt_key (optionally `<key>_<module>`)
    #[serde(default)]
    pub prompts: HashMap<String, String>,

    /// Schedule definitions; the set is fixed for the process lifetime
    #[serde(default)]
    pub schedules: Vec<ScheduleDefinition>,
}

/// Google Sheets configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SheetsConfig {
    /// Sheets API base URL
    pub api_base: String,

    /// Spreadsheet id
    pub spreadsheet_id: String,

    /// Worksheet (tab) name holding the work items
    pub worksheet: String,

    /// OAuth bearer token for the service account
    pub token: String,
}

/// OpenAI configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OpenAiConfig {
    /// API base URL
    pub api_base: String,

    /// API key
    pub api_key: String,

    /// Text model
    pub model: String,

    /// Sampling temperature for text
    pub temperature: f32,
}

/// YandexGPT configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct YandexConfig {
    /// Foundation Models API base URL
    pub api_base: String,

    /// API key
    pub api_key: String,

    /// Yandex Cloud folder id (part of the model URI)
    pub folder_id: String,

    /// Text model
    pub model: String,

    /// Sampling temperature for text
    pub temperature: f32,
}

/// Image generation configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImageConfig {
    /// Image provider name ("openai", "fusionbrain"); None disables
    /// illustration
    pub provider: Option<String>,

    /// Image model, e.g. "dall-e-3"
    pub model: String,
}

/// FusionBrain configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FusionBrainConfig {
    /// API base URL
    pub api_base: String,

    /// API key (X-Key header)
    pub api_key: String,

    /// API secret (X-Secret header)
    pub secret_key: String,
}

/// VK channel configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VkConfig {
    /// Whether the VK channel participates in runs
    pub enabled: bool,

    /// Access token (user or group)
    pub token: String,

    /// Wall owner id (negative for communities)
    pub owner_id: i64,

    /// VK API method base URL
    pub api_base: String,
}

/// Telegram channel configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TelegramConfig {
    /// Whether the Telegram channel participates in runs
    pub enabled: bool,

    /// Bot token
    pub token: String,

    /// Target chat id or @username
    pub chat_id: String,

    /// Bot API base URL
    pub api_base: String,
}

/// Vector archive configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArchiveConfig {
    /// Whether archiving is attempted at all
    pub enabled: bool,

    /// Vector store base URL
    pub url: String,

    /// Collection name
    pub collection: String,
}

/// Cache configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    /// Maximum entry count
    pub maxsize: usize,

    /// Entry TTL in seconds
    pub ttl_secs: u64,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    pub level: String,

    /// Log format (text, json)
    pub format: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            sheets: SheetsConfig {
                api_base: "https://sheets.googleapis.com/v4".to_string(),
                spreadsheet_id: String::new(),
                worksheet: "posts".to_string(),
                token: String::new(),
            },
            openai: OpenAiConfig {
                api_base: "https://api.openai.com/v1".to_string(),
                api_key: String::new(),
                model: "gpt-4o".to_string(),
                temperature: 0.7,
            },
            yandex: YandexConfig {
                api_base: "https://llm.api.cloud.yandex.net".to_string(),
                api_key: String::new(),
                folder_id: String::new(),
                model: "yandexgpt-lite".to_string(),
                temperature: 0.6,
            },
            image: ImageConfig {
                provider: None,
                model: "dall-e-3".to_string(),
            },
            fusionbrain: FusionBrainConfig {
                api_base: "https://api-key.fusionbrain.ai".to_string(),
                api_key: String::new(),
                secret_key: String::new(),
            },
            vk: VkConfig {
                enabled: false,
                token: String::new(),
                owner_id: 0,
                api_base: "https://api.vk.com/method".to_string(),
            },
            telegram: TelegramConfig {
                enabled: false,
                token: String::new(),
                chat_id: String::new(),
                api_base: "https://api.telegram.org".to_string(),
            },
            archive: ArchiveConfig {
                enabled: false,
                url: "http://localhost:8000".to_string(),
                collection: "smm_posts".to_string(),
            },
            cache: CacheConfig {
                maxsize: DEFAULT_MAXSIZE,
                ttl_secs: DEFAULT_TTL_SECS,
            },
            logging: LoggingConfig {
                level: "info".to_string(),
                format: "text".to_string(),
            },
            default_prompt_key: "daily".to_string(),
            prompts: HashMap::new(),
            schedules: Vec::new(),
        }
    }
}

/// Prompts/schedules section of the configuration file.
#[derive(Debug, Default, Deserialize)]
struct ConfigFile {
    #[serde(default)]
    prompts: HashMap<String, String>,

    #[serde(default)]
    schedules: Vec<ScheduleDefinition>,
}

fn env_or(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

fn env_parsed<T: std::str::FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

impl Config {
    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self> {
        let defaults = Config::default();

        let image_provider = match env_or("IMAGE_NETWORK", "").trim() {
            "" | "none" => None,
            other => Some(other.to_lowercase()),
        };

        Ok(Self {
            sheets: SheetsConfig {
                api_base: env_or("SHEETS_API_BASE", &defaults.sheets.api_base),
                spreadsheet_id: env_or("SHEETS_SPREADSHEET", ""),
                worksheet: env_or("SHEETS_WORKSHEET", &defaults.sheets.worksheet),
                token: env_or("SHEETS_TOKEN", ""),
            },
            openai: OpenAiConfig {
                api_base: env_or("OPENAI_API_BASE", &defaults.openai.api_base),
                api_key: env_or("OPENAI_API_KEY", ""),
                model: env_or("OPENAI_MODEL", &defaults.openai.model),
                temperature: env_parsed("OPENAI_TEMPERATURE", defaults.openai.temperature),
            },
            yandex: YandexConfig {
                api_base: env_or("YANDEX_API_BASE", &defaults.yandex.api_base),
                api_key: env_or("YANDEX_API_KEY", ""),
                folder_id: env_or("YANDEX_CLOUD_FOLDER_ID", ""),
                model: env_or("YANDEXGPT_MODEL", &defaults.yandex.model),
                temperature: env_parsed("YANDEXGPT_TEMPERATURE", defaults.yandex.temperature),
            },
            image: ImageConfig {
                provider: image_provider,
                model: env_or("IMAGE_MODEL", &defaults.image.model),
            },
            fusionbrain: FusionBrainConfig {
                api_base: env_or("FUSIONBRAIN_API_BASE", &defaults.fusionbrain.api_base),
                api_key: env_or("FUSIONBRAIN_API_KEY", ""),
                secret_key: env_or("FUSIONBRAIN_API_SECRET", ""),
            },
            vk: VkConfig {
                enabled: env_parsed("ENABLE_VK", true),
                token: env_or("VK_TOKEN", ""),
                owner_id: env_parsed("VK_OWNER_ID", 0),
                api_base: env_or("VK_API_BASE", &defaults.vk.api_base),
            },
            telegram: TelegramConfig {
                enabled: env_parsed("ENABLE_TG", false),
                token: env_or("TG_TOKEN", ""),
                chat_id: env_or("TG_CHAT_ID", ""),
                api_base: env_or("TG_API_BASE", &defaults.telegram.api_base),
            },
            archive: ArchiveConfig {
                enabled: env_parsed("ENABLE_ARCHIVE", false),
                url: env_or("ARCHIVE_URL", &defaults.archive.url),
                collection: env_or("ARCHIVE_COLLECTION", &defaults.archive.collection),
            },
            cache: CacheConfig {
                maxsize: env_parsed("CACHE_MAXSIZE", DEFAULT_MAXSIZE),
                ttl_secs: env_parsed("CACHE_TTL", DEFAULT_TTL_SECS),
            },
            logging: LoggingConfig {
                level: env_or("SMMAKER_LOG_LEVEL", &defaults.logging.level),
                format: env_or("SMMAKER_LOG_FORMAT", &defaults.logging.format),
            },
            default_prompt_key: env_or("DEFAULT_PROMPT_KEY", &defaults.default_prompt_key),
            prompts: HashMap::new(),
            schedules: Vec::new(),
        })
    }

    /// Load prompts and schedules from a TOML file into this config.
    pub fn load_file(&mut self, path: &Path) -> Result<()> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        let file: ConfigFile = toml::from_str(&raw)
            .with_context(|| format!("Failed to parse config file {}", path.display()))?;

        self.prompts = file.prompts;
        self.schedules = file.schedules;
        Ok(())
    }

    /// Load from environment, then merge the config file if one is given.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut config = Self::from_env()?;
        if let Some(path) = path {
            config.load_file(path)?;
        }
        config.validate()?;
        Ok(config)
    }

    /// Check required settings for the enabled parts of the pipeline.
    pub fn validate(&self) -> Result<()> {
        let mut missing = Vec::new();

        if self.sheets.spreadsheet_id.is_empty() {
            missing.push("SHEETS_SPREADSHEET");
        }
        if self.sheets.token.is_empty() {
            missing.push("SHEETS_TOKEN");
        }
        if self.vk.enabled && self.vk.token.is_empty() {
            missing.push("VK_TOKEN");
        }
        if self.telegram.enabled && self.telegram.token.is_empty() {
            missing.push("TG_TOKEN");
        }
        if self.telegram.enabled && self.telegram.chat_id.is_empty() {
            missing.push("TG_CHAT_ID");
        }

        if self.image.provider.as_deref() == Some("fusionbrain") {
            if self.fusionbrain.api_key.is_empty() {
                missing.push("FUSIONBRAIN_API_KEY");
            }
            if self.fusionbrain.secret_key.is_empty() {
                missing.push("FUSIONBRAIN_API_SECRET");
            }
        }

        let uses_yandex = self
            .schedules
            .iter()
            .any(|s| s.enabled && matches!(s.generator.to_lowercase().as_str(), "yandex" | "yandexgpt"));
        if uses_yandex && self.yandex.api_key.is_empty() {
            missing.push("YANDEX_API_KEY");
        }
        if uses_yandex && self.yandex.folder_id.is_empty() {
            missing.push("YANDEX_CLOUD_FOLDER_ID");
        }

        if !missing.is_empty() {
            anyhow::bail!("Missing required settings: {}", missing.join(", "));
        }

        for schedule in &self.schedules {
            if !self.prompts.contains_key(&schedule.prompt_key)
                && !self
                    .prompts
                    .keys()
                    .any(|k| k.starts_with(&format!("{}_", schedule.prompt_key)))
            {
                tracing::warn!(
                    schedule = %schedule.id,
                    prompt_key = %schedule.prompt_key,
                    "Schedule references a prompt key with no template"
                );
            }
        }

        Ok(())
    }

    /// Channel names enabled in configuration, in publish order.
    pub fn enabled_channels(&self) -> Vec<&'static str> {
        let mut channels = Vec::new();
        if self.vk.enabled {
            channels.push("vk");
        }
        if self.telegram.enabled {
            channels.push("telegram");
        }
        channels
    }

    /// Look up a prompt template, preferring a channel-specific variant.
    ///
    /// `<key>_<module>` wins over `<key>` when the run targets one module.
    pub fn prompt_template(&self, key: &str, module: Option<&str>) -> Option<&str> {
        if let Some(module) = module {
            if let Some(template) = self.prompts.get(&format!("{key}_{module}")) {
                return Some(template.as_str());
            }
        }
        self.prompts.get(key).map(String::as_str)
    }

    /// Model parameters for a canonical text provider name.
    pub fn generation_params(&self, provider: &str) -> GenerationParams {
        match provider {
            "yandex" => GenerationParams {
                model: self.yandex.model.clone(),
                temperature: self.yandex.temperature,
            },
            _ => GenerationParams {
                model: self.openai.model.clone(),
                temperature: self.openai.temperature,
            },
        }
    }
}

/// Substitute the `{idea}` and `{example}` placeholders of a template.
pub fn render_prompt(template: &str, idea: &str, example: &str) -> String {
    template.replace("{idea}", idea).replace("{example}", example)
}

// ============================================================================
// Tests
// ============================================================================
