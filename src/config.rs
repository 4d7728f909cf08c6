//! Configuration management for converse.
//!
//! Configuration is loaded from `~/.config/converse/config.toml`.

use anyhow::{Context, Result};
use clap::ValueEnum;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Main configuration structure.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Request envelope settings.
    #[serde(default)]
    pub request: RequestSettings,
    /// Bedrock transport settings.
    #[serde(default)]
    pub bedrock: BedrockSettings,
    /// Model version to model id table.
    #[serde(default)]
    pub models: ModelTable,
}

/// Fixed parts of every request envelope.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RequestSettings {
    /// Instruction prepended to every prompt.
    #[serde(default = "default_system_prompt")]
    pub system_prompt: String,
    /// Maximum number of output tokens.
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
    /// Protocol version tag expected by Bedrock's Anthropic models.
    #[serde(default = "default_anthropic_version")]
    pub anthropic_version: String,
}

impl Default for RequestSettings {
    fn default() -> Self {
        Self {
            system_prompt: default_system_prompt(),
            max_tokens: default_max_tokens(),
            anthropic_version: default_anthropic_version(),
        }
    }
}

fn default_system_prompt() -> String {
    "You are a coding assistant. Output only code without explanations, comments, or any other \
     text. Do not wrap the code in markdown code blocks."
        .to_string()
}

fn default_max_tokens() -> u32 {
    4096 * 16
}

fn default_anthropic_version() -> String {
    "bedrock-2023-05-31".to_string()
}

/// Bedrock runtime connection settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BedrockSettings {
    /// AWS region (falls back to AWS_REGION, then eu-central-1).
    #[serde(default)]
    pub region: Option<String>,
    /// Override for the runtime endpoint, e.g. a VPC endpoint.
    #[serde(default)]
    pub endpoint: Option<String>,
    /// Bedrock API key (prefer AWS_BEARER_TOKEN_BEDROCK env var).
    #[serde(default)]
    pub api_key: Option<String>,
    /// Seconds allowed to establish the connection.
    #[serde(default = "default_connect_timeout_secs")]
    pub connect_timeout_secs: u64,
    /// Seconds allowed between two reads of the response. There is no limit on
    /// the total duration, so long generations are not cut off.
    #[serde(default = "default_read_timeout_secs", alias = "timeout_secs")]
    pub read_timeout_secs: u64,
}

impl Default for BedrockSettings {
    fn default() -> Self {
        Self {
            region: None,
            endpoint: None,
            api_key: None,
            connect_timeout_secs: default_connect_timeout_secs(),
            read_timeout_secs: default_read_timeout_secs(),
        }
    }
}

fn default_connect_timeout_secs() -> u64 {
    10
}

fn default_read_timeout_secs() -> u64 {
    300
}

const DEFAULT_REGION: &str = "eu-central-1";

impl BedrockSettings {
    /// Resolve the region from config or environment.
    pub fn region(&self) -> String {
        self.region
            .clone()
            .or_else(|| std::env::var("AWS_REGION").ok())
            .unwrap_or_else(|| DEFAULT_REGION.to_string())
    }

    /// Resolve the runtime endpoint, deriving it from the region unless overridden.
    pub fn endpoint(&self) -> String {
        self.endpoint
            .clone()
            .unwrap_or_else(|| format!("https://bedrock-runtime.{}.amazonaws.com", self.region()))
    }

    /// Get the API key from config or environment.
    pub fn api_key(&self) -> Option<String> {
        self.api_key
            .clone()
            .or_else(|| std::env::var("AWS_BEARER_TOKEN_BEDROCK").ok())
    }
}

/// Supported Claude Sonnet versions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum ModelVersion {
    #[value(name = "3")]
    Sonnet3,
    #[value(name = "3.5")]
    Sonnet3_5,
    #[value(name = "3.7")]
    Sonnet3_7,
    #[default]
    #[value(name = "4")]
    Sonnet4,
}

/// Model ids served for each [`ModelVersion`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelTable {
    #[serde(default = "default_sonnet_3")]
    pub sonnet_3: String,
    #[serde(default = "default_sonnet_3_5")]
    pub sonnet_3_5: String,
    #[serde(default = "default_sonnet_3_7")]
    pub sonnet_3_7: String,
    #[serde(default = "default_sonnet_4")]
    pub sonnet_4: String,
}

impl Default for ModelTable {
    fn default() -> Self {
        Self {
            sonnet_3: default_sonnet_3(),
            sonnet_3_5: default_sonnet_3_5(),
            sonnet_3_7: default_sonnet_3_7(),
            sonnet_4: default_sonnet_4(),
        }
    }
}

fn default_sonnet_3() -> String {
    "anthropic.claude-3-sonnet-20240229-v1:0".to_string()
}

fn default_sonnet_3_5() -> String {
    "eu.anthropic.claude-3-5-sonnet-20240620-v1:0".to_string()
}

fn default_sonnet_3_7() -> String {
    "eu.anthropic.claude-3-7-sonnet-20250219-v1:0".to_string()
}

fn default_sonnet_4() -> String {
    "eu.anthropic.claude-sonnet-4-20250514-v1:0".to_string()
}

impl ModelTable {
    /// Map a version selector to the model id sent to Bedrock.
    pub fn model_id(&self, version: ModelVersion) -> &str {
        match version {
            ModelVersion::Sonnet3 => &self.sonnet_3,
            ModelVersion::Sonnet3_5 => &self.sonnet_3_5,
            ModelVersion::Sonnet3_7 => &self.sonnet_3_7,
            ModelVersion::Sonnet4 => &self.sonnet_4,
        }
    }
}

impl Config {
    /// Get the config directory path.
    pub fn config_dir() -> Result<PathBuf> {
        dirs::config_dir()
            .map(|p| p.join("converse"))
            .context("Could not determine config directory")
    }

    /// Get the config file path.
    pub fn config_path() -> Result<PathBuf> {
        Ok(Self::config_dir()?.join("config.toml"))
    }

    /// Load configuration from the default location, using defaults if not found.
    pub fn load() -> Result<Self> {
        Self::load_from(&Self::config_path()?)
    }

    /// Load configuration from an explicit path, using defaults if it does not exist.
    pub fn load_from(path: &Path) -> Result<Self> {
        if path.exists() {
            let contents = std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read config file: {}", path.display()))?;
            toml::from_str(&contents)
                .with_context(|| format!("Failed to parse config file: {}", path.display()))
        } else {
            Ok(Self::default())
        }
    }
}
