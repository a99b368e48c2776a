//! YAML configuration.
//!
//! Secrets may be written inline or as `$ENV_VAR` references; resolution
//! happens at client-construction time so a checked-in config file never
//! has to carry a key.

use std::path::{Path, PathBuf};

use anyhow::Context;
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};

use crate::orchestrator::ToolRouting;

/// Top-level configuration loaded from `config.yaml`.
#[derive(Debug, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    /// HTTP server settings.
    #[serde(default)]
    pub gateway: GatewayConfig,
    /// LLM settings.
    #[serde(default)]
    pub model: ModelConfig,
    /// Capability provider settings.
    pub provider: ProviderConfig,
    /// Speech API settings. Optional; the voice endpoints answer with a
    /// remediation hint when absent.
    #[serde(default)]
    pub voice: Option<VoiceConfig>,
    /// IANA time zone used for date interpretation in the system prompt.
    #[serde(default = "default_timezone")]
    pub timezone: String,
    /// Tool routing mode: "capability" (all connected services) or
    /// "intent" (single service chosen by the message router).
    #[serde(default = "default_routing")]
    pub routing: String,
}

fn default_timezone() -> String {
    "America/Los_Angeles".to_string()
}

fn default_routing() -> String {
    "capability".to_string()
}

/// HTTP server settings.
#[derive(Debug, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct GatewayConfig {
    /// Bind address.
    #[serde(default = "default_addr")]
    pub addr: String,
}

fn default_addr() -> String {
    "127.0.0.1:3000".to_string()
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            addr: default_addr(),
        }
    }
}

/// LLM settings.
#[derive(Debug, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct ModelConfig {
    /// API key (plain text or env-var reference like `$ANTHROPIC_API_KEY`).
    #[serde(default)]
    pub api_key: Option<String>,
    /// Model name to request.
    #[serde(default = "default_model")]
    pub model: String,
    /// Override for the messages-API endpoint (tests, proxies).
    #[serde(default)]
    pub endpoint: Option<String>,
    /// Token budget for tool-selection calls.
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
    /// Token budget for the formatting follow-up call.
    #[serde(default = "default_followup_max_tokens")]
    pub followup_max_tokens: u32,
}

fn default_model() -> String {
    "claude-3-5-sonnet-20241022".to_string()
}

fn default_max_tokens() -> u32 {
    2000
}

fn default_followup_max_tokens() -> u32 {
    3000
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            model: default_model(),
            endpoint: None,
            max_tokens: default_max_tokens(),
            followup_max_tokens: default_followup_max_tokens(),
        }
    }
}

impl ModelConfig {
    /// Resolve the API key: config value, `$VAR` reference, then the
    /// `ANTHROPIC_API_KEY` environment variable. Empty when nothing is set.
    pub fn resolved_api_key(&self) -> String {
        resolve_secret(self.api_key.as_deref(), "ANTHROPIC_API_KEY")
    }
}

/// Capability provider settings.
#[derive(Debug, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct ProviderConfig {
    /// API key (plain text or env-var reference like `$COMPOSIO_API_KEY`).
    #[serde(default)]
    pub api_key: Option<String>,
    /// Base URL of the provider's REST API.
    pub base_url: String,
    /// Identity used when the request carries no user id, and for the
    /// scoped account-not-found retries.
    pub default_user_id: String,
    /// OAuth auth-config id for the Gmail link flow.
    #[serde(default)]
    pub gmail_auth_config_id: Option<String>,
    /// Redirect target after the Gmail OAuth dance.
    #[serde(default)]
    pub gmail_callback_url: Option<String>,
    /// Auth-config id for the Canvas API-key flow.
    #[serde(default)]
    pub canvas_auth_config_id: Option<String>,
    /// Canvas instance base URL passed through in the API-key flow.
    #[serde(default)]
    pub canvas_base_url: Option<String>,
    /// Canvas API key for the server-initiated connection flow.
    #[serde(default)]
    pub canvas_api_key: Option<String>,
    /// OAuth auth-config id for the Zoom link flow.
    #[serde(default)]
    pub zoom_auth_config_id: Option<String>,
}

impl ProviderConfig {
    pub fn resolved_api_key(&self) -> String {
        resolve_secret(self.api_key.as_deref(), "COMPOSIO_API_KEY")
    }

    pub fn resolved_canvas_api_key(&self) -> String {
        resolve_secret(self.canvas_api_key.as_deref(), "CANVAS_API_KEY")
    }
}

/// Speech API settings.
#[derive(Debug, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct VoiceConfig {
    /// API key (plain text or env-var reference like `$FISH_API_KEY`).
    #[serde(default)]
    pub api_key: Option<String>,
    /// Voice model id used for synthesis.
    pub voice_model: String,
}

impl VoiceConfig {
    pub fn resolved_api_key(&self) -> String {
        resolve_secret(self.api_key.as_deref(), "FISH_API_KEY")
    }
}

/// Resolve a secret: config value → `$VAR` reference → fallback env var →
/// empty string.
fn resolve_secret(config_value: Option<&str>, fallback_env: &str) -> String {
    if let Some(v) = config_value {
        if let Some(var) = v.strip_prefix('$') {
            return std::env::var(var).unwrap_or_default();
        }
        if !v.is_empty() {
            return v.to_string();
        }
    }
    std::env::var(fallback_env).unwrap_or_default()
}

impl Config {
    /// Read and parse a YAML configuration file.
    ///
    /// A relative `config.yaml` that does not exist falls back to the
    /// satchel home directory.
    pub async fn load(path: &Path) -> anyhow::Result<Config> {
        let contents = match tokio::fs::read_to_string(path).await {
            Ok(c) => c,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                let filename = path.file_name().and_then(|f| f.to_str());
                let eligible = filename == Some("config.yaml") && path.is_relative();
                if eligible {
                    let home_path: PathBuf = crate::satchel_home().join("config.yaml");
                    match tokio::fs::read_to_string(&home_path).await {
                        Ok(c) => {
                            tracing::warn!(
                                attempted = %path.display(),
                                found = %home_path.display(),
                                "config file not found, falling back to satchel home"
                            );
                            c
                        }
                        Err(_) => {
                            return Err(e).with_context(|| {
                                format!("failed to read config file: {}", path.display())
                            });
                        }
                    }
                } else {
                    return Err(e).with_context(|| {
                        format!("failed to read config file: {}", path.display())
                    });
                }
            }
            Err(e) => {
                return Err(e)
                    .with_context(|| format!("failed to read config file: {}", path.display()));
            }
        };

        let config: Config =
            serde_yaml_ng::from_str(&contents).context("failed to parse config YAML")?;
        config.validate()?;

        tracing::debug!(
            addr = %config.gateway.addr,
            model = %config.model.model,
            routing = %config.routing,
            "configuration loaded"
        );
        Ok(config)
    }

    /// Validate semantic constraints that serde cannot enforce.
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.provider.base_url.trim().is_empty() {
            anyhow::bail!("config: provider.base_url must not be empty");
        }
        if self.provider.default_user_id.trim().is_empty() {
            anyhow::bail!("config: provider.default_user_id must not be empty");
        }
        if self.model.max_tokens == 0 || self.model.followup_max_tokens == 0 {
            anyhow::bail!("config: model token budgets must be non-zero");
        }
        self.parsed_timezone()?;
        self.parsed_routing()?;
        if let Some(voice) = &self.voice {
            if voice.voice_model.trim().is_empty() {
                anyhow::bail!("config: voice.voice_model must not be empty");
            }
        }
        Ok(())
    }

    pub fn parsed_timezone(&self) -> anyhow::Result<Tz> {
        self.timezone
            .parse::<Tz>()
            .map_err(|_| anyhow::anyhow!("config: unknown time zone '{}'", self.timezone))
    }

    pub fn parsed_routing(&self) -> anyhow::Result<ToolRouting> {
        match self.routing.as_str() {
            "capability" => Ok(ToolRouting::Capability),
            "intent" => Ok(ToolRouting::Intent),
            other => anyhow::bail!("config: unknown routing mode '{other}'"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const MINIMAL: &str = "\
provider:
  base_url: https://backend.composio.dev/api/v3
  default_user_id: default
";

    #[test]
    fn minimal_config_gets_defaults() {
        let config: Config = serde_yaml_ng::from_str(MINIMAL).unwrap();
        config.validate().unwrap();
        assert_eq!(config.gateway.addr, "127.0.0.1:3000");
        assert_eq!(config.model.model, "claude-3-5-sonnet-20241022");
        assert_eq!(config.model.max_tokens, 2000);
        assert_eq!(config.model.followup_max_tokens, 3000);
        assert_eq!(config.timezone, "America/Los_Angeles");
        assert_eq!(config.parsed_routing().unwrap(), ToolRouting::Capability);
    }

    #[test]
    fn bad_timezone_rejected() {
        let yaml = format!("{MINIMAL}timezone: Mars/Olympus_Mons\n");
        let config: Config = serde_yaml_ng::from_str(&yaml).unwrap();
        assert!(config.validate().is_err());
    }

    #[test]
    fn bad_routing_rejected() {
        let yaml = format!("{MINIMAL}routing: psychic\n");
        let config: Config = serde_yaml_ng::from_str(&yaml).unwrap();
        assert!(config.validate().is_err());
    }

    #[test]
    fn secret_env_reference_resolved() {
        std::env::set_var("SATCHEL_TEST_SECRET_1", "resolved-value");
        let model = ModelConfig {
            api_key: Some("$SATCHEL_TEST_SECRET_1".to_string()),
            ..Default::default()
        };
        assert_eq!(model.resolved_api_key(), "resolved-value");
        std::env::remove_var("SATCHEL_TEST_SECRET_1");
    }

    #[test]
    fn secret_plain_value_passthrough() {
        let model = ModelConfig {
            api_key: Some("sk-plain".to_string()),
            ..Default::default()
        };
        assert_eq!(model.resolved_api_key(), "sk-plain");
    }

    #[tokio::test]
    async fn load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.yaml");
        tokio::fs::write(&path, MINIMAL).await.unwrap();
        let config = Config::load(&path).await.unwrap();
        assert_eq!(config.provider.default_user_id, "default");
    }

    #[tokio::test]
    async fn missing_file_errors() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nope.yaml");
        assert!(Config::load(&path).await.is_err());
    }
}
