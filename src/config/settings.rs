use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

use crate::error::{GatewayError, Result};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub server: ServerConfig,
    pub upstream: UpstreamConfig,
    pub relay: RelayConfig,
    pub enhancement: EnhancementConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8000,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct UpstreamConfig {
    pub base_url: String,
    /// Falls back to `OPENAI_API_KEY` when unset.
    pub api_key: Option<String>,
    /// Whole-request timeout for non-streaming calls; streams are bounded by the relay instead.
    pub request_timeout_secs: Option<u64>,
    /// Hosts (exact, or `.suffix`) that must be reached without the environment proxy.
    pub no_proxy_hosts: Vec<String>,
}

impl Default for UpstreamConfig {
    fn default() -> Self {
        Self {
            base_url: "https://api.openai.com".to_string(),
            api_key: None,
            request_timeout_secs: Some(120),
            no_proxy_hosts: Vec::new(),
        }
    }
}

impl UpstreamConfig {
    pub fn request_timeout(&self) -> Option<Duration> {
        self.request_timeout_secs.map(Duration::from_secs)
    }

    pub fn resolve_api_key(&self) -> Option<String> {
        self.api_key
            .clone()
            .filter(|k| !k.trim().is_empty())
            .or_else(|| std::env::var("OPENAI_API_KEY").ok())
            .filter(|k| !k.trim().is_empty())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RelayConfig {
    pub default_model: String,
    pub default_max_tokens: u32,
    pub default_temperature: f64,
    /// Upper bound on the wait for the next upstream chunk; `None` waits forever.
    pub stream_idle_timeout_secs: Option<u64>,
    /// Frames buffered between the upstream reader and the SSE body.
    pub stream_channel_capacity: usize,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            default_model: "gpt-3.5-turbo".to_string(),
            default_max_tokens: 150,
            default_temperature: 0.7,
            stream_idle_timeout_secs: Some(300),
            stream_channel_capacity: 16,
        }
    }
}

impl RelayConfig {
    pub fn stream_idle_timeout(&self) -> Option<Duration> {
        self.stream_idle_timeout_secs.map(Duration::from_secs)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EnhancementConfig {
    /// Instruction-tuned model used for the rewrite call.
    pub model: String,
    pub max_tokens: u32,
    pub temperature: f64,
}

impl Default for EnhancementConfig {
    fn default() -> Self {
        Self {
            model: "gpt-3.5-turbo-instruct".to_string(),
            max_tokens: 500,
            temperature: 0.7,
        }
    }
}

impl Settings {
    /// 读取配置文件；未找到时使用默认值
    pub fn load() -> Result<Self> {
        match Self::find_config_file() {
            Some(path) => {
                tracing::info!("Loading configuration from {}", path);
                let content = std::fs::read_to_string(path)?;
                Self::from_toml(&content)
            }
            None => {
                tracing::warn!("No custom-config.toml or config.toml found, using defaults");
                Ok(Self::default())
            }
        }
    }

    pub fn from_toml(content: &str) -> Result<Self> {
        let settings: Settings = toml::from_str(content)?;
        settings.validate()?;
        Ok(settings)
    }

    fn validate(&self) -> Result<()> {
        if self.relay.stream_channel_capacity == 0 {
            return Err(GatewayError::Config(
                "relay.stream_channel_capacity must be at least 1".into(),
            ));
        }
        if reqwest::Url::parse(&self.upstream.base_url).is_err() {
            return Err(GatewayError::Config(format!(
                "upstream.base_url is not a valid URL: {}",
                self.upstream.base_url
            )));
        }
        Ok(())
    }

    fn find_config_file() -> Option<&'static str> {
        let possible_names = ["custom-config.toml", "config.toml"];
        possible_names
            .into_iter()
            .find(|name| Path::new(name).exists())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_document_yields_defaults() {
        let s = Settings::from_toml("").unwrap();
        assert_eq!(s.server.port, 8000);
        assert_eq!(s.relay.default_model, "gpt-3.5-turbo");
        assert_eq!(s.relay.default_max_tokens, 150);
        assert!((s.relay.default_temperature - 0.7).abs() < f64::EPSILON);
        assert_eq!(s.enhancement.model, "gpt-3.5-turbo-instruct");
        assert_eq!(s.enhancement.max_tokens, 500);
    }

    #[test]
    fn partial_sections_keep_other_defaults() {
        let s = Settings::from_toml(
            r#"
            [upstream]
            base_url = "http://127.0.0.1:9000"
            no_proxy_hosts = [".internal"]

            [relay]
            default_model = "gpt-4o-mini"
            stream_idle_timeout_secs = 30
            "#,
        )
        .unwrap();
        assert_eq!(s.upstream.base_url, "http://127.0.0.1:9000");
        assert_eq!(s.upstream.no_proxy_hosts, vec![".internal".to_string()]);
        assert_eq!(s.relay.default_model, "gpt-4o-mini");
        assert_eq!(s.relay.default_max_tokens, 150);
        assert_eq!(s.relay.stream_idle_timeout(), Some(Duration::from_secs(30)));
        assert_eq!(s.server.host, "0.0.0.0");
    }

    #[test]
    fn zero_channel_capacity_is_rejected() {
        let err = Settings::from_toml("[relay]\nstream_channel_capacity = 0\n").unwrap_err();
        assert!(matches!(err, GatewayError::Config(_)));
    }

    #[test]
    fn malformed_base_url_is_rejected() {
        let err = Settings::from_toml("[upstream]\nbase_url = \"not a url\"\n").unwrap_err();
        assert!(err.to_string().contains("upstream.base_url"));
    }
}
