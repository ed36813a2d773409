use std::time::Duration;

use anyhow::{bail, Context, Result};

use crate::retry::RetryPolicy;

pub const DEFAULT_GEMINI_MODEL: &str = "gemini-2.5-flash";
pub const DEFAULT_OPENAI_MODEL: &str = "gpt-4o-mini";
pub const DEFAULT_OPENAI_BASE_URL: &str = "https://api.openai.com/v1";

/// Which remote provider this process talks to, with its credential.
#[derive(Debug, Clone, PartialEq)]
pub enum ProviderChoice {
    Gemini {
        api_key: String,
        model: String,
    },
    OpenAi {
        api_key: String,
        model: String,
        base_url: String,
    },
}

impl ProviderChoice {
    pub fn label(&self) -> &'static str {
        match self {
            ProviderChoice::Gemini { .. } => "gemini",
            ProviderChoice::OpenAi { .. } => "openai",
        }
    }
}

/// Application configuration loaded from environment variables.
/// Resolved once at startup; switching provider requires a restart.
#[derive(Debug, Clone)]
pub struct Config {
    pub provider: ProviderChoice,
    pub retry: RetryPolicy,
    pub port: u16,
    pub rust_log: String,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok(); // load .env if present; ignore if missing
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds the config from any key lookup (the process environment in production).
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let get = |key: &str, default: &str| lookup(key).unwrap_or_else(|| default.to_string());
        let require = |key: &str| {
            lookup(key)
                .filter(|v| !v.trim().is_empty())
                .with_context(|| format!("Required environment variable '{key}' is not set"))
        };

        let provider = match get("AI_PROVIDER", "gemini").to_lowercase().as_str() {
            "gemini" => ProviderChoice::Gemini {
                api_key: require("GEMINI_API_KEY")?,
                model: get("GEMINI_MODEL", DEFAULT_GEMINI_MODEL),
            },
            "openai" => ProviderChoice::OpenAi {
                api_key: require("OPENAI_API_KEY")?,
                model: get("OPENAI_MODEL", DEFAULT_OPENAI_MODEL),
                base_url: get("OPENAI_BASE_URL", DEFAULT_OPENAI_BASE_URL),
            },
            other => bail!("AI_PROVIDER must be 'gemini' or 'openai', got '{other}'"),
        };

        let max_retries = get("RETRY_MAX_RETRIES", "2")
            .parse::<u32>()
            .context("RETRY_MAX_RETRIES must be a non-negative integer")?;
        let base_delay_ms = get("RETRY_BASE_DELAY_MS", "1000")
            .parse::<u64>()
            .context("RETRY_BASE_DELAY_MS must be a number of milliseconds")?;

        Ok(Config {
            provider,
            retry: RetryPolicy::new(max_retries, Duration::from_millis(base_delay_ms)),
            port: get("PORT", "8080")
                .parse::<u16>()
                .context("PORT must be a valid port number")?,
            rust_log: get("RUST_LOG", "info"),
        })
    }
}
