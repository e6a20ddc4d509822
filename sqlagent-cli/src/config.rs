//! Runtime configuration assembled from command-line flags and the
//! environment

use crate::Cli;
use sqlagent_agent::{AgentConfig, SessionOptions};
use sqlagent_core::prompt::DEFAULT_HUB_API_URL;
use sqlagent_core::{DatabaseSource, PromptSource, ProviderConfig, SQL_AGENT_PROMPT_REPO};
use sqlagent_error::{Error, Result};
use std::path::PathBuf;

pub const API_KEY_ENV: &str = "OPENAI_API_KEY";
pub const BASE_URL_ENV: &str = "OPENAI_BASE_URL";
pub const HUB_API_URL_ENV: &str = "LANGCHAIN_HUB_API_URL";
pub const HUB_API_KEY_ENV: &str = "LANGCHAIN_API_KEY";

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub database: DatabaseSource,
    pub prompt: PromptSource,
    pub model: String,
    pub temperature: Option<f32>,
    pub dialect: String,
    pub top_k: usize,
    pub max_steps: usize,
    pub stateless: bool,
    pub api_key: Option<String>,
    pub base_url: Option<String>,
}

impl AppConfig {
    /// Validate flags and read the environment through `env`.
    pub(crate) fn from_cli(cli: &Cli, env: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let env = |key: &str| env(key).filter(|v| !v.trim().is_empty());

        if cli.max_steps == 0 {
            return Err(Error::config_invalid("--max-steps must be at least 1")
                .with_operation("config::from_cli"));
        }
        if let Some(t) = cli.temperature {
            if !(0.0..=2.0).contains(&t) {
                return Err(Error::config_invalid("--temperature must be between 0 and 2")
                    .with_operation("config::from_cli")
                    .with_context("temperature", t.to_string()));
            }
        }

        let database = match (&cli.db, &cli.script_url) {
            (Some(path), _) => DatabaseSource::local(path.clone()),
            (None, Some(url)) => DatabaseSource::RemoteScript { url: url.clone() },
            (None, None) => DatabaseSource::chinook(),
        };

        let prompt = match cli.prompt.as_str() {
            "hub" => PromptSource::Hub {
                api_url: env(HUB_API_URL_ENV).unwrap_or_else(|| DEFAULT_HUB_API_URL.to_string()),
                owner_repo: SQL_AGENT_PROMPT_REPO.to_string(),
                api_key: env(HUB_API_KEY_ENV),
            },
            "builtin" => PromptSource::Builtin,
            path => PromptSource::File(PathBuf::from(path)),
        };

        Ok(Self {
            database,
            prompt,
            model: cli.model.clone(),
            temperature: cli.temperature,
            dialect: cli.dialect.clone(),
            top_k: cli.top_k,
            max_steps: cli.max_steps,
            stateless: cli.stateless,
            api_key: env(API_KEY_ENV),
            base_url: env(BASE_URL_ENV),
        })
    }

    /// Provider settings. A key is required unless a custom base URL points
    /// at a server that does not need one.
    pub fn provider_config(&self) -> Result<ProviderConfig> {
        match (&self.api_key, &self.base_url) {
            (Some(key), base_url) => {
                let config = ProviderConfig::openai(key).with_model(&self.model);
                Ok(match base_url {
                    Some(url) => config.with_base_url(url),
                    None => config,
                })
            }
            (None, Some(url)) => Ok(ProviderConfig::local(url, &self.model)),
            (None, None) => Err(Error::config_invalid(format!("{} is not set", API_KEY_ENV))
                .with_operation("config::provider_config")),
        }
    }

    pub fn agent_config(&self) -> AgentConfig {
        AgentConfig {
            model: Some(self.model.clone()),
            temperature: self.temperature,
            max_steps: self.max_steps,
        }
    }

    pub fn session_options(&self) -> SessionOptions {
        SessionOptions {
            carry_history: !self.stateless,
        }
    }

    pub fn prompt_variables(&self) -> Vec<(&'static str, String)> {
        vec![("dialect", self.dialect.clone()), ("top_k", self.top_k.to_string())]
    }
}
