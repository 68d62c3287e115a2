// Service configuration
//
// Read once at startup from the environment (after `.env` is loaded). Every
// variable has a default, so an empty environment yields a working config.

use std::path::PathBuf;
use std::str::FromStr;

use crate::agents::errors::{AgentError, AgentResult};

/// Connection settings for the model backend
#[derive(Debug, Clone)]
pub struct LlmSettings {
    pub api_key: Option<String>,
    pub base_url: String,
    pub model: String,
    pub temperature: f64,
}

impl LlmSettings {
    /// DashScope-hosted endpoints and models do not accept tool bindings
    pub fn is_dashscope(&self) -> bool {
        let base_url = self.base_url.to_lowercase();
        let model = self.model.to_lowercase();
        base_url.contains("dashscope")
            || base_url.contains("aliyun")
            || ["dashscope", "qwen", "moonshot"]
                .iter()
                .any(|marker| model.contains(marker))
    }
}

impl Default for LlmSettings {
    fn default() -> Self {
        Self {
            api_key: None,
            base_url: "https://dashscope.aliyuncs.com/compatible-mode/v1".to_string(),
            model: "Moonshot-Kimi-K2-Instruct".to_string(),
            temperature: 0.3,
        }
    }
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub bind_addr: String,
    pub llm: LlmSettings,
    pub worker_max_iterations: usize,
    pub tools_enabled: bool,
    pub document_root: PathBuf,
    pub scrape_timeout_secs: u64,
    pub consult_model_for_dispatch: bool,
}

impl Default for AppConfig {
    fn default() -> Self {
        let llm = LlmSettings::default();
        Self {
            bind_addr: "0.0.0.0:3000".to_string(),
            tools_enabled: !llm.is_dashscope(),
            llm,
            worker_max_iterations: 6,
            document_root: PathBuf::from("./workspace"),
            scrape_timeout_secs: 15,
            consult_model_for_dispatch: true,
        }
    }
}

impl AppConfig {
    /// Loads the configuration from process environment variables
    pub fn from_env() -> AgentResult<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Loads the configuration through `lookup`, which returns the raw value
    /// of a variable if it is set
    pub fn from_lookup<F>(lookup: F) -> AgentResult<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();
        let get = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        let llm = LlmSettings {
            api_key: get("LLM_API_KEY"),
            base_url: get("LLM_BASE_URL").unwrap_or(defaults.llm.base_url),
            model: get("LLM_MODEL").unwrap_or(defaults.llm.model),
            temperature: parse(&get, "LLM_TEMPERATURE", defaults.llm.temperature)?,
        };

        let worker_max_iterations =
            parse(&get, "WORKER_MAX_ITERATIONS", defaults.worker_max_iterations)?;
        if worker_max_iterations == 0 {
            return Err(AgentError::ConfigError(
                "WORKER_MAX_ITERATIONS must be at least 1".to_string(),
            ));
        }

        let disable_tools = flag(&get, "DISABLE_TOOL_CALLS", false)?;
        let force_tools = flag(&get, "FORCE_TOOL_CALLS", false)?;
        let tools_enabled = (!llm.is_dashscope() && !disable_tools) || force_tools;

        Ok(Self {
            bind_addr: get("BIND_ADDR").unwrap_or(defaults.bind_addr),
            llm,
            worker_max_iterations,
            tools_enabled,
            document_root: get("DOCUMENT_ROOT")
                .map(PathBuf::from)
                .unwrap_or(defaults.document_root),
            scrape_timeout_secs: parse(&get, "SCRAPE_TIMEOUT_SECS", defaults.scrape_timeout_secs)?,
            consult_model_for_dispatch: flag(
                &get,
                "DISPATCH_CONSULT_MODEL",
                defaults.consult_model_for_dispatch,
            )?,
        })
    }
}

fn parse<T: FromStr>(
    get: &impl Fn(&str) -> Option<String>,
    key: &str,
    default: T,
) -> AgentResult<T> {
    match get(key) {
        None => Ok(default),
        Some(raw) => raw
            .parse()
            .map_err(|_| AgentError::ConfigError(format!("{} has an invalid value: {}", key, raw))),
    }
}

fn flag(get: &impl Fn(&str) -> Option<String>, key: &str, default: bool) -> AgentResult<bool> {
    match get(key).map(|v| v.to_lowercase()).as_deref() {
        None => Ok(default),
        Some("1" | "true" | "yes" | "on") => Ok(true),
        Some("0" | "false" | "no" | "off") => Ok(false),
        Some(other) => Err(AgentError::ConfigError(format!(
            "{} must be a boolean, got {}",
            key, other
        ))),
    }
}
