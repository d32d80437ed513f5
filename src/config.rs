//! Service configuration, read once from the environment at startup

use crate::llm::LlmConfig;
use crate::state_machine::state::{DEFAULT_MAX_ITERATIONS, DEFAULT_MAX_MODEL_ATTEMPTS};
use crate::tools::{RuleAction, RulePolicy, SearchConfig, ToolSettings};
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;

const DEFAULT_PORT: u16 = 8000;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Invalid value for {name}: {message}")]
    Invalid { name: &'static str, message: String },
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub db_path: PathBuf,
    pub port: u16,
    /// Where `write_file` and `plot_graph` put their output
    pub artifact_dir: PathBuf,
    /// Working directory for shell commands and AGENTS.md discovery
    pub working_dir: PathBuf,
    pub max_iterations: u32,
    pub max_model_attempts: u32,
    /// Policy action for tools with external side effects
    pub destructive_tools: RuleAction,
    /// Per-tool overrides from `CHAT_AGENT_TOOL_POLICY`, e.g. `write_file=allow,run_cmd_command=deny`
    pub tool_rules: Vec<(String, RuleAction)>,
    pub command_timeout: Option<Duration>,
    pub search: SearchConfig,
    pub llm: LlmConfig,
}

impl AppConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        let mut config = Self::from_lookup(|name| std::env::var(name).ok())?;
        config.search = SearchConfig::from_env();
        config.llm = LlmConfig::from_env();
        Ok(config)
    }

    /// Build from an arbitrary variable source; provider settings stay default
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());

        let db_path = get("CHAT_AGENT_DB_PATH").map_or_else(
            || {
                let home = get("HOME").unwrap_or_else(|| "/tmp".to_string());
                PathBuf::from(home).join(".chat-agent").join("chat.db")
            },
            PathBuf::from,
        );

        let working_dir = get("CHAT_AGENT_WORKING_DIR").map_or_else(
            || std::env::current_dir().unwrap_or_else(|_| PathBuf::from(".")),
            PathBuf::from,
        );

        Ok(Self {
            db_path,
            port: parse_or("CHAT_AGENT_PORT", get("CHAT_AGENT_PORT"), DEFAULT_PORT)?,
            artifact_dir: get("CHAT_AGENT_ARTIFACT_DIR")
                .map_or_else(|| PathBuf::from("/tmp"), PathBuf::from),
            working_dir,
            max_iterations: positive(
                "CHAT_AGENT_MAX_ITERATIONS",
                get("CHAT_AGENT_MAX_ITERATIONS"),
                DEFAULT_MAX_ITERATIONS,
            )?,
            max_model_attempts: positive(
                "CHAT_AGENT_MAX_MODEL_ATTEMPTS",
                get("CHAT_AGENT_MAX_MODEL_ATTEMPTS"),
                DEFAULT_MAX_MODEL_ATTEMPTS,
            )?,
            destructive_tools: parse_or(
                "CHAT_AGENT_DESTRUCTIVE_TOOLS",
                get("CHAT_AGENT_DESTRUCTIVE_TOOLS"),
                RuleAction::default(),
            )?,
            tool_rules: get("CHAT_AGENT_TOOL_POLICY")
                .map(|v| parse_tool_rules(&v))
                .transpose()?
                .unwrap_or_default(),
            command_timeout: get("CHAT_AGENT_COMMAND_TIMEOUT_SECS")
                .map(|v| parse_value::<u64>("CHAT_AGENT_COMMAND_TIMEOUT_SECS", &v))
                .transpose()?
                .map(Duration::from_secs),
            search: SearchConfig::default(),
            llm: LlmConfig::default(),
        })
    }

    pub fn tool_settings(&self) -> ToolSettings {
        ToolSettings {
            search: self.search.clone(),
            command_timeout: self.command_timeout,
        }
    }

    pub fn tool_policy(&self) -> RulePolicy {
        self.tool_rules
            .iter()
            .fold(RulePolicy::new(self.destructive_tools), |policy, (name, action)| {
                policy.with_rule(name.as_str(), *action)
            })
    }
}

fn parse_tool_rules(value: &str) -> Result<Vec<(String, RuleAction)>, ConfigError> {
    const NAME: &str = "CHAT_AGENT_TOOL_POLICY";

    value
        .split(',')
        .map(str::trim)
        .filter(|rule| !rule.is_empty())
        .map(|rule| {
            let (tool, action) = rule.split_once('=').ok_or_else(|| ConfigError::Invalid {
                name: NAME,
                message: format!("expected tool=action, got '{rule}'"),
            })?;
            let tool = tool.trim();
            if tool.is_empty() {
                return Err(ConfigError::Invalid {
                    name: NAME,
                    message: format!("missing tool name in '{rule}'"),
                });
            }
            Ok((tool.to_string(), parse_value(NAME, action)?))
        })
        .collect()
}

fn parse_value<T>(name: &'static str, value: &str) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    value.trim().parse().map_err(|e: T::Err| ConfigError::Invalid {
        name,
        message: e.to_string(),
    })
}

fn parse_or<T>(name: &'static str, value: Option<String>, default: T) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    value.map_or(Ok(default), |v| parse_value(name, &v))
}

fn positive(name: &'static str, value: Option<String>, default: u32) -> Result<u32, ConfigError> {
    match parse_or(name, value, default)? {
        0 => Err(ConfigError::Invalid {
            name,
            message: "must be at least 1".to_string(),
        }),
        n => Ok(n),
    }
}
