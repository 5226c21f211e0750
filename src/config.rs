//! Engine configuration from environment variables

use crate::orchestrator::{TurnPolicy, DEFAULT_ENDED_TTL, DEFAULT_SESSION_TTL};
use crate::services::{Collections, GenerationParams, HandlerSettings};
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;

pub const DEFAULT_PROMPTS_PATH: &str = "config/prompts.json";
pub const DEFAULT_OPENAI_MODEL: &str = "gpt-4o-mini";
pub const DEFAULT_CALL_TIMEOUT: Duration = Duration::from_secs(20);

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("{name} has an invalid value {value:?}: {reason}")]
    Invalid {
        name: &'static str,
        value: String,
        reason: String,
    },
}

/// Text generation endpoint settings
#[derive(Debug, Clone, PartialEq)]
pub struct OpenAiConfig {
    pub api_key: Option<String>,
    pub model: String,
    pub base_url: Option<String>,
}

/// Vector search endpoint settings
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WeaviateConfig {
    pub url: Option<String>,
    pub api_key: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct EngineConfig {
    pub session_ttl: Duration,
    pub ended_ttl: Duration,
    pub call_timeout: Duration,
    pub turn_policy: TurnPolicy,
    pub handler: HandlerSettings,
    /// SQLite file for sessions and feedback; in-process store when unset
    pub db_path: Option<PathBuf>,
    pub prompts_path: PathBuf,
    /// Flow table override; the standard table when unset
    pub flow_path: Option<PathBuf>,
    pub openai: OpenAiConfig,
    pub weaviate: WeaviateConfig,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            session_ttl: DEFAULT_SESSION_TTL,
            ended_ttl: DEFAULT_ENDED_TTL,
            call_timeout: DEFAULT_CALL_TIMEOUT,
            turn_policy: TurnPolicy::default(),
            handler: HandlerSettings::default(),
            db_path: None,
            prompts_path: PathBuf::from(DEFAULT_PROMPTS_PATH),
            flow_path: None,
            openai: OpenAiConfig {
                api_key: None,
                model: DEFAULT_OPENAI_MODEL.to_string(),
                base_url: None,
            },
            weaviate: WeaviateConfig {
                url: None,
                api_key: None,
            },
        }
    }
}

impl EngineConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Build from any variable source. Unset or blank variables keep their
    /// defaults; malformed ones are errors.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |name: &str| {
            lookup(name)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };
        let defaults = Self::default();
        let handler_defaults = defaults.handler;

        let secs = |name: &'static str, default: Duration| -> Result<Duration, ConfigError> {
            parse(name, var(name)).map(|v| v.map_or(default, Duration::from_secs))
        };

        let generation = GenerationParams {
            temperature: parse("GPT_TEMPERATURE", var("GPT_TEMPERATURE"))?
                .unwrap_or(handler_defaults.generation.temperature),
            ..handler_defaults.generation
        };
        let max_match_distance: f32 = parse("WUFF_MAX_MATCH_DISTANCE", var("WUFF_MAX_MATCH_DISTANCE"))?
            .unwrap_or(handler_defaults.max_match_distance);
        if max_match_distance <= 0.0 || !max_match_distance.is_finite() {
            return Err(ConfigError::Invalid {
                name: "WUFF_MAX_MATCH_DISTANCE",
                value: max_match_distance.to_string(),
                reason: "must be a positive number".to_string(),
            });
        }

        let collections = Collections {
            symptoms: var("WUFF_SYMPTOM_COLLECTION")
                .unwrap_or(handler_defaults.collections.symptoms),
            instincts: var("WUFF_INSTINCT_COLLECTION")
                .unwrap_or(handler_defaults.collections.instincts),
            exercises: var("WUFF_EXERCISE_COLLECTION")
                .unwrap_or(handler_defaults.collections.exercises),
        };

        let handler = HandlerSettings {
            min_symptom_chars: parse("WUFF_MIN_SYMPTOM_CHARS", var("WUFF_MIN_SYMPTOM_CHARS"))?
                .unwrap_or(handler_defaults.min_symptom_chars),
            min_context_chars: parse("WUFF_MIN_CONTEXT_CHARS", var("WUFF_MIN_CONTEXT_CHARS"))?
                .unwrap_or(handler_defaults.min_context_chars),
            max_match_distance,
            search_limit: parse("WUFF_SEARCH_LIMIT", var("WUFF_SEARCH_LIMIT"))?
                .unwrap_or(handler_defaults.search_limit)
                .max(1),
            collections,
            generation,
        };

        Ok(Self {
            session_ttl: secs("WUFF_SESSION_TTL_SECS", defaults.session_ttl)?,
            ended_ttl: secs("WUFF_ENDED_TTL_SECS", defaults.ended_ttl)?,
            call_timeout: secs("WUFF_CALL_TIMEOUT_SECS", defaults.call_timeout)?,
            turn_policy: parse("WUFF_TURN_POLICY", var("WUFF_TURN_POLICY"))?
                .unwrap_or(defaults.turn_policy),
            handler,
            db_path: var("WUFF_DB_PATH").map(PathBuf::from),
            prompts_path: var("WUFF_PROMPTS_PATH").map_or(defaults.prompts_path, PathBuf::from),
            flow_path: var("WUFF_FLOW_PATH").map(PathBuf::from),
            openai: OpenAiConfig {
                api_key: var("OPENAI_API_KEY").or_else(|| var("OPENAI_APIKEY")),
                model: var("OPENAI_MODEL").unwrap_or(defaults.openai.model),
                base_url: var("OPENAI_BASE_URL"),
            },
            weaviate: WeaviateConfig {
                url: var("WEAVIATE_URL"),
                api_key: var("WEAVIATE_API_KEY"),
            },
        })
    }
}

fn parse<T>(name: &'static str, value: Option<String>) -> Result<Option<T>, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    value
        .map(|raw| {
            raw.parse::<T>().map_err(|e| ConfigError::Invalid {
                name,
                value: raw.clone(),
                reason: e.to_string(),
            })
        })
        .transpose()
}
