//! Environment-driven configuration for the scheduler and the gateway.
//!
//! Every tunable named in the external interface table has a typed default
//! here; a value that is present but fails to parse is logged with
//! `log::warn!` and the default is kept rather than panicking at startup.

use std::env;
use std::time::Duration;

fn env_parse<T: std::str::FromStr>(key: &str, default: T) -> T {
    match env::var(key) {
        Ok(raw) => raw.parse().unwrap_or_else(|_| {
            log::warn!("invalid value for {key}={raw:?}, using default");
            default
        }),
        Err(_) => default,
    }
}

/// Tunables for the DAG scheduler and agent runner.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Global semaphore capacity bounding in-flight agent invocations.
    pub max_parallel_agents: usize,
    /// Character budget an agent's dependency context is trimmed to.
    pub agent_context_limit: usize,
    /// Number of prior conversation exchanges included in an agent's prompt.
    pub agent_history_limit: usize,
    /// Absolute ceiling on recursion depth regardless of the complexity score.
    pub max_depth_ceiling: u8,
}

impl EngineConfig {
    pub fn from_env() -> Self {
        EngineConfig {
            max_parallel_agents: env_parse("MAX_PARALLEL_AGENTS", 4),
            agent_context_limit: env_parse("AGENT_CONTEXT_LIMIT", 4000),
            agent_history_limit: env_parse("AGENT_HISTORY_LIMIT", 2),
            max_depth_ceiling: 5,
        }
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        EngineConfig {
            max_parallel_agents: 4,
            agent_context_limit: 4000,
            agent_history_limit: 2,
            max_depth_ceiling: 5,
        }
    }
}

/// Tunables for the Tool Gateway Router.
#[derive(Debug, Clone)]
pub struct GatewayConfig {
    pub health_check_interval: Duration,
    pub request_timeout: Duration,
    pub max_retries: u32,
    pub circuit_breaker_threshold: u32,
    pub circuit_breaker_timeout: Duration,
    pub cache_ttl: Duration,
    pub cache_capacity: usize,
}

impl GatewayConfig {
    pub fn from_env() -> Self {
        GatewayConfig {
            health_check_interval: Duration::from_secs(env_parse("HEALTH_CHECK_INTERVAL", 60)),
            request_timeout: Duration::from_secs(env_parse("REQUEST_TIMEOUT", 30)),
            max_retries: env_parse("MAX_RETRIES", 2),
            circuit_breaker_threshold: env_parse("CIRCUIT_BREAKER_THRESHOLD", 5),
            circuit_breaker_timeout: Duration::from_secs(env_parse("CIRCUIT_BREAKER_TIMEOUT", 60)),
            cache_ttl: Duration::from_secs(env_parse("CACHE_TTL", 300)),
            cache_capacity: 1000,
        }
    }
}

impl Default for GatewayConfig {
    fn default() -> Self {
        GatewayConfig {
            health_check_interval: Duration::from_secs(60),
            request_timeout: Duration::from_secs(30),
            max_retries: 2,
            circuit_breaker_threshold: 5,
            circuit_breaker_timeout: Duration::from_secs(60),
            cache_ttl: Duration::from_secs(300),
            cache_capacity: 1000,
        }
    }
}

/// Bindings for the LLM adapter (`LLM_PROVIDER`, `*_MODEL`, `*_API_KEY`,
/// `LLM_TEMPERATURE`).
#[derive(Debug, Clone)]
pub struct LlmConfig {
    pub base_url: String,
    pub model: String,
    pub api_key: String,
    pub temperature: f32,
}

impl LlmConfig {
    pub fn from_env() -> Self {
        LlmConfig {
            base_url: env::var("LLM_BASE_URL")
                .unwrap_or_else(|_| "https://api.openai.com/v1".to_string()),
            model: env::var("LLM_MODEL").unwrap_or_else(|_| "gpt-4o-mini".to_string()),
            api_key: env::var("LLM_API_KEY").unwrap_or_default(),
            temperature: env_parse("LLM_TEMPERATURE", 0.2),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn engine_config_defaults() {
        let config = EngineConfig::default();
        assert_eq!(config.max_parallel_agents, 4);
        assert_eq!(config.max_depth_ceiling, 5);
    }

    #[test]
    fn gateway_config_defaults() {
        let config = GatewayConfig::default();
        assert_eq!(config.circuit_breaker_threshold, 5);
        assert_eq!(config.cache_ttl, Duration::from_secs(300));
    }
}
