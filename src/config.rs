//! Engine and server configuration.

use std::time::Duration;

/// Tunables for the turn engine.
///
/// Every external call the engine makes carries one of these timeouts; a
/// timeout is that component's failure case, never a crash of the whole turn.
///
/// # Examples
///
/// ```
/// use std::time::Duration;
/// use turnloom::config::EngineConfig;
///
/// let config = EngineConfig::default()
///     .with_max_iterations(4)
///     .with_turn_deadline(Duration::from_secs(120));
/// assert_eq!(config.max_iterations, 4);
/// ```
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Maximum tool-step iterations per turn before the turn aborts.
    pub max_iterations: u32,
    /// Number of snippets requested from the retrieval collaborator.
    pub retrieval_k: usize,
    /// Budget for one retrieval query.
    pub retrieval_timeout: Duration,
    /// Budget for one tool execution.
    pub tool_timeout: Duration,
    /// Budget for acquiring the per-thread lease before reporting the thread
    /// as busy.
    pub lease_timeout: Duration,
    /// Optional wall-clock budget for the whole turn; expiry aborts the turn
    /// after persisting the current state.
    pub turn_deadline: Option<Duration>,
    /// System instructions prepended (non-persistently) to every model call.
    pub system_prompt: Option<String>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_iterations: 8,
            retrieval_k: 1,
            retrieval_timeout: Duration::from_secs(5),
            tool_timeout: Duration::from_secs(30),
            lease_timeout: Duration::from_secs(30),
            turn_deadline: None,
            system_prompt: None,
        }
    }
}

impl EngineConfig {
    #[must_use]
    pub fn with_max_iterations(mut self, max_iterations: u32) -> Self {
        self.max_iterations = max_iterations;
        self
    }

    #[must_use]
    pub fn with_retrieval_k(mut self, k: usize) -> Self {
        self.retrieval_k = k;
        self
    }

    #[must_use]
    pub fn with_retrieval_timeout(mut self, timeout: Duration) -> Self {
        self.retrieval_timeout = timeout;
        self
    }

    #[must_use]
    pub fn with_tool_timeout(mut self, timeout: Duration) -> Self {
        self.tool_timeout = timeout;
        self
    }

    #[must_use]
    pub fn with_lease_timeout(mut self, timeout: Duration) -> Self {
        self.lease_timeout = timeout;
        self
    }

    #[must_use]
    pub fn with_turn_deadline(mut self, deadline: Duration) -> Self {
        self.turn_deadline = Some(deadline);
        self
    }

    #[must_use]
    pub fn with_system_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.system_prompt = Some(prompt.into());
        self
    }
}

/// Process configuration sourced from the environment (via dotenvy).
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub bind_addr: String,
    pub sqlite_url: String,
    pub model_base_url: String,
    pub model_api_key: String,
    pub model_name: String,
    pub backtest_base_url: String,
}

impl ServerConfig {
    /// Reads configuration from the environment, applying defaults for
    /// everything except the model API key.
    pub fn from_env() -> Result<Self, std::env::VarError> {
        Ok(Self {
            bind_addr: std::env::var("TURNLOOM_BIND_ADDR")
                .unwrap_or_else(|_| "0.0.0.0:8000".to_string()),
            sqlite_url: std::env::var("TURNLOOM_SQLITE_URL")
                .unwrap_or_else(|_| "sqlite://turnloom.db".to_string()),
            model_base_url: std::env::var("MODEL_BASE_URL")
                .unwrap_or_else(|_| "https://api.deepseek.com".to_string()),
            model_api_key: std::env::var("MODEL_API_KEY")?,
            model_name: std::env::var("MODEL_NAME")
                .unwrap_or_else(|_| "deepseek-chat".to_string()),
            backtest_base_url: std::env::var("BACKTEST_BASE_URL")
                .unwrap_or_else(|_| "http://backtrader_engine:8001".to_string()),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_sane() {
        let config = EngineConfig::default();
        assert_eq!(config.max_iterations, 8);
        assert_eq!(config.retrieval_k, 1);
        assert!(config.turn_deadline.is_none());
    }

    #[test]
    fn builder_methods_chain() {
        let config = EngineConfig::default()
            .with_max_iterations(2)
            .with_retrieval_k(3)
            .with_tool_timeout(Duration::from_secs(1))
            .with_system_prompt("you are a quant assistant");
        assert_eq!(config.max_iterations, 2);
        assert_eq!(config.retrieval_k, 3);
        assert_eq!(config.tool_timeout, Duration::from_secs(1));
        assert!(config.system_prompt.is_some());
    }
}
