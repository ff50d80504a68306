//! Strategy backtest tool.
//!
//! Forwards a strategy payload to the remote backtest compute service and
//! relays its structured result or error text verbatim. The model sees the
//! service's own response body either way; this tool adds no interpretation.

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{Value, json};
use tracing::debug;

use super::{Tool, ToolError};
use crate::model::ToolSpec;

const DEFAULT_START_CASH: f64 = 100_000.0;

/// Arguments the model supplies for a backtest run.
#[derive(Debug, Deserialize)]
struct BacktestArgs {
    /// Strategy source forwarded untouched to the compute service.
    code: String,
    #[serde(default = "default_start_cash")]
    start_cash: f64,
}

fn default_start_cash() -> f64 {
    DEFAULT_START_CASH
}

/// Tool that runs a quantitative strategy against the backtest service.
#[derive(Debug, Clone)]
pub struct BacktestTool {
    client: reqwest::Client,
    base_url: String,
}

impl BacktestTool {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }
}

#[async_trait]
impl Tool for BacktestTool {
    fn spec(&self) -> ToolSpec {
        ToolSpec::new(
            "execute_backtest",
            "Run a quantitative strategy backtest. `code` must define a \
             strategy class named 'GeneratedStrategy' with its logic in the \
             per-bar step method. `start_cash` is the initial capital \
             (default 100000).",
            json!({
                "type": "object",
                "properties": {
                    "code": {
                        "type": "string",
                        "description": "Strategy source code to execute"
                    },
                    "start_cash": {
                        "type": "number",
                        "description": "Initial capital",
                        "default": DEFAULT_START_CASH
                    }
                },
                "required": ["code"]
            }),
        )
    }

    async fn call(&self, arguments: Value) -> Result<Value, ToolError> {
        let args: BacktestArgs = serde_json::from_value(arguments)?;
        let url = format!("{}/run_backtest", self.base_url);

        debug!(url = %url, start_cash = args.start_cash, "forwarding strategy to backtest service");

        let response = self
            .client
            .post(&url)
            .json(&json!({
                "code": args.code,
                "start_cash": args.start_cash,
            }))
            .send()
            .await?;

        if response.status().is_success() {
            Ok(response.json().await?)
        } else {
            // Relay the service's error text verbatim for the model to act on.
            let body = response.text().await.unwrap_or_default();
            Err(ToolError::Execution(format!(
                "backtest service error: {body}"
            )))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use httpmock::prelude::*;

    #[tokio::test]
    async fn relays_structured_result_verbatim() {
        let server = MockServer::start_async().await;
        let mock = server
            .mock_async(|when, then| {
                when.method(POST)
                    .path("/run_backtest")
                    .json_body_partial(r#"{"start_cash": 100000.0}"#);
                then.status(200)
                    .json_body(json!({"status": "success", "pnl": 1234.5}));
            })
            .await;

        let tool = BacktestTool::new(server.base_url());
        let result = tool
            .call(json!({"code": "class GeneratedStrategy: pass"}))
            .await
            .unwrap();

        mock.assert_async().await;
        assert_eq!(result["status"], "success");
        assert_eq!(result["pnl"], 1234.5);
    }

    #[tokio::test]
    async fn service_error_text_is_preserved() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(POST).path("/run_backtest");
                then.status(500).body("strategy compilation failed");
            })
            .await;

        let tool = BacktestTool::new(server.base_url());
        let err = tool
            .call(json!({"code": "broken", "start_cash": 5000.0}))
            .await
            .unwrap_err();

        assert!(err.to_string().contains("strategy compilation failed"));
    }

    #[tokio::test]
    async fn missing_code_argument_is_rejected() {
        let tool = BacktestTool::new("http://localhost:1");
        let err = tool.call(json!({"start_cash": 1.0})).await.unwrap_err();
        assert!(matches!(err, ToolError::Arguments(_)));
    }
}
