// src/proposer/http.rs — HTTP/JSON client for the NL service

use async_trait::async_trait;
use reqwest::Client;
use serde::Serialize;
use std::time::Duration;

use super::{StepProposal, StepProposer};
use crate::infra::config::ProposerConfig;
use crate::infra::errors::CloudhandError;

#[derive(Serialize)]
struct ProposeRequest<'a> {
    intent: &'a str,
    history: &'a str,
}

pub struct HttpProposer {
    client: Client,
    base_url: String,
    api_key: Option<String>,
}

impl HttpProposer {
    pub fn new(cfg: &ProposerConfig) -> Result<Self, CloudhandError> {
        let api_key = match &cfg.api_key_env {
            Some(var) => Some(std::env::var(var).map_err(|_| {
                CloudhandError::Config(format!("proposer api key env '{var}' is not set"))
            })?),
            None => None,
        };

        let client = Client::builder()
            .timeout(Duration::from_secs(cfg.request_timeout_secs))
            .build()
            .map_err(|e| CloudhandError::Config(format!("http client: {e}")))?;

        Ok(Self {
            client,
            base_url: cfg.base_url.trim_end_matches('/').to_string(),
            api_key,
        })
    }
}

#[async_trait]
impl StepProposer for HttpProposer {
    async fn propose_step(
        &self,
        intent: &str,
        history_summary: &str,
    ) -> Result<StepProposal, CloudhandError> {
        let url = format!("{}/v1/propose", self.base_url);
        let mut req = self.client.post(&url).json(&ProposeRequest {
            intent,
            history: history_summary,
        });
        if let Some(ref key) = self.api_key {
            req = req.bearer_auth(key);
        }

        let resp = req.send().await.map_err(|e| CloudhandError::Proposer {
            message: format!("request failed: {e}"),
            // Timeouts and connect errors are worth one more try.
            retriable: e.is_timeout() || e.is_connect(),
        })?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(CloudhandError::Proposer {
                message: format!("HTTP {status}: {body}"),
                retriable: status.is_server_error(),
            });
        }

        let proposal: StepProposal =
            resp.json().await.map_err(|e| CloudhandError::Proposer {
                message: format!("invalid JSON body: {e}"),
                retriable: false,
            })?;

        tracing::debug!(kind = %proposal.kind, done = proposal.done, "proposal received");
        Ok(proposal)
    }
}
