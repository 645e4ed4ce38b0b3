//! HTTP evaluator adapter.
//!
//! Calls a judging service over JSON:
//!
//! | Call | Request | Response |
//! |------|---------|----------|
//! | `POST {endpoint}/evaluate` | `{agent, content, criteria}` | [`Evaluation`] |
//! | `POST {endpoint}/discuss` | `{agent, own_score, peers, content, criteria}` | [`DiscussionReply`] |
//!
//! No retries are attempted here; a failed call is reported to the
//! orchestrator, which treats it as missing data for that agent.

use async_trait::async_trait;
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::time::Duration;
use tracing::debug;
use tribunal_application::ports::evaluator::{
    DiscussionReply, Evaluation, EvaluationError, Evaluator, PeerScore,
};
use tribunal_domain::AgentProfile;

#[derive(Serialize)]
struct EvaluateRequest<'a> {
    agent: &'a AgentProfile,
    content: &'a str,
    criteria: &'a [String],
}

#[derive(Serialize)]
struct DiscussRequest<'a> {
    agent: &'a AgentProfile,
    own_score: f64,
    peers: &'a [PeerScore],
    content: &'a str,
    criteria: &'a [String],
}

/// [`Evaluator`] backed by a remote JSON service.
pub struct HttpEvaluator {
    client: reqwest::Client,
    endpoint: String,
}

impl HttpEvaluator {
    pub fn new(endpoint: impl Into<String>, timeout: Duration) -> Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(concat!("tribunal/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self {
            client,
            endpoint: endpoint.into().trim_end_matches('/').to_string(),
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    async fn post<B: Serialize + Sync, R: DeserializeOwned>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<R, EvaluationError> {
        let url = format!("{}/{}", self.endpoint, path);
        debug!("POST {}", url);
        let response = self
            .client
            .post(&url)
            .json(body)
            .send()
            .await
            .map_err(classify)?;

        let status = response.status();
        if !status.is_success() {
            return Err(EvaluationError::Provider(format!(
                "HTTP error: {} {}",
                status.as_u16(),
                status.canonical_reason().unwrap_or("Unknown")
            )));
        }

        response
            .json::<R>()
            .await
            .map_err(|e| EvaluationError::InvalidResponse(e.to_string()))
    }
}

fn classify(e: reqwest::Error) -> EvaluationError {
    if e.is_timeout() {
        EvaluationError::Timeout
    } else {
        EvaluationError::Provider(e.to_string())
    }
}

#[async_trait]
impl Evaluator for HttpEvaluator {
    async fn evaluate(
        &self,
        agent: &AgentProfile,
        content: &str,
        criteria: &[String],
    ) -> Result<Evaluation, EvaluationError> {
        let evaluation: Evaluation = self
            .post(
                "evaluate",
                &EvaluateRequest {
                    agent,
                    content,
                    criteria,
                },
            )
            .await?;
        evaluation.validate()?;
        Ok(evaluation)
    }

    async fn discuss(
        &self,
        agent: &AgentProfile,
        own_score: f64,
        peers: &[PeerScore],
        content: &str,
        criteria: &[String],
    ) -> Result<DiscussionReply, EvaluationError> {
        let reply: DiscussionReply = self
            .post(
                "discuss",
                &DiscussRequest {
                    agent,
                    own_score,
                    peers,
                    content,
                    criteria,
                },
            )
            .await?;
        reply.validate()?;
        Ok(reply)
    }
}
