//! Retrieval-backed answer service boundary

use super::{CollabError, CollabResult};
use crate::config::RetrievalParams;
use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use std::time::Duration;

/// A generated answer with its supporting citations
#[derive(Debug, Clone, Deserialize)]
pub struct Answer {
    pub answer: String,
    #[serde(default)]
    pub citations: Vec<String>,
    #[serde(default)]
    pub retrieved_count: u32,
}

#[async_trait]
pub trait AnswerService: Send + Sync {
    /// Answer a question against a retrieval index. Failures are
    /// reported to the caller; conversation state is left untouched.
    async fn answer(
        &self,
        question: &str,
        index_name: &str,
        params: &RetrievalParams,
    ) -> CollabResult<Answer>;
}

/// Adapter for an HTTP retrieval/answer endpoint
pub struct HttpAnswerService {
    client: Client,
    endpoint: String,
}

impl HttpAnswerService {
    pub fn new(endpoint: String) -> Self {
        let client = Client::builder()
            .timeout(Duration::from_secs(60))
            .build()
            .unwrap_or_default();
        Self { client, endpoint }
    }
}

#[async_trait]
impl AnswerService for HttpAnswerService {
    async fn answer(
        &self,
        question: &str,
        index_name: &str,
        params: &RetrievalParams,
    ) -> CollabResult<Answer> {
        let response = self
            .client
            .post(&self.endpoint)
            .json(&serde_json::json!({
                "question": question,
                "index": index_name,
                "top_k": params.top_k,
                "similarity_threshold": params.similarity_threshold,
                "namespace": params.namespace,
            }))
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(CollabError::BadResponse(format!(
                "answer service returned {}",
                response.status()
            )));
        }

        Ok(response.json::<Answer>().await?)
    }
}
