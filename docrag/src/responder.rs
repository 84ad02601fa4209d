//! Answer generation over retrieved context.

use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, error, info};

use crate::cache::{CacheKey, CacheStats, ResponseCache};
use crate::config::RagConfig;
use crate::document::{Answer, RetrievalResult};
use crate::error::{GenerationContext, RagError, Result};
use crate::llm::LlmClient;
use crate::prompt::build_prompt;
use crate::retry::{RetryPolicy, with_retry, with_timeout};

/// Returned verbatim when retrieval found nothing to ground an answer on.
pub const INSUFFICIENT_CONTEXT_ANSWER: &str = "I couldn't find relevant information to answer \
     your question. Please try rephrasing or ask something else.";

/// Generates grounded answers and caches them.
pub struct Responder {
    llm: Arc<dyn LlmClient>,
    cache: ResponseCache,
    max_context_chars: usize,
    generation_timeout: Duration,
    retry: RetryPolicy,
}

impl Responder {
    /// Create a responder using the cache and generation settings in `config`.
    pub fn new(llm: Arc<dyn LlmClient>, config: &RagConfig) -> Self {
        Self {
            llm,
            cache: ResponseCache::new(config.cache_capacity, config.cache_ttl),
            max_context_chars: config.max_context_chars,
            generation_timeout: config.timeouts.generation,
            retry: config.retry,
        }
    }

    /// Answer `query` from the chunks in `retrieval`.
    ///
    /// An empty retrieval yields [`INSUFFICIENT_CONTEXT_ANSWER`] without
    /// calling the LLM. Otherwise an answer cached for the same query and
    /// chunk set is returned as is; a fresh answer is cached before it is
    /// returned. The answer's sources are the chunks that fit in the prompt.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::GenerationError`] once retries are exhausted or on
    /// a permanent LLM failure. The error carries the prompt and sources so
    /// the caller can retry with [`generate_from_context`](Self::generate_from_context).
    pub async fn respond(&self, query: &str, retrieval: &RetrievalResult) -> Result<Answer> {
        if retrieval.is_empty() {
            info!("no context retrieved, returning fallback answer");
            return Ok(Answer {
                text: INSUFFICIENT_CONTEXT_ANSWER.to_string(),
                sources: Vec::new(),
                from_cache: false,
                grounded: false,
            });
        }

        let (prompt, included) = build_prompt(query, &retrieval.chunks, self.max_context_chars);
        let context = GenerationContext {
            query: query.to_string(),
            retrieved: retrieval.chunk_ids(),
            prompt,
            sources: retrieval.chunks[..included].to_vec(),
        };

        let key = CacheKey::new(query, context.retrieved.clone());
        if let Some(text) = self.cache.get(&key).await {
            debug!(source_count = context.sources.len(), "answer served from cache");
            return Ok(Answer { text, sources: context.sources, from_cache: true, grounded: true });
        }

        self.generate_from_context(context).await
    }

    /// Send a previously assembled prompt to the LLM and cache the answer.
    ///
    /// Never reads the cache. Used to retry after a [`RagError::GenerationError`];
    /// a successful retry is cached under the original query and chunk set.
    pub async fn generate_from_context(&self, context: GenerationContext) -> Result<Answer> {
        debug!(
            provider = self.llm.name(),
            prompt_len = context.prompt.len(),
            source_count = context.sources.len(),
            "generating answer"
        );

        let outcome =
            with_retry(&self.retry, "generate", || self.generate_once(&context.prompt)).await;

        match outcome {
            Ok(text) => {
                info!(provider = self.llm.name(), answer_len = text.len(), "answer generated");
                let key = CacheKey::new(context.query, context.retrieved);
                self.cache.insert(key, text.clone()).await;
                Ok(Answer { text, sources: context.sources, from_cache: false, grounded: true })
            }
            Err(e) => {
                error!(provider = self.llm.name(), error = %e, "answer generation failed");
                Err(RagError::GenerationError { message: e.to_string(), context: Box::new(context) })
            }
        }
    }

    async fn generate_once(&self, prompt: &str) -> Result<String> {
        with_timeout("generation", self.generation_timeout, self.llm.generate(prompt))
            .await
            .map_err(|e| e.timeout_as(|message| RagError::llm(self.llm.name(), message, true)))
    }

    /// Response cache counters.
    pub async fn cache_stats(&self) -> CacheStats {
        self.cache.stats().await
    }

    /// Drop all cached answers, e.g. after the index content changed.
    pub async fn clear_cache(&self) {
        self.cache.clear().await;
    }
}
