//! Query handling: retrieval followed by answer synthesis

mod context;

pub use context::{ReadinessReport, Resource, Resources, ServiceContext};

use crate::config::Config;
use crate::retrieval::Retriever;
use crate::synthesis::{
    AnswerSynthesizer, GeminiClient, GenerativeModel, ModelError, SynthesisOutcome,
    SynthesisResult,
};
use std::sync::Arc;
use thiserror::Error;
use tracing::{error, info, warn};

#[derive(Error, Debug)]
pub enum ServiceError {
    #[error("Service not ready; missing {missing:?}")]
    ResourcesUnavailable { missing: Vec<Resource> },
}

/// Answers questions against a shared, read-only [`ServiceContext`]
pub struct QueryService<M> {
    context: Arc<ServiceContext>,
    synthesizer: AnswerSynthesizer<M>,
    top_k: usize,
}

impl QueryService<GeminiClient> {
    /// Service wired to the configured Gemini model
    pub fn from_config(context: Arc<ServiceContext>, config: &Config) -> Result<Self, ModelError> {
        let synthesizer = AnswerSynthesizer::new(GeminiClient::from_config(&config.llm)?)
            .with_citation_verification(config.synthesis.verify_citations);
        Ok(Self::new(context, synthesizer, config.retrieval.top_k))
    }
}

impl<M: GenerativeModel> QueryService<M> {
    pub fn new(context: Arc<ServiceContext>, synthesizer: AnswerSynthesizer<M>, top_k: usize) -> Self {
        Self {
            context,
            synthesizer,
            top_k,
        }
    }

    pub fn with_top_k(mut self, top_k: usize) -> Self {
        self.top_k = top_k;
        self
    }

    pub fn context(&self) -> &ServiceContext {
        &self.context
    }

    pub fn readiness(&self) -> ReadinessReport {
        self.context.readiness()
    }

    /// Answer a question from the indexed documents
    ///
    /// Only missing resources are reported as an error. Every other failure
    /// is carried in the returned result.
    pub async fn answer_query(&self, query: &str) -> Result<SynthesisResult, ServiceError> {
        let resources = self.context.resources().map_err(|missing| {
            warn!("Query rejected, resources not loaded: {:?}", missing);
            ServiceError::ResourcesUnavailable { missing }
        })?;
        let retriever = Retriever::new(resources.embedder, resources.corpus);

        let query = query.trim();
        if query.is_empty() {
            warn!("Received empty query");
            return Ok(SynthesisResult::diagnostic(SynthesisOutcome::InvalidQuery));
        }

        info!("Processing query: {}", query);
        let passages = match retriever.retrieve(query, self.top_k) {
            Ok(passages) => passages,
            Err(e) => {
                error!("Retrieval failed: {}", e);
                return Ok(SynthesisResult::diagnostic(SynthesisOutcome::RetrievalFailed));
            }
        };

        if passages.is_empty() {
            info!("No relevant passages found for query");
            return Ok(SynthesisResult::no_evidence());
        }

        Ok(self.synthesizer.synthesize(query, &passages).await)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embedding::{EmbeddingError, EmbeddingProvider};
    use crate::ingest::Chunk;
    use crate::storage::Corpus;
    use crate::synthesis::{NO_EVIDENCE_ANSWER, RETRIEVAL_FAILED_ANSWER};
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct AxisEmbedder;

    impl EmbeddingProvider for AxisEmbedder {
        fn embed(&self, text: &str) -> Result<Vec<f32>, EmbeddingError> {
            if text.contains("explode") {
                return Err(EmbeddingError::GenerationError("model crashed".to_string()));
            }
            let text = text.to_lowercase();
            Ok(vec![
                if text.contains("rent") { 1.0 } else { 0.0 },
                if text.contains("notice") { 1.0 } else { 0.0 },
            ])
        }

        fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbeddingError> {
            texts.iter().map(|t| self.embed(t)).collect()
        }

        fn dimension(&self) -> usize {
            2
        }

        fn model_name(&self) -> &str {
            "axis"
        }
    }

    #[derive(Default)]
    struct CountingModel {
        calls: AtomicUsize,
    }

    impl GenerativeModel for CountingModel {
        async fn generate(&self, _prompt: &str) -> Result<String, ModelError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok("```json\n{\"answer\": \"Monthly.\", \"citations\": [{\"text\": \"Rent is due\", \"source\": \"lease.pdf\"}]}\n```".to_string())
        }
    }

    fn service(corpus: Corpus) -> QueryService<CountingModel> {
        let context = Arc::new(ServiceContext::with_corpus(Arc::new(AxisEmbedder), corpus));
        QueryService::new(context, AnswerSynthesizer::new(CountingModel::default()), 5)
    }

    fn lease_corpus() -> Corpus {
        let mut corpus = Corpus::new("axis", 2);
        corpus
            .append(
                Chunk {
                    document_id: "lease".to_string(),
                    source_name: "lease.pdf".to_string(),
                    ordinal: 0,
                    text: "Rent is due on the first.".to_string(),
                },
                &[1.0, 0.0],
            )
            .unwrap();
        corpus
    }

    #[tokio::test]
    async fn test_not_ready_is_error() {
        let context = Arc::new(ServiceContext::from_parts(None, None, None));
        let service = QueryService::new(context, AnswerSynthesizer::new(CountingModel::default()), 5);

        let err = service.answer_query("When is rent due?").await.unwrap_err();
        let ServiceError::ResourcesUnavailable { missing } = err;
        assert_eq!(missing.len(), 3);
        assert!(!service.readiness().ready);
    }

    #[tokio::test]
    async fn test_empty_corpus_gives_no_evidence() {
        let service = service(Corpus::new("axis", 2));

        let result = service.answer_query("When is rent due?").await.unwrap();
        assert_eq!(result.answer, NO_EVIDENCE_ANSWER);
        assert!(result.citations.is_empty());
        assert_eq!(service.synthesizer.model().calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_answer_flows_through() {
        let service = service(lease_corpus());

        let result = service.answer_query("When is rent due?").await.unwrap();
        assert_eq!(result.answer, "Monthly.");
        assert_eq!(result.citations.len(), 1);
        assert_eq!(result.citations[0].source, "lease.pdf");
        assert_eq!(service.synthesizer.model().calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_blank_query_is_diagnostic() {
        let service = service(lease_corpus());

        let result = service.answer_query("   ").await.unwrap();
        assert_eq!(result.outcome, SynthesisOutcome::InvalidQuery);
        assert_eq!(service.synthesizer.model().calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_embedding_failure_is_diagnostic() {
        let service = service(lease_corpus());

        let result = service.answer_query("explode please").await.unwrap();
        assert_eq!(result.answer, RETRIEVAL_FAILED_ANSWER);
        assert_eq!(result.outcome, SynthesisOutcome::RetrievalFailed);
    }
}
