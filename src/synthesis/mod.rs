//! Citation-constrained answer synthesis
//!
//! The synthesizer never fails past its boundary: transport failures and
//! malformed model output become a `SynthesisResult` whose `answer` explains
//! what went wrong and whose `outcome` says which failure it was.

mod model;
mod parse;
mod prompt;

pub use model::{extract_candidate_text, GeminiClient, GenerativeModel, ModelError};
pub use parse::{
    citation_is_grounded, extract_json_block, parse_response, validate_citations, ParseOutcome,
};
pub use prompt::{build_prompt, passage_labels};

use crate::retrieval::RetrievedPassage;
use serde::{Deserialize, Serialize};
use tracing::{error, info, warn};

pub const NO_EVIDENCE_ANSWER: &str =
    "Could not find any relevant information in the documents for your query.";
pub const MISSING_ANSWER: &str = "(Error) 'answer' key not found in parsed JSON.";
pub const NO_BLOCK_ANSWER: &str = "(Error) AI model did not return the expected JSON format.";
pub const MALFORMED_JSON_ANSWER: &str = "(Error) Failed to parse JSON response from AI model.";
pub const EMPTY_QUERY_ANSWER: &str = "(Error) Query text cannot be empty.";
pub const RETRIEVAL_FAILED_ANSWER: &str = "(Error) Failed to search the document index.";
pub const MISSING_KEY_ANSWER: &str = "Configuration Error: AI model API key not set.";
pub const CONNECT_ANSWER: &str = "API Error: Could not connect to the AI model.";
pub const TIMEOUT_ANSWER: &str = "API Error: AI model response timed out.";
pub const TRANSPORT_ANSWER: &str = "API Error: An unexpected error occurred during the API call.";

/// A snippet the model claims supports its answer
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Citation {
    pub text: String,
    pub source: String,
}

/// Which transport step failed when calling the model
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportFailure {
    MissingApiKey,
    Connect,
    Timeout,
    Status(u16),
    Other,
}

/// How a synthesis result came about
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SynthesisOutcome {
    #[default]
    Answered,
    /// Parsed block lacked an `answer`
    MissingAnswer,
    NoEvidence,
    InvalidQuery,
    RetrievalFailed,
    Transport(TransportFailure),
    NoStructuredBlock,
    MalformedJson,
}

impl SynthesisOutcome {
    /// Whether asking again may give a different result
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Transport(TransportFailure::Connect | TransportFailure::Timeout) => true,
            Self::Transport(TransportFailure::Status(code)) => *code == 429 || *code >= 500,
            _ => false,
        }
    }

    /// Whether the answer text is a diagnostic rather than model output
    pub fn is_error(&self) -> bool {
        !matches!(self, Self::Answered | Self::NoEvidence)
    }

    fn diagnostic(&self) -> String {
        match self {
            Self::Answered => String::new(),
            Self::MissingAnswer => MISSING_ANSWER.to_string(),
            Self::NoEvidence => NO_EVIDENCE_ANSWER.to_string(),
            Self::InvalidQuery => EMPTY_QUERY_ANSWER.to_string(),
            Self::RetrievalFailed => RETRIEVAL_FAILED_ANSWER.to_string(),
            Self::Transport(TransportFailure::MissingApiKey) => MISSING_KEY_ANSWER.to_string(),
            Self::Transport(TransportFailure::Connect) => CONNECT_ANSWER.to_string(),
            Self::Transport(TransportFailure::Timeout) => TIMEOUT_ANSWER.to_string(),
            Self::Transport(TransportFailure::Status(code)) => {
                format!("API Error: Received status code {} from AI model.", code)
            }
            Self::Transport(TransportFailure::Other) => TRANSPORT_ANSWER.to_string(),
            Self::NoStructuredBlock => NO_BLOCK_ANSWER.to_string(),
            Self::MalformedJson => MALFORMED_JSON_ANSWER.to_string(),
        }
    }
}

/// The `{answer, citations}` unit returned to callers
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SynthesisResult {
    pub answer: String,
    pub citations: Vec<Citation>,
    #[serde(skip)]
    pub outcome: SynthesisOutcome,
}

impl SynthesisResult {
    pub fn answered(answer: impl Into<String>, citations: Vec<Citation>) -> Self {
        Self {
            answer: answer.into(),
            citations,
            outcome: SynthesisOutcome::Answered,
        }
    }

    /// A result carrying the fixed message for `outcome` and no citations
    pub fn diagnostic(outcome: SynthesisOutcome) -> Self {
        Self {
            answer: outcome.diagnostic(),
            citations: Vec::new(),
            outcome,
        }
    }

    pub fn no_evidence() -> Self {
        Self::diagnostic(SynthesisOutcome::NoEvidence)
    }
}

/// Builds the prompt, calls the model and validates its structured reply
pub struct AnswerSynthesizer<M> {
    model: M,
    verify_citations: bool,
}

impl<M: GenerativeModel> AnswerSynthesizer<M> {
    pub fn new(model: M) -> Self {
        Self {
            model,
            verify_citations: false,
        }
    }

    /// Drop citations whose text cannot be found in the cited passage
    pub fn with_citation_verification(mut self, enabled: bool) -> Self {
        self.verify_citations = enabled;
        self
    }

    pub fn model(&self) -> &M {
        &self.model
    }

    pub async fn synthesize(&self, query: &str, passages: &[RetrievedPassage]) -> SynthesisResult {
        // Never let the model answer without evidence
        if passages.is_empty() {
            warn!("No context passages provided; skipping model call");
            return SynthesisResult::no_evidence();
        }

        let labels = passage_labels(passages);
        let prompt = build_prompt(query, passages, &labels);

        info!("Calling generative model with {} passages", passages.len());
        let raw_text = match self.model.generate(&prompt).await {
            Ok(text) => {
                info!("Generative model call successful");
                text
            }
            Err(e) => {
                error!("Generative model call failed: {}", e);
                return SynthesisResult::diagnostic(SynthesisOutcome::Transport(e.failure()));
            }
        };

        self.interpret(&raw_text, passages, &labels)
    }

    /// Turn raw model text into a validated result
    pub fn interpret(
        &self,
        raw_text: &str,
        passages: &[RetrievedPassage],
        labels: &[String],
    ) -> SynthesisResult {
        match parse_response(raw_text) {
            ParseOutcome::NoBlockFound => {
                warn!("No JSON block found in model response");
                warn!(
                    "Raw model text was: {}...",
                    raw_text.chars().take(500).collect::<String>()
                );
                SynthesisResult::diagnostic(SynthesisOutcome::NoStructuredBlock)
            }
            ParseOutcome::MalformedJson { block, error } => {
                error!("Failed to parse JSON from model response: {}", error);
                error!("Faulty JSON block was:\n{}", block);
                SynthesisResult::diagnostic(SynthesisOutcome::MalformedJson)
            }
            ParseOutcome::Parsed {
                answer,
                raw_citations,
            } => {
                let citations = validate_citations(&raw_citations);
                let citations = self.check_grounding(citations, passages, labels);
                info!("Returning answer and {} citations", citations.len());

                match answer {
                    Some(answer) => SynthesisResult::answered(answer, citations),
                    None => SynthesisResult {
                        answer: MISSING_ANSWER.to_string(),
                        citations,
                        outcome: SynthesisOutcome::MissingAnswer,
                    },
                }
            }
        }
    }

    fn check_grounding(
        &self,
        citations: Vec<Citation>,
        passages: &[RetrievedPassage],
        labels: &[String],
    ) -> Vec<Citation> {
        citations
            .into_iter()
            .filter(|citation| {
                if citation_is_grounded(citation, passages, labels) {
                    return true;
                }
                warn!(
                    "Citation from '{}' not found verbatim in retrieved context{}",
                    citation.source,
                    if self.verify_citations {
                        "; dropping"
                    } else {
                        ""
                    }
                );
                !self.verify_citations
            })
            .collect()
    }
}
