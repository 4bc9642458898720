//! Question answering over the retrieval pipeline.

use super::conversation::{ConversationFormatter, ConversationTurn};
use super::pipeline::RetrievalPipeline;
use crate::error::{Result, RetrieverError};
use crate::status::PipelineStatus;
use crate::storage::RetrievalResult;
use docent_embed::Generator;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, error, info};

/// Returned to callers whenever any stage of answering fails.
pub const FALLBACK_ANSWER: &str =
    "Sorry, I encountered an error while processing your question. Please try again.";

/// Number of chunks retrieved per question.
pub const DEFAULT_TOP_K: usize = 6;

/// Incoming question, in the `{question, conversationHistory}` wire shape.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnswerRequest {
    pub question: String,
    #[serde(default, rename = "conversationHistory")]
    pub conversation_history: Vec<ConversationTurn>,
}

impl AnswerRequest {
    pub fn new(question: impl Into<String>) -> Self {
        Self {
            question: question.into(),
            conversation_history: Vec::new(),
        }
    }

    pub fn with_history(mut self, history: Vec<ConversationTurn>) -> Self {
        self.conversation_history = history;
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnswerResponse {
    pub answer: String,
}

/// An answer together with the chunks it was generated from.
#[derive(Debug, Clone)]
pub struct Answer {
    pub text: String,
    pub sources: RetrievalResult,
}

pub struct AnswerService {
    pipeline: Arc<RetrievalPipeline>,
    generator: Arc<dyn Generator>,
    formatter: ConversationFormatter,
    top_k: usize,
}

impl AnswerService {
    pub fn new(pipeline: Arc<RetrievalPipeline>, generator: Arc<dyn Generator>) -> Self {
        Self {
            pipeline,
            generator,
            formatter: ConversationFormatter::default(),
            top_k: DEFAULT_TOP_K,
        }
    }

    pub fn with_formatter(mut self, formatter: ConversationFormatter) -> Self {
        self.formatter = formatter;
        self
    }

    pub fn with_top_k(mut self, top_k: usize) -> Self {
        self.top_k = top_k;
        self
    }

    pub fn pipeline(&self) -> &Arc<RetrievalPipeline> {
        &self.pipeline
    }

    /// Build the index ahead of the first question.
    pub async fn warm_up(&self) -> Result<()> {
        self.pipeline.ensure_ready().await.map(|_| ())
    }

    pub fn status(&self) -> PipelineStatus {
        self.pipeline.status()
    }

    /// Answer `request`, surfacing every failure to the caller.
    pub async fn try_answer(&self, request: &AnswerRequest) -> Result<Answer> {
        let question = request.question.trim();
        if question.is_empty() {
            return Err(RetrieverError::InvalidRequest {
                message: "question is empty".to_string(),
            });
        }
        let history = &request.conversation_history;

        let query = self.formatter.retrieval_query(question, history);
        let sources = self.pipeline.search(&query, self.top_k).await?;
        debug!("Retrieved {} chunks for question", sources.len());

        let context = self.formatter.render_context(&sources);
        let prompt_question = self.formatter.conversational_question(question, history);
        let text = self.generator.complete(&context, &prompt_question).await?;

        info!(
            "Answered question using {} chunks via {}",
            sources.len(),
            self.generator.name()
        );
        Ok(Answer { text, sources })
    }

    /// Answer `request`; any failure is logged and replaced by [`FALLBACK_ANSWER`].
    pub async fn answer(&self, request: &AnswerRequest) -> AnswerResponse {
        match self.try_answer(request).await {
            Ok(answer) => AnswerResponse {
                answer: answer.text,
            },
            Err(e) => {
                error!("Failed to answer question: {}", e);
                AnswerResponse {
                    answer: FALLBACK_ANSWER.to_string(),
                }
            }
        }
    }
}
