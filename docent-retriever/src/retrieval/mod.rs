//! Indexing and question answering.
//!
//! - [`pipeline`]: lazy, single-flight index construction with caching
//! - [`answer`]: retrieval plus generation, with a fixed fallback answer
//! - [`conversation`]: retrieval queries and prompts from chat history
//! - [`chunking_strategy`]: splitter selection per source file
//! - [`worker_pool`]: bounded, order-preserving concurrency

pub mod answer;
pub mod chunking_strategy;
pub mod conversation;
pub mod pipeline;
pub mod worker_pool;

pub use answer::{Answer, AnswerRequest, AnswerResponse, AnswerService, FALLBACK_ANSWER};
pub use conversation::{ConversationFormatter, ConversationTurn, RetrievalQueryMode, Role};
pub use pipeline::{PipelineConfig, PipelineState, ReadyIndex, RetrievalPipeline};
