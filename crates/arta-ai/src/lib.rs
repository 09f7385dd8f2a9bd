//! Question-answering client for free-form tax questions.
//!
//! Defines the [`AdvisorClient`] trait consumed by the dispatcher and an
//! OpenAI-compatible HTTP implementation with retry/backoff. Every error
//! variant maps to a distinct Persian fallback message so API failures never
//! leak internal error text to the user.

mod openai;
mod retry;
mod types;

pub use openai::{OpenAiAdvisor, OpenAiAdvisorConfig};
pub use retry::{
    is_retryable_http_error, next_backoff_ms, parse_retry_after, retry_delay, should_retry_status,
};
pub use types::{AdvisorClient, AdvisorError, AskContext};
