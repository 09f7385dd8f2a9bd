use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error)]
/// Failure modes of the question-answering call.
pub enum AdvisorError {
    #[error("missing API key")]
    MissingApiKey,
    #[error("provider rate limited the request")]
    RateLimited,
    #[error("provider rejected the credentials")]
    Unauthorized,
    #[error("provider rejected the prompt content")]
    ContentRejected,
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("provider returned non-success status {status}: {body}")]
    HttpStatus { status: u16, body: String },
    #[error("serialization error: {0}")]
    Serde(#[from] serde_json::Error),
    #[error("invalid response: {0}")]
    InvalidResponse(String),
}

impl AdvisorError {
    /// Persian fallback shown to the user in place of the failed answer.
    /// Rate-limit, auth, and content failures each get a distinct message.
    pub fn fallback_message(&self) -> &'static str {
        match self {
            Self::RateLimited => {
                "تعداد درخواست‌ها زیاد است. لطفاً چند دقیقه صبر کنید و دوباره تلاش کنید."
            }
            Self::MissingApiKey | Self::Unauthorized => {
                "مشکلی در تنظیمات سیستم وجود دارد. لطفاً با پشتیبانی تماس بگیرید."
            }
            Self::ContentRejected => {
                "متاسفانه نمی‌توانم به این سوال پاسخ دهم. لطفاً سوال خود را بازنویسی کنید."
            }
            Self::Http(_) | Self::HttpStatus { .. } | Self::Serde(_) | Self::InvalidResponse(_) => {
                "متاسفانه در حال حاضر مشکلی در سیستم وجود دارد. لطفاً بعداً تلاش کنید."
            }
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
/// Conversation context threaded into the advisor prompt.
pub struct AskContext {
    #[serde(default)]
    pub previous_questions: Vec<String>,
    #[serde(default)]
    pub user_type: Option<String>,
}

#[async_trait]
/// Trait contract for the question-answering collaborator.
pub trait AdvisorClient: Send + Sync {
    async fn ask(
        &self,
        question: &str,
        user_id: &str,
        context: &AskContext,
    ) -> Result<String, AdvisorError>;
}
