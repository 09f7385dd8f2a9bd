use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;

use crate::retry::{is_retryable_http_error, parse_retry_after, retry_delay, should_retry_status};
use crate::types::{AdvisorClient, AdvisorError, AskContext};

const SYSTEM_PROMPT: &str = "تو یک مشاور مالیاتی حرفه‌ای و متخصص در قوانین مالیاتی ایران هستی.\n\nقوانین پاسخ‌دهی:\n1. همیشه بر اساس قوانین رسمی ایران پاسخ بده\n2. اگر مطمئن نیستی، این موضوع را ذکر کن\n3. پاسخ‌ها را ساده و قابل فهم ارائه بده\n4. در صورت نیاز، مثال عملی بزن\n5. اگر سوال خارج از حوزه مالیات است، کاربر را راهنمایی کن\n\nنرخ‌های مالیاتی فعلی (۱۴۰۳):\n- تا ۵ میلیون: معاف\n- ۵ تا ۱۰ میلیون: ۱۰٪\n- ۱۰ تا ۲۰ میلیون: ۲۰٪\n- بالای ۲۰ میلیون: ۳۰٪";

#[derive(Debug, Clone)]
/// Connection settings for the OpenAI-compatible advisor endpoint.
pub struct OpenAiAdvisorConfig {
    pub api_base: String,
    pub api_key: String,
    pub model: String,
    pub max_tokens: u32,
    pub temperature: f64,
    pub request_timeout_ms: u64,
    pub retry_max_attempts: usize,
    pub retry_base_delay_ms: u64,
}

impl Default for OpenAiAdvisorConfig {
    fn default() -> Self {
        Self {
            api_base: "https://api.openai.com/v1".to_string(),
            api_key: String::new(),
            model: "gpt-4o-mini".to_string(),
            max_tokens: 1_000,
            temperature: 0.7,
            request_timeout_ms: 30_000,
            retry_max_attempts: 3,
            retry_base_delay_ms: 500,
        }
    }
}

#[derive(Debug, Deserialize)]
struct ChatCompletionResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct ChatChoiceMessage {
    content: Option<String>,
}

/// OpenAI-compatible chat-completions advisor.
pub struct OpenAiAdvisor {
    http: reqwest::Client,
    config: OpenAiAdvisorConfig,
}

impl OpenAiAdvisor {
    pub fn new(config: OpenAiAdvisorConfig) -> Result<Self, AdvisorError> {
        if config.api_key.trim().is_empty() {
            return Err(AdvisorError::MissingApiKey);
        }
        let http = reqwest::Client::builder()
            .timeout(Duration::from_millis(config.request_timeout_ms.max(1)))
            .build()?;
        Ok(Self { http, config })
    }

    fn render_user_prompt(question: &str, context: &AskContext) -> String {
        let mut prompt = format!("سوال کاربر: \"{question}\"");
        if !context.previous_questions.is_empty() {
            prompt.push_str("\n\nسوالات قبلی کاربر:\n");
            prompt.push_str(&context.previous_questions.join("\n"));
        }
        if let Some(user_type) = context
            .user_type
            .as_deref()
            .filter(|value| !value.trim().is_empty())
        {
            prompt.push_str(&format!("\n\nنوع کاربر: {user_type}"));
        }
        prompt.push_str("\n\nلطفاً پاسخ جامع و دقیق ارائه بده. اگر نیاز به محاسبه است، مراحل را نشان بده.");
        prompt
    }

    fn classify_status(status: u16, body: String) -> AdvisorError {
        match status {
            429 => AdvisorError::RateLimited,
            401 | 403 => AdvisorError::Unauthorized,
            400 => AdvisorError::ContentRejected,
            _ => AdvisorError::HttpStatus { status, body },
        }
    }
}

#[async_trait]
impl AdvisorClient for OpenAiAdvisor {
    async fn ask(
        &self,
        question: &str,
        user_id: &str,
        context: &AskContext,
    ) -> Result<String, AdvisorError> {
        let payload = json!({
            "model": self.config.model,
            "messages": [
                { "role": "system", "content": SYSTEM_PROMPT },
                { "role": "user", "content": Self::render_user_prompt(question, context) },
            ],
            "max_tokens": self.config.max_tokens,
            "temperature": self.config.temperature,
        });
        let url = format!(
            "{}/chat/completions",
            self.config.api_base.trim_end_matches('/')
        );

        let mut attempt = 0_usize;
        loop {
            attempt = attempt.saturating_add(1);
            let response = self
                .http
                .post(&url)
                .bearer_auth(&self.config.api_key)
                .json(&payload)
                .send()
                .await;

            match response {
                Ok(response) => {
                    let status = response.status();
                    if status.is_success() {
                        let parsed = response.json::<ChatCompletionResponse>().await?;
                        let answer = parsed
                            .choices
                            .first()
                            .and_then(|choice| choice.message.content.as_deref())
                            .map(str::trim)
                            .filter(|content| !content.is_empty())
                            .ok_or_else(|| {
                                AdvisorError::InvalidResponse(
                                    "chat completion had no content".to_string(),
                                )
                            })?;
                        tracing::debug!(user_id, attempt, "advisor answered");
                        return Ok(answer.to_string());
                    }

                    let retry_after = parse_retry_after(response.headers());
                    if attempt < self.config.retry_max_attempts.max(1)
                        && should_retry_status(status.as_u16())
                    {
                        let delay =
                            retry_delay(self.config.retry_base_delay_ms, attempt, retry_after);
                        tracing::warn!(
                            user_id,
                            attempt,
                            status = status.as_u16(),
                            delay_ms = delay.as_millis() as u64,
                            "advisor call failed, retrying"
                        );
                        tokio::time::sleep(delay).await;
                        continue;
                    }

                    let body = response.text().await.unwrap_or_default();
                    return Err(Self::classify_status(status.as_u16(), body));
                }
                Err(error) => {
                    if attempt < self.config.retry_max_attempts.max(1)
                        && is_retryable_http_error(&error)
                    {
                        let delay = retry_delay(self.config.retry_base_delay_ms, attempt, None);
                        tracing::warn!(
                            user_id,
                            attempt,
                            error = %error,
                            "advisor transport error, retrying"
                        );
                        tokio::time::sleep(delay).await;
                        continue;
                    }
                    return Err(AdvisorError::Http(error));
                }
            }
        }
    }
}
