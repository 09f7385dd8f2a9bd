use std::{sync::Arc, time::Duration};

use arta_admission::AdmissionController;
use arta_ai::{AdvisorClient, AskContext};
use arta_cache::{derive_cache_key, CacheTier, ResponseCache, UserProfileSnapshot};
use arta_core::{current_unix_timestamp_ms, truncate_for_message};
use arta_instagram::{InboundComment, InboundMessage, LinkEvent, OutboundSender};
use arta_lang::{
    analyze_query, analyze_sentiment, contains_inappropriate_content, format_persian_number,
    help_message, quick_response, welcome_message, QueryKind,
};
use arta_store::{InteractionRecord, InteractionStore, MessageType};
use arta_tax::{
    calculate_corporate_tax, calculate_tax, calculate_vat, income_tax_report, CompanyType,
    TaxOptions,
};
use tokio::sync::{mpsc, watch};

const UNSAFE_CONTENT_REPLY: &str = "متاسفانه نمی‌توانم به این پیام پاسخ دهم.";
const SEND_FAILURE_NOTICE: &str = "متاسفانه مشکلی پیش آمد. لطفاً دوباره تلاش کنید.";
const CLARIFY_REPLY: &str = "لطفاً سوال خود را واضح‌تر بیان کنید یا مبلغ درآمد را ذکر کنید.";
const COMMENT_POINTER_REPLY: &str = "برای محاسبه دقیق مالیات، لطفاً در DM پیام بدهید 📩";
const FULL_REPORT_CONFIDENCE: f64 = 0.8;

#[derive(Debug, Clone)]
/// Dispatcher tuning.
pub struct DispatcherConfig {
    pub max_message_length: usize,
    pub comment_max_length: usize,
    pub comment_reply_enabled: bool,
    /// Post-processing delay after each direct message; comments wait twice
    /// as long. Smooths outbound rate against platform-side throttling.
    pub request_delay_ms: u64,
    pub inappropriate_words: Vec<String>,
    /// How many prior questions are threaded into the advisor prompt.
    pub advisor_history_limit: usize,
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        Self {
            max_message_length: 1_000,
            comment_max_length: 200,
            comment_reply_enabled: true,
            request_delay_ms: 2_000,
            inappropriate_words: Vec::new(),
            advisor_history_limit: 3,
        }
    }
}

/// Sequences the per-event pipeline over explicitly injected services.
pub struct Dispatcher {
    config: DispatcherConfig,
    admission: Arc<AdmissionController>,
    cache: Arc<ResponseCache>,
    store: Arc<InteractionStore>,
    advisor: Arc<dyn AdvisorClient>,
    outbound: Arc<dyn OutboundSender>,
}

impl Dispatcher {
    pub fn new(
        config: DispatcherConfig,
        admission: Arc<AdmissionController>,
        cache: Arc<ResponseCache>,
        store: Arc<InteractionStore>,
        advisor: Arc<dyn AdvisorClient>,
        outbound: Arc<dyn OutboundSender>,
    ) -> Self {
        Self {
            config,
            admission,
            cache,
            store,
            advisor,
            outbound,
        }
    }

    /// Consumes inbound events until the channel closes or shutdown fires.
    pub async fn run(
        &self,
        mut events_rx: mpsc::Receiver<LinkEvent>,
        mut shutdown_rx: watch::Receiver<bool>,
    ) {
        loop {
            tokio::select! {
                _ = async { let _ = shutdown_rx.wait_for(|requested| *requested).await; } => {
                    tracing::info!("dispatcher shutting down");
                    return;
                }
                event = events_rx.recv() => {
                    let Some(event) = event else {
                        tracing::info!("inbound event channel closed");
                        return;
                    };
                    self.handle_event(event).await;
                }
            }
        }
    }

    /// Routes one inbound event through the pipeline.
    pub async fn handle_event(&self, event: LinkEvent) {
        match event {
            LinkEvent::DirectMessage(message) => self.process_direct_message(message).await,
            LinkEvent::Comment(comment) => self.process_comment(comment).await,
            // Connection lifecycle events belong to the supervisor.
            LinkEvent::SubscriptionError { .. } | LinkEvent::Disconnected => {}
        }
    }

    async fn process_direct_message(&self, message: InboundMessage) {
        let text = message.text.trim().to_string();
        let Some(user_id) = message.resolved_user_id().map(str::to_string) else {
            tracing::warn!(thread_id = %message.thread_id, "dropping message without user identity");
            return;
        };
        if text.is_empty() {
            tracing::warn!(user_id, "dropping empty direct message");
            return;
        }
        tracing::info!(user_id, length = text.len(), "direct message received");

        // Admission gate. An internal limiter error is logged and fails open.
        match self.admission.check_admission(&user_id) {
            Ok(decision) if !decision.allowed => {
                let notice = decision
                    .message
                    .unwrap_or_else(|| SEND_FAILURE_NOTICE.to_string());
                let _ = self.send_direct(&message.thread_id, &notice).await;
                return;
            }
            Ok(_) => {}
            Err(error) => {
                tracing::error!(user_id, error = %error, "admission check failed, allowing event");
            }
        }

        if contains_inappropriate_content(&text, &self.config.inappropriate_words) {
            tracing::warn!(user_id, "inappropriate direct message content");
            let _ = self.send_direct(&message.thread_id, UNSAFE_CONTENT_REPLY).await;
            return;
        }

        let profile = self.touch_user_profile(&user_id);

        // Read-through reply cache keyed by the sender and normalized text.
        let reply_key = derive_cache_key(&user_id, &text, CacheTier::Response);
        let cached_reply = self
            .cache
            .get(CacheTier::Response, &reply_key)
            .unwrap_or_else(|error| {
                tracing::error!(user_id, error = %error, "reply cache read failed");
                None
            })
            .and_then(|value| value.as_str().map(str::to_string));

        let reply = match cached_reply {
            Some(reply) => reply,
            None => {
                let (reply, cacheable) = self.compute_reply(&text, &user_id, &profile).await;
                if cacheable {
                    if let Err(error) = self.cache.set(
                        CacheTier::Response,
                        &reply_key,
                        serde_json::Value::String(reply.clone()),
                        None,
                    ) {
                        tracing::error!(user_id, error = %error, "reply cache write failed");
                    }
                }
                reply
            }
        };

        let reply = truncate_for_message(&reply, self.config.max_message_length);
        if !self.send_direct(&message.thread_id, &reply).await {
            // One best-effort error notice; a second failure is logged only.
            let _ = self.send_direct(&message.thread_id, SEND_FAILURE_NOTICE).await;
            return;
        }

        self.persist_interaction(InteractionRecord {
            user_id: user_id.clone(),
            question: text.clone(),
            response: reply,
            message_type: MessageType::DirectMessage,
            sentiment: analyze_sentiment(&text).as_str().to_string(),
            media_id: None,
            comment_id: None,
        });

        tokio::time::sleep(Duration::from_millis(self.config.request_delay_ms)).await;
    }

    async fn process_comment(&self, comment: InboundComment) {
        if !self.config.comment_reply_enabled {
            tracing::debug!(comment_id = %comment.comment_id, "comment replies disabled");
            return;
        }
        let text = comment.text.trim().to_string();
        let Some(user_id) = comment.resolved_user_id().map(str::to_string) else {
            tracing::warn!(comment_id = %comment.comment_id, "dropping comment without user identity");
            return;
        };
        if text.is_empty() {
            tracing::warn!(user_id, "dropping empty comment");
            return;
        }
        tracing::info!(user_id, media_id = %comment.media_id, "comment received");

        // No outbound channel exists for a rate-limit notice on a comment.
        match self.admission.check_admission(&user_id) {
            Ok(decision) if !decision.allowed => return,
            Ok(_) => {}
            Err(error) => {
                tracing::error!(user_id, error = %error, "admission check failed, allowing event");
            }
        }

        if contains_inappropriate_content(&text, &self.config.inappropriate_words) {
            tracing::warn!(user_id, "inappropriate comment content");
            return;
        }

        let reply_key = derive_cache_key(&user_id, &text, CacheTier::Response);
        let cached_reply = self
            .cache
            .get(CacheTier::Response, &reply_key)
            .unwrap_or_else(|error| {
                tracing::error!(user_id, error = %error, "reply cache read failed");
                None
            })
            .and_then(|value| value.as_str().map(str::to_string));

        let reply = match cached_reply {
            Some(reply) => reply,
            None => {
                let analysis = analyze_query(&text);
                let reply = match (analysis.kind.is_calculation(), analysis.amount) {
                    (true, Some(amount)) => match calculate_tax(amount) {
                        Ok(summary) => format!(
                            "💰 مالیات {}: {} ریال",
                            format_persian_number(summary.gross_income),
                            format_persian_number(summary.total_tax)
                        ),
                        Err(_) => COMMENT_POINTER_REPLY.to_string(),
                    },
                    _ => COMMENT_POINTER_REPLY.to_string(),
                };
                if let Err(error) = self.cache.set(
                    CacheTier::Response,
                    &reply_key,
                    serde_json::Value::String(reply.clone()),
                    None,
                ) {
                    tracing::error!(user_id, error = %error, "reply cache write failed");
                }
                reply
            }
        };

        let reply = truncate_for_message(&reply, self.config.comment_max_length);
        match self
            .outbound
            .reply_to_comment(&comment.media_id, &comment.comment_id, &reply)
            .await
        {
            Ok(()) => {
                self.persist_interaction(InteractionRecord {
                    user_id: user_id.clone(),
                    question: text.clone(),
                    response: reply,
                    message_type: MessageType::CommentReply,
                    sentiment: analyze_sentiment(&text).as_str().to_string(),
                    media_id: Some(comment.media_id.clone()),
                    comment_id: Some(comment.comment_id.clone()),
                });
            }
            Err(error) => {
                tracing::error!(user_id, error = %error, "comment reply transmission failed");
            }
        }

        // Comments wait twice as long to keep the outbound rate gentle.
        tokio::time::sleep(Duration::from_millis(
            self.config.request_delay_ms.saturating_mul(2),
        ))
        .await;
    }

    /// Produces the reply text for a direct message. The boolean marks
    /// whether the reply is worth caching (computed results are; greetings,
    /// canned messages, and failure fallbacks are not).
    async fn compute_reply(
        &self,
        text: &str,
        user_id: &str,
        profile: &UserProfileSnapshot,
    ) -> (String, bool) {
        if let Some(reply) = quick_response(text) {
            return (reply.to_string(), false);
        }
        if profile.message_count == 1 {
            return (welcome_message(), false);
        }
        if text.contains("راهنما") || text.contains("کمک") {
            return (help_message(), false);
        }

        let analysis = analyze_query(text);
        match (analysis.kind, analysis.amount) {
            (QueryKind::IncomeTax | QueryKind::SalaryTax, Some(amount)) => {
                if let Some(cached) = self.cached_tax_reply(user_id, amount) {
                    return (cached, true);
                }
                let reply = if analysis.confidence > FULL_REPORT_CONFIDENCE {
                    match income_tax_report(amount, &TaxOptions::default()) {
                        Ok(report) => report,
                        Err(_) => CLARIFY_REPLY.to_string(),
                    }
                } else {
                    match calculate_tax(amount) {
                        Ok(summary) => format!(
                            "💰 درآمد: {} ریال\n🧮 مالیات: {} ریال\n\n💡 برای محاسبه دقیق‌تر، اطلاعات بیشتری مانند تعداد فرزندان را ذکر کنید.",
                            format_persian_number(summary.gross_income),
                            format_persian_number(summary.total_tax)
                        ),
                        Err(_) => CLARIFY_REPLY.to_string(),
                    }
                };
                if reply != CLARIFY_REPLY {
                    self.store_tax_reply(user_id, amount, &reply);
                    return (reply, true);
                }
                (reply, false)
            }
            (QueryKind::BusinessTax, Some(amount)) => {
                match calculate_corporate_tax(amount, CompanyType::General) {
                    Ok(corporate) => {
                        let reply = format!(
                            "🏢 سود: {} ریال\n🧮 مالیات شرکت ({}%): {} ریال\n💵 سود خالص: {} ریال",
                            format_persian_number(corporate.profit),
                            corporate.rate_percent,
                            format_persian_number(corporate.tax),
                            format_persian_number(corporate.net_profit)
                        );
                        (reply, true)
                    }
                    Err(_) => (CLARIFY_REPLY.to_string(), false),
                }
            }
            (QueryKind::ValueAddedTax, Some(amount)) => match calculate_vat(amount, None) {
                Ok(vat) => {
                    let reply = format!(
                        "🧾 مبلغ پایه: {} ریال\n➕ مالیات بر ارزش افزوده ({}%): {} ریال\n💵 مبلغ نهایی: {} ریال",
                        format_persian_number(vat.base_amount),
                        vat.rate_percent,
                        format_persian_number(vat.vat_amount),
                        format_persian_number(vat.total_amount)
                    );
                    (reply, true)
                }
                Err(_) => (CLARIFY_REPLY.to_string(), false),
            },
            (kind, None) if kind.is_calculation() => (CLARIFY_REPLY.to_string(), false),
            _ => self.ask_advisor(text, user_id).await,
        }
    }

    /// Looks up a previously rendered reply for the same (user, income) pair.
    fn cached_tax_reply(&self, user_id: &str, amount: u64) -> Option<String> {
        match self.cache.cached_tax_result(user_id, amount) {
            Ok(value) => value.and_then(|value| {
                value
                    .get("reply")
                    .and_then(serde_json::Value::as_str)
                    .map(str::to_string)
            }),
            Err(error) => {
                tracing::error!(user_id, error = %error, "tax cache read failed");
                None
            }
        }
    }

    fn store_tax_reply(&self, user_id: &str, amount: u64, reply: &str) {
        let value = serde_json::json!({ "income": amount, "reply": reply });
        if let Err(error) = self.cache.cache_tax_result(user_id, amount, value) {
            tracing::error!(user_id, error = %error, "tax cache write failed");
        }
    }

    async fn ask_advisor(&self, text: &str, user_id: &str) -> (String, bool) {
        let previous_questions = self
            .store
            .history(user_id, self.config.advisor_history_limit)
            .map(|records| {
                records
                    .into_iter()
                    .map(|record| record.question)
                    .collect::<Vec<_>>()
            })
            .unwrap_or_else(|error| {
                tracing::warn!(user_id, error = %error, "history lookup failed");
                Vec::new()
            });
        let context = AskContext {
            previous_questions,
            user_type: None,
        };
        match self.advisor.ask(text, user_id, &context).await {
            Ok(answer) => (answer, true),
            Err(error) => {
                tracing::error!(user_id, error = %error, "advisor call failed");
                (error.fallback_message().to_string(), false)
            }
        }
    }

    /// Reads, bumps, and rewrites the per-user profile snapshot. A write
    /// fully replaces the previous snapshot.
    fn touch_user_profile(&self, user_id: &str) -> UserProfileSnapshot {
        let now_unix_ms = current_unix_timestamp_ms();
        let mut profile = self
            .cache
            .cached_user_info(user_id)
            .unwrap_or_else(|error| {
                tracing::error!(user_id, error = %error, "profile cache read failed");
                None
            })
            .unwrap_or_else(|| UserProfileSnapshot {
                user_id: user_id.to_string(),
                message_count: 0,
                first_interaction_unix_ms: now_unix_ms,
                last_message_unix_ms: now_unix_ms,
                last_seen_unix_ms: now_unix_ms,
            });
        profile.message_count = profile.message_count.saturating_add(1);
        profile.last_message_unix_ms = now_unix_ms;
        if let Err(error) = self.cache.cache_user_info(user_id, profile.clone()) {
            tracing::error!(user_id, error = %error, "profile cache write failed");
        }
        profile
    }

    async fn send_direct(&self, thread_id: &str, text: &str) -> bool {
        match self.outbound.send_direct_message(thread_id, text).await {
            Ok(()) => true,
            Err(error) => {
                tracing::error!(thread_id, error = %error, "direct message transmission failed");
                false
            }
        }
    }

    /// Fire-and-forget persistence. Failures are logged and never block or
    /// retry the reply path.
    fn persist_interaction(&self, record: InteractionRecord) {
        let store = self.store.clone();
        let _ = tokio::task::spawn_blocking(move || {
            if let Err(error) = store.save(&record) {
                tracing::error!(
                    user_id = %record.user_id,
                    error = %error,
                    "failed to persist interaction"
                );
            }
        });
    }
}
