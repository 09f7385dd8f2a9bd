//! Shared fixtures for the end-to-end integration tests: a scripted platform
//! transport and a counting advisor that stand in for the live collaborators.

use std::sync::{
    atomic::{AtomicUsize, Ordering},
    Arc, Mutex,
};

use async_trait::async_trait;
use arta_ai::{AdvisorClient, AdvisorError, AskContext};
use arta_instagram::{
    Credentials, InboundMessage, LinkEvent, OutboundSender, PlatformTransport, TransportError,
};
use serde_json::{json, Value};
use tokio::sync::mpsc;

/// Transport double: records outbound traffic and replays scripted
/// subscription batches. Each `subscribe` call drains one batch; the channel
/// stays open afterwards so sessions end only via explicit events.
pub struct ScriptedTransport {
    pub sent_direct: Mutex<Vec<(String, String)>>,
    pub sent_comments: Mutex<Vec<(String, String, String)>>,
    pub login_calls: AtomicUsize,
    subscriptions: Mutex<Vec<Vec<LinkEvent>>>,
}

impl ScriptedTransport {
    pub fn new(subscriptions: Vec<Vec<LinkEvent>>) -> Self {
        Self {
            sent_direct: Mutex::new(Vec::new()),
            sent_comments: Mutex::new(Vec::new()),
            login_calls: AtomicUsize::new(0),
            subscriptions: Mutex::new(subscriptions),
        }
    }

    pub fn direct_replies(&self) -> Vec<(String, String)> {
        self.sent_direct.lock().expect("lock").clone()
    }
}

#[async_trait]
impl OutboundSender for ScriptedTransport {
    async fn send_direct_message(&self, thread_id: &str, text: &str) -> Result<(), TransportError> {
        self.sent_direct
            .lock()
            .expect("lock")
            .push((thread_id.to_string(), text.to_string()));
        Ok(())
    }

    async fn reply_to_comment(
        &self,
        media_id: &str,
        comment_id: &str,
        text: &str,
    ) -> Result<(), TransportError> {
        self.sent_comments.lock().expect("lock").push((
            media_id.to_string(),
            comment_id.to_string(),
            text.to_string(),
        ));
        Ok(())
    }
}

#[async_trait]
impl PlatformTransport for ScriptedTransport {
    async fn login(&self, _credentials: &Credentials) -> Result<Value, TransportError> {
        let _ = self.login_calls.fetch_add(1, Ordering::SeqCst);
        Ok(json!({"token": "scripted"}))
    }

    async fn restore_session(&self, _session: &Value) -> Result<(), TransportError> {
        Err(TransportError::SessionInvalid)
    }

    async fn subscribe(&self) -> Result<mpsc::Receiver<LinkEvent>, TransportError> {
        let events = {
            let mut subscriptions = self.subscriptions.lock().expect("lock");
            if subscriptions.is_empty() {
                Vec::new()
            } else {
                subscriptions.remove(0)
            }
        };
        let (tx, rx) = mpsc::channel(32);
        let _ = tokio::spawn(async move {
            for event in events {
                if tx.send(event).await.is_err() {
                    return;
                }
            }
            tokio::time::sleep(std::time::Duration::from_secs(60)).await;
        });
        Ok(rx)
    }

    async fn disconnect(&self) -> Result<(), TransportError> {
        Ok(())
    }
}

/// Advisor double that counts invocations.
pub struct CountingAdvisor {
    pub calls: AtomicUsize,
}

impl CountingAdvisor {
    pub fn new() -> Self {
        Self {
            calls: AtomicUsize::new(0),
        }
    }
}

impl Default for CountingAdvisor {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl AdvisorClient for CountingAdvisor {
    async fn ask(
        &self,
        _question: &str,
        _user_id: &str,
        _context: &AskContext,
    ) -> Result<String, AdvisorError> {
        let _ = self.calls.fetch_add(1, Ordering::SeqCst);
        Ok("پاسخ مشاور".to_string())
    }
}

pub fn direct_message(user_id: &str, text: &str) -> LinkEvent {
    LinkEvent::DirectMessage(InboundMessage {
        thread_id: format!("thread-{user_id}"),
        user_id: Some(user_id.to_string()),
        text: text.to_string(),
        occurred_unix_ms: 1,
    })
}

pub fn test_credentials() -> Credentials {
    Credentials {
        username: "tax_bot".to_string(),
        password: "pw".to_string(),
    }
}

pub type SharedTransport = Arc<ScriptedTransport>;
