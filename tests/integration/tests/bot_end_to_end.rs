//! End-to-end pipeline scenarios: admission, caching, and reconnection
//! behavior wired through the real dispatcher and supervisor against
//! scripted collaborators.

use std::{sync::Arc, time::Duration};

use arta_admission::{AdmissionConfig, AdmissionController};
use arta_cache::{CacheConfig, CacheTier, ResponseCache};
use arta_instagram::{ConnectionSupervisor, LinkEvent, LinkStatus, ReconnectPolicy, SessionStore};
use arta_integration_tests::{
    direct_message, test_credentials, CountingAdvisor, ScriptedTransport,
};
use arta_runtime::{Dispatcher, DispatcherConfig};
use arta_store::InteractionStore;
use std::sync::atomic::Ordering;
use tokio::sync::{mpsc, watch};

struct BotFixture {
    dispatcher: Dispatcher,
    transport: Arc<ScriptedTransport>,
    advisor: Arc<CountingAdvisor>,
    cache: Arc<ResponseCache>,
}

fn bot_fixture(max_requests: u32) -> BotFixture {
    let transport = Arc::new(ScriptedTransport::new(Vec::new()));
    let advisor = Arc::new(CountingAdvisor::new());
    let cache = Arc::new(ResponseCache::new(CacheConfig::default()));
    let dispatcher = Dispatcher::new(
        DispatcherConfig {
            request_delay_ms: 0,
            ..DispatcherConfig::default()
        },
        Arc::new(AdmissionController::new(AdmissionConfig {
            enabled: true,
            window_ms: 60_000,
            max_requests,
        })),
        cache.clone(),
        Arc::new(InteractionStore::open_in_memory().expect("store")),
        advisor.clone(),
        transport.clone(),
    );
    BotFixture {
        dispatcher,
        transport,
        advisor,
        cache,
    }
}

/// Scenario: the first Persian-digit tax query computes and caches a reply;
/// the identical repeat within the TTL is served from cache and the advisor
/// is never involved.
#[tokio::test]
async fn integration_tax_query_is_computed_once_then_cached() {
    let fixture = bot_fixture(10);

    // First contact gets the welcome message out of the way.
    fixture
        .dispatcher
        .handle_event(direct_message("u1", "شروع"))
        .await;

    fixture
        .dispatcher
        .handle_event(direct_message("u1", "مالیات ۱۰۰۰۰۰۰۰"))
        .await;
    let replies = fixture.transport.direct_replies();
    let first_reply = replies.last().expect("tax reply").1.clone();
    // 10,000,000 rials sits entirely inside the exemption plus zero band.
    assert!(first_reply.contains("گزارش محاسبه مالیات"));
    assert!(first_reply.contains("۱۰٬۰۰۰٬۰۰۰"));

    let response_stats_before = fixture
        .cache
        .stats(CacheTier::Response)
        .expect("stats");

    fixture
        .dispatcher
        .handle_event(direct_message("u1", "مالیات ۱۰۰۰۰۰۰۰"))
        .await;
    let replies = fixture.transport.direct_replies();
    assert_eq!(replies.last().expect("cached reply").1, first_reply);

    let response_stats_after = fixture.cache.stats(CacheTier::Response).expect("stats");
    assert_eq!(
        response_stats_after.hits,
        response_stats_before.hits + 1,
        "repeat message must be served from the response cache"
    );
    assert_eq!(fixture.advisor.calls.load(Ordering::SeqCst), 0);
}

/// Scenario: the (L+1)th message inside one window receives the denial
/// message and is never forwarded to the classifier or the advisor.
#[tokio::test]
async fn integration_over_limit_message_is_denied_before_downstream() {
    let limit = 3_u32;
    let fixture = bot_fixture(limit);

    for index in 0..limit {
        fixture
            .dispatcher
            .handle_event(direct_message("u1", &format!("سوال شماره {index} دارم")))
            .await;
    }
    let advisor_calls_before = fixture.advisor.calls.load(Ordering::SeqCst);

    fixture
        .dispatcher
        .handle_event(direct_message("u1", "چطور معافیت بگیرم؟"))
        .await;

    let replies = fixture.transport.direct_replies();
    let denial = &replies.last().expect("denial").1;
    assert!(denial.contains("بیش از حد مجاز"));
    assert_eq!(
        fixture.advisor.calls.load(Ordering::SeqCst),
        advisor_calls_before,
        "denied event must not reach the advisor"
    );
}

/// Scenario: a realtime disconnect drives the supervisor through
/// Reconnecting and back to Connected with the attempt counter reset, and
/// events from the new session keep flowing.
#[tokio::test]
async fn integration_disconnect_reconnects_with_backoff_and_resets_attempts() {
    let tempdir = tempfile::tempdir().expect("tempdir");
    let transport = Arc::new(ScriptedTransport::new(vec![
        vec![
            direct_message("u1", "پیام اول"),
            LinkEvent::Disconnected,
        ],
        vec![direct_message("u1", "پیام دوم")],
    ]));

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let (mut supervisor, status_rx) = ConnectionSupervisor::new(
        transport.clone(),
        test_credentials(),
        SessionStore::new(tempdir.path().join("session.json")),
        ReconnectPolicy {
            base_delay_ms: 1,
            max_delay_ms: 8,
            max_attempts: 5,
        },
        shutdown_rx,
    );

    let (events_tx, mut events_rx) = mpsc::channel(32);
    let handle = tokio::spawn(async move { supervisor.run(events_tx).await });

    let first = tokio::time::timeout(Duration::from_secs(5), events_rx.recv())
        .await
        .expect("first event in time")
        .expect("first event");
    assert!(matches!(first, LinkEvent::DirectMessage(ref m) if m.text == "پیام اول"));

    // The second event only arrives after a transparent reconnect.
    let second = tokio::time::timeout(Duration::from_secs(5), events_rx.recv())
        .await
        .expect("second event in time")
        .expect("second event");
    assert!(matches!(second, LinkEvent::DirectMessage(ref m) if m.text == "پیام دوم"));
    assert_eq!(*status_rx.borrow(), LinkStatus::Connected);
    assert_eq!(transport.login_calls.load(Ordering::SeqCst), 2);

    shutdown_tx.send(true).expect("shutdown");
    assert!(handle.await.expect("join").is_ok());
    assert_eq!(*status_rx.borrow(), LinkStatus::Disconnected);
}
