//! Arta: Persian tax-assistant bot for Instagram direct messages and comments.

use std::{net::SocketAddr, path::PathBuf, sync::Arc, time::Duration};

use anyhow::{Context, Result};
use arta_admission::{AdmissionConfig, AdmissionController};
use arta_ai::{OpenAiAdvisor, OpenAiAdvisorConfig};
use arta_cache::{CacheConfig, ResponseCache, TierConfig};
use arta_core::current_unix_timestamp_ms;
use arta_instagram::{
    ConnectionSupervisor, Credentials, InstagramApiClient, InstagramApiConfig, ReconnectPolicy,
    SessionStore,
};
use arta_ops::{serve_ops, OpsState};
use arta_runtime::{
    spawn_purge_task, spawn_stats_task, spawn_sweep_task, Dispatcher, DispatcherConfig,
};
use arta_store::InteractionStore;
use clap::Parser;
use serde_json::json;
use tokio::sync::{mpsc, watch};
use tracing::level_filters::LevelFilter;
use tracing_subscriber::EnvFilter;

#[derive(Debug, Parser)]
#[command(name = "arta", about = "Instagram tax-assistant bot")]
struct Cli {
    /// Instagram account username.
    #[arg(long, env = "ARTA_IG_USERNAME")]
    ig_username: String,
    /// Instagram account password.
    #[arg(long, env = "ARTA_IG_PASSWORD", hide_env_values = true)]
    ig_password: String,
    /// Instagram private API base URL.
    #[arg(long, env = "ARTA_IG_API_BASE", default_value = "https://i.instagram.com/api/v1")]
    ig_api_base: String,
    /// Path of the persisted session blob.
    #[arg(long, env = "ARTA_SESSION_PATH", default_value = "state/session.json")]
    session_path: PathBuf,
    /// Path of the interaction history database.
    #[arg(long, env = "ARTA_DB_PATH", default_value = "state/history.sqlite")]
    db_path: PathBuf,

    /// OpenAI-compatible API key for the question-answering advisor.
    #[arg(long, env = "OPENAI_API_KEY", hide_env_values = true)]
    openai_api_key: String,
    #[arg(long, env = "OPENAI_API_BASE", default_value = "https://api.openai.com/v1")]
    openai_api_base: String,
    #[arg(long, env = "OPENAI_MODEL", default_value = "gpt-4o-mini")]
    openai_model: String,
    #[arg(long, env = "OPENAI_TIMEOUT_MS", default_value_t = 30_000)]
    openai_timeout_ms: u64,

    /// Enables the per-user fixed-window rate limiter.
    #[arg(
        long,
        env = "ARTA_RATE_LIMIT_ENABLED",
        default_value_t = true,
        action = clap::ArgAction::Set
    )]
    rate_limit_enabled: bool,
    #[arg(long, env = "ARTA_RATE_LIMIT_WINDOW_MS", default_value_t = 60_000)]
    rate_limit_window_ms: u64,
    #[arg(long, env = "ARTA_RATE_LIMIT_MAX", default_value_t = 10)]
    rate_limit_max: u32,

    /// Post-processing delay after each direct message, in milliseconds.
    #[arg(long, env = "ARTA_REQUEST_DELAY_MS", default_value_t = 2_000)]
    request_delay_ms: u64,
    #[arg(long, env = "ARTA_MAX_MESSAGE_LENGTH", default_value_t = 1_000)]
    max_message_length: usize,
    /// Replies to comments as well as direct messages.
    #[arg(long, env = "ARTA_ENABLE_COMMENT_REPLY", default_value_t = false)]
    enable_comment_reply: bool,
    /// Comma-separated blocklist for the content-safety check.
    #[arg(long, env = "ARTA_CONTENT_BLOCKLIST", value_delimiter = ',')]
    content_blocklist: Vec<String>,

    #[arg(long, env = "ARTA_RECONNECT_BASE_DELAY_MS", default_value_t = 1_000)]
    reconnect_base_delay_ms: u64,
    #[arg(long, env = "ARTA_RECONNECT_MAX_DELAY_MS", default_value_t = 30_000)]
    reconnect_max_delay_ms: u64,
    #[arg(long, env = "ARTA_RECONNECT_MAX_ATTEMPTS", default_value_t = 5)]
    reconnect_max_attempts: u32,

    /// Serves the health/metrics/admin HTTP surface.
    #[arg(
        long,
        env = "ARTA_ENABLE_OPS",
        default_value_t = true,
        action = clap::ArgAction::Set
    )]
    enable_ops: bool,
    #[arg(long, env = "ARTA_OPS_PORT", default_value_t = 3_000)]
    ops_port: u16,

    /// Interaction retention horizon for the daily purge.
    #[arg(long, env = "ARTA_RETENTION_DAYS", default_value_t = 90)]
    retention_days: u64,
    #[arg(long, env = "ARTA_SWEEP_INTERVAL_MS", default_value_t = 300_000)]
    sweep_interval_ms: u64,
    #[arg(long, env = "ARTA_STATS_INTERVAL_MS", default_value_t = 3_600_000)]
    stats_interval_ms: u64,
    #[arg(long, env = "ARTA_PURGE_INTERVAL_MS", default_value_t = 86_400_000)]
    purge_interval_ms: u64,
}

impl Cli {
    /// Configuration snapshot for the ops surface, with secrets redacted.
    fn safe_config(&self) -> serde_json::Value {
        json!({
            "ig_username": self.ig_username,
            "ig_api_base": self.ig_api_base,
            "session_path": self.session_path.display().to_string(),
            "db_path": self.db_path.display().to_string(),
            "openai_model": self.openai_model,
            "rate_limit": {
                "enabled": self.rate_limit_enabled,
                "window_ms": self.rate_limit_window_ms,
                "max_requests": self.rate_limit_max,
            },
            "request_delay_ms": self.request_delay_ms,
            "max_message_length": self.max_message_length,
            "enable_comment_reply": self.enable_comment_reply,
            "reconnect": {
                "base_delay_ms": self.reconnect_base_delay_ms,
                "max_delay_ms": self.reconnect_max_delay_ms,
                "max_attempts": self.reconnect_max_attempts,
            },
            "retention_days": self.retention_days,
        })
    }
}

fn init_tracing() {
    let env_filter = EnvFilter::builder()
        .with_default_directive(LevelFilter::INFO.into())
        .from_env_lossy();

    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .compact()
        .init();
}

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();
    let cli = Cli::parse();
    tracing::info!(
        username = %cli.ig_username,
        comment_reply = cli.enable_comment_reply,
        rate_limit = cli.rate_limit_enabled,
        "starting arta"
    );

    // Service objects, constructed once and handed out by reference.
    let admission = Arc::new(AdmissionController::new(AdmissionConfig {
        enabled: cli.rate_limit_enabled,
        window_ms: cli.rate_limit_window_ms,
        max_requests: cli.rate_limit_max,
    }));
    let cache = Arc::new(ResponseCache::new(CacheConfig {
        response: TierConfig {
            default_ttl_ms: 3_600_000,
            max_keys: 1_000,
        },
        user_profile: TierConfig {
            default_ttl_ms: 7_200_000,
            max_keys: 1_000,
        },
        tax_result: TierConfig {
            default_ttl_ms: 86_400_000,
            max_keys: 1_000,
        },
    }));
    let store = Arc::new(
        InteractionStore::open(&cli.db_path).context("failed to open interaction store")?,
    );
    let advisor = Arc::new(
        OpenAiAdvisor::new(OpenAiAdvisorConfig {
            api_base: cli.openai_api_base.clone(),
            api_key: cli.openai_api_key.clone(),
            model: cli.openai_model.clone(),
            request_timeout_ms: cli.openai_timeout_ms,
            ..OpenAiAdvisorConfig::default()
        })
        .context("failed to construct advisor client")?,
    );
    let transport = Arc::new(
        InstagramApiClient::new(InstagramApiConfig {
            api_base: cli.ig_api_base.clone(),
            ..InstagramApiConfig::default()
        })
        .context("failed to construct platform client")?,
    );

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    {
        let shutdown_tx = shutdown_tx.clone();
        let _ = tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                tracing::info!("shutdown requested");
                let _ = shutdown_tx.send(true);
            }
        });
    }

    let (mut supervisor, link_status_rx) = ConnectionSupervisor::new(
        transport.clone(),
        Credentials {
            username: cli.ig_username.clone(),
            password: cli.ig_password.clone(),
        },
        SessionStore::new(cli.session_path.clone()),
        ReconnectPolicy {
            base_delay_ms: cli.reconnect_base_delay_ms,
            max_delay_ms: cli.reconnect_max_delay_ms,
            max_attempts: cli.reconnect_max_attempts,
        },
        shutdown_rx.clone(),
    );

    if cli.enable_ops {
        let ops_state = Arc::new(OpsState {
            admission: admission.clone(),
            cache: cache.clone(),
            store: store.clone(),
            link_status: link_status_rx.clone(),
            safe_config: cli.safe_config(),
            started_unix_ms: current_unix_timestamp_ms(),
        });
        let addr: SocketAddr = ([0, 0, 0, 0], cli.ops_port).into();
        let ops_shutdown = shutdown_rx.clone();
        let _ = tokio::spawn(async move {
            if let Err(error) = serve_ops(addr, ops_state, ops_shutdown).await {
                tracing::error!(error = %error, "ops surface terminated");
            }
        });
    }

    let _sweep = spawn_sweep_task(
        admission.clone(),
        Duration::from_millis(cli.sweep_interval_ms),
        shutdown_rx.clone(),
    );
    let _stats = spawn_stats_task(
        admission.clone(),
        cache.clone(),
        store.clone(),
        Duration::from_millis(cli.stats_interval_ms),
        shutdown_rx.clone(),
    );
    let _purge = spawn_purge_task(
        store.clone(),
        cli.retention_days,
        Duration::from_millis(cli.purge_interval_ms),
        shutdown_rx.clone(),
    );

    let dispatcher = Dispatcher::new(
        DispatcherConfig {
            max_message_length: cli.max_message_length,
            comment_max_length: 200,
            comment_reply_enabled: cli.enable_comment_reply,
            request_delay_ms: cli.request_delay_ms,
            inappropriate_words: cli.content_blocklist.clone(),
            advisor_history_limit: 3,
        },
        admission,
        cache,
        store,
        advisor,
        transport.clone(),
    );
    let (events_tx, events_rx) = mpsc::channel(256);
    let dispatcher_shutdown = shutdown_rx.clone();
    let dispatcher_handle = tokio::spawn(async move {
        dispatcher.run(events_rx, dispatcher_shutdown).await;
    });

    // The supervisor drives the realtime session until graceful shutdown;
    // first-boot auth failure and ceiling exhaustion both abort the process.
    let supervisor_result = supervisor.run(events_tx).await;
    let _ = shutdown_tx.send(true);
    let _ = dispatcher_handle.await;

    supervisor_result.context("platform connection terminated")?;
    tracing::info!("arta stopped gracefully");
    Ok(())
}
