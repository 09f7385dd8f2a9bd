//! Fixed-window per-user admission control.
//!
//! Every inbound event passes through [`AdmissionController::check_admission`]
//! before any expensive work happens. State is one window record per active
//! user behind a single mutex, so the check-and-increment pair is atomic per
//! key: two concurrent events from the same user cannot both slip past an
//! exhausted window.

use std::{
    collections::HashMap,
    sync::{
        atomic::{AtomicBool, Ordering},
        Mutex,
    },
};

use anyhow::{anyhow, Result};
use arta_core::current_unix_timestamp_ms;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
/// Tuning for the fixed-window limiter.
pub struct AdmissionConfig {
    pub enabled: bool,
    pub window_ms: u64,
    pub max_requests: u32,
}

impl Default for AdmissionConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            window_ms: 60_000,
            max_requests: 10,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
/// Outcome of one admission check.
pub struct AdmissionDecision {
    pub allowed: bool,
    pub remaining: u32,
    pub reset_in_seconds: u64,
    pub message: Option<String>,
}

impl AdmissionDecision {
    fn allowed(remaining: u32, reset_in_seconds: u64) -> Self {
        Self {
            allowed: true,
            remaining,
            reset_in_seconds,
            message: None,
        }
    }

    fn denied(reset_in_seconds: u64) -> Self {
        Self {
            allowed: false,
            remaining: 0,
            reset_in_seconds,
            message: Some(format!(
                "شما بیش از حد مجاز درخواست ارسال کرده‌اید. لطفاً {reset_in_seconds} ثانیه صبر کنید."
            )),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
/// Point-in-time view of one user's window, for the ops surface.
pub struct UserWindowSnapshot {
    pub request_count: u32,
    pub remaining: u32,
    pub reset_in_seconds: u64,
    pub first_request_unix_ms: u64,
    pub blocked: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
/// Aggregate limiter counters, observability only.
pub struct GlobalAdmissionStats {
    pub active_users: usize,
    pub total_requests: u64,
    pub limited_users: usize,
    pub average_requests_per_user: f64,
    pub rate_limit_enabled: bool,
    pub window_ms: u64,
    pub max_requests: u32,
}

#[derive(Debug, Clone)]
struct UserWindowRecord {
    count: u32,
    window_reset_at_ms: u64,
    first_request_at_ms: u64,
    blocked: bool,
}

/// Fixed-window rate limiter keyed by platform user id.
pub struct AdmissionController {
    config: AdmissionConfig,
    windows: Mutex<HashMap<String, UserWindowRecord>>,
    sweep_in_flight: AtomicBool,
}

impl AdmissionController {
    pub fn new(config: AdmissionConfig) -> Self {
        Self {
            config,
            windows: Mutex::new(HashMap::new()),
            sweep_in_flight: AtomicBool::new(false),
        }
    }

    pub fn config(&self) -> &AdmissionConfig {
        &self.config
    }

    /// Checks and consumes one admission slot for the user at the current time.
    pub fn check_admission(&self, user_id: &str) -> Result<AdmissionDecision> {
        self.check_admission_at(user_id, current_unix_timestamp_ms())
    }

    /// Clock-injected admission check. Fetch-or-create, window reset, limit
    /// check, and increment all happen inside one lock section; denied checks
    /// never increment the counter.
    pub fn check_admission_at(&self, user_id: &str, now_unix_ms: u64) -> Result<AdmissionDecision> {
        if !self.config.enabled {
            return Ok(AdmissionDecision::allowed(u32::MAX, 0));
        }

        let mut windows = self
            .windows
            .lock()
            .map_err(|_| anyhow!("admission window map mutex is poisoned"))?;
        let record = windows
            .entry(user_id.to_string())
            .or_insert_with(|| UserWindowRecord {
                count: 0,
                window_reset_at_ms: now_unix_ms.saturating_add(self.config.window_ms),
                first_request_at_ms: now_unix_ms,
                blocked: false,
            });

        if now_unix_ms >= record.window_reset_at_ms {
            record.count = 0;
            record.window_reset_at_ms = now_unix_ms.saturating_add(self.config.window_ms);
            record.first_request_at_ms = now_unix_ms;
            record.blocked = false;
        }

        let reset_in_seconds = reset_in_seconds(record.window_reset_at_ms, now_unix_ms);
        if record.count >= self.config.max_requests {
            tracing::warn!(
                user_id,
                reset_in_seconds,
                blocked = record.blocked,
                "admission denied: window exhausted"
            );
            return Ok(AdmissionDecision::denied(reset_in_seconds));
        }

        record.count = record.count.saturating_add(1);
        let remaining = self.config.max_requests.saturating_sub(record.count);
        tracing::debug!(
            user_id,
            count = record.count,
            max = self.config.max_requests,
            "admission allowed"
        );
        Ok(AdmissionDecision::allowed(remaining, reset_in_seconds))
    }

    /// Deletes the user's window record. Idempotent; reports prior existence.
    pub fn reset_user_limit(&self, user_id: &str) -> Result<bool> {
        let mut windows = self
            .windows
            .lock()
            .map_err(|_| anyhow!("admission window map mutex is poisoned"))?;
        let existed = windows.remove(user_id).is_some();
        if existed {
            tracing::info!(user_id, "rate limit reset");
        }
        Ok(existed)
    }

    /// Overwrites the user's record so every check denies until the duration
    /// elapses. The over-by-one count marks the block; the `blocked` flag is
    /// the only way to tell it apart from a regularly exhausted window.
    pub fn temporary_block(&self, user_id: &str, duration_ms: u64) -> Result<()> {
        self.temporary_block_at(user_id, duration_ms, current_unix_timestamp_ms())
    }

    pub fn temporary_block_at(
        &self,
        user_id: &str,
        duration_ms: u64,
        now_unix_ms: u64,
    ) -> Result<()> {
        let mut windows = self
            .windows
            .lock()
            .map_err(|_| anyhow!("admission window map mutex is poisoned"))?;
        windows.insert(
            user_id.to_string(),
            UserWindowRecord {
                count: self.config.max_requests.saturating_add(1),
                window_reset_at_ms: now_unix_ms.saturating_add(duration_ms),
                first_request_at_ms: now_unix_ms,
                blocked: true,
            },
        );
        tracing::warn!(
            user_id,
            duration_seconds = duration_ms / 1_000,
            "user temporarily blocked"
        );
        Ok(())
    }

    /// True while a `temporary_block` record is inside its window.
    pub fn is_user_blocked(&self, user_id: &str) -> Result<bool> {
        self.is_user_blocked_at(user_id, current_unix_timestamp_ms())
    }

    pub fn is_user_blocked_at(&self, user_id: &str, now_unix_ms: u64) -> Result<bool> {
        let windows = self
            .windows
            .lock()
            .map_err(|_| anyhow!("admission window map mutex is poisoned"))?;
        Ok(windows
            .get(user_id)
            .map(|record| record.blocked && now_unix_ms < record.window_reset_at_ms)
            .unwrap_or(false))
    }

    /// Snapshot of one user's window, if a record exists.
    pub fn user_stats(&self, user_id: &str) -> Result<Option<UserWindowSnapshot>> {
        self.user_stats_at(user_id, current_unix_timestamp_ms())
    }

    pub fn user_stats_at(
        &self,
        user_id: &str,
        now_unix_ms: u64,
    ) -> Result<Option<UserWindowSnapshot>> {
        let windows = self
            .windows
            .lock()
            .map_err(|_| anyhow!("admission window map mutex is poisoned"))?;
        Ok(windows.get(user_id).map(|record| UserWindowSnapshot {
            request_count: record.count,
            remaining: self.config.max_requests.saturating_sub(record.count),
            reset_in_seconds: reset_in_seconds(record.window_reset_at_ms, now_unix_ms),
            first_request_unix_ms: record.first_request_at_ms,
            blocked: record.blocked,
        }))
    }

    /// Aggregate counters over users inside an active window.
    pub fn global_stats(&self) -> Result<GlobalAdmissionStats> {
        self.global_stats_at(current_unix_timestamp_ms())
    }

    pub fn global_stats_at(&self, now_unix_ms: u64) -> Result<GlobalAdmissionStats> {
        let windows = self
            .windows
            .lock()
            .map_err(|_| anyhow!("admission window map mutex is poisoned"))?;
        let mut active_users = 0_usize;
        let mut total_requests = 0_u64;
        let mut limited_users = 0_usize;
        for record in windows.values() {
            if now_unix_ms < record.window_reset_at_ms {
                active_users = active_users.saturating_add(1);
                total_requests = total_requests.saturating_add(u64::from(record.count));
                if record.count >= self.config.max_requests {
                    limited_users = limited_users.saturating_add(1);
                }
            }
        }
        let average_requests_per_user = if active_users > 0 {
            total_requests as f64 / active_users as f64
        } else {
            0.0
        };
        Ok(GlobalAdmissionStats {
            active_users,
            total_requests,
            limited_users,
            average_requests_per_user,
            rate_limit_enabled: self.config.enabled,
            window_ms: self.config.window_ms,
            max_requests: self.config.max_requests,
        })
    }

    /// Removes records idle for one full window past their reset time. A
    /// single sweep runs at a time; overlapping callers return immediately.
    pub fn sweep(&self) -> Result<usize> {
        self.sweep_at(current_unix_timestamp_ms())
    }

    pub fn sweep_at(&self, now_unix_ms: u64) -> Result<usize> {
        if self
            .sweep_in_flight
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return Ok(0);
        }

        let removed = {
            let mut windows = match self.windows.lock() {
                Ok(windows) => windows,
                Err(_) => {
                    self.sweep_in_flight.store(false, Ordering::Release);
                    return Err(anyhow!("admission window map mutex is poisoned"));
                }
            };
            let before = windows.len();
            windows.retain(|_, record| {
                now_unix_ms
                    < record
                        .window_reset_at_ms
                        .saturating_add(self.config.window_ms)
            });
            before.saturating_sub(windows.len())
        };
        self.sweep_in_flight.store(false, Ordering::Release);

        if removed > 0 {
            tracing::info!(removed, "swept expired rate limit records");
        }
        Ok(removed)
    }
}

fn reset_in_seconds(window_reset_at_ms: u64, now_unix_ms: u64) -> u64 {
    let remaining_ms = window_reset_at_ms.saturating_sub(now_unix_ms);
    remaining_ms.div_ceil(1_000)
}

#[cfg(test)]
mod tests {
    use super::{AdmissionConfig, AdmissionController};

    fn controller(max_requests: u32, window_ms: u64) -> AdmissionController {
        AdmissionController::new(AdmissionConfig {
            enabled: true,
            window_ms,
            max_requests,
        })
    }

    #[test]
    fn unit_remaining_counts_down_to_zero_then_denies() {
        let limiter = controller(3, 60_000);
        let now = 1_000;

        let mut remaining = Vec::new();
        for _ in 0..3 {
            let decision = limiter.check_admission_at("u1", now).expect("check");
            assert!(decision.allowed);
            remaining.push(decision.remaining);
        }
        assert_eq!(remaining, vec![2, 1, 0]);

        let denied = limiter.check_admission_at("u1", now).expect("check");
        assert!(!denied.allowed);
        assert_eq!(denied.remaining, 0);
        assert!(denied.message.is_some());
    }

    #[test]
    fn unit_denied_checks_do_not_increment() {
        let limiter = controller(1, 60_000);
        let now = 1_000;
        assert!(limiter.check_admission_at("u1", now).expect("check").allowed);
        for _ in 0..5 {
            assert!(!limiter.check_admission_at("u1", now).expect("check").allowed);
        }
        let stats = limiter.user_stats_at("u1", now).expect("stats").expect("record");
        assert_eq!(stats.request_count, 1);
    }

    #[test]
    fn unit_window_reset_allows_again_with_count_one() {
        let limiter = controller(2, 60_000);
        let start = 1_000;
        assert!(limiter.check_admission_at("u1", start).expect("check").allowed);
        assert!(limiter.check_admission_at("u1", start).expect("check").allowed);
        assert!(!limiter.check_admission_at("u1", start).expect("check").allowed);

        let after_reset = start + 60_000;
        let decision = limiter.check_admission_at("u1", after_reset).expect("check");
        assert!(decision.allowed);
        let stats = limiter
            .user_stats_at("u1", after_reset)
            .expect("stats")
            .expect("record");
        assert_eq!(stats.request_count, 1);
    }

    #[test]
    fn unit_reset_in_seconds_rounds_up() {
        let limiter = controller(1, 60_000);
        let start = 0;
        assert!(limiter.check_admission_at("u1", start).expect("check").allowed);
        let denied = limiter.check_admission_at("u1", 500).expect("check");
        assert_eq!(denied.reset_in_seconds, 60);
        let denied = limiter.check_admission_at("u1", 1_500).expect("check");
        assert_eq!(denied.reset_in_seconds, 59);
    }

    #[test]
    fn unit_disabled_limiter_always_allows() {
        let limiter = AdmissionController::new(AdmissionConfig {
            enabled: false,
            window_ms: 60_000,
            max_requests: 1,
        });
        for _ in 0..10 {
            let decision = limiter.check_admission_at("u1", 0).expect("check");
            assert!(decision.allowed);
            assert_eq!(decision.remaining, u32::MAX);
        }
    }

    #[test]
    fn functional_temporary_block_denies_for_duration_regardless_of_window() {
        let limiter = controller(10, 1_000);
        let now = 5_000;
        limiter.temporary_block_at("u1", 30_000, now).expect("block");

        assert!(limiter.is_user_blocked_at("u1", now).expect("blocked"));
        assert!(!limiter.check_admission_at("u1", now).expect("check").allowed);
        // Still denied long after the normal 1s window would have reset.
        assert!(
            !limiter
                .check_admission_at("u1", now + 20_000)
                .expect("check")
                .allowed
        );

        // After the block duration the window resets and admission resumes.
        let decision = limiter
            .check_admission_at("u1", now + 30_000)
            .expect("check");
        assert!(decision.allowed);
        assert!(!limiter
            .is_user_blocked_at("u1", now + 30_000)
            .expect("blocked"));
    }

    #[test]
    fn unit_reset_user_limit_is_idempotent() {
        let limiter = controller(1, 60_000);
        assert!(limiter.check_admission_at("u1", 0).expect("check").allowed);
        assert!(limiter.reset_user_limit("u1").expect("reset"));
        assert!(!limiter.reset_user_limit("u1").expect("reset"));
        // A fresh record is created on the next check.
        assert!(limiter.check_admission_at("u1", 0).expect("check").allowed);
    }

    #[test]
    fn unit_sweep_removes_only_idle_records() {
        let limiter = controller(5, 1_000);
        assert!(limiter.check_admission_at("idle", 0).expect("check").allowed);
        assert!(limiter.check_admission_at("busy", 1_500).expect("check").allowed);

        // "idle" reset at 1_000; one extra window puts its cutoff at 2_000.
        let removed = limiter.sweep_at(2_000).expect("sweep");
        assert_eq!(removed, 1);
        assert!(limiter.user_stats_at("idle", 2_000).expect("stats").is_none());
        assert!(limiter.user_stats_at("busy", 2_000).expect("stats").is_some());
    }

    #[test]
    fn functional_global_stats_count_active_and_limited_users() {
        let limiter = controller(1, 60_000);
        assert!(limiter.check_admission_at("a", 0).expect("check").allowed);
        assert!(limiter.check_admission_at("b", 0).expect("check").allowed);
        assert!(!limiter.check_admission_at("b", 0).expect("check").allowed);

        let stats = limiter.global_stats_at(1).expect("stats");
        assert_eq!(stats.active_users, 2);
        assert_eq!(stats.total_requests, 2);
        assert_eq!(stats.limited_users, 2);
        assert!(stats.rate_limit_enabled);
    }

    #[test]
    fn regression_blocked_flag_distinguishes_block_from_exhaustion() {
        let limiter = controller(1, 60_000);
        assert!(limiter.check_admission_at("worn", 0).expect("check").allowed);
        assert!(!limiter.check_admission_at("worn", 0).expect("check").allowed);
        limiter.temporary_block_at("barred", 60_000, 0).expect("block");

        let worn = limiter.user_stats_at("worn", 0).expect("stats").expect("record");
        let barred = limiter
            .user_stats_at("barred", 0)
            .expect("stats")
            .expect("record");
        assert!(!worn.blocked);
        assert!(barred.blocked);
        assert_eq!(barred.request_count, 2);
    }
}
