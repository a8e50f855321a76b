//! Daily Token Budget with reserve → commit/release semantics (spec §4.E).
//!
//! No direct teacher analogue — token budgeting is unique to this bridge
//! — but the state shape mirrors `rate_limiter.rs`'s
//! `Mutex`-guarded-local-state-plus-optional-shared-store split, and the
//! shared variant's atomic scripts follow the same `eval`-over-Lua pattern
//! `store.rs` exposes for the rate limiter.

use std::collections::HashMap;
use std::sync::Arc;

use bridge_core::config::ApprovalPolicy;
use bridge_core::error::BridgeError;
use chrono::Utc;
use parking_lot::Mutex;

use crate::approvals::ApprovalsStore;
use crate::store::SharedLimitStore;

/// A successful reservation, consumed by exactly one `commit` or `release`.
#[derive(Debug, Clone, Copy)]
pub struct Reservation {
    pub tokens: u64,
}

#[derive(Debug, Clone, Default)]
pub struct ToolUsage {
    pub tokens: u64,
    pub calls: u64,
    pub cost_minor: i64,
}

#[derive(Debug, Clone)]
pub struct UsageSnapshot {
    pub day_utc: String,
    pub used_tokens: u64,
    pub effective_max: u64,
    pub base_max: u64,
    pub approved_tokens: u64,
    pub request_count: u64,
    pub used_cost_minor: Option<i64>,
    pub per_tool: HashMap<String, ToolUsage>,
}

struct LocalState {
    day_utc: String,
    used_tokens: u64,
    approved_tokens: u64,
    used_cost_minor: Option<i64>,
    per_tool: HashMap<String, ToolUsage>,
}

const RESERVE_SCRIPT: &str = r#"
local total_key = KEYS[1]
local n = tonumber(ARGV[1])
local max = tonumber(ARGV[2])
local ttl_secs = tonumber(ARGV[3])
local total = tonumber(redis.call('GET', total_key) or '0')
if total + n > max then
    return -1
end
local new_total = redis.call('INCRBY', total_key, n)
redis.call('EXPIRE', total_key, ttl_secs)
return new_total
"#;

const COMMIT_SCRIPT: &str = r#"
local total_key = KEYS[1]
local tool_tokens_key = KEYS[2]
local tool_calls_key = KEYS[3]
local tools_set_key = KEYS[4]
local delta = tonumber(ARGV[1])
local actual_tokens = tonumber(ARGV[2])
local tool_name = ARGV[3]
local ttl_secs = tonumber(ARGV[4])

redis.call('INCRBY', total_key, delta)
redis.call('EXPIRE', total_key, ttl_secs)
redis.call('INCRBY', tool_tokens_key, actual_tokens)
redis.call('EXPIRE', tool_tokens_key, ttl_secs)
redis.call('INCRBY', tool_calls_key, 1)
redis.call('EXPIRE', tool_calls_key, ttl_secs)
redis.call('SADD', tools_set_key, tool_name)
redis.call('EXPIRE', tools_set_key, ttl_secs)
return 1
"#;

const SHARED_TTL_SECS: u64 = 48 * 3600;

pub struct DailyTokenBudget {
    base_max_per_day: u64,
    increment_tokens: u64,
    approval_policy: ApprovalPolicy,
    approvals: ApprovalsStore,
    local: Mutex<LocalState>,
    shared: Option<(Arc<dyn SharedLimitStore>, String)>,
}

impl DailyTokenBudget {
    pub fn new(
        base_max_per_day: u64,
        increment_tokens: u64,
        approval_policy: ApprovalPolicy,
        approvals: ApprovalsStore,
    ) -> Self {
        let day_utc = today_utc();
        let approved_tokens = approvals.read_approved_tokens(&day_utc);
        Self {
            base_max_per_day,
            increment_tokens,
            approval_policy,
            approvals,
            local: Mutex::new(LocalState {
                day_utc,
                used_tokens: 0,
                approved_tokens,
                used_cost_minor: None,
                per_tool: HashMap::new(),
            }),
            shared: None,
        }
    }

    pub fn with_shared_store(mut self, store: Arc<dyn SharedLimitStore>, key_prefix: &str) -> Self {
        self.shared = Some((store, key_prefix.to_string()));
        self
    }

    fn effective_max(&self, approved_tokens: u64) -> u64 {
        self.base_max_per_day + approved_tokens
    }

    /// Recompute `day_utc`; on rollover, reset counters and re-read the
    /// approvals ledger (spec §4.E).
    fn rollover_if_needed(&self, state: &mut LocalState) {
        let today = today_utc();
        if today != state.day_utc {
            state.day_utc = today.clone();
            state.used_tokens = 0;
            state.per_tool.clear();
            state.used_cost_minor = None;
            state.approved_tokens = self.approvals.read_approved_tokens(&today);
        }
    }

    pub fn get_usage(&self) -> UsageSnapshot {
        let mut state = self.local.lock();
        self.rollover_if_needed(&mut state);
        let request_count: u64 = state.per_tool.values().map(|t| t.calls).sum();
        UsageSnapshot {
            day_utc: state.day_utc.clone(),
            used_tokens: state.used_tokens,
            effective_max: self.effective_max(state.approved_tokens),
            base_max: self.base_max_per_day,
            approved_tokens: state.approved_tokens,
            request_count,
            used_cost_minor: state.used_cost_minor,
            per_tool: state.per_tool.clone(),
        }
    }

    pub async fn check_or_throw(&self) -> Result<(), BridgeError> {
        let (used, max) = {
            let mut state = self.local.lock();
            self.rollover_if_needed(&mut state);
            (state.used_tokens, self.effective_max(state.approved_tokens))
        };
        if used >= max {
            return Err(self.over_budget_error(used, max));
        }
        Ok(())
    }

    /// Reserve `n` tokens; on over-budget, apply the approval policy and
    /// retry exactly once before giving up (spec §4.E).
    pub async fn reserve(&self, n: u64) -> Result<Reservation, BridgeError> {
        if self.try_reserve_once(n).await? {
            return Ok(Reservation { tokens: n });
        }

        match self.approval_policy {
            ApprovalPolicy::Auto => {
                let day = {
                    let mut state = self.local.lock();
                    self.rollover_if_needed(&mut state);
                    state.day_utc.clone()
                };
                let approved = self
                    .approvals
                    .approve_increment(&day, self.increment_tokens)
                    .await
                    .map_err(|e| BridgeError::Config(e.to_string()))?;
                tracing::info!(day = %day, approved_tokens = approved.tokens, increment = self.increment_tokens, "auto-approved daily budget increment");
                {
                    let mut state = self.local.lock();
                    state.approved_tokens = approved.tokens;
                }
                if self.try_reserve_once(n).await? {
                    return Ok(Reservation { tokens: n });
                }
                let (used, max) = self.usage_pair();
                Err(self.over_budget_error(used, max))
            }
            ApprovalPolicy::Prompt => {
                let (used, max) = self.usage_pair();
                tracing::warn!(used, max, increment = self.increment_tokens, "daily budget exceeded, caller approval required");
                Err(BridgeError::BudgetApprovalRequired {
                    increment: self.increment_tokens,
                    used,
                    max,
                })
            }
            ApprovalPolicy::Never => {
                let (used, max) = self.usage_pair();
                tracing::warn!(used, max, "daily budget exceeded, rejecting reservation");
                Err(BridgeError::BudgetExceeded { used, max })
            }
        }
    }

    fn usage_pair(&self) -> (u64, u64) {
        let mut state = self.local.lock();
        self.rollover_if_needed(&mut state);
        (state.used_tokens, self.effective_max(state.approved_tokens))
    }

    fn over_budget_error(&self, used: u64, max: u64) -> BridgeError {
        match self.approval_policy {
            ApprovalPolicy::Prompt => BridgeError::BudgetApprovalRequired {
                increment: self.increment_tokens,
                used,
                max,
            },
            ApprovalPolicy::Auto | ApprovalPolicy::Never => BridgeError::BudgetExceeded { used, max },
        }
    }

    async fn try_reserve_once(&self, n: u64) -> Result<bool, BridgeError> {
        if let Some((store, prefix)) = &self.shared {
            let (day, max) = {
                let mut state = self.local.lock();
                self.rollover_if_needed(&mut state);
                (state.day_utc.clone(), self.effective_max(state.approved_tokens))
            };
            let total_key = format!("{prefix}:budget:{day}:total");
            match store
                .eval_i64(
                    RESERVE_SCRIPT,
                    &[total_key],
                    &[n.to_string(), max.to_string(), SHARED_TTL_SECS.to_string()],
                )
                .await
            {
                Ok(v) if v >= 0 => {
                    let mut state = self.local.lock();
                    state.used_tokens = v as u64;
                    return Ok(true);
                }
                Ok(_) => return Ok(false),
                Err(e) => {
                    tracing::warn!(error = %e, "shared budget reserve failed, falling back to local state");
                }
            }
        }

        let mut state = self.local.lock();
        self.rollover_if_needed(&mut state);
        let max = self.effective_max(state.approved_tokens);
        if state.used_tokens + n > max {
            return Ok(false);
        }
        state.used_tokens += n;
        Ok(true)
    }

    /// Release a reservation; `used_tokens` never drops below zero.
    pub fn release(&self, reservation: Reservation) {
        let mut state = self.local.lock();
        state.used_tokens = state.used_tokens.saturating_sub(reservation.tokens);
    }

    /// Apply `delta = actual_tokens − reservation.tokens` to `used`, and
    /// add `actual_tokens`/`+1 call` to the tool's running totals (spec §4.E).
    pub async fn commit(
        &self,
        tool_name: &str,
        actual_tokens: u64,
        cost_minor: Option<i64>,
        reservation: Reservation,
    ) {
        let delta = actual_tokens as i64 - reservation.tokens as i64;

        if let Some((store, prefix)) = &self.shared {
            let day = self.local.lock().day_utc.clone();
            let total_key = format!("{prefix}:budget:{day}:total");
            let tool_tokens_key = format!("{prefix}:budget:{day}:tool:{tool_name}:tokens");
            let tool_calls_key = format!("{prefix}:budget:{day}:tool:{tool_name}:calls");
            let tools_set_key = format!("{prefix}:budget:{day}:tools");
            if let Err(e) = store
                .eval_i64(
                    COMMIT_SCRIPT,
                    &[total_key, tool_tokens_key, tool_calls_key, tools_set_key],
                    &[
                        delta.to_string(),
                        actual_tokens.to_string(),
                        tool_name.to_string(),
                        SHARED_TTL_SECS.to_string(),
                    ],
                )
                .await
            {
                tracing::warn!(error = %e, "shared budget commit failed, applying to local state only");
            }
        }

        let mut state = self.local.lock();
        state.used_tokens = (state.used_tokens as i64 + delta).max(0) as u64;
        let entry = state.per_tool.entry(tool_name.to_string()).or_default();
        entry.tokens += actual_tokens;
        entry.calls += 1;
        if let Some(cost) = cost_minor {
            entry.cost_minor += cost;
            *state.used_cost_minor.get_or_insert(0) += cost;
        }
    }
}

fn today_utc() -> String {
    Utc::now().format("%Y-%m-%d").to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn budget(max: u64, policy: ApprovalPolicy) -> DailyTokenBudget {
        let dir = tempdir().unwrap();
        let path = dir.path().join("approvals.json");
        std::mem::forget(dir);
        let approvals = ApprovalsStore::new(path);
        DailyTokenBudget::new(max, 1000, policy, approvals)
    }

    #[tokio::test]
    async fn reserve_then_release_returns_to_zero() {
        let b = budget(100, ApprovalPolicy::Never);
        let r = b.reserve(40).await.unwrap();
        assert_eq!(b.get_usage().used_tokens, 40);
        b.release(r);
        assert_eq!(b.get_usage().used_tokens, 0);
    }

    #[tokio::test]
    async fn never_policy_rejects_over_budget() {
        let b = budget(10, ApprovalPolicy::Never);
        let err = b.reserve(11).await.unwrap_err();
        assert!(matches!(err, BridgeError::BudgetExceeded { .. }));
    }

    #[tokio::test]
    async fn prompt_policy_asks_for_approval_over_budget() {
        let b = budget(10, ApprovalPolicy::Prompt);
        let err = b.reserve(11).await.unwrap_err();
        assert!(matches!(err, BridgeError::BudgetApprovalRequired { .. }));
    }

    #[tokio::test]
    async fn auto_policy_grows_the_ceiling_and_retries() {
        let b = budget(10, ApprovalPolicy::Auto);
        let r = b.reserve(11).await.unwrap();
        assert_eq!(r.tokens, 11);
        assert_eq!(b.get_usage().effective_max, 10 + 1000);
    }

    #[tokio::test]
    async fn commit_applies_net_delta_and_per_tool_totals() {
        let b = budget(1000, ApprovalPolicy::Never);
        let r = b.reserve(50).await.unwrap();
        b.commit("generate_content", 30, Some(12), r).await;
        let usage = b.get_usage();
        assert_eq!(usage.used_tokens, 30);
        let tool = usage.per_tool.get("generate_content").unwrap();
        assert_eq!(tool.tokens, 30);
        assert_eq!(tool.calls, 1);
        assert_eq!(tool.cost_minor, 12);
        assert_eq!(usage.used_cost_minor, Some(12));
    }

    #[tokio::test]
    async fn release_never_goes_below_zero() {
        let b = budget(1000, ApprovalPolicy::Never);
        b.release(Reservation { tokens: 500 });
        assert_eq!(b.get_usage().used_tokens, 0);
    }

    proptest::proptest! {
        /// Spec §8 "Budget consistency": for any interleaving of
        /// reserve/commit/release, `used_tokens` equals the sum of committed
        /// actuals minus the sum of released-from-cancelled reservations,
        /// and never exceeds `effective_max` once a reserve has succeeded.
        #[test]
        fn used_tokens_matches_committed_minus_released(
            ops in proptest::collection::vec((1u64..50, proptest::bool::ANY, 0u64..60), 1..30)
        ) {
            let rt = tokio::runtime::Runtime::new().unwrap();
            rt.block_on(async {
                let b = budget(1_000_000, ApprovalPolicy::Never);
                let mut expected: i64 = 0;
                for (reserve_n, should_commit, actual) in ops {
                    let Ok(r) = b.reserve(reserve_n).await else { continue };
                    if should_commit {
                        b.commit("t", actual, None, r).await;
                        expected += actual as i64;
                    } else {
                        b.release(r);
                    }
                }
                proptest::prop_assert_eq!(b.get_usage().used_tokens as i64, expected.max(0));
                Ok(())
            })?;
        }
    }
}
