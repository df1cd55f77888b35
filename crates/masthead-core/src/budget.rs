//! Budget ledger
//!
//! Process-wide spend accounting for one planning day. The check and the
//! debit happen under a single lock: once `try_debit` returns `Ok` the spend
//! is committed, and a rejected spend leaves the ledger untouched. Only the
//! autonomy gate debits; everything else reads snapshots.

use crate::config::BudgetConfig;
use crate::error::EngineError;
use crate::types::Department;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Running spend for one day
#[derive(Debug, Default)]
struct LedgerState {
    spent_today: f64,
    spent_by: BTreeMap<Department, f64>,
}

/// Daily budget ledger with per-department caps
#[derive(Debug)]
pub struct BudgetLedger {
    daily_limit: f64,
    caps: BTreeMap<Department, f64>,
    state: Mutex<LedgerState>,
}

impl BudgetLedger {
    /// Create a fresh ledger for the configured limits
    #[must_use]
    pub fn new(config: &BudgetConfig) -> Self {
        let caps = Department::ALL
            .iter()
            .map(|d| (*d, config.cap_for(*d)))
            .collect();
        Self {
            daily_limit: config.daily_limit,
            caps,
            state: Mutex::new(LedgerState::default()),
        }
    }

    /// Total spend permitted per day
    #[inline]
    #[must_use]
    pub fn daily_limit(&self) -> f64 {
        self.daily_limit
    }

    /// Spend committed so far today
    #[inline]
    #[must_use]
    pub fn spent_today(&self) -> f64 {
        self.state.lock().spent_today
    }

    /// Spend committed by one department today
    #[inline]
    #[must_use]
    pub fn spent_for(&self, department: Department) -> f64 {
        self.state
            .lock()
            .spent_by
            .get(&department)
            .copied()
            .unwrap_or(0.0)
    }

    /// Budget left before the daily limit
    #[inline]
    #[must_use]
    pub fn remaining(&self) -> f64 {
        self.daily_limit - self.state.lock().spent_today
    }

    /// Atomically check and commit a spend.
    ///
    /// Fails with [`EngineError::BudgetExceeded`] when the spend would push
    /// either the daily total or the department past its cap; a failed debit
    /// changes nothing.
    pub fn try_debit(
        &self,
        department: Department,
        action: &str,
        cost: f64,
    ) -> Result<f64, EngineError> {
        let mut state = self.state.lock();
        let dept_spent = state.spent_by.get(&department).copied().unwrap_or(0.0);
        let cap = self.caps.get(&department).copied().unwrap_or(self.daily_limit);

        if state.spent_today + cost > self.daily_limit {
            return Err(EngineError::BudgetExceeded {
                action: action.to_string(),
                cost,
                remaining: self.daily_limit - state.spent_today,
            });
        }
        if dept_spent + cost > cap {
            return Err(EngineError::BudgetExceeded {
                action: action.to_string(),
                cost,
                remaining: cap - dept_spent,
            });
        }

        state.spent_today += cost;
        *state.spent_by.entry(department).or_insert(0.0) += cost;
        Ok(state.spent_today)
    }

    /// Clear the day's spend for the next cycle
    pub fn reset_day(&self) {
        let mut state = self.state.lock();
        state.spent_today = 0.0;
        state.spent_by.clear();
    }

    /// Immutable view of the ledger for reporting
    #[must_use]
    pub fn snapshot(&self) -> BudgetSnapshot {
        let state = self.state.lock();
        let by_department = Department::ALL
            .iter()
            .map(|d| {
                (
                    *d,
                    DepartmentSpend {
                        cap: self.caps.get(d).copied().unwrap_or(self.daily_limit),
                        spent: state.spent_by.get(d).copied().unwrap_or(0.0),
                    },
                )
            })
            .collect();
        BudgetSnapshot {
            daily_limit: self.daily_limit,
            spent_today: state.spent_today,
            by_department,
        }
    }
}

/// One department's cap and spend
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DepartmentSpend {
    /// Spend ceiling
    pub cap: f64,
    /// Spend committed
    pub spent: f64,
}

/// Point-in-time view of the ledger
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BudgetSnapshot {
    /// Total spend permitted per day
    pub daily_limit: f64,
    /// Spend committed so far
    pub spent_today: f64,
    /// Per-department breakdown
    pub by_department: BTreeMap<Department, DepartmentSpend>,
}
