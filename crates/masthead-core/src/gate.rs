//! Autonomy gate
//!
//! Sits between strategy proposal and execution. Classifies each proposed
//! action by ordered rule evaluation, debits the budget ledger atomically for
//! actions that execute immediately, and routes approval-required actions
//! through the injected approval handler. A denial is a resolved issue, not
//! an error.

use crate::budget::BudgetLedger;
use crate::config::AutonomyConfig;
use crate::error::EngineError;
use crate::types::Department;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, info};

/// Ordered keyword rules, matched case-insensitively as substrings
#[derive(Debug, Clone, Default)]
pub struct RuleSet {
    rules: Vec<String>,
}

impl RuleSet {
    /// Build a rule set preserving rule order
    #[must_use]
    pub fn new(rules: Vec<String>) -> Self {
        Self { rules }
    }

    /// First rule contained in `action`, ignoring case
    #[must_use]
    pub fn matches(&self, action: &str) -> Option<&str> {
        let action = action.to_lowercase();
        self.rules
            .iter()
            .find(|rule| action.contains(&rule.to_lowercase()))
            .map(String::as_str)
    }

    /// Number of rules
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.rules.len()
    }

    /// Whether the set holds no rules
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }
}

/// How a proposed action may proceed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Classification {
    /// Executes immediately; budget already debited
    Auto,
    /// Held until the approval handler resolves it; nothing debited
    ApprovalRequired,
    /// Executes immediately like auto, flagged for the next report
    MustReport,
}

impl Classification {
    /// Whether the action proceeds without waiting for approval
    #[inline]
    #[must_use]
    pub fn executes_immediately(&self) -> bool {
        matches!(self, Classification::Auto | Classification::MustReport)
    }

    /// Classification name
    #[inline]
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Classification::Auto => "auto",
            Classification::ApprovalRequired => "approval-required",
            Classification::MustReport => "must-report",
        }
    }
}

impl std::fmt::Display for Classification {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// One classified proposal
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AutonomyDecision {
    /// Proposed action text
    pub action: String,
    /// Department the spend is attributed to
    pub department: Department,
    /// Proposed cost
    pub cost: f64,
    /// How the action may proceed
    pub classification: Classification,
    /// Why it was classified this way
    pub rationale: String,
    /// When the gate decided
    pub decided_at: DateTime<Utc>,
}

/// Verdict returned by the external approver
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApprovalVerdict {
    /// Release the action
    Approved,
    /// Discard the action
    Denied,
}

/// Resolves approval-required decisions.
///
/// Who approves (a human console, another service) is the integrator's
/// concern; the gate only awaits the verdict.
#[async_trait]
pub trait ApprovalHandler: Send + Sync {
    /// Resolve one held decision
    async fn resolve(&self, decision: &AutonomyDecision) -> ApprovalVerdict;
}

/// What happened to an approval-required action
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApprovalOutcome {
    /// Approved and debited; the action may execute
    Executed,
    /// Denied; the action is discarded
    Denied,
}

/// Policy gate between strategy and execution
pub struct AutonomyGate {
    requires_approval: RuleSet,
    must_report: RuleSet,
    ledger: Arc<BudgetLedger>,
    approvals: Arc<dyn ApprovalHandler>,
}

impl AutonomyGate {
    /// Build a gate over a ledger and an approval handler
    #[must_use]
    pub fn new(
        config: &AutonomyConfig,
        ledger: Arc<BudgetLedger>,
        approvals: Arc<dyn ApprovalHandler>,
    ) -> Self {
        Self {
            requires_approval: RuleSet::new(config.requires_approval.clone()),
            must_report: RuleSet::new(config.must_report.clone()),
            ledger,
            approvals,
        }
    }

    /// Shared ledger the gate debits
    #[inline]
    #[must_use]
    pub fn ledger(&self) -> &Arc<BudgetLedger> {
        &self.ledger
    }

    /// Classify a proposed action.
    ///
    /// Rule order: approval keywords first, then budget, then report
    /// keywords. Actions classified `Auto` or `MustReport` have their cost
    /// debited before this returns; `ApprovalRequired` debits nothing.
    pub fn evaluate(&self, department: Department, action: &str, cost: f64) -> AutonomyDecision {
        let (classification, rationale) = if let Some(rule) = self.requires_approval.matches(action)
        {
            (
                Classification::ApprovalRequired,
                format!("matches approval rule \"{rule}\""),
            )
        } else {
            match self.ledger.try_debit(department, action, cost) {
                Err(_) => (Classification::ApprovalRequired, "budget exceeded".to_string()),
                Ok(_) => match self.must_report.matches(action) {
                    Some(rule) => (
                        Classification::MustReport,
                        format!("flagged by report rule \"{rule}\""),
                    ),
                    None => (Classification::Auto, "within autonomy and budget".to_string()),
                },
            }
        };

        debug!(
            department = %department,
            classification = %classification,
            cost,
            action,
            "gate decision"
        );

        AutonomyDecision {
            action: action.to_string(),
            department,
            cost,
            classification,
            rationale,
            decided_at: Utc::now(),
        }
    }

    /// Resolve an approval-required decision through the external handler.
    ///
    /// Approval debits the cost at resolution time; the budget may have moved
    /// since the gate classified, so a late debit can still fail with
    /// [`EngineError::BudgetExceeded`]. Decisions that already executed
    /// resolve to `Executed` immediately.
    pub async fn resolve_approval(
        &self,
        decision: &AutonomyDecision,
    ) -> Result<ApprovalOutcome, EngineError> {
        if decision.classification != Classification::ApprovalRequired {
            return Ok(ApprovalOutcome::Executed);
        }

        match self.approvals.resolve(decision).await {
            ApprovalVerdict::Approved => {
                self.ledger
                    .try_debit(decision.department, &decision.action, decision.cost)?;
                info!(
                    department = %decision.department,
                    action = %decision.action,
                    "approval granted"
                );
                Ok(ApprovalOutcome::Executed)
            }
            ApprovalVerdict::Denied => {
                info!(
                    department = %decision.department,
                    action = %decision.action,
                    "approval denied"
                );
                Ok(ApprovalOutcome::Denied)
            }
        }
    }
}

impl std::fmt::Debug for AutonomyGate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AutonomyGate")
            .field("requires_approval", &self.requires_approval.len())
            .field("must_report", &self.must_report.len())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::BudgetConfig;

    struct ApproveAll;

    #[async_trait]
    impl ApprovalHandler for ApproveAll {
        async fn resolve(&self, _decision: &AutonomyDecision) -> ApprovalVerdict {
            ApprovalVerdict::Approved
        }
    }

    struct DenyAll;

    #[async_trait]
    impl ApprovalHandler for DenyAll {
        async fn resolve(&self, _decision: &AutonomyDecision) -> ApprovalVerdict {
            ApprovalVerdict::Denied
        }
    }

    fn gate_with(limit: f64, approvals: Arc<dyn ApprovalHandler>) -> AutonomyGate {
        let mut budget = BudgetConfig::default();
        budget.daily_limit = limit;
        for d in Department::ALL {
            budget.cap_overrides.insert(d, limit);
        }
        let ledger = Arc::new(BudgetLedger::new(&budget));
        AutonomyGate::new(&AutonomyConfig::default(), ledger, approvals)
    }

    #[test]
    fn budget_scenario() {
        let gate = gate_with(1_000.0, Arc::new(ApproveAll));
        gate.ledger()
            .try_debit(Department::Content, "morning spend", 300.0)
            .unwrap();

        let over = gate.evaluate(Department::Content, "commission weekend documentary", 800.0);
        assert_eq!(over.classification, Classification::ApprovalRequired);
        assert_eq!(over.rationale, "budget exceeded");
        assert!((gate.ledger().spent_today() - 300.0).abs() < 1e-9);

        let within = gate.evaluate(Department::Content, "commission explainer video", 200.0);
        assert_eq!(within.classification, Classification::Auto);
        assert!((gate.ledger().spent_today() - 500.0).abs() < 1e-9);
    }

    #[test]
    fn approval_rule_wins_over_cheap_cost() {
        let gate = gate_with(1_000.0, Arc::new(ApproveAll));
        let decision = gate.evaluate(Department::Distribution, "sign syndication contract", 50.0);
        assert_eq!(decision.classification, Classification::ApprovalRequired);
        assert!(decision.rationale.contains("contract"));
        assert!(gate.ledger().spent_today().abs() < 1e-9);
    }

    #[test]
    fn rule_match_is_case_insensitive() {
        let gate = gate_with(1_000.0, Arc::new(ApproveAll));
        let decision = gate.evaluate(Department::Operations, "Renew LEGAL retainer", 10.0);
        assert_eq!(decision.classification, Classification::ApprovalRequired);
    }

    #[test]
    fn must_report_executes_and_debits() {
        let gate = gate_with(1_000.0, Arc::new(ApproveAll));
        let decision = gate.evaluate(Department::Marketing, "adjust pricing tier", 100.0);
        assert_eq!(decision.classification, Classification::MustReport);
        assert!(decision.classification.executes_immediately());
        assert!((gate.ledger().spent_today() - 100.0).abs() < 1e-9);
    }

    #[tokio::test]
    async fn approval_debits_on_grant() {
        let gate = gate_with(1_000.0, Arc::new(ApproveAll));
        let decision = gate.evaluate(Department::Content, "hire stringer", 150.0);
        assert_eq!(decision.classification, Classification::ApprovalRequired);

        let outcome = gate.resolve_approval(&decision).await.unwrap();
        assert_eq!(outcome, ApprovalOutcome::Executed);
        assert!((gate.ledger().spent_today() - 150.0).abs() < 1e-9);
    }

    #[tokio::test]
    async fn denial_debits_nothing() {
        let gate = gate_with(1_000.0, Arc::new(DenyAll));
        let decision = gate.evaluate(Department::Content, "hire columnist", 150.0);

        let outcome = gate.resolve_approval(&decision).await.unwrap();
        assert_eq!(outcome, ApprovalOutcome::Denied);
        assert!(gate.ledger().spent_today().abs() < 1e-9);
    }

    #[tokio::test]
    async fn late_approval_can_still_hit_budget() {
        let gate = gate_with(1_000.0, Arc::new(ApproveAll));
        let decision = gate.evaluate(Department::Content, "hire producer", 800.0);
        assert_eq!(decision.classification, Classification::ApprovalRequired);

        // budget moves while the approval is pending
        gate.ledger()
            .try_debit(Department::Production, "studio time", 600.0)
            .unwrap();

        let err = gate.resolve_approval(&decision).await.unwrap_err();
        assert!(matches!(err, EngineError::BudgetExceeded { .. }));
    }

    #[test]
    fn rule_set_first_match_wins() {
        let rules = RuleSet::new(vec!["contract".into(), "legal".into()]);
        assert_eq!(rules.matches("legal contract review"), Some("contract"));
    }

    #[test]
    fn empty_rule_set_matches_nothing() {
        let rules = RuleSet::default();
        assert!(rules.is_empty());
        assert_eq!(rules.matches("anything at all"), None);
    }
}
