//! Strategy seam for the two statement-analysis paths.
//!
//! When an application carries a handle to an externally stored statement
//! document, scoring is delegated to a document-understanding provider; the
//! local heuristic engine remains the fallback whenever that path fails and a
//! raw ledger is still available.

use async_trait::async_trait;
use chrono::NaiveDate;

use super::{
    AffordabilityAssessment, BalanceAnalysis, BehaviorAnalysis, DebtProfile, Decision,
    IncomeAnalysis, PeriodCovered, RuleCompliance, SpendingAnalysis, SpendingCategories,
    TrustEngineReport,
};
use crate::workflows::lending::domain::ApprovalWorkflow;

/// Prompt context shipped with the document so the provider can band its own
/// decision against the wallet's thresholds.
#[derive(Debug, Clone, Copy)]
pub struct AnalysisContext {
    pub installment_amount: f64,
    pub workflow: ApprovalWorkflow,
}

#[derive(Debug, thiserror::Error)]
pub enum AnalyzerError {
    #[error("document analysis transport failed: {0}")]
    Transport(String),
    #[error("document analysis returned an unusable response: {0}")]
    InvalidResponse(String),
}

/// External document-understanding provider.
#[async_trait]
pub trait DocumentAnalyzer: Send + Sync {
    async fn analyze(
        &self,
        file_handle: &str,
        context: &AnalysisContext,
    ) -> Result<TrustEngineReport, AnalyzerError>;
}

/// Validate an untrusted provider reply into the report shape.
pub fn decode_report(raw: serde_json::Value) -> Result<TrustEngineReport, AnalyzerError> {
    serde_json::from_value(raw).map_err(|err| AnalyzerError::InvalidResponse(err.to_string()))
}

/// Canonical substitute when the uploaded document is not a bank statement:
/// zero score, declined, nothing inferred from the non-statement content.
pub fn invalid_statement_report(
    reason: &str,
    installment_amount: f64,
    as_of: NaiveDate,
) -> TrustEngineReport {
    TrustEngineReport {
        is_valid_statement: false,
        invalid_statement_reason: Some(reason.to_string()),
        decision: Decision::Declined,
        trust_score: 0,
        period_covered: PeriodCovered {
            start_date: as_of,
            end_date: as_of,
            months_analyzed: 0,
        },
        income_analysis: IncomeAnalysis {
            total_income: 0.0,
            avg_monthly_income: 0.0,
            income_consistency: 0.0,
            income_sources: Vec::new(),
        },
        spending_analysis: SpendingAnalysis {
            total_spending: 0.0,
            avg_monthly_spending: 0.0,
            categories: SpendingCategories::default(),
        },
        balance_analysis: BalanceAnalysis {
            avg_balance: 0.0,
            min_balance: 0.0,
            max_balance: 0.0,
            closing_balance: 0.0,
        },
        behavior_analysis: BehaviorAnalysis {
            transaction_count: 0,
            avg_daily_transactions: 0.0,
            bounce_count: 0,
            overdraft_usage: false,
        },
        debt_profile: DebtProfile {
            existing_loan_repayments: 0.0,
            debt_to_income_ratio: 0.0,
        },
        affordability_assessment: AffordabilityAssessment {
            can_afford_installment: false,
            monthly_installment_amount: installment_amount,
            disposable_income: 0.0,
            affordability_ratio: 1.0,
            cushion: -installment_amount,
        },
        risk_flags: Vec::new(),
        rule_compliance: RuleCompliance {
            passed_min_trust_score: false,
            overall_pass: false,
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn invalid_statement_report_is_declined_with_zero_score() {
        let as_of = NaiveDate::from_ymd_opt(2026, 2, 1).expect("date");
        let report = invalid_statement_report("document is a utility bill", 9_600.0, as_of);
        assert!(!report.is_valid_statement);
        assert_eq!(report.decision, Decision::Declined);
        assert_eq!(report.trust_score, 0);
        assert!(!report.affordability_assessment.can_afford_installment);
    }

    #[test]
    fn decode_rejects_malformed_provider_output() {
        let err = decode_report(json!({ "decision": "MAYBE" }));
        assert!(matches!(err, Err(AnalyzerError::InvalidResponse(_))));
    }

    #[test]
    fn decode_accepts_a_report_shaped_reply() {
        let as_of = NaiveDate::from_ymd_opt(2026, 2, 1).expect("date");
        let report = invalid_statement_report("not a statement", 5_000.0, as_of);
        let raw = serde_json::to_value(&report).expect("serializes");
        let decoded = decode_report(raw).expect("decodes");
        assert_eq!(decoded, report);
    }
}
