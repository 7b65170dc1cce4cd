//! Statement-based trust and affordability scoring.
//!
//! The engine turns an ordered transaction ledger into six sub-analyses, a
//! weighted 0-100 trust score, risk flags, and a banded decision against the
//! wallet's approval workflow. The output is persisted once per application
//! and never recomputed.

pub mod analyzer;
mod keywords;
mod policy;
mod rules;

pub use policy::{RiskFlag, RiskFlagKind, RiskSeverity};

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::workflows::lending::domain::ApprovalWorkflow;
use crate::workflows::statement::Transaction;

/// Scoring outcome applied to an application.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Decision {
    Approved,
    FlaggedForReview,
    Declined,
}

impl Decision {
    pub const fn label(self) -> &'static str {
        match self {
            Decision::Approved => "APPROVED",
            Decision::FlaggedForReview => "FLAGGED_FOR_REVIEW",
            Decision::Declined => "DECLINED",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PeriodCovered {
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub months_analyzed: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IncomeSource {
    pub label: String,
    pub frequency: String,
    pub avg_amount: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IncomeAnalysis {
    pub total_income: f64,
    pub avg_monthly_income: f64,
    /// 0-1, proxy for how regularly credits arrive month over month.
    pub income_consistency: f64,
    pub income_sources: Vec<IncomeSource>,
}

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct SpendingCategories {
    pub bills: f64,
    pub loans: f64,
    pub gambling: f64,
    pub transfers: f64,
    pub other: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SpendingAnalysis {
    pub total_spending: f64,
    pub avg_monthly_spending: f64,
    pub categories: SpendingCategories,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BalanceAnalysis {
    pub avg_balance: f64,
    pub min_balance: f64,
    pub max_balance: f64,
    pub closing_balance: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BehaviorAnalysis {
    pub transaction_count: u32,
    pub avg_daily_transactions: f64,
    pub bounce_count: u32,
    pub overdraft_usage: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DebtProfile {
    pub existing_loan_repayments: f64,
    pub debt_to_income_ratio: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AffordabilityAssessment {
    pub can_afford_installment: bool,
    pub monthly_installment_amount: f64,
    pub disposable_income: f64,
    pub affordability_ratio: f64,
    pub cushion: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RuleCompliance {
    pub passed_min_trust_score: bool,
    pub overall_pass: bool,
}

/// Full scoring result, the pre-persistence shape of a trust report.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrustEngineReport {
    #[serde(default = "default_valid")]
    pub is_valid_statement: bool,
    #[serde(default)]
    pub invalid_statement_reason: Option<String>,
    pub decision: Decision,
    pub trust_score: u8,
    pub period_covered: PeriodCovered,
    pub income_analysis: IncomeAnalysis,
    pub spending_analysis: SpendingAnalysis,
    pub balance_analysis: BalanceAnalysis,
    pub behavior_analysis: BehaviorAnalysis,
    pub debt_profile: DebtProfile,
    pub affordability_assessment: AffordabilityAssessment,
    pub risk_flags: Vec<RiskFlag>,
    pub rule_compliance: RuleCompliance,
}

fn default_valid() -> bool {
    true
}

#[derive(Debug, thiserror::Error)]
pub enum TrustEngineError {
    #[error("cannot score an empty transaction ledger")]
    EmptyLedger,
}

/// Stateless scoring engine over a parsed ledger.
pub struct TrustEngine;

impl TrustEngine {
    pub fn analyze(
        transactions: &[Transaction],
        installment_amount: f64,
        workflow: &ApprovalWorkflow,
    ) -> Result<TrustEngineReport, TrustEngineError> {
        if transactions.is_empty() {
            return Err(TrustEngineError::EmptyLedger);
        }

        let period = rules::period_covered(transactions);
        let income = rules::analyze_income(transactions, period.months_analyzed);
        let spending = rules::analyze_spending(transactions, period.months_analyzed);
        let balance = rules::analyze_balance(transactions);
        let behavior = rules::analyze_behavior(transactions, period.months_analyzed);
        let debt = rules::debt_profile(&income, &spending);
        let affordability =
            rules::assess_affordability(&income, &spending, &debt, installment_amount);

        let risk_flags = policy::risk_flags(&behavior, &spending, &debt, &affordability);
        let trust_score = rules::trust_score(
            &income,
            &spending,
            &balance,
            &behavior,
            &affordability,
            installment_amount,
        );
        let decision = policy::decide(trust_score, workflow, &affordability);

        Ok(TrustEngineReport {
            is_valid_statement: true,
            invalid_statement_reason: None,
            decision,
            trust_score,
            period_covered: period,
            income_analysis: income,
            spending_analysis: spending,
            balance_analysis: balance,
            behavior_analysis: behavior,
            debt_profile: debt,
            affordability_assessment: affordability,
            risk_flags,
            rule_compliance: RuleCompliance {
                passed_min_trust_score: trust_score >= workflow.min_trust_score,
                overall_pass: decision == Decision::Approved,
            },
        })
    }
}
