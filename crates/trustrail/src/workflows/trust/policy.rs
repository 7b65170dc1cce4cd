use serde::{Deserialize, Serialize};

use super::{AffordabilityAssessment, BehaviorAnalysis, DebtProfile, Decision, SpendingAnalysis};
use crate::workflows::lending::domain::ApprovalWorkflow;

/// Flags surfaced to reviewers alongside the score.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RiskFlagKind {
    HighGamblingActivity,
    FrequentBounces,
    OverdraftUsage,
    HighDebtToIncome,
    CannotAffordInstallment,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum RiskSeverity {
    Low,
    Medium,
    High,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RiskFlag {
    pub flag: RiskFlagKind,
    pub severity: RiskSeverity,
    pub description: String,
}

pub(crate) fn risk_flags(
    behavior: &BehaviorAnalysis,
    spending: &SpendingAnalysis,
    debt: &DebtProfile,
    affordability: &AffordabilityAssessment,
) -> Vec<RiskFlag> {
    let mut flags = Vec::new();

    if spending.categories.gambling > 10_000.0 {
        flags.push(RiskFlag {
            flag: RiskFlagKind::HighGamblingActivity,
            severity: RiskSeverity::High,
            description: format!(
                "gambling spending of {:.2} in the statement period",
                spending.categories.gambling
            ),
        });
    }

    if behavior.bounce_count > 3 {
        flags.push(RiskFlag {
            flag: RiskFlagKind::FrequentBounces,
            severity: RiskSeverity::High,
            description: format!("{} bounced transactions detected", behavior.bounce_count),
        });
    }

    if behavior.overdraft_usage {
        flags.push(RiskFlag {
            flag: RiskFlagKind::OverdraftUsage,
            severity: RiskSeverity::Medium,
            description: "account balance went negative during the period".to_string(),
        });
    }

    if debt.debt_to_income_ratio > 0.4 {
        flags.push(RiskFlag {
            flag: RiskFlagKind::HighDebtToIncome,
            severity: RiskSeverity::High,
            description: format!(
                "debt-to-income ratio of {:.1}%",
                debt.debt_to_income_ratio * 100.0
            ),
        });
    }

    if !affordability.can_afford_installment {
        flags.push(RiskFlag {
            flag: RiskFlagKind::CannotAffordInstallment,
            severity: RiskSeverity::High,
            description: "installment exceeds 50% of disposable income".to_string(),
        });
    }

    flags
}

/// Band the score against the wallet's workflow.
///
/// Affordability failure and the two hard floors always win over the
/// approve/decline band.
pub(crate) fn decide(
    trust_score: u8,
    workflow: &ApprovalWorkflow,
    affordability: &AffordabilityAssessment,
) -> Decision {
    if !affordability.can_afford_installment {
        return Decision::Declined;
    }
    if trust_score < workflow.min_trust_score {
        return Decision::Declined;
    }
    if trust_score < workflow.auto_decline_threshold {
        return Decision::Declined;
    }
    if trust_score >= workflow.auto_approve_threshold {
        return Decision::Approved;
    }
    Decision::FlaggedForReview
}

#[cfg(test)]
mod tests {
    use super::*;

    fn workflow() -> ApprovalWorkflow {
        ApprovalWorkflow {
            auto_approve_threshold: 70,
            auto_decline_threshold: 40,
            min_trust_score: 30,
        }
    }

    fn affordable() -> AffordabilityAssessment {
        AffordabilityAssessment {
            can_afford_installment: true,
            monthly_installment_amount: 10_000.0,
            disposable_income: 50_000.0,
            affordability_ratio: 0.2,
            cushion: 40_000.0,
        }
    }

    #[test]
    fn decision_bands_follow_thresholds() {
        let workflow = workflow();
        let affordability = affordable();
        assert_eq!(decide(29, &workflow, &affordability), Decision::Declined);
        assert_eq!(decide(35, &workflow, &affordability), Decision::Declined);
        assert_eq!(
            decide(55, &workflow, &affordability),
            Decision::FlaggedForReview
        );
        assert_eq!(decide(75, &workflow, &affordability), Decision::Approved);
    }

    #[test]
    fn unaffordable_installment_declines_any_score() {
        let workflow = workflow();
        let affordability = AffordabilityAssessment {
            can_afford_installment: false,
            ..affordable()
        };
        assert_eq!(decide(95, &workflow, &affordability), Decision::Declined);
    }

    #[test]
    fn band_edges_are_inclusive_on_approve() {
        let workflow = workflow();
        let affordability = affordable();
        assert_eq!(decide(70, &workflow, &affordability), Decision::Approved);
        assert_eq!(
            decide(69, &workflow, &affordability),
            Decision::FlaggedForReview
        );
        assert_eq!(
            decide(40, &workflow, &affordability),
            Decision::FlaggedForReview
        );
        assert_eq!(decide(39, &workflow, &affordability), Decision::Declined);
    }
}
