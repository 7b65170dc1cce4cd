use chrono::Datelike;

use super::keywords::{
    matches_any, BILL_KEYWORDS, BOUNCE_KEYWORDS, BUSINESS_KEYWORDS, FREELANCE_KEYWORDS,
    GAMBLING_KEYWORDS, LOAN_KEYWORDS, SALARY_KEYWORDS, TRANSFER_MARKERS,
};
use super::{
    AffordabilityAssessment, BalanceAnalysis, BehaviorAnalysis, DebtProfile, IncomeAnalysis,
    IncomeSource, PeriodCovered, SpendingAnalysis, SpendingCategories,
};
use crate::workflows::statement::Transaction;

/// Whole months spanned by the ledger, never less than one.
pub(crate) fn period_covered(transactions: &[Transaction]) -> PeriodCovered {
    let start_date = transactions[0].date;
    let end_date = transactions[transactions.len() - 1].date;

    let mut months = (end_date.year() - start_date.year()) * 12
        + (end_date.month() as i32 - start_date.month() as i32);
    if end_date.day() < start_date.day() {
        months -= 1;
    }

    PeriodCovered {
        start_date,
        end_date,
        months_analyzed: months.max(1) as u32,
    }
}

pub(crate) fn analyze_income(transactions: &[Transaction], months_analyzed: u32) -> IncomeAnalysis {
    let credits: Vec<&Transaction> = transactions.iter().filter(|tx| tx.credit > 0.0).collect();
    let total_income: f64 = credits.iter().map(|tx| tx.credit).sum();
    let avg_monthly_income = total_income / months_analyzed as f64;

    // A credit may land in several source buckets; salary vs freelance vs
    // business are independent signals, not a partition.
    let mut income_sources = Vec::new();
    for (label, frequency, keywords) in [
        ("SALARY", "monthly", SALARY_KEYWORDS),
        ("FREELANCE", "irregular", FREELANCE_KEYWORDS),
        ("BUSINESS", "irregular", BUSINESS_KEYWORDS),
    ] {
        let matching: Vec<f64> = credits
            .iter()
            .filter(|tx| matches_any(&tx.description.to_uppercase(), keywords))
            .map(|tx| tx.credit)
            .collect();
        if !matching.is_empty() {
            income_sources.push(IncomeSource {
                label: label.to_string(),
                frequency: frequency.to_string(),
                avg_amount: matching.iter().sum::<f64>() / matching.len() as f64,
            });
        }
    }

    // Coarse proxy: an active month carries roughly five income credits.
    let months_with_income = (credits.len() as f64 / 5.0).min(months_analyzed as f64);
    let income_consistency = (months_with_income / months_analyzed as f64).min(1.0);

    IncomeAnalysis {
        total_income,
        avg_monthly_income,
        income_consistency,
        income_sources,
    }
}

pub(crate) fn analyze_spending(
    transactions: &[Transaction],
    months_analyzed: u32,
) -> SpendingAnalysis {
    let debits: Vec<&Transaction> = transactions.iter().filter(|tx| tx.debit > 0.0).collect();
    let total_spending: f64 = debits.iter().map(|tx| tx.debit).sum();
    let avg_monthly_spending = total_spending / months_analyzed as f64;

    let mut categories = SpendingCategories::default();
    for tx in &debits {
        let desc = tx.description.to_uppercase();
        if matches_any(&desc, BILL_KEYWORDS) {
            categories.bills += tx.debit;
        } else if matches_any(&desc, LOAN_KEYWORDS) {
            categories.loans += tx.debit;
        } else if matches_any(&desc, GAMBLING_KEYWORDS) {
            categories.gambling += tx.debit;
        } else if matches_any(&desc, TRANSFER_MARKERS) {
            categories.transfers += tx.debit;
        } else {
            categories.other += tx.debit;
        }
    }

    SpendingAnalysis {
        total_spending,
        avg_monthly_spending,
        categories,
    }
}

pub(crate) fn analyze_balance(transactions: &[Transaction]) -> BalanceAnalysis {
    let balances: Vec<f64> = transactions.iter().map(|tx| tx.balance).collect();
    BalanceAnalysis {
        avg_balance: balances.iter().sum::<f64>() / balances.len() as f64,
        min_balance: balances.iter().copied().fold(f64::INFINITY, f64::min),
        max_balance: balances.iter().copied().fold(f64::NEG_INFINITY, f64::max),
        closing_balance: balances[balances.len() - 1],
    }
}

pub(crate) fn analyze_behavior(
    transactions: &[Transaction],
    months_analyzed: u32,
) -> BehaviorAnalysis {
    let transaction_count = transactions.len() as u32;
    let days = (months_analyzed * 30).max(1);
    let bounce_count = transactions
        .iter()
        .filter(|tx| matches_any(&tx.description.to_uppercase(), BOUNCE_KEYWORDS))
        .count() as u32;

    BehaviorAnalysis {
        transaction_count,
        avg_daily_transactions: transaction_count as f64 / days as f64,
        bounce_count,
        overdraft_usage: transactions.iter().any(|tx| tx.balance < 0.0),
    }
}

pub(crate) fn debt_profile(income: &IncomeAnalysis, spending: &SpendingAnalysis) -> DebtProfile {
    // Loan-tagged debits over a statement period are treated as an already
    // monthly repayment burden.
    let existing_loan_repayments = spending.categories.loans;
    let debt_to_income_ratio = if income.avg_monthly_income > 0.0 {
        existing_loan_repayments / income.avg_monthly_income
    } else {
        0.0
    };

    DebtProfile {
        existing_loan_repayments,
        debt_to_income_ratio,
    }
}

pub(crate) fn assess_affordability(
    income: &IncomeAnalysis,
    spending: &SpendingAnalysis,
    debt: &DebtProfile,
    installment_amount: f64,
) -> AffordabilityAssessment {
    let disposable_income =
        income.avg_monthly_income - (spending.avg_monthly_spending + debt.existing_loan_repayments);

    let affordability_ratio = if disposable_income > 0.0 {
        installment_amount / disposable_income
    } else {
        1.0
    };

    AffordabilityAssessment {
        can_afford_installment: affordability_ratio < 0.5,
        monthly_installment_amount: installment_amount,
        disposable_income,
        affordability_ratio,
        cushion: disposable_income - installment_amount,
    }
}

/// Weighted 0-100 composite: income stability 30, spending behavior 25,
/// balance health 20, transaction behavior 15, affordability 10.
pub(crate) fn trust_score(
    income: &IncomeAnalysis,
    spending: &SpendingAnalysis,
    balance: &BalanceAnalysis,
    behavior: &BehaviorAnalysis,
    affordability: &AffordabilityAssessment,
    installment_amount: f64,
) -> u8 {
    let mut score = 0.0_f64;

    score += income.income_consistency * 15.0;
    if income.avg_monthly_income > 0.0 {
        let income_to_installment = installment_amount / income.avg_monthly_income;
        if income_to_installment < 0.2 {
            score += 15.0;
        } else if income_to_installment < 0.3 {
            score += 10.0;
        } else if income_to_installment < 0.4 {
            score += 5.0;
        }
    }

    let debt_ratio = if affordability.disposable_income > 0.0 && income.avg_monthly_income > 0.0 {
        spending.categories.loans / income.avg_monthly_income
    } else {
        1.0
    };
    score += (10.0 - debt_ratio * 20.0).max(0.0);
    if spending.categories.gambling > 0.0 {
        score -= (spending.categories.gambling / 1_000.0).min(10.0);
    }
    if income.avg_monthly_income > 0.0 {
        let savings_rate =
            (income.avg_monthly_income - spending.avg_monthly_spending) / income.avg_monthly_income;
        score += (savings_rate * 20.0).min(15.0);
    }

    if balance.avg_balance > installment_amount * 2.0 {
        score += 10.0;
    } else if balance.avg_balance > installment_amount {
        score += 5.0;
    }
    if balance.min_balance > installment_amount {
        score += 10.0;
    } else if balance.min_balance > installment_amount * 0.5 {
        score += 5.0;
    }

    if behavior.bounce_count == 0 {
        score += 5.0;
    } else if behavior.bounce_count <= 2 {
        score += 2.0;
    } else {
        score -= 5.0;
    }
    if behavior.overdraft_usage {
        score -= 5.0;
    } else {
        score += 5.0;
    }
    if behavior.transaction_count > 30 {
        score += 5.0;
    } else if behavior.transaction_count > 15 {
        score += 2.0;
    }

    if affordability.affordability_ratio < 0.2 {
        score += 10.0;
    } else if affordability.affordability_ratio < 0.3 {
        score += 7.0;
    } else if affordability.affordability_ratio < 0.4 {
        score += 4.0;
    }

    score.clamp(0.0, 100.0).round() as u8
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn tx(date: (i32, u32, u32), description: &str, debit: f64, credit: f64) -> Transaction {
        Transaction {
            date: NaiveDate::from_ymd_opt(date.0, date.1, date.2).expect("valid date"),
            description: description.to_string(),
            debit,
            credit,
            balance: 0.0,
        }
    }

    fn with_balances(mut ledger: Vec<Transaction>) -> Vec<Transaction> {
        let mut balance = 0.0;
        for row in &mut ledger {
            balance = balance + row.credit - row.debit;
            row.balance = balance;
        }
        ledger
    }

    #[test]
    fn period_is_at_least_one_month() {
        let ledger = vec![
            tx((2026, 3, 10), "SALARY", 0.0, 1000.0),
            tx((2026, 3, 20), "POS", 100.0, 0.0),
        ];
        assert_eq!(period_covered(&ledger).months_analyzed, 1);
    }

    #[test]
    fn period_counts_whole_months() {
        let ledger = vec![
            tx((2026, 1, 15), "SALARY", 0.0, 1000.0),
            tx((2026, 7, 14), "POS", 100.0, 0.0),
        ];
        assert_eq!(period_covered(&ledger).months_analyzed, 5);
    }

    #[test]
    fn income_sources_are_not_mutually_exclusive() {
        let ledger = vec![
            tx((2026, 1, 1), "SALARY TRANSFER", 0.0, 100_000.0),
            tx((2026, 1, 15), "POS SALES", 0.0, 20_000.0),
        ];
        let income = analyze_income(&ledger, 1);
        let labels: Vec<&str> = income
            .income_sources
            .iter()
            .map(|s| s.label.as_str())
            .collect();
        // "SALARY TRANSFER" feeds both the salary and freelance buckets.
        assert_eq!(labels, vec!["SALARY", "FREELANCE", "BUSINESS"]);
        assert_eq!(income.total_income, 120_000.0);
    }

    #[test]
    fn spending_categories_partition_debits() {
        let ledger = vec![
            tx((2026, 1, 1), "DSTV SUBSCRIPTION", 5_000.0, 0.0),
            tx((2026, 1, 2), "CARBON LOAN REPAYMENT", 10_000.0, 0.0),
            tx((2026, 1, 3), "BET9JA", 2_000.0, 0.0),
            tx((2026, 1, 4), "NIP CHARGE", 50.0, 0.0),
            tx((2026, 1, 5), "GROCERIES", 7_000.0, 0.0),
        ];
        let spending = analyze_spending(&ledger, 1);
        assert_eq!(spending.categories.bills, 5_000.0);
        assert_eq!(spending.categories.loans, 10_000.0);
        assert_eq!(spending.categories.gambling, 2_000.0);
        assert_eq!(spending.categories.transfers, 50.0);
        assert_eq!(spending.categories.other, 7_000.0);
        let sum = spending.categories.bills
            + spending.categories.loans
            + spending.categories.gambling
            + spending.categories.transfers
            + spending.categories.other;
        assert_eq!(sum, spending.total_spending);
    }

    #[test]
    fn bounces_and_overdrafts_are_detected() {
        let ledger = with_balances(vec![
            tx((2026, 1, 1), "SALARY", 0.0, 1_000.0),
            tx((2026, 1, 2), "TRANSFER REVERSAL", 0.0, 200.0),
            tx((2026, 1, 3), "POS", 2_000.0, 0.0),
        ]);
        let behavior = analyze_behavior(&ledger, 1);
        assert_eq!(behavior.bounce_count, 1);
        assert!(behavior.overdraft_usage);
    }

    #[test]
    fn score_does_not_decrease_with_income_consistency() {
        let spending = SpendingAnalysis {
            total_spending: 50_000.0,
            avg_monthly_spending: 50_000.0,
            categories: SpendingCategories::default(),
        };
        let balance = BalanceAnalysis {
            avg_balance: 40_000.0,
            min_balance: 12_000.0,
            max_balance: 90_000.0,
            closing_balance: 30_000.0,
        };
        let behavior = BehaviorAnalysis {
            transaction_count: 20,
            avg_daily_transactions: 0.6,
            bounce_count: 0,
            overdraft_usage: false,
        };

        let mut previous = 0;
        for step in 0..=10 {
            let consistency = step as f64 / 10.0;
            let income = IncomeAnalysis {
                total_income: 200_000.0,
                avg_monthly_income: 200_000.0,
                income_consistency: consistency,
                income_sources: Vec::new(),
            };
            let debt = debt_profile(&income, &spending);
            let affordability = assess_affordability(&income, &spending, &debt, 10_000.0);
            let score = trust_score(&income, &spending, &balance, &behavior, &affordability, 10_000.0);
            assert!(
                score >= previous,
                "score dropped from {previous} to {score} at consistency {consistency}"
            );
            previous = score;
        }
    }

    #[test]
    fn score_does_not_increase_with_gambling_spend() {
        let income = IncomeAnalysis {
            total_income: 200_000.0,
            avg_monthly_income: 200_000.0,
            income_consistency: 1.0,
            income_sources: Vec::new(),
        };
        let balance = BalanceAnalysis {
            avg_balance: 40_000.0,
            min_balance: 12_000.0,
            max_balance: 90_000.0,
            closing_balance: 30_000.0,
        };
        let behavior = BehaviorAnalysis {
            transaction_count: 20,
            avg_daily_transactions: 0.6,
            bounce_count: 0,
            overdraft_usage: false,
        };

        let mut previous = u8::MAX;
        for gambling in [0.0, 1_000.0, 5_000.0, 20_000.0] {
            let spending = SpendingAnalysis {
                total_spending: 50_000.0 + gambling,
                avg_monthly_spending: 50_000.0 + gambling,
                categories: SpendingCategories {
                    gambling,
                    ..SpendingCategories::default()
                },
            };
            let debt = debt_profile(&income, &spending);
            let affordability = assess_affordability(&income, &spending, &debt, 10_000.0);
            let score = trust_score(&income, &spending, &balance, &behavior, &affordability, 10_000.0);
            assert!(
                score <= previous,
                "score rose from {previous} to {score} at gambling {gambling}"
            );
            previous = score;
        }
    }

    #[test]
    fn affordability_ratio_pins_to_one_without_disposable_income() {
        let income = IncomeAnalysis {
            total_income: 10_000.0,
            avg_monthly_income: 10_000.0,
            income_consistency: 0.2,
            income_sources: Vec::new(),
        };
        let spending = SpendingAnalysis {
            total_spending: 12_000.0,
            avg_monthly_spending: 12_000.0,
            categories: SpendingCategories::default(),
        };
        let debt = debt_profile(&income, &spending);
        let affordability = assess_affordability(&income, &spending, &debt, 5_000.0);
        assert_eq!(affordability.affordability_ratio, 1.0);
        assert!(!affordability.can_afford_installment);
        assert!(affordability.cushion < 0.0);
    }
}
