use chrono::NaiveDate;
use std::io::Read;

/// One ledger row reconstructed from a bank statement export.
#[derive(Debug, Clone, PartialEq)]
pub struct Transaction {
    pub date: NaiveDate,
    pub description: String,
    pub debit: f64,
    pub credit: f64,
    pub balance: f64,
}

#[derive(Debug, thiserror::Error)]
pub enum StatementParseError {
    #[error("statement is empty")]
    Empty,
    #[error("no parsable transaction rows found in statement")]
    NoTransactions,
    #[error("failed to read statement: {0}")]
    Csv(#[from] csv::Error),
}

const DATE_COLUMNS: &[&str] = &[
    "date",
    "trans date",
    "transaction date",
    "value date",
    "posting date",
];
const DESCRIPTION_COLUMNS: &[&str] = &[
    "description",
    "narration",
    "remarks",
    "details",
    "transaction details",
];
const DEBIT_COLUMNS: &[&str] = &["debit", "debit amount", "withdrawal", "dr"];
const CREDIT_COLUMNS: &[&str] = &["credit", "credit amount", "deposit", "cr"];
const BALANCE_COLUMNS: &[&str] = &["balance", "running balance", "available balance", "bal"];

const DATE_LAYOUTS: &[&str] = &[
    "%Y-%m-%d", "%d/%m/%Y", "%d-%m-%Y", "%m/%d/%Y", "%m-%d-%Y", "%d %b %Y", "%d-%b-%Y", "%Y/%m/%d",
];

/// Parse a delimited bank-statement export into an ordered ledger.
///
/// Column headers are matched case-insensitively against per-field synonym
/// lists so exports from different banks parse without a mapping step. Rows
/// without a recognizable date or description are skipped rather than failing
/// the whole statement.
pub fn parse_statement<R: Read>(reader: R) -> Result<Vec<Transaction>, StatementParseError> {
    let mut csv_reader = csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .flexible(true)
        .from_reader(reader);

    let headers = csv_reader.headers()?.clone();
    let date_col = find_column(&headers, DATE_COLUMNS);
    let desc_col = find_column(&headers, DESCRIPTION_COLUMNS);
    let debit_col = find_column(&headers, DEBIT_COLUMNS);
    let credit_col = find_column(&headers, CREDIT_COLUMNS);
    let balance_col = find_column(&headers, BALANCE_COLUMNS);

    let mut transactions = Vec::new();
    for record in csv_reader.records() {
        let record = record?;

        let (Some(date_col), Some(desc_col)) = (date_col, desc_col) else {
            continue;
        };
        let Some(date) = record.get(date_col).and_then(parse_date) else {
            continue;
        };
        let Some(description) = record.get(desc_col).map(str::trim) else {
            continue;
        };

        transactions.push(Transaction {
            date,
            description: description.to_string(),
            debit: field_amount(&record, debit_col),
            credit: field_amount(&record, credit_col),
            balance: field_amount(&record, balance_col),
        });
    }

    if transactions.is_empty() {
        return Err(StatementParseError::NoTransactions);
    }

    transactions.sort_by_key(|tx| tx.date);
    fill_missing_balances(&mut transactions);
    Ok(transactions)
}

/// Convenience wrapper for statements held in memory.
pub fn parse_statement_str(content: &str) -> Result<Vec<Transaction>, StatementParseError> {
    if content.trim().is_empty() {
        return Err(StatementParseError::Empty);
    }
    parse_statement(content.as_bytes())
}

/// First header equal (case-insensitive) to any synonym; synonym order wins.
fn find_column(headers: &csv::StringRecord, synonyms: &[&str]) -> Option<usize> {
    for synonym in synonyms {
        if let Some(index) = headers
            .iter()
            .position(|header| header.trim().eq_ignore_ascii_case(synonym))
        {
            return Some(index);
        }
    }
    None
}

fn field_amount(record: &csv::StringRecord, column: Option<usize>) -> f64 {
    column
        .and_then(|index| record.get(index))
        .map(parse_amount)
        .unwrap_or(0.0)
}

/// Strip currency symbols, thousands separators, and whitespace.
/// Unparsable amounts become zero rather than failing the row.
fn parse_amount(value: &str) -> f64 {
    let cleaned: String = value
        .chars()
        .filter(|c| !matches!(c, '₦' | '$' | ',') && !c.is_whitespace())
        .collect();
    if cleaned.is_empty() {
        return 0.0;
    }
    cleaned.parse::<f64>().unwrap_or(0.0)
}

fn parse_date(value: &str) -> Option<NaiveDate> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return None;
    }
    DATE_LAYOUTS
        .iter()
        .find_map(|layout| NaiveDate::parse_from_str(trimmed, layout).ok())
}

/// Give every row a deterministic balance.
///
/// With no balance column at all, balances are synthesized forward from zero.
/// With at least one non-zero balance, that first value anchors the ledger:
/// earlier rows are reconstructed backward from it and later zero-balance rows
/// forward.
fn fill_missing_balances(transactions: &mut [Transaction]) {
    let anchor = transactions.iter().position(|tx| tx.balance != 0.0);

    match anchor {
        Some(anchor) => {
            for i in (0..anchor).rev() {
                transactions[i].balance =
                    transactions[i + 1].balance - transactions[i].credit + transactions[i].debit;
            }
            for i in anchor + 1..transactions.len() {
                if transactions[i].balance == 0.0 {
                    transactions[i].balance = transactions[i - 1].balance
                        + transactions[i].credit
                        - transactions[i].debit;
                }
            }
        }
        None => {
            let mut balance = 0.0;
            for tx in transactions.iter_mut() {
                balance = balance + tx.credit - tx.debit;
                tx.balance = balance;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_standard_columns_and_sorts_by_date() {
        let csv = "Date,Description,Debit,Credit,Balance\n\
                   2026-01-03,POS PURCHASE,1500,0,8500\n\
                   2026-01-01,SALARY JAN,0,10000,10000\n";
        let ledger = parse_statement_str(csv).expect("statement parses");
        assert_eq!(ledger.len(), 2);
        assert_eq!(ledger[0].description, "SALARY JAN");
        assert_eq!(ledger[0].credit, 10_000.0);
        assert_eq!(ledger[1].debit, 1_500.0);
    }

    #[test]
    fn matches_bank_specific_header_synonyms() {
        let csv = "Trans Date,Narration,Withdrawal,Deposit,Running Balance\n\
                   05/01/2026,NIP TRANSFER,2000,,48000\n";
        let ledger = parse_statement_str(csv).expect("statement parses");
        assert_eq!(ledger[0].date, NaiveDate::from_ymd_opt(2026, 1, 5).unwrap());
        assert_eq!(ledger[0].debit, 2_000.0);
        assert_eq!(ledger[0].credit, 0.0);
        assert_eq!(ledger[0].balance, 48_000.0);
    }

    #[test]
    fn parses_month_name_dates_and_currency_amounts() {
        let csv = "Date,Details,Dr,Cr,Bal\n\
                   15 Jan 2026,AIRTIME,\"₦1,200.50\",,\"₦10,000\"\n";
        let ledger = parse_statement_str(csv).expect("statement parses");
        assert_eq!(
            ledger[0].date,
            NaiveDate::from_ymd_opt(2026, 1, 15).unwrap()
        );
        assert_eq!(ledger[0].debit, 1_200.50);
        assert_eq!(ledger[0].balance, 10_000.0);
    }

    #[test]
    fn unparsable_amounts_become_zero() {
        let csv = "Date,Description,Debit,Credit,Balance\n\
                   2026-01-01,ODD ROW,n/a,,100\n";
        let ledger = parse_statement_str(csv).expect("statement parses");
        assert_eq!(ledger[0].debit, 0.0);
    }

    #[test]
    fn skips_rows_with_unrecognizable_dates() {
        let csv = "Date,Description,Debit,Credit,Balance\n\
                   not-a-date,BAD ROW,10,,\n\
                   2026-01-02,GOOD ROW,10,,90\n";
        let ledger = parse_statement_str(csv).expect("statement parses");
        assert_eq!(ledger.len(), 1);
        assert_eq!(ledger[0].description, "GOOD ROW");
    }

    #[test]
    fn empty_statement_is_an_error() {
        assert!(matches!(
            parse_statement_str("  \n"),
            Err(StatementParseError::Empty)
        ));
        assert!(matches!(
            parse_statement_str("Date,Description\n"),
            Err(StatementParseError::NoTransactions)
        ));
    }

    #[test]
    fn statement_without_date_column_is_an_error() {
        let csv = "Ref,Description,Debit\nabc,SOMETHING,10\n";
        assert!(matches!(
            parse_statement_str(csv),
            Err(StatementParseError::NoTransactions)
        ));
    }

    #[test]
    fn synthesizes_balances_forward_from_zero_without_balance_column() {
        let csv = "Date,Description,Debit,Credit\n\
                   2026-01-01,CREDIT ONE,0,1000\n\
                   2026-01-02,DEBIT ONE,300,0\n\
                   2026-01-03,CREDIT TWO,0,500\n";
        let ledger = parse_statement_str(csv).expect("statement parses");
        let balances: Vec<f64> = ledger.iter().map(|tx| tx.balance).collect();
        assert_eq!(balances, vec![1_000.0, 700.0, 1_200.0]);
    }

    #[test]
    fn reconstructs_around_a_single_balance_anchor() {
        let csv = "Date,Description,Debit,Credit,Balance\n\
                   2026-01-01,EARLIER CREDIT,0,1000,\n\
                   2026-01-02,ANCHOR DEBIT,300,0,5000\n\
                   2026-01-03,LATER CREDIT,0,500,\n";
        let ledger = parse_statement_str(csv).expect("statement parses");
        let balances: Vec<f64> = ledger.iter().map(|tx| tx.balance).collect();
        // backward from the anchor: 5000 - 1000 + 0; forward: 5000 + 500 - 0.
        assert_eq!(balances, vec![4_000.0, 5_000.0, 5_500.0]);
    }
}
