//! Bank statement ingestion: delimited exports to an ordered ledger.

mod parser;

pub use parser::{parse_statement, parse_statement_str, StatementParseError, Transaction};
