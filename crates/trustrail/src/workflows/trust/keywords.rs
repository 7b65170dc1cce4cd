//! Keyword tables used to classify statement narrations.
//!
//! Matching is case-insensitive substring containment against the uppercased
//! description. The lists mirror the narration conventions of Nigerian bank
//! exports (utilities, telcos, lenders, bookmakers).

pub(crate) const SALARY_KEYWORDS: &[&str] = &["SALARY", "SAL", "WAGES", "PAYROLL"];
pub(crate) const FREELANCE_KEYWORDS: &[&str] = &["TRANSFER", "REMITTANCE", "UPWORK", "FIVERR"];
pub(crate) const BUSINESS_KEYWORDS: &[&str] = &["POS", "PAYMENT FOR", "SALES"];

pub(crate) const BILL_KEYWORDS: &[&str] = &[
    "PHCN",
    "EKEDC",
    "IKEDC",
    "DSTV",
    "GOTV",
    "STARTIMES",
    "AIRTEL",
    "MTN",
    "GLO",
    "9MOBILE",
    "ETISALAT",
    "WATER BILL",
    "ELECTRICITY",
    "CABLE TV",
];

pub(crate) const LOAN_KEYWORDS: &[&str] = &[
    "LOAN",
    "REPAYMENT",
    "INSTALLMENT",
    "CREDIT CORP",
    "CARBON",
    "BRANCH",
    "FAIRMONEY",
    "PALMCREDIT",
    "RENMONEY",
];

pub(crate) const GAMBLING_KEYWORDS: &[&str] = &[
    "BET",
    "BETKING",
    "SPORTYBET",
    "NAIRABET",
    "1XBET",
    "BET9JA",
    "MSPORT",
    "MERRYBET",
];

pub(crate) const TRANSFER_MARKERS: &[&str] = &["TRANSFER", "FIP", "NIP"];

pub(crate) const BOUNCE_KEYWORDS: &[&str] = &[
    "INSUFFICIENT FUNDS",
    "REVERSAL",
    "DECLINED",
    "FAILED",
    "REJECTED",
];

pub(crate) fn matches_any(description_upper: &str, keywords: &[&str]) -> bool {
    keywords
        .iter()
        .any(|keyword| description_upper.contains(keyword))
}
