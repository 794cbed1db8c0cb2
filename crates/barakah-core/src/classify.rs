//! Halal / Haram / Unknown labelling of bank transactions.
//!
//! Ordered, case-insensitive substring rules; the first rule that matches
//! wins. Matching is deliberately literal: `bar` also hits names such as
//! "Barclays".

use barakah_bank::BankTransaction;
use barakah_storage::ComplianceStatus;

const HARAM_CATEGORIES: &[&str] = &["alcohol", "bar", "liquor"];
const HARAM_MERCHANTS: &[&str] = &["bar", "liquor", "pub", "wine", "mcdonald"];

const HALAL_CATEGORIES: &[&str] = &["grocery", "supermarket"];
// Convenience stores, grocery chains and petrol stations.
const HALAL_MERCHANTS: &[&str] = &[
    "7-eleven",
    "tesco",
    "sainsbury",
    "asda",
    "aldi",
    "lidl",
    "co-op",
    "morrisons",
    "waitrose",
    "shell",
    "esso",
    "texaco",
];

pub fn classify(transaction: &BankTransaction) -> ComplianceStatus {
    classify_parts(transaction.display_merchant(), &transaction.categories)
}

pub fn classify_parts<S: AsRef<str>>(merchant: &str, categories: &[S]) -> ComplianceStatus {
    let merchant = merchant.to_lowercase();
    let categories: Vec<String> = categories
        .iter()
        .map(|c| c.as_ref().to_lowercase())
        .collect();

    let category_has =
        |needles: &[&str]| categories.iter().any(|c| needles.iter().any(|n| c.contains(n)));
    let merchant_has = |needles: &[&str]| needles.iter().any(|n| merchant.contains(n));

    if category_has(HARAM_CATEGORIES) || merchant_has(HARAM_MERCHANTS) {
        ComplianceStatus::Haram
    } else if category_has(HALAL_CATEGORIES) || merchant_has(HALAL_MERCHANTS) {
        ComplianceStatus::Halal
    } else {
        ComplianceStatus::Unknown
    }
}
