//! Technical column name normalization
//!
//! Lookups are exact on the normalized key. Normalization is a fixed rule
//! table (no fuzzy matching) so that every hit can be explained:
//!
//! 1. split on separators, camelCase humps, and letter/digit boundaries
//! 2. lowercase every word
//! 3. expand known abbreviations (`qty` -> `quantity`)
//! 4. join with `_`

use serde::{Deserialize, Serialize};

/// Normalized form of a technical column name
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NormalizedKey(String);

impl NormalizedKey {
    /// Key as a string slice
    #[inline]
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Whether the technical name contained no alphanumeric characters
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl std::fmt::Display for NormalizedKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Normalize a technical column name into a lookup key
///
/// `"Cust_ID"`, `"custId"` and `"customer-id"` all map to `customer_id`.
#[must_use]
pub fn normalize(technical_name: &str) -> NormalizedKey {
    let split = split_words(technical_name);
    let words: Vec<&str> = split.iter().flat_map(|word| expand(word).split(' ')).collect();
    NormalizedKey(words.join("_"))
}

fn split_words(raw: &str) -> Vec<String> {
    let chars: Vec<char> = raw.chars().collect();
    let mut words = Vec::new();
    let mut current = String::new();

    for (i, &c) in chars.iter().enumerate() {
        if !c.is_alphanumeric() {
            flush(&mut current, &mut words);
            continue;
        }
        if i > 0 {
            let prev = chars[i - 1];
            let next = chars.get(i + 1).copied();
            let boundary = (prev.is_lowercase() && c.is_uppercase())
                || (prev.is_alphabetic() && c.is_ascii_digit())
                || (prev.is_ascii_digit() && c.is_alphabetic())
                || (prev.is_uppercase() && c.is_uppercase() && next.is_some_and(char::is_lowercase));
            if boundary {
                flush(&mut current, &mut words);
            }
        }
        current.extend(c.to_lowercase());
    }
    flush(&mut current, &mut words);
    words
}

fn flush(current: &mut String, words: &mut Vec<String>) {
    if !current.is_empty() {
        words.push(std::mem::take(current));
    }
}

/// Abbreviation rule table. Outputs never appear as inputs.
fn expand(word: &str) -> &str {
    match word {
        "qty" | "qnty" => "quantity",
        "amt" => "amount",
        "cust" | "cus" => "customer",
        "dt" => "date",
        "ts" => "timestamp",
        "yr" => "year",
        "mth" | "mon" => "month",
        "no" | "num" | "nbr" => "number",
        "cnt" => "count",
        "desc" => "description",
        "addr" => "address",
        "prod" => "product",
        "cat" => "category",
        "txn" | "trx" => "transaction",
        "acct" => "account",
        "emp" => "employee",
        "dept" => "department",
        "mgr" => "manager",
        "val" => "value",
        "avg" => "average",
        "pct" => "percent",
        "rev" => "revenue",
        "inv" => "invoice",
        "ord" => "order",
        "loc" => "location",
        "nm" => "name",
        "fname" => "first name",
        "lname" => "last name",
        "tel" => "telephone",
        "sku" => "stock keeping unit",
        other => other,
    }
}
