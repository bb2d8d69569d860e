// SPDX-FileCopyrightText: 2026 Raffle Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Purchase message classification and field extraction.
//!
//! Classification is strict: a message opens a purchase session only when it
//! carries the declaration line, an item line and both total lines, each on
//! its own line. Extraction is lenient and never fails; it is only run on
//! text that already classified as a purchase.

use std::sync::LazyLock;

use raffle_config::model::PurchaseConfig;
use raffle_core::types::{PurchaseDetails, PurchaseItem};
use regex::Regex;
use tracing::debug;

/// Shorter texts are never purchases.
const MIN_PURCHASE_LEN: usize = 10;

static ITEM_LINE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)^\S.*:\s*\d+\s*items?\s*-\s*\$\s*\d[\d.,]*$").expect("valid regex")
});
static TOTAL_ITEMS_LINE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^Total items:\s*\d+$").expect("valid regex"));
static TOTAL_AMOUNT_LINE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^Total amount:\s*\$\s*\d[\d.,]*$").expect("valid regex"));

static TOTAL_ITEMS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)Total items:\s*(\d+)").expect("valid regex"));
static ANY_ITEMS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)(\d+)\s*items?\b").expect("valid regex"));
static TOTAL_AMOUNT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)Total amount:\s*\$\s*(\d[\d.,]*)").expect("valid regex"));
static ANY_AMOUNT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\$\s*(\d[\d.,]*)").expect("valid regex"));
static ITEM: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)(\d+)\s*items?\s*-\s*\$\s*(\d[\d.,]*)").expect("valid regex")
});

/// Classifies inbound text and extracts purchase quantities.
#[derive(Debug, Clone)]
pub struct PurchaseDetector {
    declaration: String,
    unit_price: u64,
    min_plausible_amount: u64,
}

impl PurchaseDetector {
    pub fn new(config: &PurchaseConfig) -> Self {
        Self {
            declaration: config.declaration.trim().to_string(),
            unit_price: config.unit_price,
            min_plausible_amount: config.min_plausible_amount,
        }
    }

    /// Returns true when `text` is a well-formed purchase declaration.
    ///
    /// All four required lines must be present on distinct lines, in any order.
    pub fn classify(&self, text: &str) -> bool {
        if text.trim().chars().count() < MIN_PURCHASE_LEN {
            return false;
        }

        let lines: Vec<&str> = text
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty())
            .collect();

        let required: [&dyn Fn(&str) -> bool; 4] = [
            &|line: &str| line == self.declaration,
            &|line: &str| ITEM_LINE.is_match(line),
            &|line: &str| TOTAL_ITEMS_LINE.is_match(line),
            &|line: &str| TOTAL_AMOUNT_LINE.is_match(line),
        ];

        let mut used = vec![false; lines.len()];
        let matched = assign_distinct(&required, &lines, &mut used);
        debug!(matched, lines = lines.len(), "purchase classification");
        matched
    }

    /// Extracts quantity, total and line items from a purchase message.
    ///
    /// Never fails: overflowing numbers yield zeros with an `error` marker.
    /// When the parsed total looks implausibly low for the quantity it is
    /// replaced by `quantity * unit_price`. That threshold is a heuristic, not
    /// a business rule.
    pub fn extract(&self, text: &str) -> PurchaseDetails {
        match self.try_extract(text) {
            Ok(details) => details,
            Err(reason) => {
                debug!(reason = %reason, "purchase extraction failed");
                PurchaseDetails::failed(reason)
            }
        }
    }

    fn try_extract(&self, text: &str) -> Result<PurchaseDetails, String> {
        let quantity_match = TOTAL_ITEMS
            .captures(text)
            .or_else(|| ANY_ITEMS.captures(text))
            .and_then(|caps| caps.get(1));
        let item_count = match quantity_match {
            Some(m) => parse_quantity(m.as_str())?,
            None => 0,
        };

        let mut total_amount = match TOTAL_AMOUNT.captures(text).and_then(|caps| caps.get(1)) {
            Some(m) => parse_amount(m.as_str())?,
            None => {
                let mut largest = 0;
                for caps in ANY_AMOUNT.captures_iter(text) {
                    largest = largest.max(parse_amount(&caps[1])?);
                }
                largest
            }
        };

        if item_count > 0 && total_amount < self.min_plausible_amount {
            let computed = u64::from(item_count)
                .checked_mul(self.unit_price)
                .ok_or_else(|| "computed amount overflows".to_string())?;
            debug!(
                parsed = total_amount,
                computed, "amount below plausible minimum, using unit price"
            );
            total_amount = computed;
        }

        let mut items = Vec::new();
        for caps in ITEM.captures_iter(text) {
            items.push(PurchaseItem {
                quantity: parse_quantity(&caps[1])?,
                amount: parse_amount(&caps[2])?,
            });
        }

        Ok(PurchaseDetails {
            item_count,
            total_amount,
            items,
            error: None,
        })
    }
}

/// Backtracking assignment of each predicate to a line no other predicate uses.
fn assign_distinct(required: &[&dyn Fn(&str) -> bool], lines: &[&str], used: &mut [bool]) -> bool {
    let Some((first, rest)) = required.split_first() else {
        return true;
    };
    for (idx, &line) in lines.iter().enumerate() {
        if used[idx] || !first(line) {
            continue;
        }
        used[idx] = true;
        if assign_distinct(rest, lines, used) {
            return true;
        }
        used[idx] = false;
    }
    false
}

fn parse_quantity(raw: &str) -> Result<u32, String> {
    raw.parse::<u32>()
        .map_err(|_| format!("quantity `{raw}` out of range"))
}

/// Parses an amount written with `,` or `.` thousands separators.
fn parse_amount(raw: &str) -> Result<u64, String> {
    let digits: String = raw.chars().filter(char::is_ascii_digit).collect();
    if digits.is_empty() {
        return Ok(0);
    }
    digits
        .parse::<u64>()
        .map_err(|_| format!("amount `{raw}` out of range"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    const DECLARATION: &str = "I want to buy these stickers!";

    fn detector() -> PurchaseDetector {
        PurchaseDetector::new(&PurchaseConfig::default())
    }

    fn required_lines() -> Vec<String> {
        vec![
            DECLARATION.to_string(),
            "Sticker Rueda y Gana: 10 items - $10,000".to_string(),
            "Total items: 10".to_string(),
            "Total amount: $10,000".to_string(),
        ]
    }

    fn purchase_text() -> String {
        required_lines().join("\n")
    }

    #[test]
    fn well_formed_message_classifies() {
        assert!(detector().classify(&purchase_text()));
    }

    #[test]
    fn missing_total_amount_does_not_classify() {
        let text = format!(
            "{DECLARATION}\nSticker Rueda y Gana: 5 items - $5,000\nTotal items: 5"
        );
        assert!(!detector().classify(&text));
    }

    #[test]
    fn short_text_is_never_a_purchase() {
        assert!(!detector().classify(""));
        assert!(!detector().classify("buy 5"));
    }

    #[test]
    fn declaration_must_match_exactly() {
        let text = purchase_text().replace(DECLARATION, "i want to buy these stickers");
        assert!(!detector().classify(&text));
    }

    #[test]
    fn lines_are_trimmed_and_blank_lines_ignored() {
        let text = format!(
            "  {DECLARATION}  \n\n  Promo: 2 items - $2.000\n\tTotal items: 2\nTotal amount: $2.000   "
        );
        assert!(detector().classify(&text));
    }

    #[test]
    fn casual_chatter_mentioning_totals_does_not_classify() {
        let text = "hey, what's the Total amount: $5000 for Total items: 5?";
        assert!(!detector().classify(text));
    }

    #[test]
    fn extract_prefers_explicit_totals() {
        let details = detector().extract(&purchase_text());
        assert_eq!(details.item_count, 10);
        assert_eq!(details.total_amount, 10_000);
        assert_eq!(
            details.items,
            vec![PurchaseItem {
                quantity: 10,
                amount: 10_000
            }]
        );
        assert!(details.error.is_none());
    }

    #[test]
    fn extract_takes_largest_amount_without_total_line() {
        let text = "Promo A: 2 items - $2,000\nPromo B: 3 items - $3,000\nall: $5,000";
        let details = detector().extract(text);
        assert_eq!(details.item_count, 2);
        assert_eq!(details.total_amount, 5_000);
        assert_eq!(details.items.len(), 2);
    }

    #[test]
    fn implausibly_low_amount_is_recomputed_from_unit_price() {
        let text = "Total items: 7\nTotal amount: $7";
        let details = detector().extract(text);
        assert_eq!(details.item_count, 7);
        assert_eq!(details.total_amount, 7_000);
    }

    #[test]
    fn overflow_yields_zeros_with_marker() {
        let text = "Total items: 99999999999999\nTotal amount: $1";
        let details = detector().extract(text);
        assert_eq!(details.item_count, 0);
        assert_eq!(details.total_amount, 0);
        assert!(details.error.is_some());
        assert!(!details.is_valid());
    }

    #[test]
    fn no_numbers_extracts_zeros_without_error() {
        let details = detector().extract("nothing to see here");
        assert_eq!(details, PurchaseDetails::default());
    }

    proptest! {
        #[test]
        fn any_line_order_classifies(lines in Just(required_lines()).prop_shuffle()) {
            prop_assert!(detector().classify(&lines.join("\n")));
        }

        #[test]
        fn dropping_any_required_line_never_classifies(
            lines in Just(required_lines()).prop_shuffle(),
            drop in 0usize..4,
            noise in "[a-z ]{0,30}",
        ) {
            let mut lines = lines;
            lines.remove(drop);
            lines.push(noise);
            prop_assert!(!detector().classify(&lines.join("\n")));
        }

        #[test]
        fn extraction_never_panics(text in ".{0,200}") {
            let _ = detector().extract(&text);
        }
    }
}
