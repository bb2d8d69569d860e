// SPDX-FileCopyrightText: 2026 Raffle Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Raffle catalog: which promotion a message refers to.

use raffle_config::model::RaffleEntry;
use raffle_core::types::RaffleInfo;

const FALLBACK_RAFFLE_ID: u32 = 1;
const FALLBACK_RAFFLE_NAME: &str = "Sticker Rueda y Gana";

/// The configured raffles, in configuration order.
#[derive(Debug, Clone, Default)]
pub struct RaffleCatalog {
    entries: Vec<RaffleEntry>,
}

impl RaffleCatalog {
    pub fn new(entries: &[RaffleEntry]) -> Self {
        Self {
            entries: entries.to_vec(),
        }
    }

    /// Picks the raffle a message targets. Never fails.
    ///
    /// Order: first active raffle whose keyword or name appears in the text,
    /// then the first active raffle, then the first configured raffle, then a
    /// built-in default.
    pub fn detect(&self, text: &str) -> RaffleInfo {
        let haystack = text.to_lowercase();
        let mentioned = self.entries.iter().filter(|e| e.active).find(|entry| {
            let by_name = haystack.contains(&entry.name.to_lowercase());
            let by_keyword = entry
                .keyword
                .as_deref()
                .is_some_and(|k| !k.is_empty() && haystack.contains(&k.to_lowercase()));
            by_name || by_keyword
        });

        mentioned
            .or_else(|| self.entries.iter().find(|e| e.active))
            .or_else(|| self.entries.first())
            .map(|entry| RaffleInfo {
                id: entry.id,
                name: entry.name.clone(),
                icon: entry.icon.clone(),
            })
            .unwrap_or_else(|| RaffleInfo {
                id: FALLBACK_RAFFLE_ID,
                name: FALLBACK_RAFFLE_NAME.to_string(),
                icon: None,
            })
    }
}
