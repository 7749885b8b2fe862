use crate::outline::{Outline, OutlineChapter};
use serde::{Deserialize, Serialize};
use thiserror::Error;

fn default_outline_cost() -> u64 {
    500
}

fn default_credits_per_page() -> u64 {
    400
}

fn default_cover_cost() -> u64 {
    250
}

/// Starting balance for a fresh install, the trial grant.
pub const STARTING_BALANCE: u64 = 10_000;

#[derive(Debug, Error)]
pub enum LedgerError {
    #[error("insufficient balance: the operation costs {required} credits but only {available} are available")]
    InsufficientBalance { required: u64, available: u64 },
}

/// Fixed price list for generation operations.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct Pricing {
    #[serde(default = "default_outline_cost")]
    pub outline_cost: u64,
    #[serde(default = "default_credits_per_page")]
    pub credits_per_page: u64,
    #[serde(default = "default_cover_cost")]
    pub cover_cost: u64,
}

impl Default for Pricing {
    fn default() -> Self {
        Self {
            outline_cost: default_outline_cost(),
            credits_per_page: default_credits_per_page(),
            cover_cost: default_cover_cost(),
        }
    }
}

/// Single process-wide credit balance. Operations are blocked pre-flight when
/// the balance cannot cover them; charges happen only after the external call
/// succeeds, so the balance can never go negative.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CreditLedger {
    balance: u64,
    pricing: Pricing,
}

impl CreditLedger {
    pub fn new(balance: u64, pricing: Pricing) -> Self {
        Self { balance, pricing }
    }

    pub fn balance(&self) -> u64 {
        self.balance
    }

    pub fn pricing(&self) -> &Pricing {
        &self.pricing
    }

    pub fn outline_cost(&self) -> u64 {
        self.pricing.outline_cost
    }

    pub fn cover_cost(&self) -> u64 {
        self.pricing.cover_cost
    }

    pub fn chapter_cost(&self, chapter: &OutlineChapter) -> u64 {
        u64::from(chapter.estimated_pages) * self.pricing.credits_per_page
    }

    /// Cost of generating every chapter not yet marked generated.
    pub fn remaining_cost(&self, outline: &Outline) -> u64 {
        outline
            .chapters
            .iter()
            .filter(|chapter| !chapter.generated)
            .map(|chapter| self.chapter_cost(chapter))
            .sum()
    }

    pub fn can_afford(&self, cost: u64) -> bool {
        self.balance >= cost
    }

    /// Debits the balance. Callers check `can_afford` pre-flight; a failed
    /// charge here means the pre-flight check was skipped.
    pub fn charge(&mut self, cost: u64) -> Result<(), LedgerError> {
        if cost > self.balance {
            return Err(LedgerError::InsufficientBalance {
                required: cost,
                available: self.balance,
            });
        }
        self.balance -= cost;
        Ok(())
    }

    /// Credits the balance after a confirmed top-up. Payment confirmation is
    /// simulated upstream; the ledger only ever sees the confirmed amount.
    pub fn top_up(&mut self, amount: u64) {
        self.balance = self.balance.saturating_add(amount);
    }
}

/// Purchasable credit bundle. Prices are display strings only; no payment
/// processing happens anywhere in this system.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct CreditPack {
    pub id: &'static str,
    pub name: &'static str,
    pub credits: u64,
    pub price: &'static str,
    pub description: &'static str,
    pub popular: bool,
}

pub const CREDIT_PACKS: [CreditPack; 4] = [
    CreditPack {
        id: "trial",
        name: "Trial",
        credits: 10_000,
        price: "$0",
        description: "New-user grant, enough for 5-8 short chapters",
        popular: false,
    },
    CreditPack {
        id: "standard",
        name: "Standard",
        credits: 100_000,
        price: "$4.90",
        description: "Covers 2-3 standard-length technical books",
        popular: true,
    },
    CreditPack {
        id: "pro",
        name: "Pro",
        credits: 500_000,
        price: "$14.90",
        description: "For sustained writing at a much lower unit cost",
        popular: false,
    },
    CreditPack {
        id: "studio",
        name: "Studio",
        credits: 2_000_000,
        price: "$39.90",
        description: "Bulk credits for prolific authors and studios",
        popular: false,
    },
];

pub fn find_pack(id: &str) -> Option<&'static CreditPack> {
    CREDIT_PACKS.iter().find(|pack| pack.id == id)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::outline::Outline;

    fn outline_with_pages(pages: &[u32]) -> Outline {
        let mut outline = Outline::new("Test Book", "abstract cover");
        for (i, pages) in pages.iter().enumerate() {
            outline.push_chapter(OutlineChapter::new(
                format!("Chapter {}", i + 1),
                "stub",
                *pages,
            ));
        }
        outline
    }

    #[test]
    fn remaining_cost_sums_ungenerated_chapters() {
        let pricing = Pricing {
            outline_cost: 500,
            credits_per_page: 100,
            cover_cost: 250,
        };
        let ledger = CreditLedger::new(1_000, pricing);
        let mut outline = outline_with_pages(&[3, 5]);

        assert_eq!(ledger.remaining_cost(&outline), 800);

        outline.chapters[0].generated = true;
        assert_eq!(ledger.remaining_cost(&outline), 500);
    }

    #[test]
    fn charge_never_goes_negative() {
        let mut ledger = CreditLedger::new(300, Pricing::default());
        let err = ledger.charge(500).expect_err("must be blocked");
        assert!(matches!(
            err,
            LedgerError::InsufficientBalance {
                required: 500,
                available: 300
            }
        ));
        assert_eq!(ledger.balance(), 300);

        ledger.charge(300).unwrap();
        assert_eq!(ledger.balance(), 0);
    }

    #[test]
    fn top_up_increments_balance() {
        let mut ledger = CreditLedger::new(0, Pricing::default());
        ledger.top_up(find_pack("standard").unwrap().credits);
        assert_eq!(ledger.balance(), 100_000);
    }

    #[test]
    fn pack_lookup() {
        assert!(find_pack("pro").is_some());
        assert!(find_pack("nonsense").is_none());
    }
}
