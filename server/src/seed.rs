//! Initial stock.
//!
//! Every credit goes through [`StockLedger::release`], the same path a
//! cancellation uses to return units.

use bloodbank_core::{BloodType, StockLedger, StorageError};
use rand::Rng;

use crate::config::Seed;

/// Fewest units a random seed credits per blood type.
pub const RANDOM_MIN_UNITS: u32 = 5;

/// Most units a random seed credits per blood type.
pub const RANDOM_MAX_UNITS: u32 = 54;

/// Expand a seed into the credits it makes.
pub fn credits(seed: &Seed, rng: &mut impl Rng) -> Vec<(BloodType, u32)> {
    match seed {
        Seed::None => Vec::new(),
        Seed::Random => BloodType::ALL
            .into_iter()
            .map(|blood_type| (blood_type, rng.gen_range(RANDOM_MIN_UNITS..=RANDOM_MAX_UNITS)))
            .collect(),
        Seed::Explicit(entries) => entries.clone(),
    }
}

/// Credit the ledger with `seed`. Returns the total units added.
///
/// # Errors
///
/// Returns the first ledger failure; earlier credits stay applied.
pub async fn apply(ledger: &dyn StockLedger, seed: &Seed) -> Result<u64, StorageError> {
    let credits = credits(seed, &mut rand::thread_rng());
    let mut total = 0_u64;

    for (blood_type, units) in credits {
        if units == 0 {
            continue;
        }
        ledger.release(blood_type, units).await?;
        tracing::debug!(%blood_type, units, "Seeded stock");
        total = total.saturating_add(u64::from(units));
    }

    Ok(total)
}
