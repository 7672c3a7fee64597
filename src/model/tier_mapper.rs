use std::cmp::Ordering;

use serde::{Deserialize, Serialize};

use crate::{
    error::{EngineError, EngineResult},
    model::{
        constants::{
            CHALLENGER_MIN_MMR, DIAMOND_MIN_MMR, DIVISIONS_PER_TIER, GOLD_MIN_MMR, GRANDMASTER_MIN_MMR,
            MASTER_MIN_MMR, MAX_DIVISIONLESS_LP, MAX_DIVISION_LP, PLATINUM_MIN_MMR, SILVER_MIN_MMR
        },
        structures::tier::{Division, Tier}
    }
};

/// One row of the tier table. `max_mmr` is exclusive; `None` means open-ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TierBand {
    pub tier: Tier,
    pub min_mmr: i32,
    pub max_mmr: Option<i32>
}

/// Ordered, gapless partition of the rating range.
pub const TIER_TABLE: [TierBand; 8] = [
    TierBand {
        tier: Tier::Bronze,
        min_mmr: 0,
        max_mmr: Some(SILVER_MIN_MMR)
    },
    TierBand {
        tier: Tier::Silver,
        min_mmr: SILVER_MIN_MMR,
        max_mmr: Some(GOLD_MIN_MMR)
    },
    TierBand {
        tier: Tier::Gold,
        min_mmr: GOLD_MIN_MMR,
        max_mmr: Some(PLATINUM_MIN_MMR)
    },
    TierBand {
        tier: Tier::Platinum,
        min_mmr: PLATINUM_MIN_MMR,
        max_mmr: Some(DIAMOND_MIN_MMR)
    },
    TierBand {
        tier: Tier::Diamond,
        min_mmr: DIAMOND_MIN_MMR,
        max_mmr: Some(MASTER_MIN_MMR)
    },
    TierBand {
        tier: Tier::Master,
        min_mmr: MASTER_MIN_MMR,
        max_mmr: Some(GRANDMASTER_MIN_MMR)
    },
    TierBand {
        tier: Tier::Grandmaster,
        min_mmr: GRANDMASTER_MIN_MMR,
        max_mmr: Some(CHALLENGER_MIN_MMR)
    },
    TierBand {
        tier: Tier::Challenger,
        min_mmr: CHALLENGER_MIN_MMR,
        max_mmr: None
    }
];

/// A displayed rank. `division` is present iff the tier has divisions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TierDivision {
    pub tier: Tier,
    pub division: Option<Division>
}

impl TierDivision {
    pub fn new(tier: Tier, division: Option<Division>) -> EngineResult<Self> {
        if tier.has_divisions() != division.is_some() {
            return Err(EngineError::InvalidInput(format!(
                "tier {} {} a division",
                tier,
                if tier.has_divisions() { "requires" } else { "cannot have" }
            )));
        }

        Ok(TierDivision { tier, division })
    }

    /// The absolute floor of the ladder; demotion never goes below it.
    pub fn lowest() -> Self {
        TierDivision {
            tier: Tier::Bronze,
            division: Some(Division::LOWEST)
        }
    }

    pub fn highest() -> Self {
        TierDivision {
            tier: Tier::Challenger,
            division: None
        }
    }

    pub fn is_lowest(&self) -> bool {
        *self == TierDivision::lowest()
    }

    pub fn is_highest(&self) -> bool {
        *self == TierDivision::highest()
    }
}

impl std::fmt::Display for TierDivision {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.division {
            Some(division) => write!(f, "{} {}", self.tier, division),
            None => write!(f, "{}", self.tier)
        }
    }
}

pub fn band(tier: Tier) -> &'static TierBand {
    &TIER_TABLE[tier.index()]
}

/// Maps a rating onto its tier and division. Ratings above the last
/// bound stay in the open-ended top tier.
pub fn tier_for(mmr: i32) -> EngineResult<TierDivision> {
    if mmr < 0 {
        return Err(EngineError::InvalidInput(format!("rating {} is negative", mmr)));
    }

    let band = TIER_TABLE
        .iter()
        .rev()
        .find(|b| mmr >= b.min_mmr)
        .ok_or_else(|| EngineError::InvalidInput(format!("rating {} has no tier", mmr)))?;

    if !band.tier.has_divisions() {
        return Ok(TierDivision {
            tier: band.tier,
            division: None
        });
    }

    let width = division_width(band);
    let slot = ((mmr - band.min_mmr) / width).min(DIVISIONS_PER_TIER - 1);

    Ok(TierDivision {
        tier: band.tier,
        division: Division::from_slot_from_bottom(slot)
    })
}

fn division_width(band: &TierBand) -> i32 {
    // Divisioned tiers are always bounded above.
    let max = band.max_mmr.unwrap_or(band.min_mmr + DIVISIONS_PER_TIER);
    ((max - band.min_mmr) / DIVISIONS_PER_TIER).max(1)
}

/// Half-open `[min, max)` rating interval covered by a rank.
/// The open-ended top tier reports `None` as its upper bound.
pub fn rank_bounds(rank: TierDivision) -> (i32, Option<i32>) {
    let band = band(rank.tier);

    match rank.division {
        None => (band.min_mmr, band.max_mmr),
        Some(division) => {
            let width = division_width(band);
            let slot = division.slot_from_bottom();
            let lo = band.min_mmr + slot * width;
            let hi = if slot == DIVISIONS_PER_TIER - 1 {
                band.max_mmr.unwrap_or(lo + width)
            } else {
                lo + width
            };

            (lo, Some(hi))
        }
    }
}

/// [`rank_bounds`] for a raw tier/division pair, validating the pair first.
pub fn division_bounds(tier: Tier, division: Option<Division>) -> EngineResult<(i32, Option<i32>)> {
    Ok(rank_bounds(TierDivision::new(tier, division)?))
}

/// Display label of the rank a rating maps to, e.g. "Gold II".
pub fn rank_label(mmr: i32) -> EngineResult<String> {
    Ok(tier_for(mmr)?.to_string())
}

/// Position within the given rank: 0..=100 for divisioned tiers, a capped
/// point count 0..=999 above them. Derived from the rating on every call.
pub fn league_points(mmr: i32, tier: Tier, division: Option<Division>) -> EngineResult<i32> {
    let rank = TierDivision::new(tier, division)?;
    let (lo, hi) = rank_bounds(rank);

    let lp = match (rank.division, hi) {
        (Some(_), Some(hi)) => {
            let span = (hi - lo) as i64;
            let raw = (mmr as i64 - lo as i64) * MAX_DIVISION_LP as i64 / span;
            raw.clamp(0, MAX_DIVISION_LP as i64) as i32
        }
        _ => (mmr - lo).clamp(0, MAX_DIVISIONLESS_LP)
    };

    Ok(lp)
}

/// Total order over ranks. `Greater` means `a` ranks above `b`.
pub fn compare_rank(a: TierDivision, b: TierDivision) -> Ordering {
    a.tier.cmp(&b.tier).then_with(|| match (a.division, b.division) {
        // Lower division number ranks higher
        (Some(da), Some(db)) => db.number().cmp(&da.number()),
        (None, Some(_)) => Ordering::Less,
        (Some(_), None) => Ordering::Greater,
        (None, None) => Ordering::Equal
    })
}

fn tier_after(tier: Tier) -> Option<Tier> {
    Tier::try_from(tier.index() as i32 + 1).ok()
}

fn tier_before(tier: Tier) -> Option<Tier> {
    Tier::try_from(tier.index() as i32 - 1).ok()
}

/// One step up the ladder, crossing into the next tier's lowest division at
/// a tier boundary. `None` at the very top.
pub fn next_tier_division(rank: TierDivision) -> Option<TierDivision> {
    if let Some(higher) = rank.division.and_then(Division::higher) {
        return Some(TierDivision {
            tier: rank.tier,
            division: Some(higher)
        });
    }

    let next = tier_after(rank.tier)?;
    Some(TierDivision {
        tier: next,
        division: next.has_divisions().then_some(Division::LOWEST)
    })
}

/// One step down the ladder, crossing into the previous tier's highest
/// division at a tier boundary. `None` at the very bottom.
pub fn previous_tier_division(rank: TierDivision) -> Option<TierDivision> {
    if let Some(lower) = rank.division.and_then(Division::lower) {
        return Some(TierDivision {
            tier: rank.tier,
            division: Some(lower)
        });
    }

    let previous = tier_before(rank.tier)?;
    Some(TierDivision {
        tier: previous,
        division: previous.has_divisions().then_some(Division::HIGHEST)
    })
}
