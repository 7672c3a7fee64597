use serde::{Deserialize, Serialize};

/// Promotion-series progress for a single player.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum PromotionState {
    #[default]
    Normal,
    InPromos {
        wins: u32,
        losses: u32
    }
}

impl PromotionState {
    pub fn from_flags(is_in_promos: bool, wins: u32, losses: u32) -> Self {
        if is_in_promos {
            PromotionState::InPromos { wins, losses }
        } else {
            PromotionState::Normal
        }
    }

    pub fn is_in_promos(&self) -> bool {
        matches!(self, PromotionState::InPromos { .. })
    }
}
