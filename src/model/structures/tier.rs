use serde_repr::{Deserialize_repr, Serialize_repr};
use std::convert::TryFrom;
use strum_macros::{Display, EnumIter};

/// Coarse rank label. Declaration order is rank order, lowest first.
#[derive(
    Deserialize_repr, Serialize_repr, Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, EnumIter, Display,
)]
#[repr(u8)]
pub enum Tier {
    Bronze = 0,
    Silver = 1,
    Gold = 2,
    Platinum = 3,
    Diamond = 4,
    Master = 5,
    Grandmaster = 6,
    Challenger = 7
}

impl Tier {
    /// The top three tiers are ranked purely by league points.
    pub fn has_divisions(self) -> bool {
        self < Tier::Master
    }

    pub fn index(self) -> usize {
        self as usize
    }
}

impl TryFrom<i32> for Tier {
    type Error = ();

    fn try_from(v: i32) -> Result<Self, Self::Error> {
        match v {
            0 => Ok(Tier::Bronze),
            1 => Ok(Tier::Silver),
            2 => Ok(Tier::Gold),
            3 => Ok(Tier::Platinum),
            4 => Ok(Tier::Diamond),
            5 => Ok(Tier::Master),
            6 => Ok(Tier::Grandmaster),
            7 => Ok(Tier::Challenger),
            _ => Err(())
        }
    }
}

/// Fine rank label within a divisioned tier. `IV` is the lowest, `I` the highest.
#[derive(Deserialize_repr, Serialize_repr, Debug, Clone, Copy, PartialEq, Eq, Hash, EnumIter)]
#[repr(u8)]
pub enum Division {
    I = 1,
    II = 2,
    III = 3,
    IV = 4
}

impl Division {
    pub const LOWEST: Division = Division::IV;
    pub const HIGHEST: Division = Division::I;

    pub fn number(self) -> u8 {
        self as u8
    }

    /// One step up in skill (`IV` -> `III`), `None` from `I`.
    pub fn higher(self) -> Option<Division> {
        match self {
            Division::IV => Some(Division::III),
            Division::III => Some(Division::II),
            Division::II => Some(Division::I),
            Division::I => None
        }
    }

    /// One step down in skill (`I` -> `II`), `None` from `IV`.
    pub fn lower(self) -> Option<Division> {
        match self {
            Division::I => Some(Division::II),
            Division::II => Some(Division::III),
            Division::III => Some(Division::IV),
            Division::IV => None
        }
    }

    /// Zero-based slot counted from the bottom of the tier (`IV` = 0).
    pub fn slot_from_bottom(self) -> i32 {
        4 - self as i32
    }

    pub fn from_slot_from_bottom(slot: i32) -> Option<Division> {
        Division::try_from(4 - slot).ok()
    }
}

impl std::fmt::Display for Division {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let label = match self {
            Division::I => "I",
            Division::II => "II",
            Division::III => "III",
            Division::IV => "IV"
        };

        write!(f, "{}", label)
    }
}

impl TryFrom<i32> for Division {
    type Error = ();

    fn try_from(v: i32) -> Result<Self, Self::Error> {
        match v {
            1 => Ok(Division::I),
            2 => Ok(Division::II),
            3 => Ok(Division::III),
            4 => Ok(Division::IV),
            _ => Err(())
        }
    }
}
