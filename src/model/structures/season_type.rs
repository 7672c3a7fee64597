use serde_repr::{Deserialize_repr, Serialize_repr};
use std::convert::TryFrom;
use strum_macros::{Display, EnumIter};

#[derive(Deserialize_repr, Serialize_repr, Debug, Clone, Copy, PartialEq, Eq, Hash, EnumIter, Display, Default)]
#[repr(u8)]
pub enum SeasonType {
    #[default]
    Ranked = 0,
    Casual = 1,
    Tournament = 2,
    Event = 3,
    Special = 4
}

impl TryFrom<i32> for SeasonType {
    type Error = ();

    fn try_from(v: i32) -> Result<Self, Self::Error> {
        match v {
            0 => Ok(SeasonType::Ranked),
            1 => Ok(SeasonType::Casual),
            2 => Ok(SeasonType::Tournament),
            3 => Ok(SeasonType::Event),
            4 => Ok(SeasonType::Special),
            _ => Err(())
        }
    }
}
