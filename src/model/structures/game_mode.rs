use serde_repr::{Deserialize_repr, Serialize_repr};
use std::convert::TryFrom;
use strum_macros::EnumIter;

#[derive(Deserialize_repr, Serialize_repr, Debug, Clone, Copy, PartialEq, Eq, Hash, EnumIter, Default)]
#[repr(u8)]
pub enum GameMode {
    #[default]
    Solo = 0,
    Duo = 1,
    Squad = 2
}

impl TryFrom<i32> for GameMode {
    type Error = ();

    fn try_from(v: i32) -> Result<Self, Self::Error> {
        match v {
            0 => Ok(GameMode::Solo),
            1 => Ok(GameMode::Duo),
            2 => Ok(GameMode::Squad),
            _ => Err(())
        }
    }
}
