use serde_repr::{Deserialize_repr, Serialize_repr};
use std::convert::TryFrom;
use strum_macros::{Display, EnumIter};

/// Lifecycle state of a season.
#[derive(Deserialize_repr, Serialize_repr, Debug, Clone, Copy, PartialEq, Eq, Hash, EnumIter, Display, Default)]
#[repr(u8)]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum SeasonState {
    #[default]
    Draft = 0,
    Scheduled = 1,
    Active = 2,
    Paused = 3,
    Ending = 4,
    Ended = 5,
    Archived = 6
}

impl SeasonState {
    /// The directed edges leaving this state. No other transition is legal.
    pub fn allowed_transitions(self) -> &'static [SeasonState] {
        match self {
            SeasonState::Draft => &[SeasonState::Scheduled],
            SeasonState::Scheduled => &[SeasonState::Active, SeasonState::Draft],
            SeasonState::Active => &[SeasonState::Paused, SeasonState::Ending],
            SeasonState::Paused => &[SeasonState::Active, SeasonState::Ending],
            SeasonState::Ending => &[SeasonState::Ended],
            SeasonState::Ended => &[SeasonState::Archived],
            SeasonState::Archived => &[]
        }
    }

    pub fn can_transition_to(self, target: SeasonState) -> bool {
        self.allowed_transitions().contains(&target)
    }

    pub fn allows_match_recording(self) -> bool {
        self == SeasonState::Active
    }

    pub fn allows_reward_distribution(self) -> bool {
        self == SeasonState::Ended
    }

    pub fn is_terminal(self) -> bool {
        self == SeasonState::Archived
    }
}

impl TryFrom<i32> for SeasonState {
    type Error = ();

    fn try_from(v: i32) -> Result<Self, Self::Error> {
        match v {
            0 => Ok(SeasonState::Draft),
            1 => Ok(SeasonState::Scheduled),
            2 => Ok(SeasonState::Active),
            3 => Ok(SeasonState::Paused),
            4 => Ok(SeasonState::Ending),
            5 => Ok(SeasonState::Ended),
            6 => Ok(SeasonState::Archived),
            _ => Err(())
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::model::structures::season_state::SeasonState;
    use strum::IntoEnumIterator;

    #[test]
    fn test_display_uses_screaming_case() {
        assert_eq!(SeasonState::Active.to_string(), "ACTIVE");
        assert_eq!(SeasonState::Draft.to_string(), "DRAFT");
    }

    #[test]
    fn test_archived_has_no_exits() {
        assert!(SeasonState::Archived.allowed_transitions().is_empty());
        assert!(SeasonState::Archived.is_terminal());
    }

    #[test]
    fn test_no_self_loops() {
        for state in SeasonState::iter() {
            assert!(!state.can_transition_to(state), "{} should not loop", state);
        }
    }

    #[test]
    fn test_only_active_records_matches() {
        let recording = SeasonState::iter()
            .filter(|s| s.allows_match_recording())
            .collect::<Vec<_>>();

        assert_eq!(recording, vec![SeasonState::Active]);
    }

    #[test]
    fn test_convert_invalid() {
        assert_eq!(SeasonState::try_from(7), Err(()));
    }
}
