pub mod game_mode;
pub mod promotion_state;
pub mod season_state;
pub mod season_type;
pub mod tier;
