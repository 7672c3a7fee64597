// Rating model constants
pub const BASE_MMR: i32 = 1200;
pub const MAX_MMR: i32 = 5000;
pub const EXPECTED_SCORE_SCALE: f64 = 400.0;
// K-factor policy
pub const K_NEW_PLAYER: f64 = 40.0;
pub const K_BASE: f64 = 32.0;
pub const K_HIGH_RATING: f64 = 16.0;
pub const NEW_PLAYER_GAMES: u32 = 30;
pub const HIGH_RATING_THRESHOLD: i32 = 2400;
// Streaks
pub const STREAK_THRESHOLD: u32 = 3;
pub const STREAK_BONUS_UNIT: i32 = 2;
pub const STREAK_BONUS_CAP: i32 = 10;
// Placements
pub const PLACEMENT_BONUS_SCALE: f64 = 400.0;
// League points
pub const PROMOTION_THRESHOLD_LP: i32 = 100;
pub const MAX_DIVISION_LP: i32 = 100;
pub const MAX_DIVISIONLESS_LP: i32 = 999;
pub const DIVISIONS_PER_TIER: i32 = 4;
// Tier boundaries (lower bound of each tier)
pub const SILVER_MIN_MMR: i32 = 1000;
pub const GOLD_MIN_MMR: i32 = 1400;
pub const PLATINUM_MIN_MMR: i32 = 1800;
pub const DIAMOND_MIN_MMR: i32 = 2200;
pub const MASTER_MIN_MMR: i32 = 2600;
pub const GRANDMASTER_MIN_MMR: i32 = 2900;
pub const CHALLENGER_MIN_MMR: i32 = 3200;
// Decay
pub const DECAY_PERIOD_DAYS: i64 = 7;
pub const DECAY_WARNING_DAYS: i64 = 3;
// Season defaults
pub const DEFAULT_SOFT_RESET_FACTOR: f64 = 0.5;
pub const DEFAULT_PLACEMENT_MATCHES: u32 = 10;
pub const DEFAULT_DECAY_DAYS: i64 = 28;
pub const DEFAULT_DECAY_AMOUNT: i32 = 25;
pub const DEFAULT_PROMO_WINS_REQUIRED: u32 = 2;
pub const DEFAULT_PROMO_GAMES_MAX: u32 = 3;
pub const DEFAULT_DEMOTION_SHIELD_GAMES: u32 = 3;
