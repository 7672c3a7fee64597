pub mod constants;
pub mod decay;
pub mod leaderboard;
pub mod lifecycle;
pub mod orchestrator;
pub mod promotion;
pub mod rating_calculator;
pub mod structures;
pub mod tier_mapper;
