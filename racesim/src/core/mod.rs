pub mod car;
pub mod handle_race;
pub mod race;
pub mod race_control;
pub mod rng;
pub mod state_handler;
pub mod strategy;
pub mod tireset;
pub mod track;
