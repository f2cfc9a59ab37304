pub mod autopilot;
pub mod config;
pub mod constants;
pub mod desktop;
pub mod engine;
pub mod error;
pub mod game_loop;
pub mod logging;
pub mod rng;
pub mod score_store;
pub mod types;
