pub mod backend;
pub mod config;
pub mod discovery;
pub mod error;
pub mod normalize;
pub mod orchestrator;
pub mod signal;
pub mod snapshot;
pub mod state;
pub mod types;
