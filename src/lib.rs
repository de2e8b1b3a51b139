pub mod attribution;
pub mod chain_ring;
pub mod config;
pub mod constants;
pub mod coordinator;
pub mod death_resolver;
pub mod registry;
pub mod respawn;
pub mod rng;
pub mod session;
pub mod types;
pub mod win_condition;
