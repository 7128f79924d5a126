//! Projects Stakcast prediction hub events from Starknet into PostgreSQL.

pub mod chain;
pub mod checkpoint;
pub mod classifier;
pub mod config;
pub mod details;
pub mod events;
pub mod felt;
pub mod projection;
pub mod store;
pub mod sync;

#[cfg(test)]
mod testing;
