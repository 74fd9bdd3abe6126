//! Invoice-driven energy, water and carbon aggregation with live/cache
//! fallback retrieval

pub mod cli;
pub mod config;
pub mod services;
pub mod sources;
pub mod types;
