pub mod analysis;
pub mod bee;
pub mod config;
pub mod hive;
pub mod honeycomb;
pub mod report;
pub mod sampler;
pub mod simulation;
pub mod types;
pub mod waterfall;
