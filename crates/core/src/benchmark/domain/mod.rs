pub mod benchmark_engine;
pub mod benchmark_metrics;
pub mod resource_probe;
pub mod statistics;
