// Batch matching engine: result model, ranking, aggregation, export and the
// orchestration loop that drives the scoring service.
// All scoring service calls go through scoring_client; nothing here does I/O directly.

pub mod aggregator;
pub mod exporter;
pub mod models;
pub mod orchestrator;
pub mod ranker;
