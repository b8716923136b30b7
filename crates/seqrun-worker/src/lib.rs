// Workflow worker for the seqrun platform
//
// The per-job pipeline: workspace preparation, input staging from the
// record store, engine execution as a subprocess, results ingestion back
// into the record store, and cleanup on every exit path.

mod engine;
mod handler;
mod ingest;
mod paths;
mod runner;
mod staging;

pub use engine::{engine_command, EngineConfig, EngineEvents};
pub use handler::WorkflowHandler;
pub use ingest::store_results;
pub use paths::WorkflowPaths;
pub use runner::{CommandSpec, ProcessRunner};
pub use staging::{prepare_params_file, sanitize_file_name};
