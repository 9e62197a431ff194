pub mod applier;
pub mod context;
pub mod ingestor;
pub mod snapshot;
pub mod supervisor;
