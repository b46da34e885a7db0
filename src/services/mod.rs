pub mod artifacts;
pub mod job_store;
pub mod orchestrator;
pub mod reconciler;
pub mod relay;
pub mod result_parser;
pub mod retriever;
