pub mod agents;
pub mod chunker;
pub mod context;
pub mod embedding;
pub mod extraction;
pub mod indicators;
pub mod orchestrator;
pub mod report;
pub mod rules;
pub mod taxonomy;
pub mod vectorstore;
