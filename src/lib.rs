pub mod artifacts;
pub mod batch;
pub mod cli;
pub mod config;
pub mod corpus;
pub mod engine;
pub mod error_sink;
pub mod extractor;
pub mod pipeline;
pub mod recognition;
pub mod renderer;
pub mod report;
pub mod structure;
pub mod text;
pub mod util;
