pub mod composer;
pub mod config;
pub mod earliest;
pub mod error;
pub mod expander;
pub mod fallback;
pub mod outputs;
pub mod pipelines;
pub mod types;
