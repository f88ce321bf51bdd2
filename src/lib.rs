pub mod alignment;
pub mod token;
pub mod merge_sequence;
pub mod cluster;
pub mod cache;
pub mod config;
pub mod identifiers;
pub mod analyzer;
