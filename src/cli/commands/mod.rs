//! Subcommand implementations.

pub mod heatmap;
