//! CLI subcommands.

pub mod common;
pub mod config;
pub mod track;
pub mod transform;
