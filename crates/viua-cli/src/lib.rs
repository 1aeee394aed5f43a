//! Shared helpers for the Viua command-line tools

pub mod output;
