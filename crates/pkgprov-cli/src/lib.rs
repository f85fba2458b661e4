//! pkgprov CLI library components.
//!
//! This library exposes the command handlers and configuration loading so
//! they can be tested without spawning the binary.

pub mod commands;
pub mod config;
