//! CLI command handlers

pub mod call;
pub mod config;
pub mod filter;
pub mod interrogate;
pub mod serve;
pub mod tools;
