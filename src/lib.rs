// Core infrastructure modules
pub mod core;

// Feature-specific modules
pub mod cli;
pub mod config;
pub mod export;
pub mod output;
pub mod process;
