// Library for the binary, demos and tests

pub mod alerts;
pub mod collectors;
pub mod config;
pub mod engine;
pub mod error;
pub mod history_repo;
pub mod models;
pub mod recorder;
