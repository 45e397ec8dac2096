//! Scaling bench runner: HTTP API and configuration

pub mod api;
pub mod config;
