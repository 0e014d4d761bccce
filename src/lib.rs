//! TherapyBridge - client, optimistic cache and CLI for the therapy session manager

pub mod api;
pub mod cache;
pub mod cli;
pub mod config;
pub mod core;
pub mod domain;
