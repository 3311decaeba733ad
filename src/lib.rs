//! api-tester - a local-first REST API testing tool with history, collections
//! and environments

pub mod client;
pub mod collections;
pub mod commands;
pub mod config;
pub mod curl;
pub mod db;
pub mod format;
pub mod fsutil;
pub mod manifest;
pub mod models;
pub mod session;
pub mod transfer;
pub mod validation;
pub mod workflow;
