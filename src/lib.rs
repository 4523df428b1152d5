//! SmartMarks — a single-screen bookmark manager with live sync.
//!
//! This library crate exposes all modules for use by the binaries and integration tests.

pub mod app;
pub mod backend;
pub mod database;
pub mod logging;
pub mod managers;
pub mod platform;
pub mod rpc_handler;
pub mod services;
pub mod types;
