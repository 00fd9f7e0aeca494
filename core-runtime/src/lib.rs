//! # Core Runtime Module
//!
//! Provides foundational runtime infrastructure for the offline cache engine:
//! - Logging and tracing infrastructure
//! - Configuration management (cache manifest + bridge wiring)
//! - Event bus system for lifecycle and cache events
//!
//! ## Overview
//!
//! This crate contains the runtime utilities the engine and its façade depend
//! on. It establishes the logging conventions, the deploy-time manifest
//! format, and the event broadcasting mechanism hosts use to observe the
//! engine (for example, to show an "update available" prompt when a new
//! version is waiting).

pub mod config;
pub mod error;
pub mod events;
pub mod logging;

pub use error::{Error, Result};
