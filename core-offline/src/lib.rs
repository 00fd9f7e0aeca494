//! # Offline Cache Engine
//!
//! Serves previously fetched resources when the network is unavailable and
//! keeps a versioned on-device cache fresh across deploys.
//!
//! ## Overview
//!
//! This crate provides:
//! - Request classification (excluded, bypassed, navigation, static, external)
//! - Versioned partitions with a current/stale split
//! - All-or-nothing install of mandatory assets, best-effort optional assets
//! - Cache-first interception with navigation recovery
//! - Reclamation of stale partitions on activation
//! - The `SKIP_WAITING` control message
//! - [`OfflineWorker`] (one version) and [`Registration`] (waiting/active hand-off)

pub mod classify;
pub mod control;
pub mod error;
pub mod installer;
pub mod interceptor;
pub mod partitions;
pub mod reclaimer;
pub mod registration;
pub mod stats;
pub mod worker;

pub use classify::{Classifier, RequestClass};
pub use control::{ControlMessage, MessageOutcome};
pub use error::{OfflineError, Result};
pub use installer::{InstallReport, Installer};
pub use interceptor::{Intercepted, Interceptor};
pub use partitions::{PartitionKind, PartitionSet};
pub use reclaimer::{ReclaimFailure, ReclaimReport, Reclaimer};
pub use registration::{ClientId, Registered, Registration, RegistrationOptions};
pub use stats::{InterceptStats, StatsSnapshot};
pub use worker::{ActivateOutcome, InstallOutcome, InstanceId, LifecycleState, OfflineWorker};
