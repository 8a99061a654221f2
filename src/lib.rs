//! focuswall - network access for the focused window only
//!
//! Watches which application owns input focus and keeps the system packet
//! filter configured so that only that application, plus a small allow-list
//! of essential system services, can open outbound connections.
//!
//! # Architecture
//!
//! - [`core`] - Focus tracking, process enumeration, rule reconciliation and
//!   filter control
//! - [`audit`] - Audit logging for every privileged operation
//! - [`validators`] - Rule name sanitisation and program path validation
//! - [`config`] - Configuration persistence
//! - [`elevation`] - Privilege and filter tool availability checks
//! - [`shutdown`] - OS signal handling for guaranteed cleanup
//! - [`utils`] - Utility functions (per-user directories, etc.)
//!
//! # Safety Features
//!
//! - Every rule focuswall creates carries a `Block_` or `Min_` prefix, so a
//!   prefix sweep recovers from any crash
//! - Revokes always land before new blocks in a pass
//! - Exempt system processes and focuswall itself are never blocked
//! - Atomic file operations with secure permissions

// Allow pedantic clippy warnings that are not worth fixing for this codebase
#![allow(clippy::must_use_candidate)]
#![allow(clippy::return_self_not_must_use)]
#![allow(clippy::uninlined_format_args)]
#![allow(clippy::missing_errors_doc)]

pub mod audit;
pub mod config;
pub mod core;
pub mod elevation;
pub mod shutdown;
pub mod utils;
pub mod validators;

// Re-export commonly used types
pub use core::error::{Error, Result};
pub use core::filter::{FilterController, MemoryController, NetshController};
pub use core::reconciler::Reconciler;
