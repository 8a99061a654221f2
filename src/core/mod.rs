//! Core focus-gating functionality
//!
//! - [`process`]: process table snapshots and executable path resolution
//! - [`focus`]: foreground window observation per platform
//! - [`exemption`]: processes that are never blocked
//! - [`rules`]: filter rule model, rule naming and the minimal allowances
//! - [`filter`]: the packet filter seam and its netsh / in-memory backends
//! - [`reconciler`]: the block-rule ledger and reconciliation passes
//! - [`control`]: the focus-tracking loop with startup and shutdown
//! - [`error`]: error types and filter error translation

pub mod control;
pub mod error;
pub mod exemption;
pub mod filter;
pub mod focus;
pub mod process;
pub mod reconciler;
pub mod rules;

#[cfg(test)]
pub mod test_helpers;
