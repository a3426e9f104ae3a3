//! State management module
//!
//! Handles stream state in both its sequential and concurrent shapes,
//! and persists it between sync runs to enable incremental syncs.
//!
//! # Overview
//!
//! The state module provides:
//! - `CursorDomain` - How cursor values parse, print and step
//! - `StateConverter` - Sequential <-> concurrent state conversion
//! - `StateManager` - File-based state persistence

mod converter;
mod domain;
mod manager;
mod types;

pub use converter::StateConverter;
pub use domain::{CursorDomain, DatetimeDomain, EpochValueDomain, IntegerDomain, IsoMillisDomain};
pub(crate) use domain::{parse_datetime, parse_duration, saturating_add, saturating_sub};
pub use manager::StateManager;
pub use types::{
    ConcurrentState, Interval, State, StateType, END_KEY, LEGACY_KEY, SLICES_KEY, START_KEY,
    STATE_TYPE_KEY,
};

#[cfg(test)]
mod manager_tests;
