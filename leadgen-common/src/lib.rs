//! # Leadgen Common Library
//!
//! Shared code for the lead-generation services including:
//! - Lead tier domain (tiers, engagement classification, transition rule)
//! - Segment partitions
//! - Database initialization
//! - Event types and the event bus
//! - Configuration loading

pub mod config;
pub mod db;
pub mod error;
pub mod events;
pub mod partition;
pub mod tier;
pub mod time;

pub use error::{Error, Result};
pub use partition::Partition;
pub use tier::{EngagementType, Tier};
