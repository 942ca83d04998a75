//! Approval and award resolution engine for procurement requisitions.

pub mod config;
pub mod error;
pub mod telemetry;
pub mod workflows;
