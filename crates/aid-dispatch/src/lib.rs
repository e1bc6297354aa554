//! Bulk aid distribution: beneficiary targeting, send planning, dispatch and
//! delivery tracking for donor institutions.

pub mod config;
pub mod error;
pub mod telemetry;
pub mod workflows;
