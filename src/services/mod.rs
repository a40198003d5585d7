//! Orchestration core: test selection, job lifecycle, admission, aggregation
//! and registration.

pub mod aggregate;
pub mod defaults;
pub mod orchestrator;
pub mod registration;
pub mod runner;
pub mod selector;
