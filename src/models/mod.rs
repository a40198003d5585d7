//! Domain records for the three persisted collections and the normalized issue shape.

pub mod analysis;
pub mod issue;
pub mod repository;
pub mod security_test;
