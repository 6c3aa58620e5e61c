//! Integration tests for MedEase.

pub mod agent_test;
pub mod api_test;
pub mod compiler_test;
pub mod warehouse_test;
