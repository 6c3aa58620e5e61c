//! MedEase - pharmacy inventory and prescription gateway.
//!
//! Compiles filter maps into parameterized BigQuery SQL, normalizes warehouse
//! rows to JSON, and wires an LLM agent to data-access and SMS tools. This
//! library exposes the core modules for the binary and integration tests.

pub mod agent;
pub mod api;
pub mod config;
pub mod error;
pub mod llm;
pub mod query;
pub mod safety;
pub mod schema;
pub mod sms;
pub mod warehouse;
