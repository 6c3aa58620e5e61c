//! API route handlers

pub mod agent;
pub mod health;
pub mod medicines;
pub mod tables;
