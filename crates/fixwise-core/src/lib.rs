//! Core library for the Fixwise expert Q&A marketplace.
//!
//! Hosts the transaction engine ([`qa`]) together with the service-level
//! plumbing shared by every binary: environment-driven configuration,
//! tracing setup, and the application error type.

pub mod config;
pub mod error;
pub mod qa;
pub mod telemetry;
