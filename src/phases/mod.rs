//! Implementation of the phases of a migration run.
//!
//! ## Overview
//!
//! A run goes through up to three phases:
//! 1. Pull - Read users and groups from every source instance
//! 2. Check - Detect conflicts between sources and report them
//! 3. Push - Write agreements, groups, users, memberships and signatures
//!
//! Each phase can be skipped; the dataset and conflicts files carry the state
//! from one run to the next. [`orchestrator::run`] validates the requested
//! combination and chains the phases.

pub mod check;
pub mod orchestrator;
pub mod pull;
pub mod push;

pub use orchestrator::{run, Connectors, HttpConnectors, RunOptions};
