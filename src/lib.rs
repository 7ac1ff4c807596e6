//! Scenario-driven HTTP load generation.
//!
//! A [`ScenarioConfig`](models::dsl_model::ScenarioConfig) describes how many
//! virtual users run, for how long, which requests each iteration issues and
//! which thresholds decide whether the run passed. [`executor::run_load_test`]
//! drives it; [`report`] renders the outcome; [`ws`] exposes the same engine
//! as a remote worker.

pub mod client;
pub mod config;
pub mod error;
pub mod executor;
pub mod models;
pub mod report;
pub mod thresholds;
pub mod utils;
pub mod ws;

pub use error::{LoadError, RequestError, Result};
pub use executor::{run_load_test, RunSummary};
pub use models::dsl_model::ScenarioConfig;
