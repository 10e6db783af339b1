//! Scenario-based tests for flowdef

mod helpers;

mod deferred_resolution;
mod dependency_extraction;
mod equality;
mod file_loading;
mod integrations;
mod loop_policy;
mod params;
mod required_attributes;
mod retry_policy;
mod throw_and_error;
mod triggers;
