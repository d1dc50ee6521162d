// crates/topgun-harness/src/config/mod.rs
// ============================================================================
// Module: Harness Configuration
// Description: Centralized configuration for deployment scenarios.
// Purpose: Provide typed access to environment settings and defaults.
// Dependencies: std
// ============================================================================

//! ## Overview
//! Harness configuration is read from environment variables and mapped into
//! a small typed structure shared by the deployment controller, the wrapped
//! CLI, and scenario setup.

// ============================================================================
// SECTION: Modules
// ============================================================================

mod env;

// ============================================================================
// SECTION: Tests
// ============================================================================


// ============================================================================
// SECTION: Re-exports
// ============================================================================

pub use env::CloudCredentials;
pub use env::HarnessConfig;
pub use env::HarnessEnv;
pub use env::ReleaseVersions;
