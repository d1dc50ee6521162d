// system-tests/src/lib.rs
// ============================================================================
// Module: TOPGUN System Tests Library
// Description: Shared scenario setup for the system-test binaries.
// Purpose: Give every suite the same lane allocation and asset lookup.
// Dependencies: topgun-harness
// ============================================================================

//! ## Overview
//! This crate hosts the helpers used by the scenario suites in
//! `system-tests/tests`. Suites only run with `--features system-tests` and
//! need a reachable deploy director.

// ============================================================================
// SECTION: Modules
// ============================================================================

pub mod support;
