// crates/topgun-harness/src/lane.rs
// ============================================================================
// Module: Lanes
// Description: Namespaced deployment identities for parallel scenarios.
// Purpose: Keep concurrent scenarios from colliding on names or ports.
// Dependencies: std
// ============================================================================

//! ## Overview
//! A lane is an isolated execution slot. Isolation comes from naming: every
//! lane derives its own deployment name and CLI target, so the deploy tool
//! and container runtime never see colliding identities. Nothing is locked.

use std::fmt;
use std::sync::atomic::AtomicU32;
use std::sync::atomic::Ordering;

/// Prefix shared by every lane deployment.
pub const DEPLOYMENT_PREFIX: &str = "concourse-topgun";

/// One concurrent execution slot.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Lane {
    index: u32,
    deployment_name: String,
}

impl Lane {
    /// Creates the lane with the given index.
    #[must_use]
    pub fn new(index: u32) -> Self {
        Self {
            index,
            deployment_name: format!("{DEPLOYMENT_PREFIX}-{index}"),
        }
    }

    /// Returns the lane index.
    #[must_use]
    pub const fn index(&self) -> u32 {
        self.index
    }

    /// Returns the deployment name owned by this lane.
    #[must_use]
    pub fn deployment_name(&self) -> &str {
        &self.deployment_name
    }

    /// Returns the CLI target name; identical to the deployment name.
    #[must_use]
    pub fn fly_target(&self) -> &str {
        &self.deployment_name
    }
}

impl fmt::Display for Lane {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.deployment_name)
    }
}

/// Hands out distinct lanes to scenarios running in one process.
#[derive(Debug)]
pub struct LaneAllocator {
    base: u32,
    next: AtomicU32,
}

impl LaneAllocator {
    /// Creates an allocator whose first lane is `base`.
    #[must_use]
    pub const fn new(base: u32) -> Self {
        Self {
            base,
            next: AtomicU32::new(0),
        }
    }

    /// Returns a lane no other caller of this allocator has received.
    pub fn acquire(&self) -> Lane {
        let offset = self.next.fetch_add(1, Ordering::Relaxed);
        Lane::new(self.base.saturating_add(offset))
    }
}
