// crates/topgun-harness/src/registry/mod.rs
// ============================================================================
// Module: Instance Registry
// Description: Snapshot of the deployed instance and job topology.
// Purpose: Resolve groups and jobs to instance addresses between refreshes.
// Dependencies: std
// ============================================================================

//! ## Overview
//! [`InstanceRegistry`] is rebuilt from a listing on an explicit
//! [`InstanceRegistry::refresh`] and never otherwise. Lookups are snapshot
//! reads: stopping an instance externally does not change what the registry
//! returns until the next refresh.
//!
//! Invariants:
//! - Sequences keep discovery order.
//! - A job never observed and a job with zero instances are the same thing:
//!   both resolve to `None` / an empty slice.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::HashMap;
use std::fmt;
use std::net::IpAddr;

mod grammar;
#[cfg(test)]
mod registry_tests;

pub use grammar::InstanceRow;
pub use grammar::ListingRow;
pub use grammar::ProcessRow;
pub use grammar::parse_listing;
pub use grammar::parse_row;

// ============================================================================
// SECTION: Instance
// ============================================================================

/// A running unit of the deployed system.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Instance {
    name: String,
    address: IpAddr,
}

impl Instance {
    /// Creates an instance from its `group/id` name and address.
    #[must_use]
    pub fn new(name: impl Into<String>, address: IpAddr) -> Self {
        Self {
            name: name.into(),
            address,
        }
    }

    /// Returns the `group/id` name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the instance group (the part before `/`).
    #[must_use]
    pub fn group(&self) -> &str {
        self.name.split_once('/').map_or(self.name.as_str(), |(group, _)| group)
    }

    /// Returns the instance address.
    #[must_use]
    pub const fn address(&self) -> IpAddr {
        self.address
    }
}

impl fmt::Display for Instance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.name, self.address)
    }
}

// ============================================================================
// SECTION: Registry
// ============================================================================

/// Group and job lookup tables built from one listing.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InstanceRegistry {
    groups: HashMap<String, Vec<Instance>>,
    jobs: HashMap<String, Vec<Instance>>,
}

impl InstanceRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds a registry from a listing.
    #[must_use]
    pub fn from_listing(listing: &str) -> Self {
        let mut registry = Self::new();
        registry.refresh(listing);
        registry
    }

    /// Replaces the snapshot with the contents of `listing`.
    ///
    /// Unrecognized lines are skipped. Process rows seen before any instance
    /// row have no owner and are skipped too.
    pub fn refresh(&mut self, listing: &str) {
        let mut groups: HashMap<String, Vec<Instance>> = HashMap::new();
        let mut jobs: HashMap<String, Vec<Instance>> = HashMap::new();
        let mut current: Option<Instance> = None;

        for row in parse_listing(listing) {
            match row {
                ListingRow::Instance(row) => {
                    let instance = Instance::new(format!("{}/{}", row.group, row.id), row.address);
                    groups.entry(row.group).or_default().push(instance.clone());
                    current = Some(instance);
                }
                ListingRow::Process(row) => {
                    if let Some(instance) = &current {
                        jobs.entry(row.job).or_default().push(instance.clone());
                    }
                }
            }
        }

        self.groups = groups;
        self.jobs = jobs;
    }

    /// Returns the first instance of a group.
    #[must_use]
    pub fn instance(&self, group: &str) -> Option<&Instance> {
        self.instances(group).first()
    }

    /// Returns every instance of a group in discovery order.
    #[must_use]
    pub fn instances(&self, group: &str) -> &[Instance] {
        self.groups.get(group).map_or(&[], Vec::as_slice)
    }

    /// Returns the first instance running a job.
    #[must_use]
    pub fn job_instance(&self, job: &str) -> Option<&Instance> {
        self.job_instances(job).first()
    }

    /// Returns every instance running a job in discovery order.
    #[must_use]
    pub fn job_instances(&self, job: &str) -> &[Instance] {
        self.jobs.get(job).map_or(&[], Vec::as_slice)
    }

    /// Returns the known group names, sorted.
    #[must_use]
    pub fn group_names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.groups.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    /// Returns the known job names, sorted.
    #[must_use]
    pub fn job_names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.jobs.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    /// Returns true when no instance has been discovered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.groups.is_empty()
    }
}
