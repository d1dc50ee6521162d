// crates/topgun-harness/src/registry/registry_tests.rs
// ============================================================================
// Module: Instance Registry Unit Tests
// Description: Coverage for the listing grammar and snapshot lookups.
// Purpose: Pin row recognition and the job-to-instance mapping.
// Dependencies: std
// ============================================================================

#![allow(
    clippy::unwrap_used,
    clippy::panic,
    reason = "Test-only assertions favor direct unwrap for clarity."
)]

use std::net::IpAddr;

use super::InstanceRegistry;
use super::ListingRow;
use super::parse_row;

const LISTING: &str = "\
Using environment '10.0.0.6' as client 'admin'

Task 42. Done

Deployment 'concourse-topgun-1'

Instance                                    Process                State    AZ  IPs
db/6c5c1e0e-2f8e-4a3b-9b1e-7d2c8f2a9e11     -                      running  z1  10.244.15.2
~                                           postgres               running  -   -
web/1d2e3f40-aaaa-bbbb-cccc-0123456789ab    -                      running  z1  10.244.15.3
~                                           atc                    running  -   -
~                                           tsa                    running  -   -
worker/0a1b2c3d-0000-1111-2222-333344445555 -                      running  z1  10.244.15.4
~                                           worker                 running  -   -
worker/9f8e7d6c-0000-1111-2222-333344445555 -                      running  z1  10.244.15.5
~                                           worker                 running  -   -

4 instances

Succeeded
";

fn ip(raw: &str) -> IpAddr {
    raw.parse().unwrap()
}

#[test]
fn instance_row_takes_first_non_placeholder_state_and_last_address() {
    let row = parse_row("web/abc   -   running  z1  10.0.0.3").unwrap();
    let ListingRow::Instance(row) = row else {
        panic!("expected instance row");
    };
    assert_eq!(row.group, "web");
    assert_eq!(row.id, "abc");
    assert_eq!(row.state, "running");
    assert_eq!(row.address, ip("10.0.0.3"));
}

#[test]
fn process_row_requires_trailing_placeholders_only() {
    assert!(matches!(parse_row("~  atc  running  -  -"), Some(ListingRow::Process(_))));
    assert!(matches!(parse_row("~  atc  failing"), Some(ListingRow::Process(_))));
    assert!(parse_row("~  atc  running  z1  -").is_none());
    assert!(parse_row("~").is_none());
}

#[test]
fn unrecognized_lines_are_skipped() {
    assert!(parse_row("").is_none());
    assert!(parse_row("Succeeded").is_none());
    assert!(parse_row("Instance  Process  State  AZ  IPs").is_none());
    assert!(parse_row("web/abc  -  running  z1  not-an-ip").is_none());
    assert!(parse_row("web/  -  running  z1  10.0.0.3").is_none());
}

#[test]
fn refresh_builds_group_and_job_tables() {
    let registry = InstanceRegistry::from_listing(LISTING);
    assert_eq!(registry.group_names(), vec!["db", "web", "worker"]);
    assert_eq!(registry.job_names(), vec!["atc", "postgres", "tsa", "worker"]);
    assert_eq!(registry.instances("worker").len(), 2);
    assert_eq!(registry.job_instance("atc"), registry.job_instance("tsa"));
    assert_eq!(registry.job_instance("postgres").unwrap().address(), ip("10.244.15.2"));
    assert_eq!(registry.instance("web").unwrap().group(), "web");
}

#[test]
fn first_job_instance_matches_head_of_sequence() {
    let registry = InstanceRegistry::from_listing(LISTING);
    for job in registry.job_names() {
        assert_eq!(registry.job_instance(job), registry.job_instances(job).first());
    }
}

#[test]
fn job_sequences_keep_discovery_order() {
    let registry = InstanceRegistry::from_listing(LISTING);
    let addresses: Vec<IpAddr> =
        registry.job_instances("worker").iter().map(super::Instance::address).collect();
    assert_eq!(addresses, vec![ip("10.244.15.4"), ip("10.244.15.5")]);
}

#[test]
fn unknown_and_empty_jobs_are_indistinguishable() {
    let registry = InstanceRegistry::from_listing(LISTING);
    assert!(registry.job_instance("vault").is_none());
    assert!(registry.job_instances("vault").is_empty());
    assert!(registry.instances("credhub").is_empty());
}

#[test]
fn orphan_process_rows_are_ignored() {
    let registry = InstanceRegistry::from_listing("~  atc  running  -  -\n");
    assert!(registry.is_empty());
    assert!(registry.job_instances("atc").is_empty());
}

#[test]
fn refresh_replaces_the_previous_snapshot() {
    let mut registry = InstanceRegistry::from_listing(LISTING);
    registry.refresh("web/new  -  running  z1  10.9.9.9\n~  atc  running  -  -\n");
    assert!(registry.instances("worker").is_empty());
    assert_eq!(registry.job_instance("atc").unwrap().address(), ip("10.9.9.9"));
}
