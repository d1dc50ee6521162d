// crates/topgun-harness/src/registry/grammar.rs
// ============================================================================
// Module: Instance Listing Grammar
// Description: Typed line grammar for the deploy tool's instance listing.
// Purpose: Turn tabular tool output into structured rows.
// Dependencies: std
// ============================================================================

//! ## Overview
//! Each line of a listing is tried against two row shapes:
//!
//! ```text
//! web/0f3c2a      -  running  z1  10.244.0.2     <- instance row
//! ~               atc  running  -  -              <- process row
//! ```
//!
//! An instance row starts with `group/id`, has its state in the first
//! non-placeholder column and its address in the last column. A process row
//! starts with `~` and names a job running on the preceding instance.
//! Anything else yields `None`; unknown lines are part of the grammar, not an
//! error.

use std::net::IpAddr;

/// Placeholder the deploy tool prints for empty cells.
const PLACEHOLDER: &str = "-";

/// Marker that opens a process row.
const PROCESS_MARKER: &str = "~";

/// A recognized listing row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ListingRow {
    /// An instance and its address.
    Instance(InstanceRow),
    /// A job process running on the most recent instance.
    Process(ProcessRow),
}

/// `group/id  state  address` row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstanceRow {
    /// Instance group.
    pub group: String,
    /// Instance identifier within the group.
    pub id: String,
    /// Reported process state.
    pub state: String,
    /// Instance address.
    pub address: IpAddr,
}

/// `~  job  state` row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessRow {
    /// Job name.
    pub job: String,
    /// Reported job state.
    pub state: String,
}

/// Parses one listing line.
#[must_use]
pub fn parse_row(line: &str) -> Option<ListingRow> {
    let columns: Vec<&str> = line.split_whitespace().collect();
    let (first, rest) = columns.split_first()?;
    if *first == PROCESS_MARKER {
        return parse_process(rest).map(ListingRow::Process);
    }
    parse_instance(first, rest).map(ListingRow::Instance)
}

/// Parses every recognizable row of a listing, in order.
pub fn parse_listing(listing: &str) -> impl Iterator<Item = ListingRow> + '_ {
    listing.lines().filter_map(parse_row)
}

fn parse_instance(name: &str, rest: &[&str]) -> Option<InstanceRow> {
    let (group, id) = name.split_once('/')?;
    if !is_word(group) || !is_word(id) {
        return None;
    }
    let (address, middle) = rest.split_last()?;
    let address: IpAddr = address.parse().ok()?;
    let state = middle.iter().find(|column| **column != PLACEHOLDER)?;
    if !is_word(state) {
        return None;
    }
    Some(InstanceRow {
        group: group.to_string(),
        id: id.to_string(),
        state: (*state).to_string(),
        address,
    })
}

fn parse_process(rest: &[&str]) -> Option<ProcessRow> {
    let [job, state, trailing @ ..] = rest else {
        return None;
    };
    if !is_word(job) || !is_word(state) || trailing.iter().any(|column| *column != PLACEHOLDER) {
        return None;
    }
    Some(ProcessRow {
        job: (*job).to_string(),
        state: (*state).to_string(),
    })
}

fn is_word(value: &str) -> bool {
    !value.is_empty()
        && value.chars().all(|ch| ch.is_ascii_alphanumeric() || matches!(ch, '-' | '_' | '.'))
}
