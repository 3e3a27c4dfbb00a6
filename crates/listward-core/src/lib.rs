//! Core domain model and reconciliation types for Listward.

use std::collections::{BTreeMap, BTreeSet};

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

pub const CRATE_NAME: &str = "listward-core";

/// Delivery/bounce state of a subscriber as reported by the bounce review
/// page. The default is the "not bouncing" state the subscriber-info path
/// assigns to newly sighted members.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct BounceState {
    pub bouncing: bool,
    /// Score string as rendered by the server; `None` means "no score".
    pub score: Option<String>,
    pub count: u32,
    pub first: Option<NaiveDate>,
    pub last: Option<NaiveDate>,
}

/// One member of a mailing list, keyed by email within its list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Subscriber {
    pub email: String,
    pub name: String,
    pub reception: Option<String>,
    pub sources: Option<String>,
    pub sub_date: Option<NaiveDate>,
    pub last_update: Option<NaiveDate>,
    pub bounce: BounceState,
}

impl Subscriber {
    pub fn from_row(row: &SubscriberRow) -> Self {
        Self {
            email: row.email.clone(),
            name: row.name.clone(),
            reception: row.reception.clone(),
            sources: row.sources.clone(),
            sub_date: row.sub_date,
            last_update: row.last_update,
            bounce: BounceState::default(),
        }
    }

    /// Merge the subscriber-info fields from a freshly parsed row. Bounce
    /// fields are owned by the bounce pass and are never written here.
    pub fn merge_info(&mut self, row: &SubscriberRow) {
        self.name = row.name.clone();
        self.reception = row.reception.clone();
        self.sources = row.sources.clone();
        self.sub_date = row.sub_date;
        self.last_update = row.last_update;
    }

    /// Replace the bounce fields. The subscriber-info fields are owned by
    /// the review pass and are never written here.
    pub fn set_bounce(&mut self, bounce: BounceState) {
        self.bounce = bounce;
    }
}

/// Row parsed from the subscriber review page.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubscriberRow {
    pub email: String,
    pub name: String,
    pub reception: Option<String>,
    pub sources: Option<String>,
    pub sub_date: Option<NaiveDate>,
    pub last_update: Option<NaiveDate>,
}

/// Row parsed from the bounce review page.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BounceRow {
    pub email: String,
    pub score: Option<String>,
    pub count: u32,
    pub first: Option<NaiveDate>,
    pub last: Option<NaiveDate>,
}

impl BounceRow {
    pub fn into_state(self) -> BounceState {
        BounceState {
            bouncing: true,
            score: self.score,
            count: self.count,
            first: self.first,
            last: self.last,
        }
    }
}

/// The add/remove operation set that transforms the current membership into
/// the desired one. Members present in both sets are untouched: the remote
/// interface has no way to change a display name in place.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ReconcilePlan {
    /// `(email, display name)` pairs to add.
    pub additions: Vec<(String, String)>,
    /// Emails to remove.
    pub removals: Vec<String>,
}

impl ReconcilePlan {
    pub fn is_empty(&self) -> bool {
        self.additions.is_empty() && self.removals.is_empty()
    }

    pub fn len(&self) -> usize {
        self.additions.len() + self.removals.len()
    }
}

/// Diff the desired membership against the current one.
pub fn reconcile(
    current: &BTreeSet<String>,
    desired: &BTreeMap<String, String>,
) -> ReconcilePlan {
    let additions = desired
        .iter()
        .filter(|(email, _)| !current.contains(*email))
        .map(|(email, name)| (email.clone(), name.clone()))
        .collect();
    let removals = current
        .iter()
        .filter(|email| !desired.contains_key(*email))
        .cloned()
        .collect();
    ReconcilePlan {
        additions,
        removals,
    }
}
