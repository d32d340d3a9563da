//! Recipient construction for quote notifications.
//!
//! The primary list is the client plus the configured internal addresses. The cc list is the
//! fixed internal cc addresses plus whatever the caller typed into the form, lower-cased,
//! de-duplicated, and stripped of anything already on the primary list. Comparisons are
//! case-insensitive throughout.

use std::collections::HashSet;

use serde::Serialize;

use crate::domain::quote::split_addresses;

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct RecipientPolicy {
    internal_to: Vec<String>,
    fixed_cc: Vec<String>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct RecipientPlan {
    pub to: Vec<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub cc: Vec<String>,
}

impl RecipientPolicy {
    pub fn new(internal_to: Vec<String>, fixed_cc: Vec<String>) -> Self {
        Self { internal_to, fixed_cc }
    }

    pub fn plan(&self, client_email: &str, cc_input: Option<&str>) -> RecipientPlan {
        let mut seen = HashSet::new();
        let mut to = Vec::new();
        for address in std::iter::once(client_email).chain(self.internal_to.iter().map(String::as_str))
        {
            let address = address.trim();
            if !address.is_empty() && seen.insert(address.to_lowercase()) {
                to.push(address.to_string());
            }
        }

        let requested = cc_input.map(split_addresses).into_iter().flatten();
        let mut cc = Vec::new();
        for address in self.fixed_cc.iter().map(String::as_str).chain(requested) {
            let normalized = address.trim().to_lowercase();
            if !normalized.is_empty() && seen.insert(normalized.clone()) {
                cc.push(normalized);
            }
        }

        RecipientPlan { to, cc }
    }
}

impl RecipientPlan {
    /// The cc list, or `None` when nothing survived filtering.
    pub fn cc(&self) -> Option<&[String]> {
        (!self.cc.is_empty()).then_some(self.cc.as_slice())
    }

    pub fn all(&self) -> Vec<String> {
        self.to.iter().chain(&self.cc).cloned().collect()
    }
}
