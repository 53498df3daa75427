//! # Address — Hierarchical Dot-Separated Labels
//!
//! Defines `Address`, the dot-separated hierarchical label used for
//! packet destinations, routing table prefixes, and local-terminating
//! prefix declarations.
//!
//! ## Implements
//!
//! §3 — Address: segment validation and prefix match.

use serde::{Deserialize, Serialize};

use crate::error::AddressError;

/// A validated dot-separated hierarchical address, e.g.
/// `g.workflow.resize.watermark`.
///
/// Valid addresses have at least one segment, no empty segments, and no
/// leading or trailing dot. Duplicated step names (e.g.
/// `g.workflow.resize.resize`) are permitted; segments are plain strings
/// with no uniqueness constraint.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Address(String);

impl Address {
    /// Parse and validate an address string.
    pub fn parse(s: impl Into<String>) -> Result<Self, AddressError> {
        let s = s.into();
        if s.is_empty() {
            return Err(AddressError::Empty);
        }
        if s.starts_with('.') || s.ends_with('.') {
            return Err(AddressError::LeadingOrTrailingDot);
        }
        if s.split('.').any(|segment| segment.is_empty()) {
            return Err(AddressError::EmptySegment);
        }
        Ok(Self(s))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn segments(&self) -> impl Iterator<Item = &str> {
        self.0.split('.')
    }

    /// True if `self` is a prefix of `other` at a segment boundary: `self`
    /// extended by a dot is a prefix of `other` extended by a dot. Every
    /// address is a prefix of itself.
    pub fn is_prefix_of(&self, other: &Address) -> bool {
        let mut prefix = self.0.clone();
        prefix.push('.');
        let mut candidate = other.0.clone();
        candidate.push('.');
        candidate.starts_with(&prefix)
    }

    /// Number of dot-separated segments, used to break ties between
    /// candidate route prefixes by specificity (longest-prefix match).
    pub fn segment_count(&self) -> usize {
        self.0.split('.').count()
    }
}

impl std::fmt::Display for Address {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for Address {
    type Error = AddressError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        Address::parse(s)
    }
}

impl From<Address> for String {
    fn from(addr: Address) -> Self {
        addr.0
    }
}

impl std::str::FromStr for Address {
    type Err = AddressError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Address::parse(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_single_segment() {
        assert!(Address::parse("g").is_ok());
    }

    #[test]
    fn accepts_multi_segment() {
        assert!(Address::parse("g.workflow.resize.watermark").is_ok());
    }

    #[test]
    fn rejects_empty() {
        assert!(matches!(Address::parse(""), Err(AddressError::Empty)));
    }

    #[test]
    fn rejects_leading_dot() {
        assert!(matches!(Address::parse(".g.workflow"), Err(AddressError::LeadingOrTrailingDot)));
    }

    #[test]
    fn rejects_trailing_dot() {
        assert!(matches!(Address::parse("g.workflow."), Err(AddressError::LeadingOrTrailingDot)));
    }

    #[test]
    fn rejects_empty_segment() {
        assert!(matches!(Address::parse("g..workflow"), Err(AddressError::EmptySegment)));
    }

    #[test]
    fn permits_duplicated_step_names() {
        // Resolved Open Question: repeated segments execute in order.
        let addr = Address::parse("g.workflow.resize.resize").unwrap();
        assert_eq!(addr.segment_count(), 4);
    }

    #[test]
    fn prefix_match_is_segment_aligned() {
        let prefix = Address::parse("g.workflow").unwrap();
        let addr = Address::parse("g.workflow.resize").unwrap();
        let not_addr = Address::parse("g.workflowish").unwrap();
        assert!(prefix.is_prefix_of(&addr));
        assert!(!prefix.is_prefix_of(&not_addr));
    }

    #[test]
    fn address_is_prefix_of_itself() {
        let addr = Address::parse("g.workflow").unwrap();
        assert!(addr.is_prefix_of(&addr));
    }
}
