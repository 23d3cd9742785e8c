//! Partition targets by self-reported role

use std::collections::BTreeMap;

use crate::recipes::operation::RemoteOperation;
use crate::recipes::target::Target;

pub const LEADER: &str = "leader";
pub const REPLICA: &str = "replica";

/// Targets grouped by the literal role string they reported
///
/// Within a group, targets keep the order they were discovered in.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RoleGroup {
    groups: BTreeMap<String, Vec<Target>>,
}

impl RoleGroup {
    pub fn from_operations(operations: &[RemoteOperation]) -> Self {
        let mut groups: BTreeMap<String, Vec<Target>> = BTreeMap::new();
        for op in operations {
            groups
                .entry(op.result.clone())
                .or_default()
                .push(op.target.clone());
        }
        Self { groups }
    }

    pub fn get(&self, role: &str) -> &[Target] {
        self.groups.get(role).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn leaders(&self) -> &[Target] {
        self.get(LEADER)
    }

    pub fn replicas(&self) -> &[Target] {
        self.get(REPLICA)
    }

    /// Groups that are neither leader nor replica
    pub fn others(&self) -> impl Iterator<Item = (&str, &[Target])> {
        self.groups
            .iter()
            .filter(|(role, _)| role.as_str() != LEADER && role.as_str() != REPLICA)
            .map(|(role, targets)| (role.as_str(), targets.as_slice()))
    }

    pub fn roles(&self) -> impl Iterator<Item = &str> {
        self.groups.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.groups.values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
