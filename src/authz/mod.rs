//! Authorization core: capability model, identity resolution, permission
//! aggregation and the per-request decision pipeline.
//!
//! A permission row is a sparse set of named boolean capabilities; absence
//! means "not addressed", never "denied". There is no negative flag in this
//! model.

mod aggregate;
mod guard;
mod identity;
mod resolver;

pub use aggregate::{aggregate_for_user, merge_rows, AggregatedPermissions, MergedPermission};
pub use guard::{evaluate, pipeline, PipelineState};
pub use identity::Identity;
pub use resolver::{bearer_token, resolve_identity};

use std::collections::BTreeSet;
use std::fmt;

use serde::de::{MapAccess, Visitor};
use serde::ser::SerializeMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// Well-known permission names
pub mod permissions {
    pub const EMPLOYEE_MANAGEMENT: &str = "EMPLOYEE_MANAGEMENT";
    pub const LEAVE_MANAGEMENT: &str = "LEAVE_MANAGEMENT";
    pub const ROLE_MANAGEMENT: &str = "ROLE_MANAGEMENT";
    pub const PROJECT_MANAGEMENT: &str = "PROJECT_MANAGEMENT";
    pub const PAYROLL_MANAGEMENT: &str = "PAYROLL_MANAGEMENT";

    pub const ALL: &[&str] = &[
        EMPLOYEE_MANAGEMENT,
        LEAVE_MANAGEMENT,
        ROLE_MANAGEMENT,
        PROJECT_MANAGEMENT,
        PAYROLL_MANAGEMENT,
    ];
}

/// One named boolean on a permission row. The closed enum is the source of
/// valid capability names; wire payloads carrying unknown keys simply do not
/// assert anything.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Capability {
    CanCreate,
    CanRead,
    CanUpdate,
    CanDelete,
    CanApprove,
    CanExport,
}

impl Capability {
    pub const ALL: [Capability; 6] = [
        Capability::CanCreate,
        Capability::CanRead,
        Capability::CanUpdate,
        Capability::CanDelete,
        Capability::CanApprove,
        Capability::CanExport,
    ];

    pub fn as_key(self) -> &'static str {
        match self {
            Capability::CanCreate => "canCreate",
            Capability::CanRead => "canRead",
            Capability::CanUpdate => "canUpdate",
            Capability::CanDelete => "canDelete",
            Capability::CanApprove => "canApprove",
            Capability::CanExport => "canExport",
        }
    }

    pub fn from_key(key: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|cap| cap.as_key() == key)
    }
}

/// Sparse set of asserted capabilities.
///
/// Serializes to the wire shape `{"canRead": true, ...}` — only asserted
/// flags appear. Deserialization keeps keys whose value is JSON `true` and
/// drops everything else.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CapabilitySet(BTreeSet<Capability>);

impl CapabilitySet {
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn of(capabilities: &[Capability]) -> Self {
        Self(capabilities.iter().copied().collect())
    }

    pub fn all() -> Self {
        Self::of(&Capability::ALL)
    }

    pub fn insert(&mut self, capability: Capability) {
        self.0.insert(capability);
    }

    pub fn contains(&self, capability: Capability) -> bool {
        self.0.contains(&capability)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Union of asserted flags; flags the other set does not address are
    /// left untouched.
    pub fn merge(&mut self, other: &CapabilitySet) {
        self.0.extend(other.0.iter().copied());
    }

    /// At least one capability asserted by both sets.
    pub fn intersects(&self, other: &CapabilitySet) -> bool {
        self.0.iter().any(|cap| other.0.contains(cap))
    }

    pub fn iter(&self) -> impl Iterator<Item = Capability> + '_ {
        self.0.iter().copied()
    }
}

impl FromIterator<Capability> for CapabilitySet {
    fn from_iter<I: IntoIterator<Item = Capability>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

impl Serialize for CapabilitySet {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.0.len()))?;
        for capability in &self.0 {
            map.serialize_entry(capability.as_key(), &true)?;
        }
        map.end()
    }
}

impl<'de> Deserialize<'de> for CapabilitySet {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct SetVisitor;

        impl<'de> Visitor<'de> for SetVisitor {
            type Value = CapabilitySet;

            fn expecting(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
                formatter.write_str("a map of capability flags")
            }

            fn visit_map<A: MapAccess<'de>>(self, mut map: A) -> Result<Self::Value, A::Error> {
                let mut set = CapabilitySet::empty();
                while let Some(key) = map.next_key::<String>()? {
                    let value = map.next_value::<serde_json::Value>()?;
                    if value.as_bool() == Some(true) {
                        if let Some(capability) = Capability::from_key(&key) {
                            set.insert(capability);
                        }
                    }
                }
                Ok(set)
            }
        }

        deserializer.deserialize_map(SetVisitor)
    }
}

/// One entry of a route's declared requirement: a permission name plus the
/// capabilities the caller should hold on it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PermissionRequirement {
    pub permission: &'static str,
    pub capabilities: CapabilitySet,
}

impl PermissionRequirement {
    pub fn new(permission: &'static str, capabilities: &[Capability]) -> Self {
        Self {
            permission,
            capabilities: CapabilitySet::of(capabilities),
        }
    }
}

/// What a route demands from the caller before its handler runs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AccessRequirement {
    /// No identity needed; absent identity is valid here.
    Public,
    /// Any resolved identity will do.
    Authenticated,
    /// At least one entry must match by capability overlap, or the
    /// self-service override must apply.
    Permissions(Vec<PermissionRequirement>),
}

impl AccessRequirement {
    pub fn permission(name: &'static str, capabilities: &[Capability]) -> Self {
        Self::Permissions(vec![PermissionRequirement::new(name, capabilities)])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn capability_keys_round_trip() {
        for capability in Capability::ALL {
            assert_eq!(Capability::from_key(capability.as_key()), Some(capability));
        }
        assert_eq!(Capability::from_key("canFly"), None);
    }

    #[test]
    fn serializes_only_asserted_flags() {
        let set = CapabilitySet::of(&[Capability::CanRead, Capability::CanUpdate]);
        let value = serde_json::to_value(&set).unwrap();
        assert_eq!(value, serde_json::json!({"canRead": true, "canUpdate": true}));
    }

    #[test]
    fn deserialize_keeps_true_flags_and_drops_the_rest() {
        let set: CapabilitySet = serde_json::from_value(serde_json::json!({
            "canRead": true,
            "canUpdate": false,
            "canDelete": "yes",
            "canFly": true,
        }))
        .unwrap();
        assert!(set.contains(Capability::CanRead));
        assert!(!set.contains(Capability::CanUpdate));
        assert!(!set.contains(Capability::CanDelete));
        assert_eq!(set.len(), 1);
    }

    #[test]
    fn intersects_requires_a_shared_flag() {
        let held = CapabilitySet::of(&[Capability::CanUpdate]);
        let wanted = CapabilitySet::of(&[Capability::CanCreate, Capability::CanUpdate]);
        let unrelated = CapabilitySet::of(&[Capability::CanDelete]);
        assert!(held.intersects(&wanted));
        assert!(!held.intersects(&unrelated));
    }
}
