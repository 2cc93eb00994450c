use async_graphql::{Enum, InputObject, SimpleObject};
use serde::{Deserialize, Serialize};
use strum::{EnumIter, IntoEnumIterator};

use crate::entities::role_permission;

/// One of the four actions a grant can allow on a permission category.
#[derive(
    Enum, Copy, Clone, Eq, PartialEq, Hash, Ord, PartialOrd, Debug, Serialize, Deserialize, EnumIter,
)]
#[serde(rename_all = "lowercase")]
#[graphql(name = "Capability")]
pub enum Capability {
    #[graphql(name = "VIEW")]
    View,
    #[graphql(name = "ADD")]
    Add,
    #[graphql(name = "EDIT")]
    Edit,
    #[graphql(name = "DELETE")]
    Delete,
}

impl Capability {
    pub fn as_str(&self) -> &'static str {
        match self {
            Capability::View => "view",
            Capability::Add => "add",
            Capability::Edit => "edit",
            Capability::Delete => "delete",
        }
    }

    /// Accepts both the short form (`view`) and the column form (`can_view`).
    pub fn from_str(s: &str) -> Option<Self> {
        let lowered = s.trim().to_ascii_lowercase();
        match lowered.strip_prefix("can_").unwrap_or(&lowered) {
            "view" => Some(Capability::View),
            "add" => Some(Capability::Add),
            "edit" => Some(Capability::Edit),
            "delete" => Some(Capability::Delete),
            _ => None,
        }
    }

    pub fn all() -> Vec<Capability> {
        Capability::iter().collect()
    }
}

/// Four-flag capability set, used both for grants and for the `enable_*`
/// flags of a category.
#[derive(SimpleObject, Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CapabilityFlags {
    pub can_view: bool,
    pub can_add: bool,
    pub can_edit: bool,
    pub can_delete: bool,
}

impl CapabilityFlags {
    pub const ALL: CapabilityFlags = CapabilityFlags {
        can_view: true,
        can_add: true,
        can_edit: true,
        can_delete: true,
    };

    pub const NONE: CapabilityFlags = CapabilityFlags {
        can_view: false,
        can_add: false,
        can_edit: false,
        can_delete: false,
    };

    pub fn new(can_view: bool, can_add: bool, can_edit: bool, can_delete: bool) -> Self {
        Self {
            can_view,
            can_add,
            can_edit,
            can_delete,
        }
    }

    pub fn get(&self, capability: Capability) -> bool {
        match capability {
            Capability::View => self.can_view,
            Capability::Add => self.can_add,
            Capability::Edit => self.can_edit,
            Capability::Delete => self.can_delete,
        }
    }

    pub fn set(&mut self, capability: Capability, value: bool) {
        match capability {
            Capability::View => self.can_view = value,
            Capability::Add => self.can_add = value,
            Capability::Edit => self.can_edit = value,
            Capability::Delete => self.can_delete = value,
        }
    }

    /// Granted capabilities in canonical order (view, add, edit, delete).
    pub fn granted(&self) -> Vec<Capability> {
        Capability::iter().filter(|c| self.get(*c)).collect()
    }

    pub fn restricted(&self) -> Vec<Capability> {
        Capability::iter().filter(|c| !self.get(*c)).collect()
    }

    pub fn count(&self) -> usize {
        Capability::iter().filter(|c| self.get(*c)).count()
    }

    pub fn any(&self) -> bool {
        self.count() > 0
    }

    /// Per-capability logical OR.
    pub fn union(self, other: CapabilityFlags) -> CapabilityFlags {
        CapabilityFlags {
            can_view: self.can_view || other.can_view,
            can_add: self.can_add || other.can_add,
            can_edit: self.can_edit || other.can_edit,
            can_delete: self.can_delete || other.can_delete,
        }
    }

    /// Capabilities granted here that `permitted` does not allow.
    pub fn violations(&self, permitted: &CapabilityFlags) -> Vec<Capability> {
        Capability::iter()
            .filter(|c| self.get(*c) && !permitted.get(*c))
            .collect()
    }

    pub fn access_level(&self) -> AccessLevel {
        match self.count() {
            4 => AccessLevel::Full,
            0 => AccessLevel::None,
            _ => AccessLevel::Partial,
        }
    }
}

impl From<&role_permission::Model> for CapabilityFlags {
    fn from(grant: &role_permission::Model) -> Self {
        Self::new(grant.can_view, grant.can_add, grant.can_edit, grant.can_delete)
    }
}

#[derive(InputObject, Clone, Copy, Debug, Default)]
pub struct CapabilityFlagsInput {
    #[graphql(default)]
    pub can_view: bool,
    #[graphql(default)]
    pub can_add: bool,
    #[graphql(default)]
    pub can_edit: bool,
    #[graphql(default)]
    pub can_delete: bool,
}

impl From<CapabilityFlagsInput> for CapabilityFlags {
    fn from(input: CapabilityFlagsInput) -> Self {
        Self::new(input.can_view, input.can_add, input.can_edit, input.can_delete)
    }
}

/// Classification of a grant by how many of its four flags are set.
#[derive(Enum, Copy, Clone, Eq, PartialEq, Debug, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
#[graphql(name = "AccessLevel")]
pub enum AccessLevel {
    #[graphql(name = "FULL")]
    Full,
    #[graphql(name = "PARTIAL")]
    Partial,
    #[graphql(name = "NONE")]
    None,
}

/// Stable tag on a category that feeds a named effective permission.
#[derive(Copy, Clone, Eq, PartialEq, Debug)]
pub enum CapabilityTag {
    UserManagement,
    SystemSettings,
    ContentManagement,
}

impl CapabilityTag {
    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "user_management" => Some(CapabilityTag::UserManagement),
            "system_settings" => Some(CapabilityTag::SystemSettings),
            "content_management" => Some(CapabilityTag::ContentManagement),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn union_is_a_per_flag_or() {
        let existing = CapabilityFlags::new(true, false, false, false);
        let template = CapabilityFlags::new(false, true, false, false);
        assert_eq!(
            existing.union(template),
            CapabilityFlags::new(true, true, false, false)
        );
    }

    #[test]
    fn access_level_follows_granted_count() {
        assert_eq!(CapabilityFlags::ALL.access_level(), AccessLevel::Full);
        assert_eq!(CapabilityFlags::NONE.access_level(), AccessLevel::None);
        assert_eq!(
            CapabilityFlags::new(true, false, true, false).access_level(),
            AccessLevel::Partial
        );
    }

    #[test]
    fn capability_names_accept_both_forms() {
        assert_eq!(Capability::from_str("can_edit"), Some(Capability::Edit));
        assert_eq!(Capability::from_str("DELETE"), Some(Capability::Delete));
        assert_eq!(Capability::from_str("approve"), None);
    }

    #[test]
    fn violations_list_granted_but_not_permitted() {
        let grant = CapabilityFlags::new(true, true, false, true);
        let permitted = CapabilityFlags::new(true, false, true, true);
        assert_eq!(grant.violations(&permitted), vec![Capability::Add]);
    }

    #[test]
    fn granted_and_restricted_partition_the_capabilities() {
        let flags = CapabilityFlags::new(false, true, false, true);
        assert_eq!(flags.granted(), vec![Capability::Add, Capability::Delete]);
        assert_eq!(flags.restricted(), vec![Capability::View, Capability::Edit]);
    }
}
