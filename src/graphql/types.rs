use async_graphql::*;
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::entities::{
    permission_group, permission_template, role, sidebar_menu, sidebar_sub_menu,
    template_version,
};
use crate::services::capability::{AccessLevel, Capability, CapabilityFlags};

// Plain entity views

#[derive(SimpleObject, Clone, Debug, Serialize)]
pub struct Role {
    pub id: i32,
    pub name: String,
    pub description: Option<String>,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<role::Model> for Role {
    fn from(model: role::Model) -> Self {
        Self {
            id: model.id,
            name: model.name,
            description: model.description,
            is_active: model.is_active,
            created_at: model.created_at.into(),
            updated_at: model.updated_at.into(),
        }
    }
}

#[derive(SimpleObject, Clone, Debug, Serialize)]
pub struct PermissionGroup {
    pub id: i32,
    pub name: String,
    pub short_code: String,
    pub description: Option<String>,
    pub is_active: bool,
}

impl From<permission_group::Model> for PermissionGroup {
    fn from(model: permission_group::Model) -> Self {
        Self {
            id: model.id,
            name: model.name,
            short_code: model.short_code,
            description: model.description,
            is_active: model.is_active,
        }
    }
}

#[derive(SimpleObject, Clone, Debug, Serialize)]
pub struct SidebarSubMenu {
    pub id: i32,
    pub menu_id: i32,
    pub name: String,
    pub icon: Option<String>,
    pub route_path: Option<String>,
    pub display_order: i32,
    pub is_active: bool,
    pub permission_category_id: Option<i32>,
}

impl From<sidebar_sub_menu::Model> for SidebarSubMenu {
    fn from(model: sidebar_sub_menu::Model) -> Self {
        Self {
            id: model.id,
            menu_id: model.menu_id,
            name: model.name,
            icon: model.icon,
            route_path: model.route_path,
            display_order: model.display_order,
            is_active: model.is_active,
            permission_category_id: model.permission_category_id,
        }
    }
}

#[derive(SimpleObject, Clone, Debug, Serialize)]
pub struct SidebarMenu {
    pub id: i32,
    pub name: String,
    pub icon: Option<String>,
    pub route_path: Option<String>,
    pub display_order: i32,
    pub is_active: bool,
    pub permission_group_id: Option<i32>,
    pub permission_category_id: Option<i32>,
    pub sub_menus: Vec<SidebarSubMenu>,
}

impl From<sidebar_menu::Model> for SidebarMenu {
    fn from(model: sidebar_menu::Model) -> Self {
        Self {
            id: model.id,
            name: model.name,
            icon: model.icon,
            route_path: model.route_path,
            display_order: model.display_order,
            is_active: model.is_active,
            permission_group_id: model.permission_group_id,
            permission_category_id: model.permission_category_id,
            sub_menus: Vec::new(),
        }
    }
}

/// Navigation node as it appears inside staff and superadmin views.
#[derive(SimpleObject, Clone, Debug, Serialize)]
pub struct MenuLink {
    pub id: i32,
    pub name: String,
    pub route_path: Option<String>,
    pub sub_menus: Vec<SubMenuLink>,
}

#[derive(SimpleObject, Clone, Debug, Serialize)]
pub struct SubMenuLink {
    pub id: i32,
    pub name: String,
    pub route_path: Option<String>,
}

// Combined listing and search

#[derive(SimpleObject, Clone, Debug, Serialize)]
pub struct CombinedPermission {
    pub role_id: i32,
    pub role_name: String,
    pub group_id: i32,
    pub group_name: String,
    pub group_code: String,
    pub category_id: i32,
    pub category_name: String,
    pub category_code: String,
    pub permissions: CapabilityFlags,
}

#[derive(InputObject, Clone, Copy, Debug, Default)]
pub struct PermissionFilter {
    pub role_id: Option<i32>,
    pub group_id: Option<i32>,
    pub category_id: Option<i32>,
}

// Statistics

#[derive(SimpleObject, Clone, Debug, Serialize)]
pub struct RoleGrantCount {
    pub role_id: i32,
    pub role_name: String,
    pub grant_count: i64,
}

#[derive(SimpleObject, Clone, Debug, Serialize)]
pub struct CategoryGrantCount {
    pub category_id: i32,
    pub category_name: String,
    pub grant_count: i64,
}

#[derive(SimpleObject, Clone, Debug, Serialize)]
pub struct PermissionStatistics {
    pub total_roles: u64,
    pub total_permission_groups: u64,
    pub total_permission_categories: u64,
    pub permissions_per_role: Vec<RoleGrantCount>,
    /// At most five categories, most granted first.
    pub most_used_permissions: Vec<CategoryGrantCount>,
}

// Matrix

#[derive(SimpleObject, Clone, Debug, Serialize)]
pub struct MatrixCell {
    pub role_id: i32,
    pub role_name: String,
    pub capabilities: Vec<Capability>,
}

#[derive(SimpleObject, Clone, Debug, Serialize)]
pub struct MatrixRow {
    pub category_id: i32,
    pub category_name: String,
    pub cells: Vec<MatrixCell>,
}

#[derive(SimpleObject, Clone, Debug, Serialize)]
pub struct PermissionMatrix {
    pub roles: Vec<String>,
    pub permission_categories: Vec<MatrixRow>,
}

// Role access map

#[derive(SimpleObject, Clone, Debug, Serialize)]
pub struct CategoryRef {
    pub id: i32,
    pub name: String,
    pub code: String,
}

#[derive(SimpleObject, Clone, Debug, Serialize)]
pub struct PartialAccess {
    pub category: CategoryRef,
    pub granted: Vec<Capability>,
    pub restricted: Vec<Capability>,
}

#[derive(SimpleObject, Clone, Debug, Default, Serialize)]
pub struct AccessLevels {
    pub full_access: Vec<CategoryRef>,
    pub partial_access: Vec<PartialAccess>,
    pub no_access: Vec<CategoryRef>,
}

#[derive(SimpleObject, Clone, Debug, Serialize)]
pub struct EffectivePermissions {
    pub can_manage_users: bool,
    pub can_configure_system: bool,
    pub can_manage_content: AccessLevel,
}

#[derive(SimpleObject, Clone, Debug, Serialize)]
pub struct RoleAccessMap {
    pub role_id: i32,
    pub role_name: String,
    pub access_levels: AccessLevels,
    pub effective_permissions: EffectivePermissions,
}

// Role comparison

/// Capability names for one category. A role-unique set covering all four
/// capabilities is reported as `["all"]`.
#[derive(SimpleObject, Clone, Debug, PartialEq, Serialize)]
pub struct CategoryCapabilities {
    pub category_id: i32,
    pub category_name: String,
    pub capabilities: Vec<String>,
}

#[derive(SimpleObject, Clone, Debug, Serialize)]
pub struct RoleDifference {
    /// `role_{id}`
    pub role_key: String,
    pub role_id: i32,
    pub role_name: String,
    pub unique_permissions: Vec<CategoryCapabilities>,
}

#[derive(SimpleObject, Clone, Debug, Serialize)]
pub struct RoleComparison {
    pub common_permissions: Vec<CategoryCapabilities>,
    pub differences: Vec<RoleDifference>,
}

// Role tree and detail

#[derive(SimpleObject, Clone, Debug, Serialize)]
pub struct TreeCategory {
    pub id: i32,
    pub name: String,
    pub code: String,
    pub access_level: AccessLevel,
    pub permissions: Vec<Capability>,
}

#[derive(SimpleObject, Clone, Debug, Serialize)]
pub struct TreeGroup {
    pub id: i32,
    pub name: String,
    pub code: String,
    pub categories: Vec<TreeCategory>,
}

#[derive(SimpleObject, Clone, Debug, Serialize)]
pub struct RolePermissionTree {
    pub role_id: i32,
    pub role_name: String,
    pub permission_tree: Vec<TreeGroup>,
}

#[derive(SimpleObject, Clone, Debug, Serialize)]
pub struct GrantedCategory {
    pub id: i32,
    pub name: String,
    pub code: String,
    pub permissions: CapabilityFlags,
}

#[derive(SimpleObject, Clone, Debug, Serialize)]
pub struct GroupGrants {
    pub id: i32,
    pub name: String,
    pub code: String,
    pub categories: Vec<GrantedCategory>,
}

#[derive(SimpleObject, Clone, Debug, Serialize)]
pub struct RoleDetail {
    pub role: Role,
    pub assigned_staff_count: u64,
    pub permission_groups: Vec<GroupGrants>,
}

/// A grant as it appears under a role in the staff and superadmin views.
#[derive(SimpleObject, Clone, Debug, Serialize)]
pub struct RoleGrant {
    pub category_id: i32,
    pub category_name: String,
    pub category_code: String,
    pub group_id: i32,
    pub group_name: String,
    pub permissions: CapabilityFlags,
}

#[derive(SimpleObject, Clone, Debug, Serialize)]
pub struct RoleWithGrants {
    pub id: i32,
    pub name: String,
    pub description: Option<String>,
    pub permissions: Vec<RoleGrant>,
}

#[derive(SimpleObject, Clone, Debug, Serialize)]
pub struct StaffDetail {
    pub id: i32,
    pub name: String,
    pub email: String,
    pub is_active: bool,
    pub roles: Vec<RoleWithGrants>,
    pub menus: Vec<MenuLink>,
}

#[derive(SimpleObject, Clone, Debug, Serialize)]
pub struct RoleSummaryRef {
    pub id: i32,
    pub name: String,
}

#[derive(SimpleObject, Clone, Debug, Serialize)]
pub struct SuperadminStaff {
    pub id: i32,
    pub name: String,
    pub email: String,
    pub roles: Vec<RoleSummaryRef>,
}

#[derive(SimpleObject, Clone, Debug, Serialize)]
pub struct SuperadminOverview {
    pub staff_members: Vec<SuperadminStaff>,
    pub roles: Vec<RoleWithGrants>,
    pub permission_groups: Vec<PermissionGroup>,
    pub menus: Vec<MenuLink>,
    pub templates: Vec<PermissionTemplate>,
}

// Validation and summary

#[derive(InputObject, Clone, Debug)]
pub struct RequiredPermission {
    pub category_id: i32,
    pub required_actions: Vec<Capability>,
}

#[derive(SimpleObject, Clone, Debug, Default, PartialEq, Serialize)]
pub struct RoleAccessSummary {
    pub role_id: i32,
    pub role_name: String,
    pub total_groups_accessed: u64,
    pub total_categories_accessed: u64,
    pub total_view_permissions: u64,
    pub total_add_permissions: u64,
    pub total_edit_permissions: u64,
    pub total_delete_permissions: u64,
    pub full_access_count: u64,
}

#[derive(SimpleObject, Clone, Debug, Serialize)]
pub struct MissingPermission {
    pub category_id: i32,
    pub category_name: String,
    pub permittable: CapabilityFlags,
}

#[derive(SimpleObject, Clone, Debug, Serialize)]
pub struct ConflictingPermission {
    pub category1: CategoryRef,
    pub group1: String,
    pub category2: CategoryRef,
    pub group2: String,
    /// Capabilities granted on `category1` that it does not permit.
    pub violations1: Vec<Capability>,
    /// Capabilities granted on `category2` that it does not permit.
    pub violations2: Vec<Capability>,
}

/// A single grant that allows capabilities its category does not permit.
#[derive(SimpleObject, Clone, Debug, Serialize)]
pub struct InvalidGrant {
    pub category: CategoryRef,
    pub group_name: String,
    pub violations: Vec<Capability>,
}

#[derive(SimpleObject, Clone, Debug, Serialize)]
pub struct PermissionDependencies {
    pub category_id: i32,
    pub category_name: String,
    pub depends_on: Vec<CategoryRef>,
}

// Mutation payloads

#[derive(InputObject, Clone, Debug)]
pub struct RolePermissionUpdate {
    pub role_id: i32,
    pub category_id: i32,
    pub permissions: crate::services::capability::CapabilityFlagsInput,
}

#[derive(InputObject, Clone, Debug)]
pub struct CategoryPermissionUpdate {
    pub category_id: i32,
    pub permissions: crate::services::capability::CapabilityFlagsInput,
}

#[derive(Enum, Copy, Clone, Eq, PartialEq, Debug, Serialize)]
#[graphql(name = "BatchItemStatus")]
pub enum BatchItemStatus {
    #[graphql(name = "UPDATED")]
    Updated,
    #[graphql(name = "NOT_FOUND")]
    NotFound,
    #[graphql(name = "FAILED")]
    Failed,
}

/// Outcome of one entry of a non-transactional batch write.
#[derive(SimpleObject, Clone, Debug, Serialize)]
pub struct BatchItemResult {
    /// Position of the entry in the submitted batch.
    pub index: i32,
    pub status: BatchItemStatus,
    pub message: Option<String>,
}

impl BatchItemResult {
    pub fn updated(index: usize) -> Self {
        Self {
            index: index as i32,
            status: BatchItemStatus::Updated,
            message: None,
        }
    }

    pub fn not_found(index: usize) -> Self {
        Self {
            index: index as i32,
            status: BatchItemStatus::NotFound,
            message: None,
        }
    }

    pub fn failed(index: usize, message: impl Into<String>) -> Self {
        Self {
            index: index as i32,
            status: BatchItemStatus::Failed,
            message: Some(message.into()),
        }
    }
}

#[derive(InputObject, Clone, Copy, Debug)]
pub struct DisplayOrderUpdate {
    pub id: i32,
    pub display_order: i32,
}

#[derive(SimpleObject, Clone, Debug, Serialize)]
pub struct CascadeDeleteResult {
    pub deleted_grants: u64,
    pub deleted_staff_links: u64,
    pub cleared_menu_links: u64,
    pub deleted_categories: u64,
}

#[derive(SimpleObject, Clone, Debug, Serialize)]
pub struct GrantSetChange {
    pub role_id: i32,
    pub removed: u64,
    pub inserted: u64,
    pub updated: u64,
}

// Templates

/// One entry of a template's stored permission set.
#[derive(SimpleObject, Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TemplatePermission {
    pub category_id: i32,
    pub can_view: bool,
    pub can_add: bool,
    pub can_edit: bool,
    pub can_delete: bool,
}

impl TemplatePermission {
    pub fn new(category_id: i32, flags: CapabilityFlags) -> Self {
        Self {
            category_id,
            can_view: flags.can_view,
            can_add: flags.can_add,
            can_edit: flags.can_edit,
            can_delete: flags.can_delete,
        }
    }

    pub fn flags(&self) -> CapabilityFlags {
        CapabilityFlags::new(self.can_view, self.can_add, self.can_edit, self.can_delete)
    }
}

#[derive(InputObject, Clone, Copy, Debug)]
pub struct TemplatePermissionInput {
    pub category_id: i32,
    #[graphql(default)]
    pub can_view: bool,
    #[graphql(default)]
    pub can_add: bool,
    #[graphql(default)]
    pub can_edit: bool,
    #[graphql(default)]
    pub can_delete: bool,
}

impl From<TemplatePermissionInput> for TemplatePermission {
    fn from(input: TemplatePermissionInput) -> Self {
        Self {
            category_id: input.category_id,
            can_view: input.can_view,
            can_add: input.can_add,
            can_edit: input.can_edit,
            can_delete: input.can_delete,
        }
    }
}

#[derive(SimpleObject, Clone, Debug, Serialize)]
pub struct PermissionTemplate {
    pub id: i32,
    pub name: String,
    pub permissions: Vec<TemplatePermission>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub last_used: Option<DateTime<Utc>>,
}

impl TryFrom<permission_template::Model> for PermissionTemplate {
    type Error = serde_json::Error;

    fn try_from(model: permission_template::Model) -> Result<Self, Self::Error> {
        Ok(Self {
            id: model.id,
            name: model.name,
            permissions: serde_json::from_value(model.permissions)?,
            created_at: model.created_at.into(),
            updated_at: model.updated_at.into(),
            last_used: model.last_used.map(Into::into),
        })
    }
}

#[derive(SimpleObject, Clone, Debug, Serialize)]
pub struct TemplateVersion {
    pub version_id: i32,
    pub template_name: String,
    pub permissions: Vec<TemplatePermission>,
    pub created_at: DateTime<Utc>,
    pub created_by: String,
}

impl TryFrom<template_version::Model> for TemplateVersion {
    type Error = serde_json::Error;

    fn try_from(model: template_version::Model) -> Result<Self, Self::Error> {
        Ok(Self {
            version_id: model.version_id,
            template_name: model.template_name,
            permissions: serde_json::from_value(model.permissions)?,
            created_at: model.created_at.into(),
            created_by: model.created_by,
        })
    }
}

#[derive(InputObject, Clone, Debug, Default)]
pub struct TemplateModifications {
    #[graphql(default)]
    pub add_categories: Vec<i32>,
    #[graphql(default)]
    pub remove_categories: Vec<i32>,
}

#[derive(InputObject, Clone, Copy, Debug, Default)]
pub struct SyncOptions {
    #[graphql(default)]
    pub sync_only_missing: bool,
    #[graphql(default)]
    pub override_existing: bool,
}

// History

#[derive(SimpleObject, Clone, Debug, Serialize)]
pub struct PermissionChange {
    pub id: i32,
    pub role_id: i32,
    pub role_name: Option<String>,
    pub category_id: i32,
    pub category_name: Option<String>,
    pub changes: Json<serde_json::Value>,
    pub changed_by: String,
    pub changed_at: DateTime<Utc>,
}

#[derive(InputObject, Clone, Copy, Debug, Default)]
pub struct HistoryQuery {
    pub role_id: Option<i32>,
    pub from_date: Option<DateTime<Utc>>,
    pub to_date: Option<DateTime<Utc>>,
}

#[derive(SimpleObject, Clone, Debug, Serialize)]
pub struct DailyChangeSummary {
    pub change_date: NaiveDate,
    pub change_count: u64,
    pub affected_categories: Vec<String>,
}
