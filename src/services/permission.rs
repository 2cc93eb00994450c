use std::collections::{BTreeSet, HashMap, HashSet};

use sea_orm::sea_query::Expr;
use sea_orm::{
    ColumnTrait, DatabaseConnection, EntityTrait, FromQueryResult, JoinType, Order,
    PaginatorTrait, QueryFilter, QueryOrder, QuerySelect, RelationTrait, Select,
};
use serde_json::Value;
use tracing::debug;

use crate::entities::{
    permission_category, permission_group, prelude::*, role, role_permission,
};
use crate::error::{RbacError, RbacResult};
use crate::graphql::types::{
    AccessLevels, CategoryCapabilities, CategoryGrantCount, CategoryRef, CombinedPermission,
    ConflictingPermission, EffectivePermissions, InvalidGrant, MatrixCell, MatrixRow,
    MissingPermission, PartialAccess, PermissionDependencies, PermissionFilter,
    PermissionMatrix, PermissionStatistics, RequiredPermission, RoleAccessMap,
    RoleAccessSummary, RoleComparison, RoleDifference, RoleGrantCount, RolePermissionTree,
    TreeCategory, TreeGroup,
};
use crate::services::capability::{AccessLevel, Capability, CapabilityFlags, CapabilityTag};
use crate::services::flatten::{Branch, Nested};

const TOP_CATEGORY_LIMIT: usize = 5;
const ALL_SENTINEL: &str = "all";

/// Whitelisted sort fields for permission search.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortField {
    RoleName,
    PermissionCategoryName,
    PermissionGroupName,
}

impl SortField {
    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "role_name" => Some(SortField::RoleName),
            "permission_category_name" => Some(SortField::PermissionCategoryName),
            "permission_group_name" => Some(SortField::PermissionGroupName),
            _ => None,
        }
    }
}

/// Validated form of the free-form search filter and sort mappings.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SearchCriteria {
    pub role_name: Option<String>,
    pub permission_group_code: Option<String>,
    pub permission_category_code: Option<String>,
    pub has_permissions: Vec<Capability>,
    pub sort: Option<(SortField, Order)>,
}

fn optional_string(filters: &serde_json::Map<String, Value>, key: &str) -> RbacResult<Option<String>> {
    match filters.get(key) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(s)) => Ok(Some(s.clone())),
        Some(_) => Err(RbacError::invalid(format!("{key} must be a string"))),
    }
}

impl SearchCriteria {
    /// Validate raw filter and sort input. Nothing is queried when this fails.
    pub fn parse(filters: Option<&Value>, sort: Option<&Value>) -> RbacResult<Self> {
        let mut criteria = SearchCriteria::default();

        match filters {
            None | Some(Value::Null) => {}
            Some(Value::Object(filters)) => {
                criteria.role_name = optional_string(filters, "role_name")?;
                criteria.permission_group_code = optional_string(filters, "permission_group_code")?;
                criteria.permission_category_code =
                    optional_string(filters, "permission_category_code")?;

                match filters.get("has_permissions") {
                    None | Some(Value::Null) => {}
                    Some(Value::Object(flags)) => {
                        for (name, wanted) in flags {
                            let capability = Capability::from_str(name).ok_or_else(|| {
                                RbacError::invalid(format!("unknown capability '{name}'"))
                            })?;
                            match wanted {
                                Value::Bool(true) => criteria.has_permissions.push(capability),
                                Value::Bool(false) => {}
                                _ => {
                                    return Err(RbacError::invalid(format!(
                                        "has_permissions.{name} must be a boolean"
                                    )));
                                }
                            }
                        }
                        criteria.has_permissions.sort();
                        criteria.has_permissions.dedup();
                    }
                    Some(_) => return Err(RbacError::invalid("has_permissions must be an object")),
                }
            }
            Some(_) => return Err(RbacError::invalid("filters must be an object")),
        }

        match sort {
            None | Some(Value::Null) => {}
            Some(Value::Object(sort)) => {
                let field = match sort.get("field") {
                    Some(Value::String(field)) => SortField::from_str(field).ok_or_else(|| {
                        RbacError::invalid(
                            "sort field must be one of role_name, permission_category_name, permission_group_name",
                        )
                    })?,
                    Some(_) => return Err(RbacError::invalid("sort field must be a string")),
                    None => return Err(RbacError::invalid("sort field is required")),
                };
                let order = match sort.get("order") {
                    None | Some(Value::Null) => Order::Asc,
                    Some(Value::String(order)) => match order.to_ascii_uppercase().as_str() {
                        "ASC" => Order::Asc,
                        "DESC" => Order::Desc,
                        _ => return Err(RbacError::invalid("sort order must be ASC or DESC")),
                    },
                    Some(_) => return Err(RbacError::invalid("sort order must be a string")),
                };
                criteria.sort = Some((field, order));
            }
            Some(_) => return Err(RbacError::invalid("sort must be an object")),
        }

        Ok(criteria)
    }
}

/// One joined (role, category, group, grant) row.
#[derive(Debug, Clone, FromQueryResult)]
pub(crate) struct GrantRow {
    pub role_id: i32,
    pub role_name: String,
    pub group_id: i32,
    pub group_name: String,
    pub group_code: String,
    pub category_id: i32,
    pub category_name: String,
    pub category_code: String,
    pub capability_tag: Option<String>,
    pub can_view: bool,
    pub can_add: bool,
    pub can_edit: bool,
    pub can_delete: bool,
    pub enable_view: bool,
    pub enable_add: bool,
    pub enable_edit: bool,
    pub enable_delete: bool,
}

impl GrantRow {
    pub fn flags(&self) -> CapabilityFlags {
        CapabilityFlags::new(self.can_view, self.can_add, self.can_edit, self.can_delete)
    }

    pub fn permittable(&self) -> CapabilityFlags {
        CapabilityFlags::new(
            self.enable_view,
            self.enable_add,
            self.enable_edit,
            self.enable_delete,
        )
    }

    pub fn category_ref(&self) -> CategoryRef {
        CategoryRef {
            id: self.category_id,
            name: self.category_name.clone(),
            code: self.category_code.clone(),
        }
    }
}

impl From<GrantRow> for CombinedPermission {
    fn from(row: GrantRow) -> Self {
        let permissions = row.flags();
        Self {
            role_id: row.role_id,
            role_name: row.role_name,
            group_id: row.group_id,
            group_name: row.group_name,
            group_code: row.group_code,
            category_id: row.category_id,
            category_name: row.category_name,
            category_code: row.category_code,
            permissions,
        }
    }
}

/// Grants joined with their role, category and group.
pub(crate) fn grant_rows() -> Select<RolePermission> {
    RolePermission::find()
        .select_only()
        .column(role_permission::Column::RoleId)
        .column_as(role::Column::Name, "role_name")
        .column_as(permission_group::Column::Id, "group_id")
        .column_as(permission_group::Column::Name, "group_name")
        .column_as(permission_group::Column::ShortCode, "group_code")
        .column_as(role_permission::Column::CategoryId, "category_id")
        .column_as(permission_category::Column::Name, "category_name")
        .column_as(permission_category::Column::ShortCode, "category_code")
        .column(permission_category::Column::CapabilityTag)
        .column(role_permission::Column::CanView)
        .column(role_permission::Column::CanAdd)
        .column(role_permission::Column::CanEdit)
        .column(role_permission::Column::CanDelete)
        .column(permission_category::Column::EnableView)
        .column(permission_category::Column::EnableAdd)
        .column(permission_category::Column::EnableEdit)
        .column(permission_category::Column::EnableDelete)
        .join(JoinType::InnerJoin, role_permission::Relation::Role.def())
        .join(JoinType::InnerJoin, role_permission::Relation::PermissionCategory.def())
        .join(JoinType::InnerJoin, permission_category::Relation::PermissionGroup.def())
}

fn capability_names(capabilities: &BTreeSet<Capability>) -> Vec<String> {
    capabilities.iter().map(|c| c.as_str().to_string()).collect()
}

#[derive(Clone)]
pub struct PermissionService {
    db: DatabaseConnection,
}

impl PermissionService {
    pub fn new(db: DatabaseConnection) -> Self {
        Self { db }
    }

    pub fn get_db(&self) -> &DatabaseConnection {
        &self.db
    }

    async fn role_grant_rows(&self, role_id: i32) -> RbacResult<Vec<GrantRow>> {
        let rows = grant_rows()
            .filter(role_permission::Column::RoleId.eq(role_id))
            .order_by_asc(permission_group::Column::Id)
            .order_by_asc(permission_category::Column::Id)
            .into_model::<GrantRow>()
            .all(&self.db)
            .await?;
        Ok(rows)
    }

    /// Get every grant with its role, category and group, ordered by group,
    /// category and role
    pub async fn combined_permissions(
        &self,
        filter: PermissionFilter,
    ) -> RbacResult<Vec<CombinedPermission>> {
        let mut query = grant_rows();
        if let Some(role_id) = filter.role_id {
            query = query.filter(role_permission::Column::RoleId.eq(role_id));
        }
        if let Some(group_id) = filter.group_id {
            query = query.filter(permission_group::Column::Id.eq(group_id));
        }
        if let Some(category_id) = filter.category_id {
            query = query.filter(role_permission::Column::CategoryId.eq(category_id));
        }

        let rows = query
            .order_by_asc(permission_group::Column::Id)
            .order_by_asc(permission_category::Column::Id)
            .order_by_asc(role::Column::Id)
            .into_model::<GrantRow>()
            .all(&self.db)
            .await?;

        debug!(rows = rows.len(), ?filter, "combined permissions loaded");
        Ok(rows.into_iter().map(CombinedPermission::from).collect())
    }

    /// Search grants with the free-form filter/sort contract.
    pub async fn search_permissions(
        &self,
        filters: Option<&Value>,
        sort: Option<&Value>,
    ) -> RbacResult<Vec<CombinedPermission>> {
        let criteria = SearchCriteria::parse(filters, sort)?;

        let mut query = grant_rows();
        if let Some(role_name) = &criteria.role_name {
            query = query.filter(role::Column::Name.contains(role_name));
        }
        if let Some(code) = &criteria.permission_group_code {
            query = query.filter(permission_group::Column::ShortCode.eq(code.as_str()));
        }
        if let Some(code) = &criteria.permission_category_code {
            query = query.filter(permission_category::Column::ShortCode.eq(code.as_str()));
        }
        for capability in &criteria.has_permissions {
            let column = match capability {
                Capability::View => role_permission::Column::CanView,
                Capability::Add => role_permission::Column::CanAdd,
                Capability::Edit => role_permission::Column::CanEdit,
                Capability::Delete => role_permission::Column::CanDelete,
            };
            query = query.filter(column.eq(true));
        }

        if let Some((field, order)) = &criteria.sort {
            query = match field {
                SortField::RoleName => query.order_by(role::Column::Name, order.clone()),
                SortField::PermissionCategoryName => {
                    query.order_by(permission_category::Column::Name, order.clone())
                }
                SortField::PermissionGroupName => {
                    query.order_by(permission_group::Column::Name, order.clone())
                }
            };
        }

        let rows = query
            .order_by_asc(permission_group::Column::Id)
            .order_by_asc(permission_category::Column::Id)
            .order_by_asc(role::Column::Id)
            .into_model::<GrantRow>()
            .all(&self.db)
            .await?;

        Ok(rows.into_iter().map(CombinedPermission::from).collect())
    }

    /// Get aggregate counts over roles, groups, categories and grants
    pub async fn statistics(&self) -> RbacResult<PermissionStatistics> {
        let total_roles = Role::find().count(&self.db).await?;
        let total_permission_groups = PermissionGroup::find().count(&self.db).await?;
        let total_permission_categories = PermissionCategory::find().count(&self.db).await?;

        let per_role: Vec<(i32, String, i64)> = RolePermission::find()
            .select_only()
            .column(role_permission::Column::RoleId)
            .column(role::Column::Name)
            .column_as(
                Expr::col((RolePermission, role_permission::Column::Id)).count(),
                "grant_count",
            )
            .join(JoinType::InnerJoin, role_permission::Relation::Role.def())
            .group_by(role_permission::Column::RoleId)
            .group_by(role::Column::Name)
            .order_by_asc(role_permission::Column::RoleId)
            .into_tuple()
            .all(&self.db)
            .await?;

        let mut per_category: Vec<(i32, String, i64)> = RolePermission::find()
            .select_only()
            .column(role_permission::Column::CategoryId)
            .column(permission_category::Column::Name)
            .column_as(
                Expr::col((RolePermission, role_permission::Column::Id)).count(),
                "grant_count",
            )
            .join(JoinType::InnerJoin, role_permission::Relation::PermissionCategory.def())
            .group_by(role_permission::Column::CategoryId)
            .group_by(permission_category::Column::Name)
            .into_tuple()
            .all(&self.db)
            .await?;
        per_category.sort_by(|a, b| b.2.cmp(&a.2).then(a.0.cmp(&b.0)));
        per_category.truncate(TOP_CATEGORY_LIMIT);

        Ok(PermissionStatistics {
            total_roles,
            total_permission_groups,
            total_permission_categories,
            permissions_per_role: per_role
                .into_iter()
                .map(|(role_id, role_name, grant_count)| RoleGrantCount {
                    role_id,
                    role_name,
                    grant_count,
                })
                .collect(),
            most_used_permissions: per_category
                .into_iter()
                .map(|(category_id, category_name, grant_count)| CategoryGrantCount {
                    category_id,
                    category_name,
                    grant_count,
                })
                .collect(),
        })
    }

    /// True when the role holds every required capability on every listed
    /// category. An absent role never validates.
    pub async fn validate_role_permissions(
        &self,
        role_id: i32,
        required: &[RequiredPermission],
    ) -> RbacResult<bool> {
        if Role::find_by_id(role_id).one(&self.db).await?.is_none() {
            return Ok(false);
        }

        let category_ids: Vec<i32> = required.iter().map(|r| r.category_id).collect();
        let grants: HashMap<i32, CapabilityFlags> = RolePermission::find()
            .filter(role_permission::Column::RoleId.eq(role_id))
            .filter(role_permission::Column::CategoryId.is_in(category_ids))
            .all(&self.db)
            .await?
            .iter()
            .map(|grant| (grant.category_id, CapabilityFlags::from(grant)))
            .collect();

        Ok(required.iter().all(|requirement| {
            grants.get(&requirement.category_id).is_some_and(|flags| {
                requirement
                    .required_actions
                    .iter()
                    .all(|capability| flags.get(*capability))
            })
        }))
    }

    /// Categories × roles, one cell per pair. Pairs without a grant row get an
    /// empty capability list.
    pub async fn permission_matrix(&self) -> RbacResult<PermissionMatrix> {
        let roles = Role::find()
            .order_by_asc(role::Column::Id)
            .all(&self.db)
            .await?;
        let categories = PermissionCategory::find()
            .order_by_asc(permission_category::Column::Id)
            .all(&self.db)
            .await?;
        let grants: HashMap<(i32, i32), CapabilityFlags> = RolePermission::find()
            .all(&self.db)
            .await?
            .iter()
            .map(|grant| ((grant.role_id, grant.category_id), CapabilityFlags::from(grant)))
            .collect();

        let permission_categories = categories
            .into_iter()
            .map(|category| MatrixRow {
                category_id: category.id,
                cells: roles
                    .iter()
                    .map(|role| MatrixCell {
                        role_id: role.id,
                        role_name: role.name.clone(),
                        capabilities: grants
                            .get(&(role.id, category.id))
                            .map(CapabilityFlags::granted)
                            .unwrap_or_default(),
                    })
                    .collect(),
                category_name: category.name,
            })
            .collect();

        Ok(PermissionMatrix {
            roles: roles.into_iter().map(|role| role.name).collect(),
            permission_categories,
        })
    }

    /// Classify each granted category of a role as full, partial or no
    /// access and derive the tagged effective permissions.
    pub async fn role_access_map(&self, role_id: i32) -> RbacResult<Option<RoleAccessMap>> {
        let Some(role) = Role::find_by_id(role_id).one(&self.db).await? else {
            return Ok(None);
        };
        let rows = self.role_grant_rows(role_id).await?;

        let mut access_levels = AccessLevels::default();
        let mut can_manage_users = false;
        let mut can_configure_system = false;
        let mut can_manage_content = AccessLevel::None;

        for row in &rows {
            let flags = row.flags();
            let level = flags.access_level();
            match level {
                AccessLevel::Full => access_levels.full_access.push(row.category_ref()),
                AccessLevel::None => access_levels.no_access.push(row.category_ref()),
                AccessLevel::Partial => access_levels.partial_access.push(PartialAccess {
                    category: row.category_ref(),
                    granted: flags.granted(),
                    restricted: flags.restricted(),
                }),
            }

            match row.capability_tag.as_deref().and_then(CapabilityTag::from_str) {
                Some(CapabilityTag::UserManagement) => {
                    can_manage_users |= level == AccessLevel::Full;
                }
                Some(CapabilityTag::SystemSettings) => {
                    can_configure_system |= level == AccessLevel::Full;
                }
                Some(CapabilityTag::ContentManagement) => {
                    can_manage_content = match (can_manage_content, level) {
                        (AccessLevel::Full, _) | (_, AccessLevel::Full) => AccessLevel::Full,
                        (AccessLevel::Partial, _) | (_, AccessLevel::Partial) => {
                            AccessLevel::Partial
                        }
                        _ => AccessLevel::None,
                    };
                }
                None => {}
            }
        }

        Ok(Some(RoleAccessMap {
            role_id: role.id,
            role_name: role.name,
            access_levels,
            effective_permissions: EffectivePermissions {
                can_manage_users,
                can_configure_system,
                can_manage_content,
            },
        }))
    }

    /// Per category, the capabilities held by every supplied role, and per
    /// role the capabilities beyond that common set.
    ///
    /// Unknown ids are ignored. A supplied role without a grant on a
    /// category counts as holding nothing there.
    pub async fn compare_roles(&self, role_ids: &[i32]) -> RbacResult<RoleComparison> {
        if role_ids.is_empty() {
            return Err(RbacError::invalid("at least one role id is required"));
        }

        let mut ids = role_ids.to_vec();
        ids.sort_unstable();
        ids.dedup();

        let roles = Role::find()
            .filter(role::Column::Id.is_in(ids.clone()))
            .order_by_asc(role::Column::Id)
            .all(&self.db)
            .await?;
        let rows = grant_rows()
            .filter(role_permission::Column::RoleId.is_in(ids))
            .into_model::<GrantRow>()
            .all(&self.db)
            .await?;

        let mut categories: Vec<(String, i32)> = Vec::new();
        let mut held: HashMap<(i32, i32), BTreeSet<Capability>> = HashMap::new();
        let mut seen = HashSet::new();
        for row in &rows {
            if seen.insert(row.category_id) {
                categories.push((row.category_name.clone(), row.category_id));
            }
            held.insert(
                (row.role_id, row.category_id),
                row.flags().granted().into_iter().collect(),
            );
        }
        categories.sort();

        let empty = BTreeSet::new();
        let mut common_permissions = Vec::new();
        let mut differences: Vec<RoleDifference> = roles
            .iter()
            .map(|role| RoleDifference {
                role_key: format!("role_{}", role.id),
                role_id: role.id,
                role_name: role.name.clone(),
                unique_permissions: Vec::new(),
            })
            .collect();

        for (category_name, category_id) in categories {
            let sets: Vec<&BTreeSet<Capability>> = roles
                .iter()
                .map(|role| held.get(&(role.id, category_id)).unwrap_or(&empty))
                .collect();
            let common: BTreeSet<Capability> = match sets.split_first() {
                Some((first, rest)) => first
                    .iter()
                    .filter(|c| rest.iter().all(|set| set.contains(*c)))
                    .copied()
                    .collect(),
                None => BTreeSet::new(),
            };

            if !common.is_empty() {
                common_permissions.push(CategoryCapabilities {
                    category_id,
                    category_name: category_name.clone(),
                    capabilities: capability_names(&common),
                });
            }

            for (difference, set) in differences.iter_mut().zip(&sets) {
                let unique: BTreeSet<Capability> = set.difference(&common).copied().collect();
                if unique.is_empty() {
                    continue;
                }
                let capabilities = if unique.len() == Capability::all().len() {
                    vec![ALL_SENTINEL.to_string()]
                } else {
                    capability_names(&unique)
                };
                difference.unique_permissions.push(CategoryCapabilities {
                    category_id,
                    category_name: category_name.clone(),
                    capabilities,
                });
            }
        }

        Ok(RoleComparison {
            common_permissions,
            differences,
        })
    }

    /// Group → category tree of a role's grants with an access level per
    /// category
    pub async fn role_permission_tree(
        &self,
        role_id: i32,
    ) -> RbacResult<Option<RolePermissionTree>> {
        let Some(role) = Role::find_by_id(role_id).one(&self.db).await? else {
            return Ok(None);
        };

        let mut groups: Nested<i32, Branch<TreeGroup, i32, TreeCategory>> = Nested::new();
        for row in self.role_grant_rows(role_id).await? {
            let flags = row.flags();
            let group = groups.get_or_insert_with(row.group_id, || {
                Branch::new(TreeGroup {
                    id: row.group_id,
                    name: row.group_name.clone(),
                    code: row.group_code.clone(),
                    categories: Vec::new(),
                })
            });
            group.children.insert_if_absent(row.category_id, || TreeCategory {
                id: row.category_id,
                name: row.category_name.clone(),
                code: row.category_code.clone(),
                access_level: flags.access_level(),
                permissions: flags.granted(),
            });
        }

        let permission_tree = groups
            .into_vec()
            .into_iter()
            .map(|branch| TreeGroup {
                categories: branch.children.into_vec(),
                ..branch.node
            })
            .collect();

        Ok(Some(RolePermissionTree {
            role_id: role.id,
            role_name: role.name,
            permission_tree,
        }))
    }

    /// Grants of a role that allow a capability their category does not
    /// permit.
    pub async fn find_invalid_grants(&self, role_id: i32) -> RbacResult<Vec<InvalidGrant>> {
        Ok(self
            .role_grant_rows(role_id)
            .await?
            .into_iter()
            .filter_map(|row| {
                let violations = row.flags().violations(&row.permittable());
                (!violations.is_empty()).then(|| InvalidGrant {
                    category: row.category_ref(),
                    group_name: row.group_name.clone(),
                    violations,
                })
            })
            .collect())
    }

    /// Pairs of distinct granted categories (lower id first) where at least
    /// one side grants a capability its category does not permit.
    pub async fn find_conflicting_permissions(
        &self,
        role_id: i32,
    ) -> RbacResult<Vec<ConflictingPermission>> {
        let mut rows = self.role_grant_rows(role_id).await?;
        rows.sort_by_key(|row| row.category_id);
        let violations: Vec<Vec<Capability>> = rows
            .iter()
            .map(|row| row.flags().violations(&row.permittable()))
            .collect();

        let mut conflicts = Vec::new();
        for (i, first) in rows.iter().enumerate() {
            for (j, second) in rows.iter().enumerate().skip(i + 1) {
                if first.category_id == second.category_id {
                    continue;
                }
                if violations[i].is_empty() && violations[j].is_empty() {
                    continue;
                }
                conflicts.push(ConflictingPermission {
                    category1: first.category_ref(),
                    group1: first.group_name.clone(),
                    category2: second.category_ref(),
                    group2: second.group_name.clone(),
                    violations1: violations[i].clone(),
                    violations2: violations[j].clone(),
                });
            }
        }

        debug!(role_id, conflicts = conflicts.len(), "conflict scan finished");
        Ok(conflicts)
    }

    /// Categories that permit at least one capability but have no grant row
    /// for the role at all.
    pub async fn find_missing_permissions(
        &self,
        role_id: i32,
    ) -> RbacResult<Vec<MissingPermission>> {
        if Role::find_by_id(role_id).one(&self.db).await?.is_none() {
            return Ok(Vec::new());
        }

        let granted: HashSet<i32> = RolePermission::find()
            .filter(role_permission::Column::RoleId.eq(role_id))
            .all(&self.db)
            .await?
            .into_iter()
            .map(|grant| grant.category_id)
            .collect();

        let categories = PermissionCategory::find()
            .order_by_asc(permission_category::Column::Id)
            .all(&self.db)
            .await?;

        Ok(categories
            .into_iter()
            .filter(|category| !granted.contains(&category.id))
            .filter_map(|category| {
                let permittable = CapabilityFlags::new(
                    category.enable_view,
                    category.enable_add,
                    category.enable_edit,
                    category.enable_delete,
                );
                permittable.any().then(|| MissingPermission {
                    category_id: category.id,
                    category_name: category.name,
                    permittable,
                })
            })
            .collect())
    }

    /// Every other category reachable through the "same group" relation.
    pub async fn permission_dependencies(
        &self,
        category_id: i32,
    ) -> RbacResult<Option<PermissionDependencies>> {
        let categories = PermissionCategory::find()
            .order_by_asc(permission_category::Column::Id)
            .all(&self.db)
            .await?;
        let Some(root) = categories.iter().find(|c| c.id == category_id) else {
            return Ok(None);
        };

        let mut reached: HashSet<i32> = HashSet::from([root.id]);
        let mut frontier = vec![root];
        while let Some(current) = frontier.pop() {
            for candidate in &categories {
                if candidate.group_id == current.group_id && reached.insert(candidate.id) {
                    frontier.push(candidate);
                }
            }
        }

        let depends_on = categories
            .iter()
            .filter(|c| c.id != root.id && reached.contains(&c.id))
            .map(|c| CategoryRef {
                id: c.id,
                name: c.name.clone(),
                code: c.short_code.clone(),
            })
            .collect();

        Ok(Some(PermissionDependencies {
            category_id: root.id,
            category_name: root.name.clone(),
            depends_on,
        }))
    }

    /// Per-capability totals and coverage counts for a role
    pub async fn role_access_summary(
        &self,
        role_id: i32,
    ) -> RbacResult<Option<RoleAccessSummary>> {
        let Some(role) = Role::find_by_id(role_id).one(&self.db).await? else {
            return Ok(None);
        };
        let rows = self.role_grant_rows(role_id).await?;

        let groups: HashSet<i32> = rows.iter().map(|row| row.group_id).collect();
        let categories: HashSet<i32> = rows.iter().map(|row| row.category_id).collect();
        let count = |capability: Capability| {
            rows.iter().filter(|row| row.flags().get(capability)).count() as u64
        };

        Ok(Some(RoleAccessSummary {
            role_id: role.id,
            role_name: role.name,
            total_groups_accessed: groups.len() as u64,
            total_categories_accessed: categories.len() as u64,
            total_view_permissions: count(Capability::View),
            total_add_permissions: count(Capability::Add),
            total_edit_permissions: count(Capability::Edit),
            total_delete_permissions: count(Capability::Delete),
            full_access_count: rows
                .iter()
                .filter(|row| row.flags().access_level() == AccessLevel::Full)
                .count() as u64,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::*;
    use serde_json::json;

    struct Fixture {
        service: PermissionService,
        admin: i32,
        editor: i32,
        users: i32,
        settings: i32,
        posts: i32,
        reports: i32,
    }

    /// Two groups, four categories, two roles with overlapping grants.
    async fn fixture() -> Fixture {
        let db = setup_db().await;
        let system = insert_group(&db, "system").await;
        let content = insert_group(&db, "content").await;
        let users = insert_category(
            &db,
            system.id,
            "User Accounts",
            CapabilityFlags::ALL,
            Some("user_management"),
        )
        .await;
        let settings = insert_category(
            &db,
            system.id,
            "Settings",
            flags(true, false, true, false),
            Some("system_settings"),
        )
        .await;
        let posts = insert_category(
            &db,
            content.id,
            "Posts",
            CapabilityFlags::ALL,
            Some("content_management"),
        )
        .await;
        let reports = insert_category(&db, content.id, "Reports", flags(true, false, false, false), None).await;

        let admin = insert_role(&db, "admin").await;
        let editor = insert_role(&db, "editor").await;

        insert_grant(&db, admin.id, users.id, CapabilityFlags::ALL).await;
        insert_grant(&db, admin.id, settings.id, flags(true, false, true, false)).await;
        insert_grant(&db, admin.id, posts.id, CapabilityFlags::ALL).await;
        insert_grant(&db, editor.id, posts.id, flags(true, true, false, false)).await;
        insert_grant(&db, editor.id, reports.id, CapabilityFlags::NONE).await;

        Fixture {
            service: PermissionService::new(db),
            admin: admin.id,
            editor: editor.id,
            users: users.id,
            settings: settings.id,
            posts: posts.id,
            reports: reports.id,
        }
    }

    #[tokio::test]
    async fn combined_listing_is_ordered_and_filterable() {
        let f = fixture().await;

        let all = f.service.combined_permissions(PermissionFilter::default()).await.unwrap();
        let keys: Vec<(i32, i32)> = all.iter().map(|p| (p.category_id, p.role_id)).collect();
        assert_eq!(
            keys,
            vec![
                (f.users, f.admin),
                (f.settings, f.admin),
                (f.posts, f.admin),
                (f.posts, f.editor),
                (f.reports, f.editor),
            ]
        );

        let editor_only = f
            .service
            .combined_permissions(PermissionFilter {
                role_id: Some(f.editor),
                ..Default::default()
            })
            .await
            .unwrap();
        assert_eq!(editor_only.len(), 2);
        assert!(editor_only.iter().all(|p| p.role_name == "editor"));
    }

    #[test]
    fn search_input_is_validated_before_querying() {
        assert!(SearchCriteria::parse(Some(&json!("admin")), None).is_err());
        assert!(SearchCriteria::parse(Some(&json!({ "role_name": 3 })), None).is_err());
        assert!(SearchCriteria::parse(Some(&json!({ "has_permissions": [] })), None).is_err());
        assert!(
            SearchCriteria::parse(Some(&json!({ "has_permissions": { "can_fly": true } })), None)
                .is_err()
        );
        assert!(SearchCriteria::parse(None, Some(&json!({ "field": "id" }))).is_err());
        assert!(
            SearchCriteria::parse(None, Some(&json!({ "field": "role_name", "order": "up" })))
                .is_err()
        );
        assert!(SearchCriteria::parse(None, Some(&json!(["role_name"]))).is_err());

        let parsed = SearchCriteria::parse(
            Some(&json!({ "has_permissions": { "can_edit": true, "can_view": false } })),
            Some(&json!({ "field": "role_name", "order": "desc" })),
        )
        .unwrap();
        assert_eq!(parsed.has_permissions, vec![Capability::Edit]);
        assert_eq!(parsed.sort, Some((SortField::RoleName, Order::Desc)));
    }

    #[tokio::test]
    async fn search_applies_filters_and_sort() {
        let f = fixture().await;

        let deletable = f
            .service
            .search_permissions(
                Some(&json!({ "has_permissions": { "can_delete": true } })),
                Some(&json!({ "field": "permission_category_name", "order": "DESC" })),
            )
            .await
            .unwrap();
        let names: Vec<&str> = deletable.iter().map(|p| p.category_name.as_str()).collect();
        assert_eq!(names, vec!["User Accounts", "Posts"]);

        let content = f
            .service
            .search_permissions(
                Some(&json!({ "role_name": "edi", "permission_group_code": "content" })),
                None,
            )
            .await
            .unwrap();
        assert_eq!(content.len(), 2);

        let err = f
            .service
            .search_permissions(None, Some(&json!({ "field": "role_name; DROP TABLE roles" })))
            .await
            .unwrap_err();
        assert_eq!(err.code(), "INVALID_ARGUMENT");
    }

    #[tokio::test]
    async fn statistics_count_grants_per_role_and_category() {
        let f = fixture().await;
        let stats = f.service.statistics().await.unwrap();

        assert_eq!(stats.total_roles, 2);
        assert_eq!(stats.total_permission_groups, 2);
        assert_eq!(stats.total_permission_categories, 4);
        assert_eq!(stats.permissions_per_role[0].grant_count, 3);
        assert_eq!(stats.permissions_per_role[1].grant_count, 2);
        assert_eq!(stats.most_used_permissions[0].category_id, f.posts);
        assert_eq!(stats.most_used_permissions[0].grant_count, 2);
        assert!(stats.most_used_permissions.len() <= 5);
    }

    #[tokio::test]
    async fn validation_requires_every_listed_capability() {
        let f = fixture().await;
        let requirement = |category_id, required_actions| RequiredPermission {
            category_id,
            required_actions,
        };

        assert!(f
            .service
            .validate_role_permissions(
                f.editor,
                &[requirement(f.posts, vec![Capability::View, Capability::Add])]
            )
            .await
            .unwrap());
        assert!(!f
            .service
            .validate_role_permissions(f.editor, &[requirement(f.posts, vec![Capability::Edit])])
            .await
            .unwrap());
        assert!(!f
            .service
            .validate_role_permissions(f.editor, &[requirement(f.users, vec![Capability::View])])
            .await
            .unwrap());
        assert!(!f.service.validate_role_permissions(999, &[]).await.unwrap());
    }

    #[tokio::test]
    async fn matrix_has_one_cell_per_role_and_category() {
        let f = fixture().await;
        let matrix = f.service.permission_matrix().await.unwrap();

        assert_eq!(matrix.roles, vec!["admin", "editor"]);
        assert_eq!(matrix.permission_categories.len(), 4);
        for row in &matrix.permission_categories {
            let roles: Vec<i32> = row.cells.iter().map(|c| c.role_id).collect();
            assert_eq!(roles, vec![f.admin, f.editor]);
        }

        let users_row = &matrix.permission_categories[0];
        assert_eq!(users_row.cells[0].capabilities, Capability::all());
        assert!(users_row.cells[1].capabilities.is_empty());
    }

    #[tokio::test]
    async fn access_map_classifies_each_category_once() {
        let f = fixture().await;

        let admin = f.service.role_access_map(f.admin).await.unwrap().unwrap();
        assert_eq!(admin.access_levels.full_access.len(), 2);
        assert_eq!(admin.access_levels.partial_access.len(), 1);
        assert!(admin.access_levels.no_access.is_empty());
        assert!(admin.effective_permissions.can_manage_users);
        assert!(!admin.effective_permissions.can_configure_system);
        assert_eq!(admin.effective_permissions.can_manage_content, AccessLevel::Full);

        let editor = f.service.role_access_map(f.editor).await.unwrap().unwrap();
        let mut classified: Vec<i32> = editor
            .access_levels
            .full_access
            .iter()
            .chain(&editor.access_levels.no_access)
            .map(|c| c.id)
            .chain(editor.access_levels.partial_access.iter().map(|p| p.category.id))
            .collect();
        classified.sort_unstable();
        assert_eq!(classified, vec![f.posts, f.reports]);
        let partial = &editor.access_levels.partial_access[0];
        assert_eq!(partial.granted, vec![Capability::View, Capability::Add]);
        assert_eq!(partial.restricted, vec![Capability::Edit, Capability::Delete]);
        assert_eq!(editor.effective_permissions.can_manage_content, AccessLevel::Partial);
        assert!(!editor.effective_permissions.can_manage_users);

        assert!(f.service.role_access_map(999).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn comparison_common_set_ignores_input_order() {
        let f = fixture().await;

        let forward = f.service.compare_roles(&[f.admin, f.editor]).await.unwrap();
        let backward = f.service.compare_roles(&[f.editor, f.admin]).await.unwrap();
        assert_eq!(forward.common_permissions, backward.common_permissions);

        assert_eq!(forward.common_permissions.len(), 1);
        assert_eq!(forward.common_permissions[0].category_id, f.posts);
        assert_eq!(forward.common_permissions[0].capabilities, vec!["view", "add"]);

        let admin = &forward.differences[0];
        assert_eq!(admin.role_key, format!("role_{}", f.admin));
        let admin_users = admin
            .unique_permissions
            .iter()
            .find(|u| u.category_id == f.users)
            .unwrap();
        assert_eq!(admin_users.capabilities, vec!["all"]);
        let admin_posts = admin
            .unique_permissions
            .iter()
            .find(|u| u.category_id == f.posts)
            .unwrap();
        assert_eq!(admin_posts.capabilities, vec!["edit", "delete"]);

        assert!(f.service.compare_roles(&[]).await.is_err());
    }

    #[tokio::test]
    async fn tree_annotates_access_levels() {
        let f = fixture().await;
        let tree = f.service.role_permission_tree(f.editor).await.unwrap().unwrap();

        assert_eq!(tree.permission_tree.len(), 1);
        let content = &tree.permission_tree[0];
        assert_eq!(content.code, "content");
        let levels: Vec<AccessLevel> = content.categories.iter().map(|c| c.access_level).collect();
        assert_eq!(levels, vec![AccessLevel::Partial, AccessLevel::None]);
    }

    #[tokio::test]
    async fn conflicts_flag_grants_beyond_enabled_capabilities() {
        let f = fixture().await;
        assert!(f.service.find_conflicting_permissions(f.admin).await.unwrap().is_empty());

        let db = f.service.get_db();
        let rogue = insert_role(db, "rogue").await;
        insert_grant(db, rogue.id, f.reports, flags(true, true, false, false)).await;
        insert_grant(db, rogue.id, f.posts, flags(true, false, false, false)).await;

        let conflicts = f.service.find_conflicting_permissions(rogue.id).await.unwrap();
        assert_eq!(conflicts.len(), 1);
        assert_eq!(conflicts[0].category1.id, f.posts);
        assert_eq!(conflicts[0].category2.id, f.reports);
        assert!(conflicts[0].violations1.is_empty());
        assert_eq!(conflicts[0].violations2, vec![Capability::Add]);

        let invalid = f.service.find_invalid_grants(rogue.id).await.unwrap();
        assert_eq!(invalid.len(), 1);
        assert_eq!(invalid[0].category.id, f.reports);
    }

    #[tokio::test]
    async fn missing_permissions_skip_granted_and_unpermittable() {
        let f = fixture().await;
        let db = f.service.get_db();
        let system = PermissionGroup::find().one(db).await.unwrap().unwrap();
        insert_category(db, system.id, "Audit", CapabilityFlags::NONE, None).await;

        let missing = f.service.find_missing_permissions(f.editor).await.unwrap();
        let ids: Vec<i32> = missing.iter().map(|m| m.category_id).collect();
        assert_eq!(ids, vec![f.users, f.settings]);

        assert!(f.service.find_missing_permissions(999).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn dependencies_cover_the_rest_of_the_group() {
        let f = fixture().await;
        let deps = f.service.permission_dependencies(f.users).await.unwrap().unwrap();
        let ids: Vec<i32> = deps.depends_on.iter().map(|c| c.id).collect();
        assert_eq!(ids, vec![f.settings]);

        assert!(f.service.permission_dependencies(999).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn access_summary_totals_capabilities() {
        let f = fixture().await;
        let summary = f.service.role_access_summary(f.admin).await.unwrap().unwrap();

        assert_eq!(summary.total_groups_accessed, 2);
        assert_eq!(summary.total_categories_accessed, 3);
        assert_eq!(summary.total_view_permissions, 3);
        assert_eq!(summary.total_add_permissions, 2);
        assert_eq!(summary.total_edit_permissions, 3);
        assert_eq!(summary.full_access_count, 2);

        assert!(f.service.role_access_summary(999).await.unwrap().is_none());
    }
}
