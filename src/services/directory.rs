use std::collections::HashSet;

use sea_orm::{
    ColumnTrait, DatabaseConnection, EntityTrait, FromQueryResult, JoinType, PaginatorTrait,
    QueryFilter, QueryOrder, QuerySelect, RelationTrait, Select,
};
use tracing::debug;

use crate::entities::{
    permission_category, permission_group, permission_template, prelude::*, role,
    role_permission, sidebar_menu, sidebar_sub_menu, staff, staff_role,
};
use crate::error::RbacResult;
use crate::graphql::types::{
    GrantedCategory, GroupGrants, MenuLink, PermissionGroup as PermissionGroupView,
    PermissionTemplate as PermissionTemplateView, RoleDetail, RoleGrant, RoleSummaryRef,
    RoleWithGrants, StaffDetail, SubMenuLink, SuperadminOverview, SuperadminStaff,
};
use crate::services::capability::CapabilityFlags;
use crate::services::flatten::{Branch, Nested};
use crate::services::permission::{GrantRow, grant_rows};

/// One row of the staff → role → grant → category → group left-join chain.
/// Everything past the staff columns may be absent.
#[derive(Debug, Clone, FromQueryResult)]
struct StaffRow {
    staff_id: i32,
    staff_name: String,
    email: String,
    staff_active: bool,
    role_id: Option<i32>,
    role_name: Option<String>,
    role_description: Option<String>,
    category_id: Option<i32>,
    category_name: Option<String>,
    category_code: Option<String>,
    group_id: Option<i32>,
    group_name: Option<String>,
    can_view: Option<bool>,
    can_add: Option<bool>,
    can_edit: Option<bool>,
    can_delete: Option<bool>,
}

impl StaffRow {
    fn role(&self) -> Option<RoleWithGrants> {
        Some(RoleWithGrants {
            id: self.role_id?,
            name: self.role_name.clone()?,
            description: self.role_description.clone(),
            permissions: Vec::new(),
        })
    }

    fn grant(&self) -> Option<RoleGrant> {
        Some(RoleGrant {
            category_id: self.category_id?,
            category_name: self.category_name.clone()?,
            category_code: self.category_code.clone()?,
            group_id: self.group_id?,
            group_name: self.group_name.clone()?,
            permissions: CapabilityFlags::new(
                self.can_view.unwrap_or(false),
                self.can_add.unwrap_or(false),
                self.can_edit.unwrap_or(false),
                self.can_delete.unwrap_or(false),
            ),
        })
    }

}

/// Categories and groups the folded grants allow viewing.
#[derive(Debug, Default)]
struct MenuScope {
    categories: HashSet<i32>,
    groups: HashSet<i32>,
}

impl MenuScope {
    fn from_rows(rows: &[StaffRow]) -> Self {
        let mut scope = MenuScope::default();
        for row in rows.iter().filter(|row| row.can_view == Some(true)) {
            if let Some(category_id) = row.category_id {
                scope.categories.insert(category_id);
            }
            if let Some(group_id) = row.group_id {
                scope.groups.insert(group_id);
            }
        }
        scope
    }

    /// A menu is gated by its category, or failing that by its group.
    /// Ungated menus are not reachable through a grant.
    fn allows_menu(&self, menu: &sidebar_menu::Model) -> bool {
        match (menu.permission_category_id, menu.permission_group_id) {
            (Some(category_id), _) => self.categories.contains(&category_id),
            (None, Some(group_id)) => self.groups.contains(&group_id),
            (None, None) => false,
        }
    }

    /// Submenus without a gate of their own inherit the menu's.
    fn allows_sub_menu(&self, sub_menu: &sidebar_sub_menu::Model) -> bool {
        sub_menu
            .permission_category_id
            .is_none_or(|category_id| self.categories.contains(&category_id))
    }
}

fn staff_rows() -> Select<Staff> {
    Staff::find()
        .select_only()
        .column_as(staff::Column::Id, "staff_id")
        .column_as(staff::Column::Name, "staff_name")
        .column(staff::Column::Email)
        .column_as(staff::Column::IsActive, "staff_active")
        .column_as(role::Column::Id, "role_id")
        .column_as(role::Column::Name, "role_name")
        .column_as(role::Column::Description, "role_description")
        .column_as(permission_category::Column::Id, "category_id")
        .column_as(permission_category::Column::Name, "category_name")
        .column_as(permission_category::Column::ShortCode, "category_code")
        .column_as(permission_group::Column::Id, "group_id")
        .column_as(permission_group::Column::Name, "group_name")
        .column(role_permission::Column::CanView)
        .column(role_permission::Column::CanAdd)
        .column(role_permission::Column::CanEdit)
        .column(role_permission::Column::CanDelete)
        .join(JoinType::LeftJoin, staff::Relation::StaffRole.def())
        .join(JoinType::LeftJoin, staff_role::Relation::Role.def())
        .join(JoinType::LeftJoin, role::Relation::RolePermission.def())
        .join(JoinType::LeftJoin, role_permission::Relation::PermissionCategory.def())
        .join(JoinType::LeftJoin, permission_category::Relation::PermissionGroup.def())
        .order_by_asc(staff::Column::Id)
        .order_by_asc(role::Column::Id)
        .order_by_asc(permission_category::Column::Id)
}

type RoleTree = Nested<i32, Branch<RoleWithGrants, i32, RoleGrant>>;

fn fold_role(roles: &mut RoleTree, row: &StaffRow) {
    let Some(role_id) = row.role_id else {
        return;
    };
    let Some(role) = row.role() else {
        return;
    };
    let branch = roles.get_or_insert_with(role_id, || Branch::new(role));
    if let Some(grant) = row.grant() {
        branch.children.insert_if_absent(grant.category_id, || grant);
    }
}

fn finish_roles(roles: RoleTree) -> Vec<RoleWithGrants> {
    roles
        .into_vec()
        .into_iter()
        .map(|branch| RoleWithGrants {
            permissions: branch.children.into_vec(),
            ..branch.node
        })
        .collect()
}

fn menu_link(menu: sidebar_menu::Model, sub_menus: Vec<sidebar_sub_menu::Model>) -> MenuLink {
    MenuLink {
        id: menu.id,
        name: menu.name,
        route_path: menu.route_path,
        sub_menus: sub_menus
            .into_iter()
            .map(|sub_menu| SubMenuLink {
                id: sub_menu.id,
                name: sub_menu.name,
                route_path: sub_menu.route_path,
            })
            .collect(),
    }
}

/// Multi-table staff, role and system views assembled from flat joins.
#[derive(Clone)]
pub struct DirectoryService {
    db: DatabaseConnection,
}

impl DirectoryService {
    pub fn new(db: DatabaseConnection) -> Self {
        Self { db }
    }

    pub fn get_db(&self) -> &DatabaseConnection {
        &self.db
    }

    /// Active menus and submenus the scope can view, in display order.
    async fn visible_menus(&self, scope: &MenuScope) -> RbacResult<Vec<MenuLink>> {
        if scope.categories.is_empty() {
            return Ok(Vec::new());
        }

        let mut menus = SidebarMenu::find()
            .filter(sidebar_menu::Column::IsActive.eq(true))
            .find_with_related(SidebarSubMenu)
            .all(&self.db)
            .await?;
        menus.retain(|(menu, _)| scope.allows_menu(menu));
        menus.sort_by_key(|(menu, _)| (menu.display_order, menu.id));

        Ok(menus
            .into_iter()
            .map(|(menu, mut sub_menus)| {
                sub_menus.retain(|sub| sub.is_active && scope.allows_sub_menu(sub));
                sub_menus.sort_by_key(|sub| (sub.display_order, sub.id));
                menu_link(menu, sub_menus)
            })
            .collect())
    }

    /// Get a staff member with their roles, each role's grants and the menus
    /// those grants make visible
    pub async fn staff_full_detail(&self, staff_id: i32) -> RbacResult<Option<StaffDetail>> {
        let rows = staff_rows()
            .filter(staff::Column::Id.eq(staff_id))
            .into_model::<StaffRow>()
            .all(&self.db)
            .await?;
        debug!(staff_id, rows = rows.len(), "staff detail rows loaded");

        let Some(first) = rows.first() else {
            return Ok(None);
        };
        let mut detail = StaffDetail {
            id: first.staff_id,
            name: first.staff_name.clone(),
            email: first.email.clone(),
            is_active: first.staff_active,
            roles: Vec::new(),
            menus: Vec::new(),
        };

        let mut roles = RoleTree::new();
        for row in &rows {
            fold_role(&mut roles, row);
        }

        detail.roles = finish_roles(roles);
        detail.menus = self.visible_menus(&MenuScope::from_rows(&rows)).await?;
        Ok(Some(detail))
    }

    /// Get a role with its grants grouped by permission group and the number
    /// of staff assigned to it
    pub async fn role_full_detail(&self, role_id: i32) -> RbacResult<Option<RoleDetail>> {
        let Some(role) = Role::find_by_id(role_id).one(&self.db).await? else {
            return Ok(None);
        };

        let assigned_staff_count = StaffRole::find()
            .filter(staff_role::Column::RoleId.eq(role_id))
            .count(&self.db)
            .await?;

        let rows = grant_rows()
            .filter(role_permission::Column::RoleId.eq(role_id))
            .order_by_asc(permission_group::Column::Id)
            .order_by_asc(permission_category::Column::Id)
            .into_model::<GrantRow>()
            .all(&self.db)
            .await?;

        let mut groups: Nested<i32, Branch<GroupGrants, i32, GrantedCategory>> = Nested::new();
        for row in &rows {
            let branch = groups.get_or_insert_with(row.group_id, || {
                Branch::new(GroupGrants {
                    id: row.group_id,
                    name: row.group_name.clone(),
                    code: row.group_code.clone(),
                    categories: Vec::new(),
                })
            });
            branch.children.insert_if_absent(row.category_id, || GrantedCategory {
                id: row.category_id,
                name: row.category_name.clone(),
                code: row.category_code.clone(),
                permissions: row.flags(),
            });
        }

        Ok(Some(RoleDetail {
            role: role.into(),
            assigned_staff_count,
            permission_groups: groups
                .into_vec()
                .into_iter()
                .map(|branch| GroupGrants {
                    categories: branch.children.into_vec(),
                    ..branch.node
                })
                .collect(),
        }))
    }

    /// Everything reachable from superadmin staff plus all templates.
    /// `None` when no staff member is flagged superadmin.
    pub async fn superadmin_overview(&self) -> RbacResult<Option<SuperadminOverview>> {
        let rows = staff_rows()
            .filter(staff::Column::IsSuperadmin.eq(true))
            .into_model::<StaffRow>()
            .all(&self.db)
            .await?;
        if rows.is_empty() {
            return Ok(None);
        }

        let mut staff_members: Nested<i32, Branch<SuperadminStaff, i32, RoleSummaryRef>> =
            Nested::new();
        let mut roles = RoleTree::new();
        let mut group_ids: Nested<i32, i32> = Nested::new();

        for row in &rows {
            let member = staff_members.get_or_insert_with(row.staff_id, || {
                Branch::new(SuperadminStaff {
                    id: row.staff_id,
                    name: row.staff_name.clone(),
                    email: row.email.clone(),
                    roles: Vec::new(),
                })
            });
            if let (Some(id), Some(name)) = (row.role_id, &row.role_name) {
                member.children.insert_if_absent(id, || RoleSummaryRef {
                    id,
                    name: name.clone(),
                });
            }
            if let Some(group_id) = row.group_id {
                group_ids.insert_if_absent(group_id, || group_id);
            }
            fold_role(&mut roles, row);
        }
        let menus = self.visible_menus(&MenuScope::from_rows(&rows)).await?;

        let permission_groups = PermissionGroup::find()
            .filter(permission_group::Column::Id.is_in(group_ids.into_vec()))
            .order_by_asc(permission_group::Column::Id)
            .all(&self.db)
            .await?
            .into_iter()
            .map(PermissionGroupView::from)
            .collect();

        let templates = PermissionTemplate::find()
            .order_by_asc(permission_template::Column::Name)
            .all(&self.db)
            .await?
            .into_iter()
            .map(PermissionTemplateView::try_from)
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Some(SuperadminOverview {
            staff_members: staff_members
                .into_vec()
                .into_iter()
                .map(|branch| SuperadminStaff {
                    roles: branch.children.into_vec(),
                    ..branch.node
                })
                .collect(),
            roles: finish_roles(roles),
            permission_groups,
            menus,
            templates,
        }))
    }
}
