//! `SeaORM` Entity, Permission Category
//!
//! The `enable_*` flags declare which capabilities may be granted on the
//! category at all. `capability_tag` is a stable marker used to derive the
//! effective permissions of a role (see `services::capability::CapabilityTag`).

use sea_orm::entity::prelude::*;

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Eq)]
#[sea_orm(table_name = "permission_category")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i32,
    #[sea_orm(column_name = "perm_group_id")]
    pub group_id: i32,
    pub name: String,
    #[sea_orm(unique)]
    pub short_code: String,
    pub capability_tag: Option<String>,
    pub enable_view: bool,
    pub enable_add: bool,
    pub enable_edit: bool,
    pub enable_delete: bool,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::permission_group::Entity",
        from = "Column::GroupId",
        to = "super::permission_group::Column::Id",
        on_delete = "Cascade"
    )]
    PermissionGroup,
    #[sea_orm(has_many = "super::role_permission::Entity")]
    RolePermission,
    #[sea_orm(has_many = "super::sidebar_menu::Entity")]
    SidebarMenu,
    #[sea_orm(has_many = "super::sidebar_sub_menu::Entity")]
    SidebarSubMenu,
}

impl Related<super::permission_group::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::PermissionGroup.def()
    }
}

impl Related<super::role_permission::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::RolePermission.def()
    }
}

impl Related<super::sidebar_menu::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::SidebarMenu.def()
    }
}

impl Related<super::sidebar_sub_menu::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::SidebarSubMenu.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
