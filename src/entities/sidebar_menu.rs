//! `SeaORM` Entity, Sidebar Menu

use sea_orm::entity::prelude::*;

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Eq)]
#[sea_orm(table_name = "sidebar_menus")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i32,
    pub name: String,
    pub icon: Option<String>,
    pub route_path: Option<String>,
    pub display_order: i32,
    pub is_active: bool,
    pub permission_group_id: Option<i32>,
    pub permission_category_id: Option<i32>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::permission_group::Entity",
        from = "Column::PermissionGroupId",
        to = "super::permission_group::Column::Id",
        on_delete = "SetNull"
    )]
    PermissionGroup,
    #[sea_orm(
        belongs_to = "super::permission_category::Entity",
        from = "Column::PermissionCategoryId",
        to = "super::permission_category::Column::Id",
        on_delete = "SetNull"
    )]
    PermissionCategory,
    #[sea_orm(has_many = "super::sidebar_sub_menu::Entity")]
    SidebarSubMenu,
}

impl Related<super::permission_group::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::PermissionGroup.def()
    }
}

impl Related<super::permission_category::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::PermissionCategory.def()
    }
}

impl Related<super::sidebar_sub_menu::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::SidebarSubMenu.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
