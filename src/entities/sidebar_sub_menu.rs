//! `SeaORM` Entity, Sidebar Sub Menu
//!
//! `menu_id` is the only link to the parent menu.

use sea_orm::entity::prelude::*;

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Eq)]
#[sea_orm(table_name = "sidebar_sub_menus")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i32,
    pub menu_id: i32,
    pub name: String,
    pub icon: Option<String>,
    pub route_path: Option<String>,
    pub display_order: i32,
    pub is_active: bool,
    pub permission_category_id: Option<i32>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::sidebar_menu::Entity",
        from = "Column::MenuId",
        to = "super::sidebar_menu::Column::Id",
        on_delete = "Cascade"
    )]
    SidebarMenu,
    #[sea_orm(
        belongs_to = "super::permission_category::Entity",
        from = "Column::PermissionCategoryId",
        to = "super::permission_category::Column::Id",
        on_delete = "SetNull"
    )]
    PermissionCategory,
}

impl Related<super::sidebar_menu::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::SidebarMenu.def()
    }
}

impl Related<super::permission_category::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::PermissionCategory.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
