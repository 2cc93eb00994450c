//! `SeaORM` Entity, Permission Group

use sea_orm::entity::prelude::*;

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Eq)]
#[sea_orm(table_name = "permission_group")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i32,
    pub name: String,
    #[sea_orm(unique)]
    pub short_code: String,
    pub description: Option<String>,
    pub is_active: bool,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(has_many = "super::permission_category::Entity")]
    PermissionCategory,
    #[sea_orm(has_many = "super::sidebar_menu::Entity")]
    SidebarMenu,
}

impl Related<super::permission_category::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::PermissionCategory.def()
    }
}

impl Related<super::sidebar_menu::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::SidebarMenu.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
