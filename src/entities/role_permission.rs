//! `SeaORM` Entity, Role-Permission grant (one row per role and category)

use sea_orm::entity::prelude::*;

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Eq)]
#[sea_orm(table_name = "roles_permissions")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i32,
    pub role_id: i32,
    #[sea_orm(column_name = "perm_cat_id")]
    pub category_id: i32,
    pub can_view: bool,
    pub can_add: bool,
    pub can_edit: bool,
    pub can_delete: bool,
    pub created_at: DateTimeWithTimeZone,
    pub updated_at: DateTimeWithTimeZone,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::role::Entity",
        from = "Column::RoleId",
        to = "super::role::Column::Id",
        on_delete = "Cascade"
    )]
    Role,
    #[sea_orm(
        belongs_to = "super::permission_category::Entity",
        from = "Column::CategoryId",
        to = "super::permission_category::Column::Id",
        on_delete = "Cascade"
    )]
    PermissionCategory,
}

impl Related<super::role::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Role.def()
    }
}

impl Related<super::permission_category::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::PermissionCategory.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
