//! `SeaORM` Entity, immutable Template Version snapshot

use sea_orm::entity::prelude::*;

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Eq)]
#[sea_orm(table_name = "role_permission_template_versions")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub version_id: i32,
    pub template_name: String,
    pub permissions: Json,
    pub created_at: DateTimeWithTimeZone,
    pub created_by: String,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::permission_template::Entity",
        from = "Column::TemplateName",
        to = "super::permission_template::Column::Name",
        on_delete = "Cascade"
    )]
    PermissionTemplate,
}

impl Related<super::permission_template::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::PermissionTemplate.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
