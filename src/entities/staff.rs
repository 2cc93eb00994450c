//! `SeaORM` Entity, Staff member

use sea_orm::entity::prelude::*;

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Eq)]
#[sea_orm(table_name = "staff")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i32,
    pub name: String,
    #[sea_orm(unique)]
    pub email: String,
    pub is_active: bool,
    pub is_superadmin: bool,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(has_many = "super::staff_role::Entity")]
    StaffRole,
}

impl Related<super::staff_role::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::StaffRole.def()
    }
}

impl Related<super::role::Entity> for Entity {
    fn to() -> RelationDef {
        super::staff_role::Relation::Role.def()
    }

    fn via() -> Option<RelationDef> {
        Some(super::staff_role::Relation::Staff.def().rev())
    }
}

impl ActiveModelBehavior for ActiveModel {}
