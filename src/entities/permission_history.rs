//! `SeaORM` Entity, append-only Role Permission History
//!
//! Rows outlive the role and category they describe, so there are no
//! foreign keys; reports join through ad hoc relations.

use sea_orm::entity::prelude::*;

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Eq)]
#[sea_orm(table_name = "role_permission_history")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i32,
    pub role_id: i32,
    pub category_id: i32,
    /// `{ "before": flags | null, "after": flags | null }`
    pub changes: Json,
    pub changed_by: String,
    pub changed_at: DateTimeWithTimeZone,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
