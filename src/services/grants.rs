//! Grant-set primitives shared by the mutation services. Every function
//! takes the connection to run on so callers can compose them inside one
//! transaction.

use std::collections::HashMap;

use chrono::Utc;
use sea_orm::entity::prelude::DateTimeWithTimeZone;
use sea_orm::sea_query::Expr;
use sea_orm::{ColumnTrait, ConnectionTrait, EntityTrait, QueryFilter, QueryOrder, Set};

use crate::entities::{prelude::*, role, role_permission};
use crate::error::{RbacError, RbacResult};
use crate::services::capability::CapabilityFlags;

pub(crate) type GrantMap = HashMap<i32, CapabilityFlags>;

/// Role that an operation depends on; absence is a precondition failure.
pub(crate) async fn require_role<C: ConnectionTrait>(conn: &C, role_id: i32) -> RbacResult<role::Model> {
    Role::find_by_id(role_id)
        .one(conn)
        .await?
        .ok_or_else(|| RbacError::conflict(format!("role {role_id} does not exist")))
}

pub(crate) async fn load_grants<C: ConnectionTrait>(
    conn: &C,
    role_id: i32,
) -> RbacResult<Vec<role_permission::Model>> {
    Ok(RolePermission::find()
        .filter(role_permission::Column::RoleId.eq(role_id))
        .order_by_asc(role_permission::Column::CategoryId)
        .all(conn)
        .await?)
}

pub(crate) async fn load_grant_map<C: ConnectionTrait>(conn: &C, role_id: i32) -> RbacResult<GrantMap> {
    Ok(load_grants(conn, role_id)
        .await?
        .iter()
        .map(|grant| (grant.category_id, CapabilityFlags::from(grant)))
        .collect())
}

fn new_grant(role_id: i32, category_id: i32, flags: CapabilityFlags) -> role_permission::ActiveModel {
    let now = Utc::now();
    role_permission::ActiveModel {
        role_id: Set(role_id),
        category_id: Set(category_id),
        can_view: Set(flags.can_view),
        can_add: Set(flags.can_add),
        can_edit: Set(flags.can_edit),
        can_delete: Set(flags.can_delete),
        created_at: Set(now.into()),
        updated_at: Set(now.into()),
        ..Default::default()
    }
}

pub(crate) async fn insert_grants<C: ConnectionTrait>(
    conn: &C,
    role_id: i32,
    grants: &[(i32, CapabilityFlags)],
) -> RbacResult<u64> {
    if grants.is_empty() {
        return Ok(0);
    }
    let models = grants
        .iter()
        .map(|(category_id, flags)| new_grant(role_id, *category_id, *flags));
    RolePermission::insert_many(models).exec(conn).await?;
    Ok(grants.len() as u64)
}

pub(crate) async fn delete_grants<C: ConnectionTrait>(conn: &C, role_id: i32) -> RbacResult<u64> {
    let result = RolePermission::delete_many()
        .filter(role_permission::Column::RoleId.eq(role_id))
        .exec(conn)
        .await?;
    Ok(result.rows_affected)
}

/// Full replace: drop every grant of the role, then insert `grants`.
/// Returns `(removed, inserted)`.
pub(crate) async fn replace_grants<C: ConnectionTrait>(
    conn: &C,
    role_id: i32,
    grants: &[(i32, CapabilityFlags)],
) -> RbacResult<(u64, u64)> {
    let removed = delete_grants(conn, role_id).await?;
    let inserted = insert_grants(conn, role_id, grants).await?;
    Ok((removed, inserted))
}

/// Overwrite the flags of an existing grant row in place.
pub(crate) async fn update_grant_flags<C: ConnectionTrait>(
    conn: &C,
    role_id: i32,
    category_id: i32,
    flags: CapabilityFlags,
) -> RbacResult<u64> {
    let now: DateTimeWithTimeZone = Utc::now().into();
    let result = RolePermission::update_many()
        .col_expr(role_permission::Column::CanView, Expr::value(flags.can_view))
        .col_expr(role_permission::Column::CanAdd, Expr::value(flags.can_add))
        .col_expr(role_permission::Column::CanEdit, Expr::value(flags.can_edit))
        .col_expr(role_permission::Column::CanDelete, Expr::value(flags.can_delete))
        .col_expr(role_permission::Column::UpdatedAt, Expr::value(now))
        .filter(role_permission::Column::RoleId.eq(role_id))
        .filter(role_permission::Column::CategoryId.eq(category_id))
        .exec(conn)
        .await?;
    Ok(result.rows_affected)
}
