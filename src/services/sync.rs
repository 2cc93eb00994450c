use std::collections::HashMap;

use futures::future::join_all;
use sea_orm::sea_query::Expr;
use sea_orm::{
    ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter, TransactionTrait,
};
use tracing::{info, warn};

use crate::entities::{
    permission_category, permission_group, prelude::*, role_permission, sidebar_menu,
    sidebar_sub_menu, staff_role,
};
use crate::error::{RbacError, RbacResult};
use crate::graphql::types::{
    BatchItemResult, CascadeDeleteResult, CategoryPermissionUpdate, GrantSetChange,
    RolePermissionUpdate,
};
use crate::services::capability::{Capability, CapabilityFlags};
use crate::services::grants::{self, GrantMap};
use crate::services::history::{GrantChange, HistoryService};

/// Which capability columns a clone copies from the source role.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CloneSelection {
    All,
    /// Columns taken from the source row. Columns outside the list keep the
    /// source row's values as well, so the copy still mirrors the source.
    Columns(Vec<Capability>),
}

impl From<Option<Vec<Capability>>> for CloneSelection {
    fn from(capabilities: Option<Vec<Capability>>) -> Self {
        match capabilities {
            None => CloneSelection::All,
            Some(columns) => CloneSelection::Columns(columns),
        }
    }
}

impl CloneSelection {
    fn copy(&self, source: CapabilityFlags) -> CapabilityFlags {
        match self {
            CloneSelection::All => source,
            CloneSelection::Columns(columns) => {
                let mut copied = source;
                for capability in columns {
                    copied.set(*capability, source.get(*capability));
                }
                copied
            }
        }
    }
}

/// Role-to-role and bulk grant mutations, plus cascading deletes.
#[derive(Clone)]
pub struct PermissionSyncService {
    db: DatabaseConnection,
}

impl PermissionSyncService {
    pub fn new(db: DatabaseConnection) -> Self {
        Self { db }
    }

    pub fn get_db(&self) -> &DatabaseConnection {
        &self.db
    }

    /// Update one existing grant and its history row together. Returns
    /// `false` when the grant does not exist; nothing is inserted.
    async fn update_one(&self, update: &RolePermissionUpdate, actor: &str) -> RbacResult<bool> {
        let txn = self.db.begin().await?;

        let Some(existing) = RolePermission::find()
            .filter(role_permission::Column::RoleId.eq(update.role_id))
            .filter(role_permission::Column::CategoryId.eq(update.category_id))
            .one(&txn)
            .await?
        else {
            return Ok(false);
        };

        let before = CapabilityFlags::from(&existing);
        let after = CapabilityFlags::from(update.permissions);
        grants::update_grant_flags(&txn, update.role_id, update.category_id, after).await?;
        HistoryService::record_change(
            &txn,
            update.role_id,
            update.category_id,
            &GrantChange::new(Some(before), Some(after)),
            actor,
        )
        .await?;

        txn.commit().await?;
        Ok(true)
    }

    /// Update many grants independently. Entries run concurrently and each
    /// reports its own outcome; there is no atomicity across the batch.
    pub async fn bulk_update_role_permissions(
        &self,
        updates: &[RolePermissionUpdate],
        actor: &str,
    ) -> Vec<BatchItemResult> {
        let outcomes = join_all(updates.iter().map(|update| self.update_one(update, actor))).await;

        let results: Vec<BatchItemResult> = outcomes
            .into_iter()
            .enumerate()
            .map(|(index, outcome)| match outcome {
                Ok(true) => BatchItemResult::updated(index),
                Ok(false) => BatchItemResult::not_found(index),
                Err(e) => {
                    warn!(index, error = %e, "grant update failed");
                    BatchItemResult::failed(index, e.to_string())
                }
            })
            .collect();

        info!(
            entries = results.len(),
            actor, "bulk grant update finished"
        );
        results
    }

    /// Update several categories of a single role, reported per entry.
    pub async fn update_role_permissions(
        &self,
        role_id: i32,
        updates: &[CategoryPermissionUpdate],
        actor: &str,
    ) -> Vec<BatchItemResult> {
        let updates: Vec<RolePermissionUpdate> = updates
            .iter()
            .map(|update| RolePermissionUpdate {
                role_id,
                category_id: update.category_id,
                permissions: update.permissions,
            })
            .collect();
        self.bulk_update_role_permissions(&updates, actor).await
    }

    /// Replace the target role's grants with copies of the source role's.
    /// Runs in one transaction: on failure the target keeps its old grants.
    pub async fn clone_role_permissions(
        &self,
        source_role_id: i32,
        target_role_id: i32,
        selection: CloneSelection,
        actor: &str,
    ) -> RbacResult<GrantSetChange> {
        if source_role_id == target_role_id {
            return Err(RbacError::invalid("source and target role must differ"));
        }

        let txn = self.db.begin().await?;
        grants::require_role(&txn, source_role_id).await?;
        grants::require_role(&txn, target_role_id).await?;

        let copies: Vec<(i32, CapabilityFlags)> = grants::load_grants(&txn, source_role_id)
            .await?
            .iter()
            .map(|grant| (grant.category_id, selection.copy(CapabilityFlags::from(grant))))
            .collect();
        let before = grants::load_grant_map(&txn, target_role_id).await?;

        let (removed, inserted) = grants::replace_grants(&txn, target_role_id, &copies).await?;
        let after: GrantMap = copies.into_iter().collect();
        HistoryService::record_diff(&txn, target_role_id, &before, &after, actor).await?;

        txn.commit().await?;

        info!(
            source_role_id,
            target_role_id, removed, inserted, "role permissions cloned"
        );
        Ok(GrantSetChange {
            role_id: target_role_id,
            removed,
            inserted,
            updated: 0,
        })
    }

    /// Delete a role with its grants and staff assignments.
    pub async fn delete_role_cascade(
        &self,
        role_id: i32,
        actor: &str,
    ) -> RbacResult<CascadeDeleteResult> {
        let txn = self.db.begin().await?;
        if Role::find_by_id(role_id).one(&txn).await?.is_none() {
            return Err(RbacError::NotFound(format!("role {role_id}")));
        }

        let before = grants::load_grant_map(&txn, role_id).await?;
        let deleted_grants = grants::delete_grants(&txn, role_id).await?;
        HistoryService::record_diff(&txn, role_id, &before, &GrantMap::new(), actor).await?;

        let deleted_staff_links = StaffRole::delete_many()
            .filter(staff_role::Column::RoleId.eq(role_id))
            .exec(&txn)
            .await?
            .rows_affected;
        Role::delete_by_id(role_id).exec(&txn).await?;

        txn.commit().await?;

        info!(role_id, deleted_grants, deleted_staff_links, "role deleted");
        Ok(CascadeDeleteResult {
            deleted_grants,
            deleted_staff_links,
            cleared_menu_links: 0,
            deleted_categories: 0,
        })
    }

    /// Delete a permission group, its categories and every grant on them.
    /// Menus gated by the group or its categories lose the link but stay.
    pub async fn delete_permission_group_cascade(
        &self,
        group_id: i32,
        actor: &str,
    ) -> RbacResult<CascadeDeleteResult> {
        let txn = self.db.begin().await?;
        if PermissionGroup::find_by_id(group_id).one(&txn).await?.is_none() {
            return Err(RbacError::NotFound(format!("permission group {group_id}")));
        }

        let category_ids: Vec<i32> = PermissionCategory::find()
            .filter(permission_category::Column::GroupId.eq(group_id))
            .all(&txn)
            .await?
            .into_iter()
            .map(|category| category.id)
            .collect();

        let doomed = RolePermission::find()
            .filter(role_permission::Column::CategoryId.is_in(category_ids.clone()))
            .all(&txn)
            .await?;
        let mut before_by_role: HashMap<i32, GrantMap> = HashMap::new();
        for grant in &doomed {
            before_by_role
                .entry(grant.role_id)
                .or_default()
                .insert(grant.category_id, CapabilityFlags::from(grant));
        }

        let deleted_grants = RolePermission::delete_many()
            .filter(role_permission::Column::CategoryId.is_in(category_ids.clone()))
            .exec(&txn)
            .await?
            .rows_affected;
        for (role_id, before) in &before_by_role {
            HistoryService::record_diff(&txn, *role_id, before, &GrantMap::new(), actor).await?;
        }

        let mut cleared_menu_links = SidebarMenu::update_many()
            .col_expr(sidebar_menu::Column::PermissionCategoryId, Expr::value(Option::<i32>::None))
            .filter(sidebar_menu::Column::PermissionCategoryId.is_in(category_ids.clone()))
            .exec(&txn)
            .await?
            .rows_affected;
        cleared_menu_links += SidebarMenu::update_many()
            .col_expr(sidebar_menu::Column::PermissionGroupId, Expr::value(Option::<i32>::None))
            .filter(sidebar_menu::Column::PermissionGroupId.eq(group_id))
            .exec(&txn)
            .await?
            .rows_affected;
        cleared_menu_links += SidebarSubMenu::update_many()
            .col_expr(
                sidebar_sub_menu::Column::PermissionCategoryId,
                Expr::value(Option::<i32>::None),
            )
            .filter(sidebar_sub_menu::Column::PermissionCategoryId.is_in(category_ids.clone()))
            .exec(&txn)
            .await?
            .rows_affected;

        let deleted_categories = PermissionCategory::delete_many()
            .filter(permission_category::Column::Id.is_in(category_ids))
            .exec(&txn)
            .await?
            .rows_affected;
        PermissionGroup::delete_many()
            .filter(permission_group::Column::Id.eq(group_id))
            .exec(&txn)
            .await?;

        txn.commit().await?;

        info!(
            group_id,
            deleted_grants, deleted_categories, cleared_menu_links, "permission group deleted"
        );
        Ok(CascadeDeleteResult {
            deleted_grants,
            deleted_staff_links: 0,
            cleared_menu_links,
            deleted_categories,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entities::permission_history;
    use crate::graphql::types::BatchItemStatus;
    use crate::services::capability::CapabilityFlagsInput;
    use crate::test_support::*;
    use sea_orm::{PaginatorTrait, QueryOrder};

    fn input(flags: CapabilityFlags) -> CapabilityFlagsInput {
        CapabilityFlagsInput {
            can_view: flags.can_view,
            can_add: flags.can_add,
            can_edit: flags.can_edit,
            can_delete: flags.can_delete,
        }
    }

    #[tokio::test]
    async fn bulk_update_touches_existing_grants_only() {
        let db = setup_db().await;
        let group = insert_group(&db, "content").await;
        let posts = insert_category(&db, group.id, "Posts", CapabilityFlags::ALL, None).await;
        let pages = insert_category(&db, group.id, "Pages", CapabilityFlags::ALL, None).await;
        let editor = insert_role(&db, "editor").await;
        insert_grant(&db, editor.id, posts.id, flags(true, false, false, false)).await;

        let service = PermissionSyncService::new(db.clone());
        let results = service
            .bulk_update_role_permissions(
                &[
                    RolePermissionUpdate {
                        role_id: editor.id,
                        category_id: posts.id,
                        permissions: input(flags(true, true, true, false)),
                    },
                    RolePermissionUpdate {
                        role_id: editor.id,
                        category_id: pages.id,
                        permissions: input(CapabilityFlags::ALL),
                    },
                ],
                "alice",
            )
            .await;

        assert_eq!(results[0].status, BatchItemStatus::Updated);
        assert_eq!(results[1].status, BatchItemStatus::NotFound);
        assert_eq!(
            grants_of(&db, editor.id).await,
            vec![(posts.id, flags(true, true, true, false))]
        );

        let history = PermissionHistory::find().all(&db).await.unwrap();
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].changed_by, "alice");
    }

    #[tokio::test]
    async fn single_role_update_reports_per_category() {
        let db = setup_db().await;
        let group = insert_group(&db, "content").await;
        let posts = insert_category(&db, group.id, "Posts", CapabilityFlags::ALL, None).await;
        let editor = insert_role(&db, "editor").await;
        insert_grant(&db, editor.id, posts.id, CapabilityFlags::NONE).await;

        let results = PermissionSyncService::new(db.clone())
            .update_role_permissions(
                editor.id,
                &[CategoryPermissionUpdate {
                    category_id: posts.id,
                    permissions: input(flags(true, false, false, false)),
                }],
                "system",
            )
            .await;

        assert_eq!(results[0].status, BatchItemStatus::Updated);
        assert_eq!(grants_of(&db, editor.id).await[0].1, flags(true, false, false, false));
    }

    #[tokio::test]
    async fn clone_replaces_target_grants() {
        let db = setup_db().await;
        let group = insert_group(&db, "content").await;
        let posts = insert_category(&db, group.id, "Posts", CapabilityFlags::ALL, None).await;
        let pages = insert_category(&db, group.id, "Pages", CapabilityFlags::ALL, None).await;
        let source = insert_role(&db, "source").await;
        let target = insert_role(&db, "target").await;
        insert_grant(&db, source.id, posts.id, flags(true, true, false, false)).await;
        insert_grant(&db, target.id, pages.id, CapabilityFlags::ALL).await;

        let service = PermissionSyncService::new(db.clone());
        let change = service
            .clone_role_permissions(source.id, target.id, CloneSelection::All, "alice")
            .await
            .unwrap();

        assert_eq!((change.removed, change.inserted), (1, 1));
        assert_eq!(grants_of(&db, target.id).await, grants_of(&db, source.id).await);

        let history = PermissionHistory::find()
            .filter(permission_history::Column::RoleId.eq(target.id))
            .count(&db)
            .await
            .unwrap();
        assert_eq!(history, 2);
    }

    #[tokio::test]
    async fn clone_with_column_subset_mirrors_source_rows() {
        let db = setup_db().await;
        let group = insert_group(&db, "content").await;
        let posts = insert_category(&db, group.id, "Posts", CapabilityFlags::ALL, None).await;
        let source = insert_role(&db, "source").await;
        let target = insert_role(&db, "target").await;
        insert_grant(&db, source.id, posts.id, flags(true, false, true, false)).await;

        PermissionSyncService::new(db.clone())
            .clone_role_permissions(
                source.id,
                target.id,
                CloneSelection::Columns(vec![Capability::View]),
                "system",
            )
            .await
            .unwrap();

        assert_eq!(
            grants_of(&db, target.id).await,
            vec![(posts.id, flags(true, false, true, false))]
        );
    }

    #[tokio::test]
    async fn clone_rolls_back_when_insert_fails() {
        let db = setup_db().await;
        let group = insert_group(&db, "content").await;
        let posts = insert_category(&db, group.id, "Posts", CapabilityFlags::ALL, None).await;
        let pages = insert_category(&db, group.id, "Pages", CapabilityFlags::ALL, None).await;
        let source = insert_role(&db, "source").await;
        let target = insert_role(&db, "target").await;
        insert_grant(&db, source.id, posts.id, CapabilityFlags::ALL).await;
        insert_grant(&db, target.id, pages.id, flags(true, false, false, false)).await;
        let before = grants_of(&db, target.id).await;

        fail_grant_inserts_for(&db, target.id).await;

        let err = PermissionSyncService::new(db.clone())
            .clone_role_permissions(source.id, target.id, CloneSelection::All, "alice")
            .await
            .unwrap_err();

        assert_eq!(err.code(), "STORAGE_FAILURE");
        assert_eq!(grants_of(&db, target.id).await, before);
        assert_eq!(PermissionHistory::find().count(&db).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn clone_rejects_bad_role_arguments() {
        let db = setup_db().await;
        let role = insert_role(&db, "solo").await;
        let service = PermissionSyncService::new(db);

        let same = service
            .clone_role_permissions(role.id, role.id, CloneSelection::All, "system")
            .await
            .unwrap_err();
        assert_eq!(same.code(), "INVALID_ARGUMENT");

        let missing = service
            .clone_role_permissions(role.id, 999, CloneSelection::All, "system")
            .await
            .unwrap_err();
        assert_eq!(missing.code(), "CONFLICT");
    }

    #[tokio::test]
    async fn role_delete_cascades_to_grants_and_staff_links() {
        let db = setup_db().await;
        let group = insert_group(&db, "content").await;
        let posts = insert_category(&db, group.id, "Posts", CapabilityFlags::ALL, None).await;
        let editor = insert_role(&db, "editor").await;
        insert_grant(&db, editor.id, posts.id, CapabilityFlags::ALL).await;
        let staff = insert_staff(&db, "Fay", false).await;
        assign_role(&db, staff.id, editor.id).await;

        let service = PermissionSyncService::new(db.clone());
        let result = service.delete_role_cascade(editor.id, "alice").await.unwrap();

        assert_eq!(result.deleted_grants, 1);
        assert_eq!(result.deleted_staff_links, 1);
        assert!(Role::find_by_id(editor.id).one(&db).await.unwrap().is_none());
        assert_eq!(PermissionHistory::find().count(&db).await.unwrap(), 1);

        let again = service.delete_role_cascade(editor.id, "alice").await.unwrap_err();
        assert_eq!(again.code(), "NOT_FOUND");
    }

    #[tokio::test]
    async fn group_delete_removes_categories_and_unlinks_menus() {
        let db = setup_db().await;
        let content = insert_group(&db, "content").await;
        let system = insert_group(&db, "system").await;
        let posts = insert_category(&db, content.id, "Posts", CapabilityFlags::ALL, None).await;
        let users = insert_category(&db, system.id, "Users", CapabilityFlags::ALL, None).await;
        let editor = insert_role(&db, "editor").await;
        insert_grant(&db, editor.id, posts.id, CapabilityFlags::ALL).await;
        insert_grant(&db, editor.id, users.id, CapabilityFlags::ALL).await;
        let menu = insert_menu(&db, "Posts", Some(posts.id), 1).await;

        let result = PermissionSyncService::new(db.clone())
            .delete_permission_group_cascade(content.id, "alice")
            .await
            .unwrap();

        assert_eq!(result.deleted_grants, 1);
        assert_eq!(result.deleted_categories, 1);
        assert_eq!(result.cleared_menu_links, 1);
        assert_eq!(grants_of(&db, editor.id).await, vec![(users.id, CapabilityFlags::ALL)]);

        let menu = SidebarMenu::find_by_id(menu.id).one(&db).await.unwrap().unwrap();
        assert_eq!(menu.permission_category_id, None);
        let remaining = PermissionCategory::find()
            .order_by_asc(permission_category::Column::Id)
            .all(&db)
            .await
            .unwrap();
        assert_eq!(remaining.len(), 1);
    }
}
