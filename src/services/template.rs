use std::collections::HashSet;

use chrono::Utc;
use sea_orm::entity::prelude::DateTimeWithTimeZone;
use sea_orm::sea_query::Expr;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, DatabaseConnection, EntityTrait,
    IntoActiveModel, QueryFilter, QueryOrder, QuerySelect, Set, TransactionTrait,
};
use tracing::{debug, info, warn};

use crate::entities::{
    permission_category, permission_template, prelude::*, role_permission, template_version,
};
use crate::error::{RbacError, RbacResult};
use crate::graphql::types::{
    GrantSetChange, PermissionTemplate as PermissionTemplateView, SyncOptions,
    TemplateModifications, TemplatePermission, TemplateVersion as TemplateVersionView,
};
use crate::services::capability::CapabilityFlags;
use crate::services::grants::{self, GrantMap};
use crate::services::history::{HistoryService, DEFAULT_ACTOR};

/// How a template is pushed onto several roles at once.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SyncStrategy {
    OnlyMissing,
    OverrideExisting,
}

impl TryFrom<SyncOptions> for SyncStrategy {
    type Error = RbacError;

    fn try_from(options: SyncOptions) -> Result<Self, Self::Error> {
        match (options.sync_only_missing, options.override_existing) {
            (true, false) => Ok(SyncStrategy::OnlyMissing),
            (false, true) => Ok(SyncStrategy::OverrideExisting),
            _ => Err(RbacError::invalid(
                "exactly one of syncOnlyMissing and overrideExisting must be set",
            )),
        }
    }
}

fn grant_list(permissions: &[TemplatePermission]) -> Vec<(i32, CapabilityFlags)> {
    permissions
        .iter()
        .map(|permission| (permission.category_id, permission.flags()))
        .collect()
}

async fn find_template<C: ConnectionTrait>(
    conn: &C,
    name: &str,
) -> RbacResult<Option<permission_template::Model>> {
    Ok(PermissionTemplate::find()
        .filter(permission_template::Column::Name.eq(name))
        .one(conn)
        .await?)
}

/// Template an operation depends on; absence is a precondition failure.
async fn require_template<C: ConnectionTrait>(
    conn: &C,
    name: &str,
) -> RbacResult<permission_template::Model> {
    find_template(conn, name)
        .await?
        .ok_or_else(|| RbacError::conflict(format!("template '{name}' not found")))
}

/// Reject duplicate categories and categories that do not exist.
async fn validate_permissions<C: ConnectionTrait>(
    conn: &C,
    permissions: &[TemplatePermission],
) -> RbacResult<()> {
    let mut seen = HashSet::new();
    for permission in permissions {
        if !seen.insert(permission.category_id) {
            return Err(RbacError::invalid(format!(
                "category {} listed more than once",
                permission.category_id
            )));
        }
    }
    if seen.is_empty() {
        return Ok(());
    }

    let known: HashSet<i32> = PermissionCategory::find()
        .select_only()
        .column(permission_category::Column::Id)
        .filter(permission_category::Column::Id.is_in(seen.iter().copied()))
        .into_tuple::<i32>()
        .all(conn)
        .await?
        .into_iter()
        .collect();

    match permissions.iter().find(|p| !known.contains(&p.category_id)) {
        Some(unknown) => Err(RbacError::invalid(format!(
            "permission category {} does not exist",
            unknown.category_id
        ))),
        None => Ok(()),
    }
}

async fn insert_template<C: ConnectionTrait>(
    conn: &C,
    name: &str,
    permissions: &[TemplatePermission],
) -> RbacResult<permission_template::Model> {
    if name.trim().is_empty() {
        return Err(RbacError::invalid("template name must not be empty"));
    }
    if find_template(conn, name).await?.is_some() {
        return Err(RbacError::conflict(format!("template '{name}' already exists")));
    }
    validate_permissions(conn, permissions).await?;

    let now = Utc::now();
    let model = permission_template::ActiveModel {
        name: Set(name.to_string()),
        permissions: Set(serde_json::to_value(permissions)?),
        created_at: Set(now.into()),
        updated_at: Set(now.into()),
        last_used: Set(None),
        ..Default::default()
    }
    .insert(conn)
    .await?;
    Ok(model)
}

/// Decode a template's payload, dropping entries whose category has since
/// been deleted. Stored payloads and versions are never rewritten.
async fn live_permissions<C: ConnectionTrait>(
    conn: &C,
    template: &permission_template::Model,
) -> RbacResult<Vec<TemplatePermission>> {
    let mut permissions: Vec<TemplatePermission> =
        serde_json::from_value(template.permissions.clone())?;
    if permissions.is_empty() {
        return Ok(permissions);
    }

    let live: HashSet<i32> = PermissionCategory::find()
        .select_only()
        .column(permission_category::Column::Id)
        .filter(
            permission_category::Column::Id
                .is_in(permissions.iter().map(|permission| permission.category_id)),
        )
        .into_tuple::<i32>()
        .all(conn)
        .await?
        .into_iter()
        .collect();

    permissions.retain(|permission| {
        let keep = live.contains(&permission.category_id);
        if !keep {
            warn!(
                template = %template.name,
                category_id = permission.category_id,
                "skipping template entry for deleted category"
            );
        }
        keep
    });
    Ok(permissions)
}

async fn stamp_last_used<C: ConnectionTrait>(conn: &C, template_id: i32) -> RbacResult<()> {
    let now: DateTimeWithTimeZone = Utc::now().into();
    PermissionTemplate::update_many()
        .col_expr(permission_template::Column::LastUsed, Expr::value(now))
        .filter(permission_template::Column::Id.eq(template_id))
        .exec(conn)
        .await?;
    Ok(())
}

async fn overwrite_permissions<C: ConnectionTrait>(
    conn: &C,
    template: permission_template::Model,
    payload: serde_json::Value,
) -> RbacResult<permission_template::Model> {
    let mut active = template.into_active_model();
    active.permissions = Set(payload);
    active.updated_at = Set(Utc::now().into());
    Ok(active.update(conn).await?)
}

/// Named permission sets: CRUD, application to roles and versioning.
#[derive(Clone)]
pub struct TemplateService {
    db: DatabaseConnection,
}

impl TemplateService {
    pub fn new(db: DatabaseConnection) -> Self {
        Self { db }
    }

    pub fn get_db(&self) -> &DatabaseConnection {
        &self.db
    }

    /// Create a template. The name must be unique and every category must exist.
    pub async fn create(
        &self,
        name: &str,
        permissions: &[TemplatePermission],
    ) -> RbacResult<PermissionTemplateView> {
        let model = insert_template(&self.db, name, permissions).await?;
        info!(template = name, entries = permissions.len(), "template created");
        Ok(PermissionTemplateView::try_from(model)?)
    }

    /// Get template by name
    pub async fn get(&self, name: &str) -> RbacResult<Option<PermissionTemplateView>> {
        match find_template(&self.db, name).await? {
            Some(model) => Ok(Some(PermissionTemplateView::try_from(model)?)),
            None => Ok(None),
        }
    }

    /// Get all templates, most recently used first. Never-used templates
    /// follow in name order.
    pub async fn list(&self) -> RbacResult<Vec<PermissionTemplateView>> {
        let mut templates = PermissionTemplate::find()
            .order_by_asc(permission_template::Column::Name)
            .all(&self.db)
            .await?
            .into_iter()
            .map(PermissionTemplateView::try_from)
            .collect::<Result<Vec<_>, _>>()?;

        // Stable sort keeps name order among equal keys.
        templates.sort_by(|a, b| b.last_used.cmp(&a.last_used));
        debug!(templates = templates.len(), "templates listed");
        Ok(templates)
    }

    /// Replace a template's permission set. With `snapshot_current` the
    /// previous payload is stored as a version first, in the same transaction.
    pub async fn update(
        &self,
        name: &str,
        permissions: &[TemplatePermission],
        snapshot_current: bool,
        actor: &str,
    ) -> RbacResult<PermissionTemplateView> {
        let txn = self.db.begin().await?;
        let template = require_template(&txn, name).await?;
        validate_permissions(&txn, permissions).await?;

        if snapshot_current {
            Self::insert_version(&txn, name, template.permissions.clone(), actor).await?;
        }
        let updated =
            overwrite_permissions(&txn, template, serde_json::to_value(permissions)?).await?;

        txn.commit().await?;

        info!(template = name, entries = permissions.len(), snapshot_current, "template updated");
        Ok(PermissionTemplateView::try_from(updated)?)
    }

    /// Delete a template together with all its versions.
    pub async fn delete(&self, name: &str) -> RbacResult<u64> {
        let txn = self.db.begin().await?;
        let Some(template) = find_template(&txn, name).await? else {
            return Err(RbacError::NotFound(format!("template '{name}'")));
        };

        let versions = TemplateVersion::delete_many()
            .filter(template_version::Column::TemplateName.eq(name))
            .exec(&txn)
            .await?
            .rows_affected;
        PermissionTemplate::delete_by_id(template.id).exec(&txn).await?;

        txn.commit().await?;

        info!(template = name, versions, "template deleted");
        Ok(versions)
    }

    /// Replace the role's whole grant set with the template's.
    pub async fn apply(&self, name: &str, role_id: i32, actor: &str) -> RbacResult<GrantSetChange> {
        let txn = self.db.begin().await?;
        let template = require_template(&txn, name).await?;
        grants::require_role(&txn, role_id).await?;
        let permissions = live_permissions(&txn, &template).await?;

        let before = grants::load_grant_map(&txn, role_id).await?;
        let target = grant_list(&permissions);
        let (removed, inserted) = grants::replace_grants(&txn, role_id, &target).await?;
        stamp_last_used(&txn, template.id).await?;
        let after: GrantMap = target.into_iter().collect();
        HistoryService::record_diff(&txn, role_id, &before, &after, actor).await?;

        txn.commit().await?;

        info!(template = name, role_id, removed, inserted, "template applied");
        Ok(GrantSetChange {
            role_id,
            removed,
            inserted,
            updated: 0,
        })
    }

    /// Merge the template into the role's grants: flags are OR-ed into
    /// existing grants, missing categories are inserted, nothing is removed.
    pub async fn export(&self, name: &str, role_id: i32, actor: &str) -> RbacResult<GrantSetChange> {
        let txn = self.db.begin().await?;
        let template = require_template(&txn, name).await?;
        grants::require_role(&txn, role_id).await?;
        let permissions = live_permissions(&txn, &template).await?;

        let before = grants::load_grant_map(&txn, role_id).await?;
        let mut after = before.clone();
        let mut missing = Vec::new();
        let mut updated = 0;

        for permission in &permissions {
            let incoming = permission.flags();
            match before.get(&permission.category_id) {
                Some(existing) => {
                    let merged = existing.union(incoming);
                    if merged != *existing {
                        grants::update_grant_flags(&txn, role_id, permission.category_id, merged)
                            .await?;
                        after.insert(permission.category_id, merged);
                        updated += 1;
                    }
                }
                None => {
                    missing.push((permission.category_id, incoming));
                    after.insert(permission.category_id, incoming);
                }
            }
        }
        let inserted = grants::insert_grants(&txn, role_id, &missing).await?;
        HistoryService::record_diff(&txn, role_id, &before, &after, actor).await?;

        txn.commit().await?;

        info!(template = name, role_id, inserted, updated, "template exported");
        Ok(GrantSetChange {
            role_id,
            removed: 0,
            inserted,
            updated,
        })
    }

    /// Push a template onto several roles in one transaction using exactly
    /// one strategy: insert only missing categories, or replace everything.
    pub async fn sync_template_to_roles(
        &self,
        name: &str,
        role_ids: &[i32],
        options: SyncOptions,
        actor: &str,
    ) -> RbacResult<Vec<GrantSetChange>> {
        let strategy = SyncStrategy::try_from(options)?;
        let mut seen = HashSet::new();
        let role_ids: Vec<i32> = role_ids.iter().copied().filter(|id| seen.insert(*id)).collect();

        let txn = self.db.begin().await?;
        let template = require_template(&txn, name).await?;
        let permissions = live_permissions(&txn, &template).await?;
        let target = grant_list(&permissions);

        let mut changes = Vec::with_capacity(role_ids.len());
        for role_id in role_ids {
            grants::require_role(&txn, role_id).await?;
            let before = grants::load_grant_map(&txn, role_id).await?;

            let (removed, inserted, after) = match strategy {
                SyncStrategy::OverrideExisting => {
                    let (removed, inserted) =
                        grants::replace_grants(&txn, role_id, &target).await?;
                    (removed, inserted, target.iter().copied().collect::<GrantMap>())
                }
                SyncStrategy::OnlyMissing => {
                    let missing: Vec<(i32, CapabilityFlags)> = target
                        .iter()
                        .copied()
                        .filter(|(category_id, _)| !before.contains_key(category_id))
                        .collect();
                    let inserted = grants::insert_grants(&txn, role_id, &missing).await?;
                    let mut after = before.clone();
                    after.extend(missing);
                    (0, inserted, after)
                }
            };
            HistoryService::record_diff(&txn, role_id, &before, &after, actor).await?;
            changes.push(GrantSetChange {
                role_id,
                removed,
                inserted,
                updated: 0,
            });
        }
        stamp_last_used(&txn, template.id).await?;

        txn.commit().await?;

        info!(template = name, roles = changes.len(), ?strategy, "template synced");
        Ok(changes)
    }

    /// Copy a template under a new name, dropping `remove_categories` and
    /// appending view-only entries for `add_categories` that exist.
    pub async fn clone_template(
        &self,
        name: &str,
        new_name: &str,
        modifications: &TemplateModifications,
    ) -> RbacResult<PermissionTemplateView> {
        let txn = self.db.begin().await?;
        let source = require_template(&txn, name).await?;
        let mut permissions: Vec<TemplatePermission> =
            serde_json::from_value(source.permissions)?;

        let removed: HashSet<i32> = modifications.remove_categories.iter().copied().collect();
        permissions.retain(|permission| !removed.contains(&permission.category_id));

        if !modifications.add_categories.is_empty() {
            let existing: HashSet<i32> = PermissionCategory::find()
                .select_only()
                .column(permission_category::Column::Id)
                .filter(
                    permission_category::Column::Id
                        .is_in(modifications.add_categories.iter().copied()),
                )
                .into_tuple::<i32>()
                .all(&txn)
                .await?
                .into_iter()
                .collect();
            let mut present: HashSet<i32> =
                permissions.iter().map(|permission| permission.category_id).collect();
            for category_id in &modifications.add_categories {
                if existing.contains(category_id) && present.insert(*category_id) {
                    permissions.push(TemplatePermission::new(
                        *category_id,
                        CapabilityFlags::new(true, false, false, false),
                    ));
                }
            }
        }

        let model = insert_template(&txn, new_name, &permissions).await?;
        txn.commit().await?;

        info!(template = name, new_template = new_name, entries = permissions.len(), "template cloned");
        Ok(PermissionTemplateView::try_from(model)?)
    }

    /// Snapshot a role's grants as a new template, optionally keeping only
    /// categories whose short code is listed.
    pub async fn import_from_role(
        &self,
        role_id: i32,
        name: &str,
        include_short_codes: Option<&[String]>,
    ) -> RbacResult<PermissionTemplateView> {
        let txn = self.db.begin().await?;
        grants::require_role(&txn, role_id).await?;

        let mut query = RolePermission::find()
            .find_also_related(PermissionCategory)
            .filter(role_permission::Column::RoleId.eq(role_id));
        if let Some(codes) = include_short_codes {
            query = query.filter(permission_category::Column::ShortCode.is_in(codes.iter().cloned()));
        }
        let permissions: Vec<TemplatePermission> = query
            .order_by_asc(role_permission::Column::CategoryId)
            .all(&txn)
            .await?
            .iter()
            .map(|(grant, _)| TemplatePermission::new(grant.category_id, CapabilityFlags::from(grant)))
            .collect();

        let model = insert_template(&txn, name, &permissions).await?;
        txn.commit().await?;

        info!(template = name, role_id, entries = permissions.len(), "template imported from role");
        Ok(PermissionTemplateView::try_from(model)?)
    }

    async fn insert_version<C: ConnectionTrait>(
        conn: &C,
        name: &str,
        payload: serde_json::Value,
        actor: &str,
    ) -> RbacResult<template_version::Model> {
        Ok(template_version::ActiveModel {
            template_name: Set(name.to_string()),
            permissions: Set(payload),
            created_at: Set(Utc::now().into()),
            created_by: Set(actor.to_string()),
            ..Default::default()
        }
        .insert(conn)
        .await?)
    }

    /// Store an immutable snapshot for a template. Without explicit
    /// permissions the template's current payload is captured.
    pub async fn create_version(
        &self,
        name: &str,
        permissions: Option<&[TemplatePermission]>,
        created_by: Option<&str>,
    ) -> RbacResult<TemplateVersionView> {
        let created_by = created_by.unwrap_or(DEFAULT_ACTOR);
        let template = require_template(&self.db, name).await?;
        let payload = match permissions {
            Some(permissions) => {
                validate_permissions(&self.db, permissions).await?;
                serde_json::to_value(permissions)?
            }
            None => template.permissions,
        };

        let version = Self::insert_version(&self.db, name, payload, created_by).await?;
        info!(template = name, version_id = version.version_id, created_by, "template version created");
        Ok(TemplateVersionView::try_from(version)?)
    }

    /// Get versions of a template, newest first
    pub async fn list_versions(&self, name: &str) -> RbacResult<Vec<TemplateVersionView>> {
        let versions = TemplateVersion::find()
            .filter(template_version::Column::TemplateName.eq(name))
            .order_by_desc(template_version::Column::CreatedAt)
            .order_by_desc(template_version::Column::VersionId)
            .all(&self.db)
            .await?;
        Ok(versions
            .into_iter()
            .map(TemplateVersionView::try_from)
            .collect::<Result<Vec<_>, _>>()?)
    }

    pub async fn get_version(
        &self,
        name: &str,
        version_id: i32,
    ) -> RbacResult<Option<TemplateVersionView>> {
        let version = TemplateVersion::find_by_id(version_id)
            .filter(template_version::Column::TemplateName.eq(name))
            .one(&self.db)
            .await?;
        match version {
            Some(model) => Ok(Some(TemplateVersionView::try_from(model)?)),
            None => Ok(None),
        }
    }

    /// Overwrite the live payload with a stored version. The revert itself
    /// is not versioned, so reverting again later is always possible.
    pub async fn revert_to_version(
        &self,
        name: &str,
        version_id: i32,
    ) -> RbacResult<PermissionTemplateView> {
        let txn = self.db.begin().await?;
        let template = require_template(&txn, name).await?;
        let version = TemplateVersion::find_by_id(version_id)
            .filter(template_version::Column::TemplateName.eq(name))
            .one(&txn)
            .await?
            .ok_or_else(|| {
                RbacError::conflict(format!("version {version_id} of template '{name}' not found"))
            })?;

        let reverted = overwrite_permissions(&txn, template, version.permissions).await?;
        txn.commit().await?;

        info!(template = name, version_id, "template reverted");
        Ok(PermissionTemplateView::try_from(reverted)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entities::permission_group;
    use crate::services::PermissionSyncService;
    use crate::test_support::*;
    use sea_orm::PaginatorTrait;

    struct Fixture {
        db: DatabaseConnection,
        posts: i32,
        pages: i32,
        users: i32,
        editor: i32,
        author: i32,
    }

    async fn fixture() -> Fixture {
        let db = setup_db().await;
        let content: permission_group::Model = insert_group(&db, "content").await;
        let posts = insert_category(&db, content.id, "Posts", CapabilityFlags::ALL, None).await;
        let pages = insert_category(&db, content.id, "Pages", CapabilityFlags::ALL, None).await;
        let users = insert_category(&db, content.id, "Users", CapabilityFlags::ALL, None).await;
        let editor = insert_role(&db, "editor").await;
        let author = insert_role(&db, "author").await;
        Fixture {
            db,
            posts: posts.id,
            pages: pages.id,
            users: users.id,
            editor: editor.id,
            author: author.id,
        }
    }

    fn entry(category_id: i32, flags: CapabilityFlags) -> TemplatePermission {
        TemplatePermission::new(category_id, flags)
    }

    #[tokio::test]
    async fn create_validates_name_and_categories() {
        let f = fixture().await;
        let service = TemplateService::new(f.db.clone());

        service.create("writer", &[entry(f.posts, CapabilityFlags::ALL)]).await.unwrap();

        let duplicate = service.create("writer", &[]).await.unwrap_err();
        assert_eq!(duplicate.code(), "CONFLICT");

        let unknown = service.create("ghost", &[entry(999, CapabilityFlags::ALL)]).await.unwrap_err();
        assert_eq!(unknown.code(), "INVALID_ARGUMENT");

        let repeated = service
            .create("twice", &[entry(f.posts, CapabilityFlags::ALL), entry(f.posts, CapabilityFlags::NONE)])
            .await
            .unwrap_err();
        assert_eq!(repeated.code(), "INVALID_ARGUMENT");

        assert!(service.get("ghost").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn list_puts_recently_used_first() {
        let f = fixture().await;
        let service = TemplateService::new(f.db.clone());
        for name in ["alpha", "beta", "gamma"] {
            service.create(name, &[entry(f.posts, CapabilityFlags::ALL)]).await.unwrap();
        }
        service.apply("gamma", f.editor, "system").await.unwrap();

        let names: Vec<String> = service.list().await.unwrap().into_iter().map(|t| t.name).collect();
        assert_eq!(names, vec!["gamma", "alpha", "beta"]);
    }

    #[tokio::test]
    async fn apply_twice_yields_the_same_grants() {
        let f = fixture().await;
        let service = TemplateService::new(f.db.clone());
        service
            .create(
                "writer",
                &[
                    entry(f.posts, flags(true, true, false, false)),
                    entry(f.pages, flags(true, false, false, false)),
                ],
            )
            .await
            .unwrap();

        service.apply("writer", f.editor, "alice").await.unwrap();
        let first = grants_of(&f.db, f.editor).await;
        service.apply("writer", f.editor, "alice").await.unwrap();
        let second = grants_of(&f.db, f.editor).await;

        assert_eq!(first, second);
        assert_eq!(first.len(), 2);
        assert_eq!(PermissionHistory::find().count(&f.db).await.unwrap(), 2);
    }

    #[tokio::test]
    async fn apply_replaces_while_export_merges() {
        let f = fixture().await;
        let service = TemplateService::new(f.db.clone());
        service.create("writer", &[entry(f.posts, CapabilityFlags::ALL)]).await.unwrap();
        insert_grant(&f.db, f.editor, f.users, flags(true, false, false, false)).await;
        insert_grant(&f.db, f.author, f.users, flags(true, false, false, false)).await;

        service.apply("writer", f.editor, "system").await.unwrap();
        assert_eq!(grants_of(&f.db, f.editor).await, vec![(f.posts, CapabilityFlags::ALL)]);

        service.export("writer", f.author, "system").await.unwrap();
        assert_eq!(
            grants_of(&f.db, f.author).await,
            vec![(f.posts, CapabilityFlags::ALL), (f.users, flags(true, false, false, false))]
        );
    }

    #[tokio::test]
    async fn export_ors_flags_into_existing_grants() {
        let f = fixture().await;
        let service = TemplateService::new(f.db.clone());
        service.create("adder", &[entry(f.posts, flags(false, true, false, false))]).await.unwrap();
        insert_grant(&f.db, f.editor, f.posts, flags(true, false, false, false)).await;

        let change = service.export("adder", f.editor, "system").await.unwrap();

        assert_eq!(change.updated, 1);
        assert_eq!(change.inserted, 0);
        assert_eq!(grants_of(&f.db, f.editor).await, vec![(f.posts, flags(true, true, false, false))]);
    }

    #[tokio::test]
    async fn sync_strategies_are_exclusive() {
        let f = fixture().await;
        let service = TemplateService::new(f.db.clone());
        service
            .create(
                "writer",
                &[entry(f.posts, CapabilityFlags::ALL), entry(f.pages, CapabilityFlags::ALL)],
            )
            .await
            .unwrap();
        insert_grant(&f.db, f.editor, f.posts, flags(true, false, false, false)).await;
        insert_grant(&f.db, f.author, f.users, CapabilityFlags::ALL).await;
        let roles = [f.editor, f.author];

        for options in [SyncOptions::default(), SyncOptions { sync_only_missing: true, override_existing: true }] {
            let err = service.sync_template_to_roles("writer", &roles, options, "system").await.unwrap_err();
            assert_eq!(err.code(), "INVALID_ARGUMENT");
        }

        let only_missing = SyncOptions { sync_only_missing: true, override_existing: false };
        service.sync_template_to_roles("writer", &roles, only_missing, "system").await.unwrap();
        assert_eq!(
            grants_of(&f.db, f.editor).await,
            vec![(f.posts, flags(true, false, false, false)), (f.pages, CapabilityFlags::ALL)]
        );
        assert_eq!(grants_of(&f.db, f.author).await.len(), 3);

        let override_existing = SyncOptions { sync_only_missing: false, override_existing: true };
        let changes = service
            .sync_template_to_roles("writer", &roles, override_existing, "system")
            .await
            .unwrap();
        assert_eq!(changes.len(), 2);
        let expected = vec![(f.posts, CapabilityFlags::ALL), (f.pages, CapabilityFlags::ALL)];
        assert_eq!(grants_of(&f.db, f.editor).await, expected);
        assert_eq!(grants_of(&f.db, f.author).await, expected);
    }

    #[tokio::test]
    async fn sync_rolls_back_every_role_when_a_later_role_is_missing() {
        let f = fixture().await;
        let service = TemplateService::new(f.db.clone());
        service.create("writer", &[entry(f.posts, CapabilityFlags::ALL)]).await.unwrap();
        insert_grant(&f.db, f.editor, f.users, CapabilityFlags::ALL).await;

        let override_existing = SyncOptions { sync_only_missing: false, override_existing: true };
        let err = service
            .sync_template_to_roles("writer", &[f.editor, 9_999], override_existing, "system")
            .await
            .unwrap_err();
        assert_eq!(err.code(), "CONFLICT");

        assert_eq!(grants_of(&f.db, f.editor).await, vec![(f.users, CapabilityFlags::ALL)]);
        assert_eq!(PermissionHistory::find().count(&f.db).await.unwrap(), 0);
        let writer = service.get("writer").await.unwrap().unwrap();
        assert!(writer.last_used.is_none());
    }

    #[tokio::test]
    async fn entries_for_deleted_categories_are_skipped() {
        let f = fixture().await;
        let legacy = insert_group(&f.db, "legacy").await;
        let old = insert_category(&f.db, legacy.id, "Old", CapabilityFlags::ALL, None).await;
        let service = TemplateService::new(f.db.clone());
        service
            .create(
                "writer",
                &[entry(f.posts, flags(true, false, false, false)), entry(old.id, CapabilityFlags::ALL)],
            )
            .await
            .unwrap();

        PermissionSyncService::new(f.db.clone())
            .delete_permission_group_cascade(legacy.id, "system")
            .await
            .unwrap();

        let applied = service.apply("writer", f.editor, "system").await.unwrap();
        assert_eq!(applied.inserted, 1);
        assert_eq!(grants_of(&f.db, f.editor).await, vec![(f.posts, flags(true, false, false, false))]);

        let exported = service.export("writer", f.author, "system").await.unwrap();
        assert_eq!(exported.inserted, 1);
        assert_eq!(grants_of(&f.db, f.author).await, vec![(f.posts, flags(true, false, false, false))]);

        let only_missing = SyncOptions { sync_only_missing: true, override_existing: false };
        let changes = service
            .sync_template_to_roles("writer", &[f.editor, f.author], only_missing, "system")
            .await
            .unwrap();
        assert!(changes.iter().all(|change| change.inserted == 0));

        // the stored payload is left as written
        let stored = service.get("writer").await.unwrap().unwrap();
        assert_eq!(stored.permissions.len(), 2);
    }

    #[tokio::test]
    async fn missing_template_is_a_precondition_failure() {
        let f = fixture().await;
        let service = TemplateService::new(f.db.clone());
        let options = SyncOptions { sync_only_missing: true, override_existing: false };

        assert_eq!(service.apply("nope", f.editor, "system").await.unwrap_err().code(), "CONFLICT");
        assert_eq!(service.export("nope", f.editor, "system").await.unwrap_err().code(), "CONFLICT");
        assert_eq!(
            service.sync_template_to_roles("nope", &[f.editor], options, "system").await.unwrap_err().code(),
            "CONFLICT"
        );
        assert_eq!(service.revert_to_version("nope", 1).await.unwrap_err().code(), "CONFLICT");
    }

    #[tokio::test]
    async fn revert_restores_a_snapshot() {
        let f = fixture().await;
        let service = TemplateService::new(f.db.clone());
        let first = vec![entry(f.posts, CapabilityFlags::ALL)];
        let second = vec![entry(f.pages, flags(true, false, false, false))];
        service.create("writer", &first).await.unwrap();

        let version = service.create_version("writer", Some(first.as_slice()), None).await.unwrap();
        assert_eq!(version.created_by, "system");
        service.update("writer", &second, false, "alice").await.unwrap();
        assert_eq!(service.get("writer").await.unwrap().unwrap().permissions, second);

        service.revert_to_version("writer", version.version_id).await.unwrap();
        assert_eq!(service.get("writer").await.unwrap().unwrap().permissions, first);

        let missing = service.revert_to_version("writer", version.version_id + 100).await.unwrap_err();
        assert_eq!(missing.code(), "CONFLICT");
    }

    #[tokio::test]
    async fn update_can_snapshot_the_previous_payload() {
        let f = fixture().await;
        let service = TemplateService::new(f.db.clone());
        let first = vec![entry(f.posts, CapabilityFlags::ALL)];
        service.create("writer", &first).await.unwrap();

        service.update("writer", &[], true, "alice").await.unwrap();
        service.create_version("writer", None, Some("bob")).await.unwrap();

        let versions = service.list_versions("writer").await.unwrap();
        assert_eq!(versions.len(), 2);
        assert_eq!(versions[0].created_by, "bob");
        assert!(versions[0].permissions.is_empty());
        assert_eq!(versions[1].permissions, first);

        let fetched = service.get_version("writer", versions[1].version_id).await.unwrap().unwrap();
        assert_eq!(fetched.created_by, "alice");
        assert!(service.get_version("other", versions[1].version_id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn delete_removes_versions() {
        let f = fixture().await;
        let service = TemplateService::new(f.db.clone());
        service.create("writer", &[]).await.unwrap();
        service.create_version("writer", None, None).await.unwrap();

        assert_eq!(service.delete("writer").await.unwrap(), 1);
        assert_eq!(TemplateVersion::find().count(&f.db).await.unwrap(), 0);
        assert_eq!(service.delete("writer").await.unwrap_err().code(), "NOT_FOUND");
    }

    #[tokio::test]
    async fn clone_applies_modifications() {
        let f = fixture().await;
        let service = TemplateService::new(f.db.clone());
        service
            .create("writer", &[entry(f.posts, CapabilityFlags::ALL), entry(f.pages, CapabilityFlags::ALL)])
            .await
            .unwrap();

        let cloned = service
            .clone_template(
                "writer",
                "reviewer",
                &TemplateModifications {
                    add_categories: vec![f.users, 999],
                    remove_categories: vec![f.pages],
                },
            )
            .await
            .unwrap();

        assert_eq!(
            cloned.permissions,
            vec![entry(f.posts, CapabilityFlags::ALL), entry(f.users, flags(true, false, false, false))]
        );
    }

    #[tokio::test]
    async fn import_snapshots_role_grants() {
        let f = fixture().await;
        let service = TemplateService::new(f.db.clone());
        insert_grant(&f.db, f.editor, f.posts, CapabilityFlags::ALL).await;
        insert_grant(&f.db, f.editor, f.users, flags(true, false, false, false)).await;

        let everything = service.import_from_role(f.editor, "editor copy", None).await.unwrap();
        assert_eq!(everything.permissions.len(), 2);

        let codes = vec!["users".to_string()];
        let subset = service.import_from_role(f.editor, "user admin", Some(codes.as_slice())).await.unwrap();
        assert_eq!(subset.permissions, vec![entry(f.users, flags(true, false, false, false))]);

        let missing = service.import_from_role(999, "ghost", None).await.unwrap_err();
        assert_eq!(missing.code(), "CONFLICT");
    }
}
