use async_graphql::*;

use crate::graphql::actor;
use crate::graphql::types::*;
use crate::services::capability::Capability;
use crate::services::{PermissionSyncService, SidebarService, TemplateService};

pub struct MutationRoot;

fn template_permissions(input: Vec<TemplatePermissionInput>) -> Vec<TemplatePermission> {
    input.into_iter().map(TemplatePermission::from).collect()
}

#[Object]
impl MutationRoot {
    // Grant mutations

    /// Update many existing grants. Each entry reports its own outcome.
    async fn bulk_update_role_permissions(
        &self,
        ctx: &Context<'_>,
        updates: Vec<RolePermissionUpdate>,
    ) -> Result<Vec<BatchItemResult>> {
        let service = ctx.data::<PermissionSyncService>()?;
        Ok(service.bulk_update_role_permissions(&updates, actor(ctx)).await)
    }

    async fn update_role_permissions(
        &self,
        ctx: &Context<'_>,
        role_id: i32,
        updates: Vec<CategoryPermissionUpdate>,
    ) -> Result<Vec<BatchItemResult>> {
        let service = ctx.data::<PermissionSyncService>()?;
        Ok(service
            .update_role_permissions(role_id, &updates, actor(ctx))
            .await)
    }

    /// Replace the target role's grants with the source role's.
    async fn clone_role_permissions(
        &self,
        ctx: &Context<'_>,
        source_role_id: i32,
        target_role_id: i32,
        capabilities: Option<Vec<Capability>>,
    ) -> Result<GrantSetChange> {
        let service = ctx.data::<PermissionSyncService>()?;
        service
            .clone_role_permissions(source_role_id, target_role_id, capabilities.into(), actor(ctx))
            .await
            .map_err(|e| e.extend())
    }

    async fn delete_role(&self, ctx: &Context<'_>, role_id: i32) -> Result<CascadeDeleteResult> {
        let service = ctx.data::<PermissionSyncService>()?;
        service
            .delete_role_cascade(role_id, actor(ctx))
            .await
            .map_err(|e| e.extend())
    }

    async fn delete_permission_group(
        &self,
        ctx: &Context<'_>,
        group_id: i32,
    ) -> Result<CascadeDeleteResult> {
        let service = ctx.data::<PermissionSyncService>()?;
        service
            .delete_permission_group_cascade(group_id, actor(ctx))
            .await
            .map_err(|e| e.extend())
    }

    // Sidebar

    async fn update_menu_display_order(
        &self,
        ctx: &Context<'_>,
        updates: Vec<DisplayOrderUpdate>,
    ) -> Result<Vec<BatchItemResult>> {
        let service = ctx.data::<SidebarService>()?;
        Ok(service.update_menu_display_order(&updates).await)
    }

    async fn update_sub_menu_display_order(
        &self,
        ctx: &Context<'_>,
        updates: Vec<DisplayOrderUpdate>,
    ) -> Result<Vec<BatchItemResult>> {
        let service = ctx.data::<SidebarService>()?;
        Ok(service.update_sub_menu_display_order(&updates).await)
    }

    // Templates

    async fn create_template(
        &self,
        ctx: &Context<'_>,
        name: String,
        permissions: Vec<TemplatePermissionInput>,
    ) -> Result<PermissionTemplate> {
        let service = ctx.data::<TemplateService>()?;
        service
            .create(&name, &template_permissions(permissions))
            .await
            .map_err(|e| e.extend())
    }

    /// Replace a template's permissions, optionally keeping the old set as a version.
    async fn update_template(
        &self,
        ctx: &Context<'_>,
        name: String,
        permissions: Vec<TemplatePermissionInput>,
        #[graphql(default)] snapshot_current: bool,
    ) -> Result<PermissionTemplate> {
        let service = ctx.data::<TemplateService>()?;
        service
            .update(&name, &template_permissions(permissions), snapshot_current, actor(ctx))
            .await
            .map_err(|e| e.extend())
    }

    /// Returns the number of versions deleted with the template.
    async fn delete_template(&self, ctx: &Context<'_>, name: String) -> Result<u64> {
        let service = ctx.data::<TemplateService>()?;
        service.delete(&name).await.map_err(|e| e.extend())
    }

    async fn apply_template(
        &self,
        ctx: &Context<'_>,
        name: String,
        role_id: i32,
    ) -> Result<GrantSetChange> {
        let service = ctx.data::<TemplateService>()?;
        service
            .apply(&name, role_id, actor(ctx))
            .await
            .map_err(|e| e.extend())
    }

    async fn export_template(
        &self,
        ctx: &Context<'_>,
        name: String,
        role_id: i32,
    ) -> Result<GrantSetChange> {
        let service = ctx.data::<TemplateService>()?;
        service
            .export(&name, role_id, actor(ctx))
            .await
            .map_err(|e| e.extend())
    }

    async fn sync_template_to_roles(
        &self,
        ctx: &Context<'_>,
        name: String,
        role_ids: Vec<i32>,
        options: SyncOptions,
    ) -> Result<Vec<GrantSetChange>> {
        let service = ctx.data::<TemplateService>()?;
        service
            .sync_template_to_roles(&name, &role_ids, options, actor(ctx))
            .await
            .map_err(|e| e.extend())
    }

    async fn clone_template(
        &self,
        ctx: &Context<'_>,
        name: String,
        new_name: String,
        #[graphql(default)] modifications: TemplateModifications,
    ) -> Result<PermissionTemplate> {
        let service = ctx.data::<TemplateService>()?;
        service
            .clone_template(&name, &new_name, &modifications)
            .await
            .map_err(|e| e.extend())
    }

    async fn import_template_from_role(
        &self,
        ctx: &Context<'_>,
        role_id: i32,
        name: String,
        include_short_codes: Option<Vec<String>>,
    ) -> Result<PermissionTemplate> {
        let service = ctx.data::<TemplateService>()?;
        service
            .import_from_role(role_id, &name, include_short_codes.as_deref())
            .await
            .map_err(|e| e.extend())
    }

    /// Snapshot a template. Without `permissions` the current set is stored.
    async fn create_template_version(
        &self,
        ctx: &Context<'_>,
        name: String,
        permissions: Option<Vec<TemplatePermissionInput>>,
        created_by: Option<String>,
    ) -> Result<TemplateVersion> {
        let service = ctx.data::<TemplateService>()?;
        let permissions = permissions.map(template_permissions);
        let created_by = created_by.as_deref().unwrap_or(actor(ctx));
        service
            .create_version(&name, permissions.as_deref(), Some(created_by))
            .await
            .map_err(|e| e.extend())
    }

    async fn revert_template_to_version(
        &self,
        ctx: &Context<'_>,
        name: String,
        version_id: i32,
    ) -> Result<PermissionTemplate> {
        let service = ctx.data::<TemplateService>()?;
        service
            .revert_to_version(&name, version_id)
            .await
            .map_err(|e| e.extend())
    }
}
