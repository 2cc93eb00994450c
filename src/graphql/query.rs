use async_graphql::*;
use chrono::{DateTime, Utc};
use serde_json::Value;

use crate::graphql::types::*;
use crate::services::{
    DirectoryService, HistoryService, PermissionService, SidebarService, TemplateService,
};

pub struct QueryRoot;

#[Object]
impl QueryRoot {
    async fn health(&self) -> &str {
        "OK"
    }

    // Permission aggregation

    /// Every grant joined with its role, category and group.
    async fn combined_permissions(
        &self,
        ctx: &Context<'_>,
        #[graphql(default)] filter: PermissionFilter,
    ) -> Result<Vec<CombinedPermission>> {
        let service = ctx.data::<PermissionService>()?;
        service.combined_permissions(filter).await.map_err(|e| e.extend())
    }

    /// Search grants with a JSON filter object and an optional `{field, order}` sort.
    async fn search_permissions(
        &self,
        ctx: &Context<'_>,
        filters: Option<Json<Value>>,
        sort: Option<Json<Value>>,
    ) -> Result<Vec<CombinedPermission>> {
        let service = ctx.data::<PermissionService>()?;
        service
            .search_permissions(filters.as_ref().map(|f| &f.0), sort.as_ref().map(|s| &s.0))
            .await
            .map_err(|e| e.extend())
    }

    async fn permission_statistics(&self, ctx: &Context<'_>) -> Result<PermissionStatistics> {
        let service = ctx.data::<PermissionService>()?;
        service.statistics().await.map_err(|e| e.extend())
    }

    async fn validate_role_permissions(
        &self,
        ctx: &Context<'_>,
        role_id: i32,
        required: Vec<RequiredPermission>,
    ) -> Result<bool> {
        let service = ctx.data::<PermissionService>()?;
        service
            .validate_role_permissions(role_id, &required)
            .await
            .map_err(|e| e.extend())
    }

    async fn permission_matrix(&self, ctx: &Context<'_>) -> Result<PermissionMatrix> {
        let service = ctx.data::<PermissionService>()?;
        service.permission_matrix().await.map_err(|e| e.extend())
    }

    async fn role_access_map(&self, ctx: &Context<'_>, role_id: i32) -> Result<Option<RoleAccessMap>> {
        let service = ctx.data::<PermissionService>()?;
        service.role_access_map(role_id).await.map_err(|e| e.extend())
    }

    async fn compare_roles(&self, ctx: &Context<'_>, role_ids: Vec<i32>) -> Result<RoleComparison> {
        let service = ctx.data::<PermissionService>()?;
        service.compare_roles(&role_ids).await.map_err(|e| e.extend())
    }

    async fn role_permission_tree(
        &self,
        ctx: &Context<'_>,
        role_id: i32,
    ) -> Result<Option<RolePermissionTree>> {
        let service = ctx.data::<PermissionService>()?;
        service.role_permission_tree(role_id).await.map_err(|e| e.extend())
    }

    /// Grants holding capabilities their category does not permit.
    async fn invalid_grants(&self, ctx: &Context<'_>, role_id: i32) -> Result<Vec<InvalidGrant>> {
        let service = ctx.data::<PermissionService>()?;
        service.find_invalid_grants(role_id).await.map_err(|e| e.extend())
    }

    async fn conflicting_permissions(
        &self,
        ctx: &Context<'_>,
        role_id: i32,
    ) -> Result<Vec<ConflictingPermission>> {
        let service = ctx.data::<PermissionService>()?;
        service
            .find_conflicting_permissions(role_id)
            .await
            .map_err(|e| e.extend())
    }

    async fn missing_permissions(
        &self,
        ctx: &Context<'_>,
        role_id: i32,
    ) -> Result<Vec<MissingPermission>> {
        let service = ctx.data::<PermissionService>()?;
        service.find_missing_permissions(role_id).await.map_err(|e| e.extend())
    }

    async fn permission_dependencies(
        &self,
        ctx: &Context<'_>,
        category_id: i32,
    ) -> Result<Option<PermissionDependencies>> {
        let service = ctx.data::<PermissionService>()?;
        service
            .permission_dependencies(category_id)
            .await
            .map_err(|e| e.extend())
    }

    async fn role_access_summary(
        &self,
        ctx: &Context<'_>,
        role_id: i32,
    ) -> Result<Option<RoleAccessSummary>> {
        let service = ctx.data::<PermissionService>()?;
        service.role_access_summary(role_id).await.map_err(|e| e.extend())
    }

    // Directory views

    async fn staff_full_detail(&self, ctx: &Context<'_>, staff_id: i32) -> Result<Option<StaffDetail>> {
        let service = ctx.data::<DirectoryService>()?;
        service.staff_full_detail(staff_id).await.map_err(|e| e.extend())
    }

    async fn role_full_detail(&self, ctx: &Context<'_>, role_id: i32) -> Result<Option<RoleDetail>> {
        let service = ctx.data::<DirectoryService>()?;
        service.role_full_detail(role_id).await.map_err(|e| e.extend())
    }

    /// Dashboard payload; null when no superadmin staff exist.
    async fn superadmin_overview(&self, ctx: &Context<'_>) -> Result<Option<SuperadminOverview>> {
        let service = ctx.data::<DirectoryService>()?;
        service.superadmin_overview().await.map_err(|e| e.extend())
    }

    async fn sidebar_menus(
        &self,
        ctx: &Context<'_>,
        #[graphql(default)] active_only: bool,
    ) -> Result<Vec<SidebarMenu>> {
        let service = ctx.data::<SidebarService>()?;
        service.menu_tree(active_only).await.map_err(|e| e.extend())
    }

    // Templates

    async fn templates(&self, ctx: &Context<'_>) -> Result<Vec<PermissionTemplate>> {
        let service = ctx.data::<TemplateService>()?;
        service.list().await.map_err(|e| e.extend())
    }

    async fn template(&self, ctx: &Context<'_>, name: String) -> Result<Option<PermissionTemplate>> {
        let service = ctx.data::<TemplateService>()?;
        service.get(&name).await.map_err(|e| e.extend())
    }

    async fn template_versions(&self, ctx: &Context<'_>, name: String) -> Result<Vec<TemplateVersion>> {
        let service = ctx.data::<TemplateService>()?;
        service.list_versions(&name).await.map_err(|e| e.extend())
    }

    async fn template_version(
        &self,
        ctx: &Context<'_>,
        name: String,
        version_id: i32,
    ) -> Result<Option<TemplateVersion>> {
        let service = ctx.data::<TemplateService>()?;
        service.get_version(&name, version_id).await.map_err(|e| e.extend())
    }

    // History

    async fn permission_history(
        &self,
        ctx: &Context<'_>,
        #[graphql(default)] query: HistoryQuery,
    ) -> Result<Vec<PermissionChange>> {
        let service = ctx.data::<HistoryService>()?;
        service.history(query).await.map_err(|e| e.extend())
    }

    async fn role_history(
        &self,
        ctx: &Context<'_>,
        role_id: i32,
        from_date: Option<DateTime<Utc>>,
        to_date: Option<DateTime<Utc>>,
    ) -> Result<Vec<PermissionChange>> {
        let service = ctx.data::<HistoryService>()?;
        service
            .role_history(role_id, from_date, to_date)
            .await
            .map_err(|e| e.extend())
    }

    async fn recent_changes(&self, ctx: &Context<'_>, limit: Option<u64>) -> Result<Vec<PermissionChange>> {
        let service = ctx.data::<HistoryService>()?;
        service.recent_changes(limit).await.map_err(|e| e.extend())
    }

    async fn changes_summary(&self, ctx: &Context<'_>, role_id: i32) -> Result<Vec<DailyChangeSummary>> {
        let service = ctx.data::<HistoryService>()?;
        service.changes_summary(role_id).await.map_err(|e| e.extend())
    }
}
