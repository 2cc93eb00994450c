use async_graphql::{EmptySubscription, Schema};
use sea_orm::DatabaseConnection;

use crate::graphql::{MutationRoot, QueryRoot};
use crate::services::{
    DirectoryService, HistoryService, PermissionService, PermissionSyncService, SidebarService,
    TemplateService,
};

pub type ApiSchema = Schema<QueryRoot, MutationRoot, EmptySubscription>;

/// Build the schema with every service registered as schema data.
pub fn create_schema(db: DatabaseConnection) -> ApiSchema {
    Schema::build(QueryRoot, MutationRoot, EmptySubscription)
        .data(PermissionService::new(db.clone()))
        .data(DirectoryService::new(db.clone()))
        .data(SidebarService::new(db.clone()))
        .data(PermissionSyncService::new(db.clone()))
        .data(TemplateService::new(db.clone()))
        .data(HistoryService::new(db))
        .finish()
}
