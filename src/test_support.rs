//! In-memory SQLite fixtures shared by the service tests.

use chrono::Utc;
use sea_orm::sea_query::Index;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectOptions, ConnectionTrait, Database, DatabaseConnection,
    DbBackend, EntityTrait, QueryFilter, QueryOrder, Schema, Set, Statement,
};

use crate::entities::{
    permission_category, permission_group, permission_template, prelude::*, role,
    role_permission, sidebar_menu, sidebar_sub_menu, staff, staff_role,
};
use crate::graphql::types::TemplatePermission;
use crate::services::capability::CapabilityFlags;

pub async fn setup_db() -> DatabaseConnection {
    let mut options = ConnectOptions::new("sqlite::memory:");
    options.max_connections(1).min_connections(1).sqlx_logging(false);
    let db = Database::connect(options)
        .await
        .expect("open in-memory sqlite");

    let backend = db.get_database_backend();
    let schema = Schema::new(DbBackend::Sqlite);
    let tables = vec![
        schema.create_table_from_entity(Staff),
        schema.create_table_from_entity(Role),
        schema.create_table_from_entity(StaffRole),
        schema.create_table_from_entity(PermissionGroup),
        schema.create_table_from_entity(PermissionCategory),
        schema.create_table_from_entity(RolePermission),
        schema.create_table_from_entity(SidebarMenu),
        schema.create_table_from_entity(SidebarSubMenu),
        schema.create_table_from_entity(PermissionTemplate),
        schema.create_table_from_entity(TemplateVersion),
        schema.create_table_from_entity(PermissionHistory),
    ];
    for table in tables {
        db.execute(backend.build(&table))
            .await
            .expect("create table");
    }

    let unique_grant = Index::create()
        .name("idx_roles_permissions_role_category")
        .table(RolePermission)
        .col(role_permission::Column::RoleId)
        .col(role_permission::Column::CategoryId)
        .unique()
        .to_owned();
    db.execute(backend.build(&unique_grant))
        .await
        .expect("create grant index");

    db
}

/// Makes every insert into `roles_permissions` for `role_id` abort.
pub async fn fail_grant_inserts_for(db: &DatabaseConnection, role_id: i32) {
    let sql = format!(
        "CREATE TRIGGER fail_grants_{role_id} BEFORE INSERT ON roles_permissions \
         WHEN NEW.role_id = {role_id} BEGIN SELECT RAISE(ABORT, 'injected failure'); END"
    );
    db.execute(Statement::from_string(DbBackend::Sqlite, sql))
        .await
        .expect("create failure trigger");
}

pub async fn insert_role(db: &DatabaseConnection, name: &str) -> role::Model {
    let now = Utc::now();
    role::ActiveModel {
        name: Set(name.to_string()),
        description: Set(Some(format!("{name} role"))),
        is_active: Set(true),
        created_at: Set(now.into()),
        updated_at: Set(now.into()),
        ..Default::default()
    }
    .insert(db)
    .await
    .expect("insert role")
}

pub async fn insert_group(db: &DatabaseConnection, code: &str) -> permission_group::Model {
    permission_group::ActiveModel {
        name: Set(format!("{code} group")),
        short_code: Set(code.to_string()),
        description: Set(None),
        is_active: Set(true),
        ..Default::default()
    }
    .insert(db)
    .await
    .expect("insert group")
}

pub async fn insert_category(
    db: &DatabaseConnection,
    group_id: i32,
    name: &str,
    permittable: CapabilityFlags,
    capability_tag: Option<&str>,
) -> permission_category::Model {
    permission_category::ActiveModel {
        group_id: Set(group_id),
        name: Set(name.to_string()),
        short_code: Set(name.to_lowercase().replace(' ', "_")),
        capability_tag: Set(capability_tag.map(str::to_string)),
        enable_view: Set(permittable.can_view),
        enable_add: Set(permittable.can_add),
        enable_edit: Set(permittable.can_edit),
        enable_delete: Set(permittable.can_delete),
        ..Default::default()
    }
    .insert(db)
    .await
    .expect("insert category")
}

pub async fn insert_grant(
    db: &DatabaseConnection,
    role_id: i32,
    category_id: i32,
    flags: CapabilityFlags,
) -> role_permission::Model {
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
    .insert(db)
    .await
    .expect("insert grant")
}

pub async fn insert_staff(db: &DatabaseConnection, name: &str, is_superadmin: bool) -> staff::Model {
    staff::ActiveModel {
        name: Set(name.to_string()),
        email: Set(format!("{}@example.com", name.to_lowercase())),
        is_active: Set(true),
        is_superadmin: Set(is_superadmin),
        ..Default::default()
    }
    .insert(db)
    .await
    .expect("insert staff")
}

pub async fn assign_role(db: &DatabaseConnection, staff_id: i32, role_id: i32) {
    staff_role::ActiveModel {
        staff_id: Set(staff_id),
        role_id: Set(role_id),
    }
    .insert(db)
    .await
    .expect("assign role");
}

pub async fn insert_menu(
    db: &DatabaseConnection,
    name: &str,
    category_id: Option<i32>,
    display_order: i32,
) -> sidebar_menu::Model {
    sidebar_menu::ActiveModel {
        name: Set(name.to_string()),
        icon: Set(None),
        route_path: Set(Some(format!("/{}", name.to_lowercase()))),
        display_order: Set(display_order),
        is_active: Set(true),
        permission_group_id: Set(None),
        permission_category_id: Set(category_id),
        ..Default::default()
    }
    .insert(db)
    .await
    .expect("insert menu")
}

pub async fn insert_sub_menu(
    db: &DatabaseConnection,
    menu_id: i32,
    name: &str,
    display_order: i32,
) -> sidebar_sub_menu::Model {
    sidebar_sub_menu::ActiveModel {
        menu_id: Set(menu_id),
        name: Set(name.to_string()),
        icon: Set(None),
        route_path: Set(Some(format!("/{}", name.to_lowercase()))),
        display_order: Set(display_order),
        is_active: Set(true),
        permission_category_id: Set(None),
        ..Default::default()
    }
    .insert(db)
    .await
    .expect("insert sub menu")
}

pub async fn insert_template(
    db: &DatabaseConnection,
    name: &str,
    permissions: &[TemplatePermission],
) -> permission_template::Model {
    let now = Utc::now();
    permission_template::ActiveModel {
        name: Set(name.to_string()),
        permissions: Set(serde_json::to_value(permissions).expect("encode template")),
        created_at: Set(now.into()),
        updated_at: Set(now.into()),
        last_used: Set(None),
        ..Default::default()
    }
    .insert(db)
    .await
    .expect("insert template")
}

/// A role's grants as `(category id, flags)`, ordered by category.
pub async fn grants_of(db: &DatabaseConnection, role_id: i32) -> Vec<(i32, CapabilityFlags)> {
    RolePermission::find()
        .filter(role_permission::Column::RoleId.eq(role_id))
        .order_by_asc(role_permission::Column::CategoryId)
        .all(db)
        .await
        .expect("load grants")
        .iter()
        .map(|grant| (grant.category_id, CapabilityFlags::from(grant)))
        .collect()
}

pub fn flags(can_view: bool, can_add: bool, can_edit: bool, can_delete: bool) -> CapabilityFlags {
    CapabilityFlags::new(can_view, can_add, can_edit, can_delete)
}
