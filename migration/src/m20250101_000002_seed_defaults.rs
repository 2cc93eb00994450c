use chrono::Utc;
use rbac_admin::entities::{permission_category, permission_group, prelude::*, role, role_permission};
use sea_orm_migration::prelude::*;
use sea_orm_migration::sea_orm::{ActiveModelTrait, ColumnTrait, EntityTrait, QueryFilter, Set};

#[derive(DeriveMigrationName)]
pub struct Migration;

const SUPER_ADMIN: &str = "super_admin";

/// (short code, name, description)
const GROUPS: &[(&str, &str, &str)] = &[
    ("system", "System", "Staff, roles and system settings"),
    ("content", "Content", "Published content and media"),
];

struct SeedCategory {
    group: &'static str,
    short_code: &'static str,
    name: &'static str,
    tag: &'static str,
    /// view, add, edit, delete
    enabled: [bool; 4],
}

const CATEGORIES: &[SeedCategory] = &[
    SeedCategory {
        group: "system",
        short_code: "staff",
        name: "Staff",
        tag: "user_management",
        enabled: [true, true, true, true],
    },
    SeedCategory {
        group: "system",
        short_code: "roles_permissions",
        name: "Roles & Permissions",
        tag: "user_management",
        enabled: [true, true, true, true],
    },
    SeedCategory {
        group: "system",
        short_code: "general_settings",
        name: "General Settings",
        tag: "system_settings",
        enabled: [true, false, true, false],
    },
    SeedCategory {
        group: "content",
        short_code: "posts",
        name: "Posts",
        tag: "content_management",
        enabled: [true, true, true, true],
    },
    SeedCategory {
        group: "content",
        short_code: "media",
        name: "Media",
        tag: "content_management",
        enabled: [true, true, false, true],
    },
];

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        let db = manager.get_connection();

        let mut group_ids = Vec::with_capacity(GROUPS.len());
        for (short_code, name, description) in GROUPS {
            let group = permission_group::ActiveModel {
                name: Set(String::from(*name)),
                short_code: Set(String::from(*short_code)),
                description: Set(Some(String::from(*description))),
                is_active: Set(true),
                ..Default::default()
            }
            .insert(db)
            .await?;
            group_ids.push((*short_code, group.id));
        }

        let now = Utc::now();
        let super_admin = role::ActiveModel {
            name: Set(String::from(SUPER_ADMIN)),
            description: Set(Some(String::from("Full access to every permission category"))),
            is_active: Set(true),
            created_at: Set(now.into()),
            updated_at: Set(now.into()),
            ..Default::default()
        }
        .insert(db)
        .await?;

        for seed in CATEGORIES {
            let group_id = group_ids
                .iter()
                .find(|(code, _)| *code == seed.group)
                .map(|(_, id)| *id)
                .ok_or_else(|| DbErr::Custom(format!("unknown seed group {}", seed.group)))?;
            let [view, add, edit, delete] = seed.enabled;

            let category = permission_category::ActiveModel {
                group_id: Set(group_id),
                name: Set(String::from(seed.name)),
                short_code: Set(String::from(seed.short_code)),
                capability_tag: Set(Some(String::from(seed.tag))),
                enable_view: Set(view),
                enable_add: Set(add),
                enable_edit: Set(edit),
                enable_delete: Set(delete),
                ..Default::default()
            }
            .insert(db)
            .await?;

            // super_admin holds everything the category permits
            role_permission::ActiveModel {
                role_id: Set(super_admin.id),
                category_id: Set(category.id),
                can_view: Set(view),
                can_add: Set(add),
                can_edit: Set(edit),
                can_delete: Set(delete),
                created_at: Set(now.into()),
                updated_at: Set(now.into()),
                ..Default::default()
            }
            .insert(db)
            .await?;
        }

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        let db = manager.get_connection();
        let codes: Vec<&str> = CATEGORIES.iter().map(|seed| seed.short_code).collect();
        let group_codes: Vec<&str> = GROUPS.iter().map(|(code, _, _)| *code).collect();

        if let Some(super_admin) = Role::find()
            .filter(role::Column::Name.eq(SUPER_ADMIN))
            .one(db)
            .await?
        {
            RolePermission::delete_many()
                .filter(role_permission::Column::RoleId.eq(super_admin.id))
                .exec(db)
                .await?;
            Role::delete_by_id(super_admin.id).exec(db).await?;
        }
        PermissionCategory::delete_many()
            .filter(permission_category::Column::ShortCode.is_in(codes))
            .exec(db)
            .await?;
        PermissionGroup::delete_many()
            .filter(permission_group::Column::ShortCode.is_in(group_codes))
            .exec(db)
            .await?;

        Ok(())
    }
}
