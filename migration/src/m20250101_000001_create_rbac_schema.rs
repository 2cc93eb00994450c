use sea_orm_migration::{prelude::*, schema::*};

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(Staff::Table)
                    .if_not_exists()
                    .col(pk_auto(Staff::Id))
                    .col(string(Staff::Name))
                    .col(string_uniq(Staff::Email))
                    .col(boolean(Staff::IsActive).default(true))
                    .col(boolean(Staff::IsSuperadmin).default(false))
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(Roles::Table)
                    .if_not_exists()
                    .col(pk_auto(Roles::Id))
                    .col(string_uniq(Roles::Name))
                    .col(string_null(Roles::Description))
                    .col(boolean(Roles::IsActive).default(true))
                    .col(timestamp_with_time_zone(Roles::CreatedAt))
                    .col(timestamp_with_time_zone(Roles::UpdatedAt))
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(StaffRoles::Table)
                    .if_not_exists()
                    .col(integer(StaffRoles::StaffId))
                    .col(integer(StaffRoles::RoleId))
                    .primary_key(
                        Index::create()
                            .col(StaffRoles::StaffId)
                            .col(StaffRoles::RoleId),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk-staff-roles-staff")
                            .from(StaffRoles::Table, StaffRoles::StaffId)
                            .to(Staff::Table, Staff::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk-staff-roles-role")
                            .from(StaffRoles::Table, StaffRoles::RoleId)
                            .to(Roles::Table, Roles::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(PermissionGroup::Table)
                    .if_not_exists()
                    .col(pk_auto(PermissionGroup::Id))
                    .col(string(PermissionGroup::Name))
                    .col(string_uniq(PermissionGroup::ShortCode))
                    .col(string_null(PermissionGroup::Description))
                    .col(boolean(PermissionGroup::IsActive).default(true))
                    .to_owned(),
            )
            .await?;

        // capability_tag drives the effective-permission flags of the access map
        manager
            .create_table(
                Table::create()
                    .table(PermissionCategory::Table)
                    .if_not_exists()
                    .col(pk_auto(PermissionCategory::Id))
                    .col(integer(PermissionCategory::PermGroupId))
                    .col(string(PermissionCategory::Name))
                    .col(string_uniq(PermissionCategory::ShortCode))
                    .col(string_null(PermissionCategory::CapabilityTag))
                    .col(boolean(PermissionCategory::EnableView).default(true))
                    .col(boolean(PermissionCategory::EnableAdd).default(true))
                    .col(boolean(PermissionCategory::EnableEdit).default(true))
                    .col(boolean(PermissionCategory::EnableDelete).default(true))
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk-permission-category-group")
                            .from(PermissionCategory::Table, PermissionCategory::PermGroupId)
                            .to(PermissionGroup::Table, PermissionGroup::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(RolesPermissions::Table)
                    .if_not_exists()
                    .col(pk_auto(RolesPermissions::Id))
                    .col(integer(RolesPermissions::RoleId))
                    .col(integer(RolesPermissions::PermCatId))
                    .col(boolean(RolesPermissions::CanView).default(false))
                    .col(boolean(RolesPermissions::CanAdd).default(false))
                    .col(boolean(RolesPermissions::CanEdit).default(false))
                    .col(boolean(RolesPermissions::CanDelete).default(false))
                    .col(timestamp_with_time_zone(RolesPermissions::CreatedAt))
                    .col(timestamp_with_time_zone(RolesPermissions::UpdatedAt))
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk-roles-permissions-role")
                            .from(RolesPermissions::Table, RolesPermissions::RoleId)
                            .to(Roles::Table, Roles::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk-roles-permissions-category")
                            .from(RolesPermissions::Table, RolesPermissions::PermCatId)
                            .to(PermissionCategory::Table, PermissionCategory::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .to_owned(),
            )
            .await?;

        // At most one grant per (role, category)
        manager
            .create_index(
                Index::create()
                    .name("idx_roles_permissions_role_category")
                    .table(RolesPermissions::Table)
                    .col(RolesPermissions::RoleId)
                    .col(RolesPermissions::PermCatId)
                    .unique()
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(SidebarMenus::Table)
                    .if_not_exists()
                    .col(pk_auto(SidebarMenus::Id))
                    .col(string(SidebarMenus::Name))
                    .col(string_null(SidebarMenus::Icon))
                    .col(string_null(SidebarMenus::RoutePath))
                    .col(integer(SidebarMenus::DisplayOrder).default(0))
                    .col(boolean(SidebarMenus::IsActive).default(true))
                    .col(integer_null(SidebarMenus::PermissionGroupId))
                    .col(integer_null(SidebarMenus::PermissionCategoryId))
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk-sidebar-menus-group")
                            .from(SidebarMenus::Table, SidebarMenus::PermissionGroupId)
                            .to(PermissionGroup::Table, PermissionGroup::Id)
                            .on_delete(ForeignKeyAction::SetNull),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk-sidebar-menus-category")
                            .from(SidebarMenus::Table, SidebarMenus::PermissionCategoryId)
                            .to(PermissionCategory::Table, PermissionCategory::Id)
                            .on_delete(ForeignKeyAction::SetNull),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(SidebarSubMenus::Table)
                    .if_not_exists()
                    .col(pk_auto(SidebarSubMenus::Id))
                    .col(integer(SidebarSubMenus::MenuId))
                    .col(string(SidebarSubMenus::Name))
                    .col(string_null(SidebarSubMenus::Icon))
                    .col(string_null(SidebarSubMenus::RoutePath))
                    .col(integer(SidebarSubMenus::DisplayOrder).default(0))
                    .col(boolean(SidebarSubMenus::IsActive).default(true))
                    .col(integer_null(SidebarSubMenus::PermissionCategoryId))
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk-sidebar-sub-menus-menu")
                            .from(SidebarSubMenus::Table, SidebarSubMenus::MenuId)
                            .to(SidebarMenus::Table, SidebarMenus::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk-sidebar-sub-menus-category")
                            .from(SidebarSubMenus::Table, SidebarSubMenus::PermissionCategoryId)
                            .to(PermissionCategory::Table, PermissionCategory::Id)
                            .on_delete(ForeignKeyAction::SetNull),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(RolePermissionTemplates::Table)
                    .if_not_exists()
                    .col(pk_auto(RolePermissionTemplates::Id))
                    .col(string_uniq(RolePermissionTemplates::Name))
                    .col(json(RolePermissionTemplates::Permissions))
                    .col(timestamp_with_time_zone(RolePermissionTemplates::CreatedAt))
                    .col(timestamp_with_time_zone(RolePermissionTemplates::UpdatedAt))
                    .col(timestamp_with_time_zone_null(RolePermissionTemplates::LastUsed))
                    .to_owned(),
            )
            .await?;

        // Versions go with their template
        manager
            .create_table(
                Table::create()
                    .table(RolePermissionTemplateVersions::Table)
                    .if_not_exists()
                    .col(pk_auto(RolePermissionTemplateVersions::VersionId))
                    .col(string(RolePermissionTemplateVersions::TemplateName))
                    .col(json(RolePermissionTemplateVersions::Permissions))
                    .col(timestamp_with_time_zone(RolePermissionTemplateVersions::CreatedAt))
                    .col(string(RolePermissionTemplateVersions::CreatedBy).default("system"))
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk-template-versions-template")
                            .from(
                                RolePermissionTemplateVersions::Table,
                                RolePermissionTemplateVersions::TemplateName,
                            )
                            .to(RolePermissionTemplates::Table, RolePermissionTemplates::Name)
                            .on_delete(ForeignKeyAction::Cascade)
                            .on_update(ForeignKeyAction::Cascade),
                    )
                    .to_owned(),
            )
            .await?;

        // History outlives the roles and categories it mentions, so no foreign keys
        manager
            .create_table(
                Table::create()
                    .table(RolePermissionHistory::Table)
                    .if_not_exists()
                    .col(pk_auto(RolePermissionHistory::Id))
                    .col(integer(RolePermissionHistory::RoleId))
                    .col(integer(RolePermissionHistory::CategoryId))
                    .col(json(RolePermissionHistory::Changes))
                    .col(string(RolePermissionHistory::ChangedBy))
                    .col(timestamp_with_time_zone(RolePermissionHistory::ChangedAt))
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_role_permission_history_role_changed_at")
                    .table(RolePermissionHistory::Table)
                    .col(RolePermissionHistory::RoleId)
                    .col(RolePermissionHistory::ChangedAt)
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        for table in [
            RolePermissionHistory::Table.into_iden(),
            RolePermissionTemplateVersions::Table.into_iden(),
            RolePermissionTemplates::Table.into_iden(),
            SidebarSubMenus::Table.into_iden(),
            SidebarMenus::Table.into_iden(),
            RolesPermissions::Table.into_iden(),
            PermissionCategory::Table.into_iden(),
            PermissionGroup::Table.into_iden(),
            StaffRoles::Table.into_iden(),
            Roles::Table.into_iden(),
            Staff::Table.into_iden(),
        ] {
            manager
                .drop_table(Table::drop().table(table).if_exists().to_owned())
                .await?;
        }

        Ok(())
    }
}

#[derive(DeriveIden)]
enum Staff {
    Table,
    Id,
    Name,
    Email,
    IsActive,
    IsSuperadmin,
}

#[derive(DeriveIden)]
enum Roles {
    Table,
    Id,
    Name,
    Description,
    IsActive,
    CreatedAt,
    UpdatedAt,
}

#[derive(DeriveIden)]
enum StaffRoles {
    Table,
    StaffId,
    RoleId,
}

#[derive(DeriveIden)]
enum PermissionGroup {
    Table,
    Id,
    Name,
    ShortCode,
    Description,
    IsActive,
}

#[derive(DeriveIden)]
enum PermissionCategory {
    Table,
    Id,
    PermGroupId,
    Name,
    ShortCode,
    CapabilityTag,
    EnableView,
    EnableAdd,
    EnableEdit,
    EnableDelete,
}

#[derive(DeriveIden)]
enum RolesPermissions {
    Table,
    Id,
    RoleId,
    PermCatId,
    CanView,
    CanAdd,
    CanEdit,
    CanDelete,
    CreatedAt,
    UpdatedAt,
}

#[derive(DeriveIden)]
enum SidebarMenus {
    Table,
    Id,
    Name,
    Icon,
    RoutePath,
    DisplayOrder,
    IsActive,
    PermissionGroupId,
    PermissionCategoryId,
}

#[derive(DeriveIden)]
enum SidebarSubMenus {
    Table,
    Id,
    MenuId,
    Name,
    Icon,
    RoutePath,
    DisplayOrder,
    IsActive,
    PermissionCategoryId,
}

#[derive(DeriveIden)]
enum RolePermissionTemplates {
    Table,
    Id,
    Name,
    Permissions,
    CreatedAt,
    UpdatedAt,
    LastUsed,
}

#[derive(DeriveIden)]
enum RolePermissionTemplateVersions {
    Table,
    VersionId,
    TemplateName,
    Permissions,
    CreatedAt,
    CreatedBy,
}

#[derive(DeriveIden)]
enum RolePermissionHistory {
    Table,
    Id,
    RoleId,
    CategoryId,
    Changes,
    ChangedBy,
    ChangedAt,
}
