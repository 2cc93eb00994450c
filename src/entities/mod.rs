//! `SeaORM` entities for the RBAC administration schema

pub mod prelude;

pub mod permission_category;
pub mod permission_group;
pub mod permission_history;
pub mod permission_template;
pub mod role;
pub mod role_permission;
pub mod sidebar_menu;
pub mod sidebar_sub_menu;
pub mod staff;
pub mod staff_role;
pub mod template_version;
