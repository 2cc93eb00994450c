pub use super::permission_category::Entity as PermissionCategory;
pub use super::permission_group::Entity as PermissionGroup;
pub use super::permission_history::Entity as PermissionHistory;
pub use super::permission_template::Entity as PermissionTemplate;
pub use super::role::Entity as Role;
pub use super::role_permission::Entity as RolePermission;
pub use super::sidebar_menu::Entity as SidebarMenu;
pub use super::sidebar_sub_menu::Entity as SidebarSubMenu;
pub use super::staff::Entity as Staff;
pub use super::staff_role::Entity as StaffRole;
pub use super::template_version::Entity as TemplateVersion;
