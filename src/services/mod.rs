pub mod capability;
pub mod directory;
pub mod flatten;
pub(crate) mod grants;
pub mod history;
pub mod permission;
pub mod sidebar;
pub mod sync;
pub mod template;

pub use directory::DirectoryService;
pub use history::HistoryService;
pub use permission::PermissionService;
pub use sidebar::SidebarService;
pub use sync::PermissionSyncService;
pub use template::TemplateService;
