pub use super::admin_sessions::Entity as AdminSessions;
pub use super::uploads::Entity as Uploads;
