pub mod prelude;

pub mod admin_sessions;
pub mod uploads;
