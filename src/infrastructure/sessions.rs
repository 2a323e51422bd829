use crate::config::{AppConfig, SessionBackend};
use crate::services::session_store::{DbSessionStore, MemorySessionStore, SessionStore};
use sea_orm::DatabaseConnection;
use std::sync::Arc;
use tracing::info;

pub fn setup_session_store(db: &DatabaseConnection, config: &AppConfig) -> Arc<dyn SessionStore> {
    match config.session_backend {
        SessionBackend::Database => {
            info!("🔐 Admin sessions: database ({}h TTL)", config.session_ttl_hours);
            Arc::new(DbSessionStore::new(
                db.clone(),
                config.session_secret.clone(),
            ))
        }
        SessionBackend::Memory => {
            info!("🔐 Admin sessions: in-memory ({}h TTL)", config.session_ttl_hours);
            Arc::new(MemorySessionStore::new())
        }
    }
}
