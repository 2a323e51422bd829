pub mod database;
pub mod sessions;
pub mod storage;
