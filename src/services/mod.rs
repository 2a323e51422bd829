pub mod catalog;
pub mod intake;
pub mod record_store;
pub mod session_store;
pub mod storage;
pub mod worker;
