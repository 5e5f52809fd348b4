pub mod client_handler;
pub mod error;
pub mod redis;
pub mod replica_client;
pub mod resp;
