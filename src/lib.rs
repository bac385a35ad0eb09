pub mod auth;
pub mod config;
pub mod db;
pub mod email;
pub mod error;
pub mod lifecycle;
pub mod models;
pub mod notify;
pub mod policy;
pub mod routes;
pub mod s3;
pub mod state;
pub mod storage;
pub mod store;
pub mod workers;

pub use workers::{default_handlers, Worker};
