pub mod compactor;
pub mod config;
pub mod engine;
pub mod error;
pub mod http;
pub mod limits;
pub mod matcher;
pub mod model;
pub mod observability;
pub mod query;
pub mod resolver;
pub mod service;
pub mod sql;
pub mod store;
pub mod wal;
pub mod wire;
