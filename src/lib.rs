pub mod analytics;
pub mod config;
pub mod models;
pub mod redirect;
pub mod storage;
