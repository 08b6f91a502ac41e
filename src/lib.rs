pub mod app;
pub mod chat;
pub mod commands;
pub mod error;
pub mod models;
pub mod pagination;
pub mod ratings;
pub mod reconcile;
pub mod render;
pub mod router;
pub mod store;
pub mod token;
