// Organizer client - Library root

pub mod api;
pub mod auth;
pub mod config;
pub mod drafts;
pub mod error;
pub mod format;
pub mod http_client;
pub mod models;
pub mod pipeline;
pub mod storage;
