//! Backend service for a personal AI assistant: conversations with
//! context-aware replies, media processing, saved web searches, and a
//! deliberate-reasoning endpoint, all persisted in SQLite and exposed
//! over HTTP.

pub mod chat;
pub mod config;
pub mod context;
pub mod database;
pub mod error;
pub mod gateway;
pub mod jobs;
pub mod media;
pub mod reasoning;
pub mod search;
pub mod server;
