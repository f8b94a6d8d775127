pub mod app;
pub mod catalog;
pub mod chat_stream;
pub mod config;
pub mod error;
pub mod ids;
pub mod message;
pub mod repository;
pub mod state;
pub mod store;
pub mod transport;
