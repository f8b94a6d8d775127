//! Chatdeck is a chat client that keeps conversations grouped into projects
//! and streams assistant replies from OpenAI-compatible APIs.
//!
//! The crate is organized around a small set of collaborating layers:
//! - [`core`] owns the persisted project/chat/message hierarchy, the
//!   streaming completion engine, and the session context that ties them to
//!   the current selection.
//! - [`api`] defines chat/model payloads and the model-list client.
//! - [`cli`] is the command-line front end used by the `chatdeck` binary.
//!
//! A presentation layer drives [`core::app::ChatApp`] and receives live
//! updates through the callback registered with
//! [`core::app::ChatApp::subscribe`].

pub mod api;
pub mod cli;
pub mod core;
pub mod logging;
pub mod utils;
