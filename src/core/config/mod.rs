//! User configuration loaded from `config.toml`.
//!
//! Every key is optional; [`Config::app_settings`] fills in defaults for
//! anything left unset.

pub mod data;
pub mod io;


pub use data::{path_display, Config, CONFIG_KEYS};
pub use io::ConfigError;
