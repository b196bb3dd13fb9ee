//! Application Configuration Module
//!
//! Configuration is loaded from TOML, overridden from the environment, and
//! validated once at startup. The resulting [`AppConfig`] is passed by value
//! into the components that need it; nothing reads configuration globally.
//!
//! ## Loading Order
//!
//! 1. `--config <path>` on the command line (errors are fatal)
//! 2. `MATERIAL_ORIGIN_CONFIG` environment variable (path to TOML file)
//! 3. `material_origin.toml` in the current working directory
//! 4. Built-in defaults
//!
//! After the file is chosen, `MATERIAL_ORIGIN_MODEL` and
//! `MATERIAL_ORIGIN_SERVER_ADDR` override the corresponding keys.
//!
//! The inference API key is never stored in the file. It is read from the
//! environment variable named by `inference.api_key_env`
//! (`GEMINI_API_KEY` by default).

mod app_config;
pub mod defaults;
pub mod validation;

pub use app_config::*;
