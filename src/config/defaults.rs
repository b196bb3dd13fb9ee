//! Built-in configuration defaults.
//!
//! Grouped by subsystem for easy discovery.

// ============================================================================
// Inference Service
// ============================================================================

/// Model identifier addressed for every stage.
pub const MODEL: &str = "gemini-2.5-flash";

/// Base URL of the Gemini REST API (without trailing slash).
pub const BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta";

/// Environment variable holding the API key.
pub const API_KEY_ENV: &str = "GEMINI_API_KEY";

/// Upper bound on one stage's request/response exchange (seconds).
pub const STAGE_TIMEOUT_SECS: u64 = 60;

/// TCP connect timeout for the inference client (seconds).
pub const CONNECT_TIMEOUT_SECS: u64 = 10;

// ============================================================================
// HTTP Server
// ============================================================================

/// Default bind address for `serve`.
pub const SERVER_ADDR: &str = "0.0.0.0:8080";

/// Largest accepted upload (bytes). 20 MiB matches the inline-data ceiling
/// of the inference service.
pub const MAX_IMAGE_BYTES: usize = 20 * 1024 * 1024;

// ============================================================================
// Environment
// ============================================================================

/// Path to the TOML config file.
pub const CONFIG_PATH_ENV: &str = "MATERIAL_ORIGIN_CONFIG";

/// Config file looked up in the working directory.
pub const LOCAL_CONFIG_FILE: &str = "material_origin.toml";

/// Overrides `inference.model`.
pub const MODEL_ENV: &str = "MATERIAL_ORIGIN_MODEL";

/// Overrides `server.addr`.
pub const SERVER_ADDR_ENV: &str = "MATERIAL_ORIGIN_SERVER_ADDR";

/// Comma-separated list of allowed CORS origins.
pub const CORS_ORIGINS_ENV: &str = "MATERIAL_ORIGIN_CORS_ORIGINS";
