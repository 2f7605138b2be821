// Tool Gateway Library
// Reverse proxy that serves registered web tools under one origin for iframe embedding

pub mod config;
pub mod error;
pub mod proxy;
pub mod server;
pub mod storage;
pub mod tools;

pub use config::{GatewayConfig, DEFAULT_PORT};
pub use error::ManagementError;
pub use proxy::{ProxyError, ToolProxy};
pub use server::{GatewayServer, ServerHandle};
pub use storage::{Database, SettingsStore, SqliteSettingsStore};
pub use tools::{AccessMode, ToolDefinition, ToolRegistry};
