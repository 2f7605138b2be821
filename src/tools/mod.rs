//! 工具注册表模块
//!
//! 管理运维人员注册的外部 Web 工具（基础 URL、凭据、访问模式），
//! 数据保存在外部设置存储中。

mod error;
mod model;
mod registry;

pub use error::RegistryError;
pub use model::{AccessMode, ToolDefinition, ToolSummary};
pub use registry::{
    decode_tools, lookup_tool, prepare_tools, ToolList, ToolLookup, ToolRegistry,
    TOOLS_SETTING_KEY,
};
