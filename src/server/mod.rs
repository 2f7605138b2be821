//! 网关 HTTP Server 模块
//!
//! 提供工具管理 API（列表、保存、连通性测试）以及工具反向代理入口。

mod handlers;
mod server;

pub use handlers::AppState;
pub use server::{GatewayServer, ServerError, ServerHandle};
