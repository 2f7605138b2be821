//! HTTP Server 实现
//!
//! 使用 axum 创建网关 HTTP Server，支持启动和停止。

use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;

use axum::{
    routing::{get, post},
    Router,
};
use thiserror::Error;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tower_http::cors::{Any, CorsLayer};

use super::handlers::{self, AppState};
use crate::config::{ConfigError, GatewayConfig};
use crate::proxy::{ConnectivityProber, ProxyError, ToolProxy};
use crate::storage::SettingsStore;
use crate::tools::ToolRegistry;

/// Server 启动错误
#[derive(Debug, Error)]
pub enum ServerError {
    #[error("配置错误: {0}")]
    Config(#[from] ConfigError),

    #[error("初始化代理失败: {0}")]
    Proxy(#[from] ProxyError),

    #[error("绑定 {addr} 失败: {source}")]
    Bind {
        addr: SocketAddr,
        #[source]
        source: std::io::Error,
    },
}

/// Server 控制句柄
///
/// 用于控制 Server 的生命周期，丢弃句柄会关闭 Server
pub struct ServerHandle {
    /// 关闭信号发送器
    shutdown_tx: Option<oneshot::Sender<()>>,
    task: Option<JoinHandle<()>>,
    /// 实际监听地址
    addr: SocketAddr,
}

impl ServerHandle {
    /// 获取当前端口
    pub fn port(&self) -> u16 {
        self.addr.port()
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.addr
    }

    /// 关闭 Server
    pub fn shutdown(mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }
    }

    /// 关闭 Server 并等待进行中的连接结束
    pub async fn shutdown_and_wait(mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }
        if let Some(task) = self.task.take() {
            if let Err(e) = task.await {
                tracing::error!(error = %e, "Server task failed");
            }
        }
    }
}

impl Drop for ServerHandle {
    fn drop(&mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }
    }
}

/// 网关 HTTP Server
pub struct GatewayServer {
    config: GatewayConfig,
    store: Arc<dyn SettingsStore>,
}

impl GatewayServer {
    /// 创建新的 Server 实例
    pub fn new(config: GatewayConfig, store: Arc<dyn SettingsStore>) -> Self {
        Self { config, store }
    }

    /// 构建共享状态
    pub fn build_state(&self) -> Result<AppState, ServerError> {
        let registry = Arc::new(ToolRegistry::new(
            self.store.clone(),
            self.config.proxy.cache_registry,
        ));
        let proxy = ToolProxy::new(registry.clone(), &self.config.proxy_settings())?;
        let prober = ConnectivityProber::new(
            self.config.probe_timeout(),
            self.config.probe.user_agent.as_deref(),
        )?;

        Ok(AppState {
            registry,
            proxy: Arc::new(proxy),
            prober: Arc::new(prober),
            api_prefix: self.config.normalized_api_prefix(),
        })
    }

    /// 创建路由
    ///
    /// 管理路由挂载在 API 前缀下；其余请求进入 fallback，由代理服务识别。
    pub fn router(state: AppState) -> Router {
        let management = Router::new()
            .route("/tools", get(handlers::list_tools).post(handlers::save_tools))
            .route("/tools/{tool_id}/test", post(handlers::test_tool))
            .layer(
                CorsLayer::new()
                    .allow_origin(Any)
                    .allow_methods(Any)
                    .allow_headers(Any),
            );

        let app = if state.api_prefix.is_empty() {
            Router::new().merge(management)
        } else {
            Router::new().nest(&state.api_prefix, management)
        };

        app.route("/api/health", get(handlers::health_check))
            .fallback(handlers::proxy_dispatch)
            .with_state(state)
    }

    /// 启动 Server
    ///
    /// # Arguments
    /// * `port` - 可选端口号，如果不提供则使用配置中的端口；0 表示由系统分配
    ///
    /// # Returns
    /// ServerHandle 用于控制 Server 生命周期
    pub async fn start(&self, port: Option<u16>) -> Result<ServerHandle, ServerError> {
        let port = port.unwrap_or(self.config.port);
        GatewayConfig::validate_port(port)?;

        let app = Self::router(self.build_state()?);

        let addr = SocketAddr::new(self.config.bind_address, port);
        let listener = tokio::net::TcpListener::bind(addr)
            .await
            .map_err(|source| ServerError::Bind { addr, source })?;
        let addr = listener
            .local_addr()
            .map_err(|source| ServerError::Bind { addr, source })?;

        let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();

        let task = tokio::spawn(async move {
            let graceful = axum::serve(listener, app).with_graceful_shutdown(async {
                let _ = shutdown_rx.await;
            });

            if let Err(e) = graceful.await {
                tracing::error!(error = %e, "Server error");
            }
            tracing::info!("Server stopped");
        });

        tracing::info!(%addr, api_prefix = %self.config.api_prefix, "Tool gateway listening");

        Ok(ServerHandle {
            shutdown_tx: Some(shutdown_tx),
            task: Some(task),
            addr,
        })
    }

    /// 检查端口是否可用
    pub async fn check_port_available(bind_address: IpAddr, port: u16) -> bool {
        tokio::net::TcpListener::bind(SocketAddr::new(bind_address, port))
            .await
            .is_ok()
    }
}
