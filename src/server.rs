use anyhow::Result;
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper_util::rt::TokioIo;
use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::{TcpListener, TcpStream};
use tracing::{debug, error, info};

use crate::handler::{handle_request, AppState};

/// HTTP 服务器
pub struct Server {
    listener: TcpListener,
    state: Arc<AppState>,
}

impl Server {
    /// 绑定监听地址
    pub async fn bind(addr: &str, state: AppState) -> Result<Self> {
        let listener = TcpListener::bind(addr).await?;
        info!("🎯 HTTP 服务监听 {}", listener.local_addr()?);

        Ok(Self {
            listener,
            state: Arc::new(state),
        })
    }

    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.listener.local_addr()?)
    }

    /// 运行服务器直到收到 SIGINT / SIGTERM
    pub async fn run(self) -> Result<()> {
        self.run_until(shutdown_signal()).await
    }

    /// 运行服务器直到 `shutdown` 完成
    pub async fn run_until<F>(self, shutdown: F) -> Result<()>
    where
        F: Future<Output = ()>,
    {
        tokio::pin!(shutdown);

        loop {
            tokio::select! {
                _ = &mut shutdown => {
                    info!("👋 服务正在关闭");
                    break;
                }
                accepted = self.listener.accept() => {
                    match accepted {
                        Ok((stream, peer)) => {
                            let state = self.state.clone();
                            tokio::spawn(async move {
                                Self::serve_connection(stream, peer, state).await;
                            });
                        }
                        Err(e) => {
                            error!("接受连接失败: {}", e);
                        }
                    }
                }
            }
        }

        Ok(())
    }

    /// 在单个 TCP 连接上提供 HTTP/1.1 服务
    async fn serve_connection(stream: TcpStream, peer: SocketAddr, state: Arc<AppState>) {
        debug!("📥 新连接来自: {}", peer);

        let service = service_fn(move |req| handle_request(state.clone(), req, peer));

        if let Err(e) = http1::Builder::new()
            .serve_connection(TokioIo::new(stream), service)
            .await
        {
            debug!("连接 {} 处理结束: {}", peer, e);
        }
    }
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("监听 Ctrl+C 失败: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!("监听 SIGTERM 失败: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("收到 SIGINT"),
        _ = terminate => info!("收到 SIGTERM"),
    }
}
