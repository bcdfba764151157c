#![allow(dead_code)]

use std::io;
use std::net::{Ipv4Addr, Ipv6Addr};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::Value;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::task::JoinHandle;

use nodesieve::core::error::LaunchError;
use nodesieve::core::model::{Node, Protocol};
use nodesieve::engine::ProbeSettings;
use nodesieve::interfaces::{CoreLauncher, CoreProcess};

/// 替身核心的行为
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Behavior {
    /// 在入站端口上提供 SOCKS5 转发
    Socks,
    /// 启动后立即退出
    ExitImmediately,
    /// `install` 失败
    NotInstalled,
}

#[derive(Default)]
pub struct Stats {
    pub launches: AtomicUsize,
    pub live: AtomicUsize,
    pub max_live: AtomicUsize,
    pub config_dirs: Mutex<Vec<PathBuf>>,
}

impl Stats {
    pub fn launches(&self) -> usize {
        self.launches.load(Ordering::SeqCst)
    }

    pub fn live(&self) -> usize {
        self.live.load(Ordering::SeqCst)
    }

    pub fn max_live(&self) -> usize {
        self.max_live.load(Ordering::SeqCst)
    }

    pub fn dirs(&self) -> Vec<PathBuf> {
        self.config_dirs.lock().clone()
    }
}

/// 测试用核心启动器：读取生成的配置，在入站端口上运行一个最小 SOCKS5 服务
pub struct FakeLauncher {
    pub behavior: Behavior,
    /// 每个 SOCKS 连接在转发前的额外等待
    pub delay: Duration,
    pub stats: Arc<Stats>,
}

impl FakeLauncher {
    pub fn new(behavior: Behavior) -> Self {
        Self {
            behavior,
            delay: Duration::ZERO,
            stats: Arc::new(Stats::default()),
        }
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }
}

#[async_trait]
impl CoreLauncher for FakeLauncher {
    async fn install(&self) -> Result<PathBuf, LaunchError> {
        match self.behavior {
            Behavior::NotInstalled => Err(LaunchError::NotInstalled("fake-core".into())),
            _ => Ok(PathBuf::from("/fake/xray")),
        }
    }

    async fn launch(&self, config_path: &Path) -> Result<Box<dyn CoreProcess>, LaunchError> {
        let text = tokio::fs::read_to_string(config_path).await?;
        if text.contains("panic-me") {
            panic!("fake core crashed");
        }

        self.stats.launches.fetch_add(1, Ordering::SeqCst);
        if let Some(dir) = config_path.parent() {
            self.stats.config_dirs.lock().push(dir.to_path_buf());
        }

        if self.behavior == Behavior::ExitImmediately {
            return Ok(Box::new(FakeProcess {
                server: None,
                alive: false,
                stats: self.stats.clone(),
            }));
        }

        let config: Value = serde_json::from_str(&text).map_err(io::Error::from)?;
        let port = config["inbounds"][0]["port"]
            .as_u64()
            .and_then(|p| u16::try_from(p).ok())
            .ok_or_else(|| io::Error::other("config has no inbound port"))?;
        let listener = TcpListener::bind(("127.0.0.1", port)).await?;

        let live = self.stats.live.fetch_add(1, Ordering::SeqCst) + 1;
        self.stats.max_live.fetch_max(live, Ordering::SeqCst);

        let delay = self.delay;
        let server = tokio::spawn(async move {
            while let Ok((conn, _)) = listener.accept().await {
                tokio::spawn(async move {
                    let _ = handle_socks(conn, delay).await;
                });
            }
        });

        Ok(Box::new(FakeProcess {
            server: Some(server),
            alive: true,
            stats: self.stats.clone(),
        }))
    }
}

pub struct FakeProcess {
    server: Option<JoinHandle<()>>,
    alive: bool,
    stats: Arc<Stats>,
}

impl FakeProcess {
    fn shutdown(&mut self) {
        if let Some(server) = self.server.take() {
            server.abort();
        }
        if self.alive {
            self.alive = false;
            self.stats.live.fetch_sub(1, Ordering::SeqCst);
        }
    }
}

#[async_trait]
impl CoreProcess for FakeProcess {
    fn id(&self) -> Option<u32> {
        None
    }

    fn is_running(&mut self) -> bool {
        self.alive
    }

    async fn terminate(&mut self, _grace: Duration) -> io::Result<()> {
        self.shutdown();
        Ok(())
    }

    fn kill_now(&mut self) {
        self.shutdown();
    }
}

/// 无认证 SOCKS5 CONNECT
async fn handle_socks(mut conn: TcpStream, delay: Duration) -> io::Result<()> {
    let mut greeting = [0u8; 2];
    conn.read_exact(&mut greeting).await?;
    let mut methods = vec![0u8; usize::from(greeting[1])];
    conn.read_exact(&mut methods).await?;
    conn.write_all(&[5, 0]).await?;

    let mut request = [0u8; 4];
    conn.read_exact(&mut request).await?;
    let host = match request[3] {
        1 => {
            let mut ip = [0u8; 4];
            conn.read_exact(&mut ip).await?;
            Ipv4Addr::from(ip).to_string()
        }
        3 => {
            let len = conn.read_u8().await?;
            let mut name = vec![0u8; usize::from(len)];
            conn.read_exact(&mut name).await?;
            String::from_utf8_lossy(&name).into_owned()
        }
        4 => {
            let mut ip = [0u8; 16];
            conn.read_exact(&mut ip).await?;
            Ipv6Addr::from(ip).to_string()
        }
        _ => return Err(io::Error::other("unsupported address type")),
    };
    let port = conn.read_u16().await?;

    if !delay.is_zero() {
        tokio::time::sleep(delay).await;
    }

    match TcpStream::connect((host.as_str(), port)).await {
        Ok(mut upstream) => {
            conn.write_all(&[5, 0, 0, 1, 0, 0, 0, 0, 0, 0]).await?;
            tokio::io::copy_bidirectional(&mut conn, &mut upstream).await?;
        }
        Err(_) => conn.write_all(&[5, 5, 0, 1, 0, 0, 0, 0, 0, 0]).await?,
    }
    Ok(())
}

/// 对任意请求都返回固定状态码的 HTTP 服务，返回其 URL
pub async fn http_server(status: u16) -> String {
    let listener = TcpListener::bind(("127.0.0.1", 0)).await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        while let Ok((mut conn, _)) = listener.accept().await {
            tokio::spawn(async move {
                let mut buf = Vec::new();
                let mut chunk = [0u8; 1024];
                while !buf.windows(4).any(|w| w == b"\r\n\r\n") {
                    match conn.read(&mut chunk).await {
                        Ok(0) | Err(_) => return,
                        Ok(n) => buf.extend_from_slice(&chunk[..n]),
                    }
                }
                let response = format!(
                    "HTTP/1.1 {status} Test\r\nContent-Length: 0\r\nConnection: close\r\n\r\n"
                );
                let _ = conn.write_all(response.as_bytes()).await;
                let _ = conn.shutdown().await;
            });
        }
    });
    format!("http://{addr}/generate_204")
}

/// 接受连接但永不响应的 HTTP 服务
pub async fn hanging_server() -> String {
    let listener = TcpListener::bind(("127.0.0.1", 0)).await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        while let Ok((conn, _)) = listener.accept().await {
            tokio::spawn(async move {
                tokio::time::sleep(Duration::from_secs(60)).await;
                drop(conn);
            });
        }
    });
    format!("http://{addr}/")
}

pub fn settings(test_urls: Vec<String>) -> ProbeSettings {
    ProbeSettings::builder()
        .test_urls(test_urls)
        .request_timeout(Duration::from_millis(500))
        .readiness_timeout(Duration::from_millis(500))
        .max_latency(Duration::from_secs(2))
        .stop_timeout(Duration::from_millis(200))
        .build()
}

pub fn trojan(name: &str, password: &str) -> Node {
    Node::new(
        name,
        "proxy.example.com",
        443,
        Protocol::Trojan {
            password: password.to_string(),
        },
    )
}
