//! 探测运行时上下文 (Ephemeral Probe Context)
//!
//! 一次探测独占的资源：本地端口、临时目录 (含 `config.json`) 与核心进程。
//! 无论探测以何种方式结束，进程都会被终止、目录都会被删除。

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;
use tempfile::TempDir;
use tokio::net::{TcpListener, TcpStream};
use tokio::time::{Instant, sleep};
use tracing::{debug, warn};

use crate::core::error::ProbeError;
use crate::interfaces::{CoreLauncher, CoreProcess};

/// 临时目录前缀
pub const TEMP_PREFIX: &str = "node_test_";

const READY_POLL: Duration = Duration::from_millis(50);

/// 绑定 `127.0.0.1:0` 取得一个空闲端口后立即释放
pub async fn allocate_port(attempts: u32) -> Result<u16, ProbeError> {
    let attempts = attempts.max(1);
    for attempt in 1..=attempts {
        match TcpListener::bind(("127.0.0.1", 0)).await {
            Ok(listener) => return Ok(listener.local_addr()?.port()),
            Err(e) => debug!("端口分配失败 ({attempt}/{attempts}): {e}"),
        }
    }
    Err(ProbeError::PortAllocation(attempts))
}

/// 单次探测的作用域资源
pub struct EphemeralProbeContext {
    launcher: Arc<dyn CoreLauncher>,
    dir: Option<TempDir>,
    port: u16,
    process: Option<Box<dyn CoreProcess>>,
}

impl EphemeralProbeContext {
    /// 分配端口并创建临时目录，尚未写入配置
    pub async fn create(launcher: Arc<dyn CoreLauncher>, port_attempts: u32) -> Result<Self, ProbeError> {
        let port = allocate_port(port_attempts).await?;
        let dir = tempfile::Builder::new().prefix(TEMP_PREFIX).tempdir()?;
        Ok(Self {
            launcher,
            dir: Some(dir),
            port,
            process: None,
        })
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    pub fn dir(&self) -> Option<&Path> {
        self.dir.as_ref().map(TempDir::path)
    }

    fn config_path(&self) -> Option<PathBuf> {
        self.dir().map(|d| d.join("config.json"))
    }

    /// 写入 `config.json` 并启动核心；立刻退出视为 [`ProbeError::CoreExited`]
    pub async fn launch(&mut self, config: &Value) -> Result<(), ProbeError> {
        let path = self
            .config_path()
            .ok_or_else(|| ProbeError::Io(std::io::Error::other("probe context already released")))?;
        let bytes = serde_json::to_vec_pretty(config).map_err(std::io::Error::from)?;
        tokio::fs::write(&path, bytes).await?;

        let mut process = self.launcher.launch(&path).await?;
        let running = process.is_running();
        self.process = Some(process);
        if running { Ok(()) } else { Err(ProbeError::CoreExited) }
    }

    /// 轮询连接本地端口，直到可连或超时；进程中途退出则立即失败
    ///
    /// 超时本身不算失败，由后续 HTTP 请求决定结果。
    pub async fn wait_ready(&mut self, timeout: Duration) -> Result<(), ProbeError> {
        let deadline = Instant::now() + timeout;
        loop {
            if !self.process.as_mut().is_some_and(|p| p.is_running()) {
                return Err(ProbeError::CoreExited);
            }
            if TcpStream::connect(("127.0.0.1", self.port)).await.is_ok() {
                return Ok(());
            }
            if Instant::now() >= deadline {
                debug!("端口 {} 就绪等待超时，继续探测", self.port);
                return Ok(());
            }
            sleep(READY_POLL).await;
        }
    }

    /// 终止进程 (先优雅后强制) 并删除临时目录
    pub async fn release(mut self, grace: Duration) {
        if let Some(process) = self.process.take()
            && let Err(e) = self.launcher.stop(process, grace).await
        {
            warn!("终止核心进程失败: {e}");
        }
        if let Some(dir) = self.dir.take()
            && let Err(e) = dir.close()
        {
            warn!("清理临时目录失败: {e}");
        }
    }
}

impl Drop for EphemeralProbeContext {
    /// 未经 `release` 的路径 (取消、panic) 只能同步强杀，目录由 `TempDir` 自行删除
    fn drop(&mut self) {
        if let Some(mut process) = self.process.take() {
            process.kill_now();
        }
    }
}
