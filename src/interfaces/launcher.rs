//! 代理核心启动器 (Core Launcher)
//!
//! 探测器只依赖此接口，具体实现 (本地 xray、测试替身) 由调用方注入。

use std::io;
use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;

use crate::core::error::LaunchError;

/// 运行中的核心进程句柄
#[async_trait]
pub trait CoreProcess: Send {
    /// 操作系统进程号 (测试替身可能没有)
    fn id(&self) -> Option<u32>;

    /// 非阻塞检查进程是否仍在运行
    fn is_running(&mut self) -> bool;

    /// 优雅终止：先请求退出，等待 `grace` 后强制结束
    async fn terminate(&mut self, grace: Duration) -> io::Result<()>;

    /// 立即强制结束，用于 `Drop` 等无法等待的路径
    fn kill_now(&mut self);
}

/// 核心程序启动器
#[async_trait]
pub trait CoreLauncher: Send + Sync {
    /// 定位可执行文件；多次调用返回同一路径
    async fn install(&self) -> Result<PathBuf, LaunchError>;

    /// 以给定配置文件启动一个核心实例
    async fn launch(&self, config_path: &Path) -> Result<Box<dyn CoreProcess>, LaunchError>;

    /// 停止由 [`CoreLauncher::launch`] 返回的实例
    async fn stop(&self, mut process: Box<dyn CoreProcess>, grace: Duration) -> io::Result<()> {
        process.terminate(grace).await
    }
}
