use std::env::consts::EXE_SUFFIX;
use std::io;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use tokio::process::{Child, Command};
use tokio::sync::OnceCell;
use tokio::time::timeout;
use tracing::{debug, info, warn};

use crate::core::config::CoreConfig;
use crate::core::error::LaunchError;
use crate::interfaces::{CoreLauncher, CoreProcess};

/// 本地 xray 启动器
pub struct XrayLauncher {
    bin_dir: PathBuf,
    executable: String,
    resolved: OnceCell<PathBuf>,
}

impl XrayLauncher {
    pub fn new(bin_dir: impl Into<PathBuf>, executable: impl Into<String>) -> Self {
        Self {
            bin_dir: bin_dir.into(),
            executable: executable.into(),
            resolved: OnceCell::new(),
        }
    }

    pub fn from_config(core: &CoreConfig) -> Self {
        Self::new(&core.bin_path, &core.executable)
    }

    /// 先查 `bin_dir`，再查 `PATH`
    fn locate(&self) -> Option<PathBuf> {
        // 自动处理不同系统的扩展名 (Windows 为 .exe，Linux/Mac 为空)
        let file = format!("{}{}", self.executable, EXE_SUFFIX);
        let local = self.bin_dir.join(&file);
        if local.is_file() {
            return Some(local);
        }
        std::env::var_os("PATH").and_then(|paths| {
            std::env::split_paths(&paths)
                .map(|dir| dir.join(&file))
                .find(|p| p.is_file())
        })
    }
}

#[async_trait]
impl CoreLauncher for XrayLauncher {
    async fn install(&self) -> Result<PathBuf, LaunchError> {
        self.resolved
            .get_or_try_init(|| async {
                let path = self.locate().ok_or_else(|| {
                    LaunchError::NotInstalled(format!(
                        "{} (searched {} and PATH)",
                        self.executable,
                        self.bin_dir.display()
                    ))
                })?;
                info!("使用代理核心: {}", path.display());
                Ok::<_, LaunchError>(path)
            })
            .await
            .cloned()
    }

    async fn launch(&self, config_path: &Path) -> Result<Box<dyn CoreProcess>, LaunchError> {
        let executable = self.install().await?;
        let child = Command::new(&executable)
            .arg("-c")
            .arg(config_path)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .spawn()?;
        debug!("xray 已启动 (pid {:?})", child.id());
        Ok(Box::new(XrayProcess { child }))
    }
}

/// xray 子进程句柄
pub struct XrayProcess {
    child: Child,
}

impl XrayProcess {
    /// 请求进程自行退出
    #[cfg(unix)]
    fn request_exit(&mut self) -> io::Result<()> {
        let Some(pid) = self.child.id() else {
            return Ok(());
        };
        let pid = libc::pid_t::try_from(pid).map_err(io::Error::other)?;
        // SAFETY: pid 来自仍被持有、尚未回收的子进程
        if unsafe { libc::kill(pid, libc::SIGTERM) } == 0 {
            Ok(())
        } else {
            Err(io::Error::last_os_error())
        }
    }

    #[cfg(not(unix))]
    fn request_exit(&mut self) -> io::Result<()> {
        self.child.start_kill()
    }
}

#[async_trait]
impl CoreProcess for XrayProcess {
    fn id(&self) -> Option<u32> {
        self.child.id()
    }

    fn is_running(&mut self) -> bool {
        matches!(self.child.try_wait(), Ok(None))
    }

    async fn terminate(&mut self, grace: Duration) -> io::Result<()> {
        if !self.is_running() {
            return Ok(());
        }
        if let Err(e) = self.request_exit() {
            debug!("发送终止信号失败: {e}");
        }
        match timeout(grace, self.child.wait()).await {
            Ok(status) => status.map(|_| ()),
            Err(_) => {
                warn!("xray 未在 {grace:?} 内退出，强制结束");
                self.child.kill().await
            }
        }
    }

    fn kill_now(&mut self) {
        let _ = self.child.start_kill();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn missing_executable_is_not_installed() {
        let dir = tempfile::tempdir().unwrap();
        let launcher = XrayLauncher::new(dir.path(), "definitely-not-a-real-core-binary");
        let err = launcher.install().await.unwrap_err();
        assert!(matches!(err, LaunchError::NotInstalled(_)));
    }

    #[tokio::test]
    async fn executable_in_bin_dir_is_resolved_once() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(format!("xray{EXE_SUFFIX}"));
        std::fs::write(&path, b"").unwrap();

        let launcher = XrayLauncher::new(dir.path(), "xray");
        assert_eq!(launcher.install().await.unwrap(), path);
        std::fs::remove_file(&path).unwrap();
        assert_eq!(launcher.install().await.unwrap(), path);
    }
}
