//! 单节点延迟探测 (Latency Probe)
//!
//! 为节点拉起一个临时代理核心，通过其本地 SOCKS 入站请求测试地址并计时。

use std::sync::Arc;
use std::time::Duration;

use bon::Builder;
use reqwest::{Client, Proxy, StatusCode};
use tokio::time::Instant;
use tracing::debug;

use crate::core::config::{CoreConfig, TesterConfig};
use crate::core::error::ProbeError;
use crate::core::model::Node;
use crate::engine::context::EphemeralProbeContext;
use crate::engine::outbound::{build_config, build_outbound};
use crate::interfaces::CoreLauncher;
use crate::network::retry::RetryPolicy;

/// 探测参数
#[derive(Debug, Clone, Builder)]
pub struct ProbeSettings {
    #[builder(default = vec!["http://www.gstatic.com/generate_204".to_string()])]
    pub test_urls: Vec<String>,
    #[builder(default = Duration::from_secs(10))]
    pub request_timeout: Duration,
    #[builder(default = Duration::from_secs(3))]
    pub readiness_timeout: Duration,
    #[builder(default = Duration::from_millis(1000))]
    pub max_latency: Duration,
    #[builder(default = Duration::from_secs(5))]
    pub stop_timeout: Duration,
    #[builder(default = 3)]
    pub port_attempts: u32,
    /// 整体探测尝试次数
    #[builder(default = 1)]
    pub max_attempts: u32,
}

impl Default for ProbeSettings {
    fn default() -> Self {
        Self::builder().build()
    }
}

impl ProbeSettings {
    pub fn from_config(tester: &TesterConfig, core: &CoreConfig) -> Self {
        Self::builder()
            .test_urls(tester.test_urls.clone())
            .request_timeout(Duration::from_secs(tester.request_timeout_secs))
            .readiness_timeout(Duration::from_millis(tester.readiness_timeout_ms))
            .max_latency(Duration::from_millis(tester.max_latency_ms))
            .stop_timeout(core.stop_timeout())
            .max_attempts(tester.max_attempts)
            .build()
    }
}

/// 延迟探测器
pub struct LatencyProbe {
    launcher: Arc<dyn CoreLauncher>,
    settings: ProbeSettings,
    retry: RetryPolicy<ProbeError>,
}

impl LatencyProbe {
    pub fn new(launcher: Arc<dyn CoreLauncher>, settings: ProbeSettings) -> Self {
        let retry = RetryPolicy::new(
            settings.max_attempts,
            Duration::from_millis(200),
            ProbeError::is_transient,
        );
        Self {
            launcher,
            settings,
            retry,
        }
    }

    pub fn launcher(&self) -> &Arc<dyn CoreLauncher> {
        &self.launcher
    }

    /// 探测节点；通过时返回带延迟标注的副本
    pub async fn probe(&self, node: &Node) -> Result<Node, ProbeError> {
        if node.name.trim().is_empty() || node.server.trim().is_empty() {
            return Err(ProbeError::Rejected);
        }
        // 无出站构造器时不产生任何副作用
        let outbound = build_outbound(node)?;

        let latency = self
            .retry
            .run(&node.name, || self.measure(outbound.clone()))
            .await?;

        let limit = self.settings.max_latency;
        if latency > limit {
            return Err(ProbeError::TooSlow { latency, limit });
        }

        let ms = latency.as_millis() as u64;
        let mut accepted = node.clone();
        accepted.latency_ms = Some(ms);
        accepted.name = format!("{} [{}ms]", node.name, ms);
        Ok(accepted)
    }

    /// 一次完整的启动-请求-清理周期，返回测得延迟
    async fn measure(&self, outbound: serde_json::Value) -> Result<Duration, ProbeError> {
        let mut ctx =
            EphemeralProbeContext::create(self.launcher.clone(), self.settings.port_attempts).await?;
        let result = self.measure_in(&mut ctx, outbound).await;
        ctx.release(self.settings.stop_timeout).await;
        result
    }

    async fn measure_in(
        &self,
        ctx: &mut EphemeralProbeContext,
        outbound: serde_json::Value,
    ) -> Result<Duration, ProbeError> {
        let port = ctx.port();
        ctx.launch(&build_config(outbound, port)).await?;

        let start = Instant::now();
        ctx.wait_ready(self.settings.readiness_timeout).await?;

        let client = Client::builder()
            .proxy(Proxy::all(format!("socks5h://127.0.0.1:{port}"))?)
            .timeout(self.settings.request_timeout)
            .build()?;

        for url in &self.settings.test_urls {
            match client.get(url).send().await {
                Ok(resp) if matches!(resp.status(), StatusCode::OK | StatusCode::NO_CONTENT) => {
                    return Ok(start.elapsed());
                }
                Ok(resp) => debug!("{url} 返回 {}", resp.status()),
                Err(e) => debug!("{url} 请求失败: {e}"),
            }
        }
        Err(ProbeError::Unreachable)
    }
}
