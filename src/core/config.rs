//! 配置管理系统 (Configuration Management)
//!
//! 负责 `config.toml` 的反序列化及其层级结构映射，支持环境变量与默认值回退机制。

use std::path::{Path, PathBuf};
use std::time::Duration;

use bon::Builder;
use config::{Config, Environment, File};
use directories::ProjectDirs;
use serde::Deserialize;
use strum::{Display, EnumString};

use crate::core::error::{Result, SieveError};
use crate::interfaces::SubscriptionSource;

/// 全局应用配置
#[derive(Debug, Deserialize, Builder, Clone, Default)]
pub struct AppConfig {
    /// 订阅链接列表
    #[serde(default)]
    #[builder(default)]
    pub subscriptions: Vec<String>,

    /// 聚合订阅地址 (内容为按行分隔的订阅链接)
    #[serde(default)]
    pub agg_subs: Option<String>,

    /// 代理核心 (xray) 相关配置
    #[serde(default)]
    #[builder(default)]
    pub core: CoreConfig,

    /// 订阅拉取参数
    #[serde(default)]
    #[builder(default)]
    pub fetch: FetchConfig,

    /// 测速参数
    #[serde(default)]
    #[builder(default)]
    pub tester: TesterConfig,

    /// 输出文件位置
    #[serde(default)]
    #[builder(default)]
    pub output: OutputConfig,
}

/// 代理核心配置
#[derive(Debug, Deserialize, Builder, Clone)]
pub struct CoreConfig {
    /// 二进制执行文件搜索路径
    #[serde(default = "default_bin_path")]
    #[builder(default = default_bin_path())]
    pub bin_path: String,
    /// 可执行文件名 (不含平台扩展名)
    #[serde(default = "default_executable")]
    #[builder(default = default_executable())]
    pub executable: String,
    /// 优雅终止等待时长 (秒)
    #[serde(default = "default_stop_timeout")]
    #[builder(default = default_stop_timeout())]
    pub stop_timeout_secs: u64,
}

/// 订阅拉取参数
#[derive(Debug, Deserialize, Builder, Clone)]
pub struct FetchConfig {
    #[serde(default = "default_timeout")]
    #[builder(default = default_timeout())]
    pub timeout_secs: u64,
    /// 同时进行的订阅请求数
    #[serde(default = "default_fetch_concurrency")]
    #[builder(default = default_fetch_concurrency())]
    pub concurrency: usize,
    #[serde(default = "default_user_agent")]
    #[builder(default = default_user_agent())]
    pub user_agent: String,
    #[serde(default = "default_fetch_attempts")]
    #[builder(default = default_fetch_attempts())]
    pub max_attempts: u32,
    #[serde(default = "default_backoff")]
    #[builder(default = default_backoff())]
    pub backoff_ms: u64,
}

/// 并发执行模式
#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq, Default, Display, EnumString)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
pub enum ExecutionMode {
    /// 协作式：所有探测为独立任务，由信号量准入
    #[default]
    Gate,
    /// 工作池：固定数量的 worker 从通道拉取节点
    Pool,
}

/// 测速参数
#[derive(Debug, Deserialize, Builder, Clone)]
pub struct TesterConfig {
    /// 最大并发探测数，缺省为 `min(100, CPU * 10)`
    pub concurrency: Option<usize>,
    #[serde(default)]
    #[builder(default)]
    pub mode: ExecutionMode,
    #[serde(default = "default_test_urls")]
    #[builder(default = default_test_urls())]
    pub test_urls: Vec<String>,
    #[serde(default = "default_timeout")]
    #[builder(default = default_timeout())]
    pub request_timeout_secs: u64,
    #[serde(default = "default_readiness_timeout")]
    #[builder(default = default_readiness_timeout())]
    pub readiness_timeout_ms: u64,
    /// 可接受的最大延迟
    #[serde(default = "default_max_latency")]
    #[builder(default = default_max_latency())]
    pub max_latency_ms: u64,
    /// 单节点探测尝试次数 (仅本地资源类错误会重试)
    #[serde(default = "default_probe_attempts")]
    #[builder(default = default_probe_attempts())]
    pub max_attempts: u32,
}

/// 输出配置
#[derive(Debug, Deserialize, Builder, Clone)]
pub struct OutputConfig {
    #[serde(default = "default_output_dir")]
    #[builder(default = default_output_dir())]
    pub dir: String,
    #[serde(default = "default_raw_file")]
    #[builder(default = default_raw_file())]
    pub raw_file: String,
    #[serde(default = "default_valid_file")]
    #[builder(default = default_valid_file())]
    pub valid_file: String,
}

impl Default for CoreConfig {
    fn default() -> Self {
        Self::builder().build()
    }
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self::builder().build()
    }
}

impl Default for TesterConfig {
    fn default() -> Self {
        Self::builder().build()
    }
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self::builder().build()
    }
}

fn default_bin_path() -> String {
    "bin".to_string()
}
fn default_executable() -> String {
    "xray".to_string()
}
fn default_stop_timeout() -> u64 {
    5
}
fn default_timeout() -> u64 {
    10
}
fn default_fetch_concurrency() -> usize {
    50
}
fn default_user_agent() -> String {
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/137.0.0.0 Safari/537.36".to_string()
}
fn default_fetch_attempts() -> u32 {
    3
}
fn default_backoff() -> u64 {
    1000
}
fn default_test_urls() -> Vec<String> {
    vec!["http://www.gstatic.com/generate_204".to_string()]
}
fn default_readiness_timeout() -> u64 {
    3000
}
fn default_max_latency() -> u64 {
    1000
}
fn default_probe_attempts() -> u32 {
    1
}
fn default_output_dir() -> String {
    "v2ray".to_string()
}
fn default_raw_file() -> String {
    "v2ray_raw.txt".to_string()
}
fn default_valid_file() -> String {
    "v2ray.txt".to_string()
}

impl CoreConfig {
    pub fn stop_timeout(&self) -> Duration {
        Duration::from_secs(self.stop_timeout_secs)
    }
}

impl TesterConfig {
    /// 显式配置优先，否则按 CPU 数推导
    pub fn effective_concurrency(&self) -> usize {
        self.concurrency
            .filter(|c| *c > 0)
            .unwrap_or_else(default_probe_concurrency)
    }
}

/// `min(100, CPU * 10)`
pub fn default_probe_concurrency() -> usize {
    let cpus = std::thread::available_parallelism().map_or(1, |n| n.get());
    (cpus * 10).min(100)
}

impl AppConfig {
    /// 按默认搜索顺序加载：工作目录 `config.*`，其次平台配置目录
    pub fn load() -> Result<Self> {
        Self::load_from(None)
    }

    /// 从指定文件加载，叠加 `NODESIEVE__` 前缀的环境变量
    pub fn load_from(path: Option<&Path>) -> Result<Self> {
        let mut builder = Config::builder();

        match path {
            Some(path) => builder = builder.add_source(File::from(path)),
            None => {
                if let Some(path) = Self::discover() {
                    builder = builder.add_source(File::from(path));
                }
            }
        }

        let settings = builder
            .add_source(
                Environment::with_prefix("NODESIEVE")
                    .prefix_separator("__")
                    .separator("__")
                    .list_separator(",")
                    .with_list_parse_key("subscriptions")
                    .with_list_parse_key("tester.test_urls")
                    .try_parsing(true),
            )
            .build()
            .map_err(SieveError::Config)?;
        settings.try_deserialize().map_err(SieveError::Config)
    }

    fn discover() -> Option<PathBuf> {
        ["config.toml", "config.yaml", "config.json"]
            .into_iter()
            .map(PathBuf::from)
            .find(|p| p.exists())
            .or_else(|| {
                ProjectDirs::from("", "", "nodesieve")
                    .map(|dirs| dirs.config_dir().join("config.toml"))
                    .filter(|p| p.exists())
            })
    }
}

impl SubscriptionSource for AppConfig {
    fn subscriptions(&self) -> Vec<String> {
        self.subscriptions.clone()
    }

    fn aggregator(&self) -> Option<String> {
        self.agg_subs.clone().filter(|s| !s.trim().is_empty())
    }
}
