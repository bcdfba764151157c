//! 错误处理体系 (Error Handling System)
//!
//! 单条节点、单个订阅、单次探测的错误都在最小作用域内吞掉；
//! 只有 [`SieveError`] 会穿过流水线边界。

use std::time::Duration;

use reqwest::StatusCode;
use thiserror::Error;

use crate::core::model::NodeKind;

/// URI / JSON 片段解码失败
#[derive(Error, Debug)]
pub enum DecodeError {
    #[error("unsupported scheme: {0}")]
    UnsupportedScheme(String),

    #[error("malformed base64 payload")]
    Base64,

    #[error("missing field `{0}`")]
    MissingField(&'static str),

    #[error("invalid port: {0}")]
    InvalidPort(String),

    #[error("malformed uri: {0}")]
    Url(#[from] url::ParseError),

    #[error("malformed json: {0}")]
    Json(#[from] serde_json::Error),

    /// 语法合法但不是代理描述 (如普通网页链接)
    #[error("not a proxy descriptor: {0}")]
    NotAProxy(String),
}

/// 节点编码失败
#[derive(Error, Debug)]
pub enum EncodeError {
    #[error("invalid node: {0}")]
    InvalidNode(String),

    #[error("serialization failed: {0}")]
    Json(#[from] serde_json::Error),

    #[error("query encoding failed: {0}")]
    Query(#[from] serde_urlencoded::ser::Error),
}

/// 订阅拉取失败
#[derive(Error, Debug)]
pub enum FetchError {
    #[error("request failed: {0}")]
    Network(#[from] reqwest::Error),

    #[error("unexpected status {status} from {url}")]
    Status { status: StatusCode, url: String },
}

impl FetchError {
    /// 连接/超时以及 5xx 允许重试
    pub fn is_transient(&self) -> bool {
        match self {
            FetchError::Network(e) => e.is_timeout() || e.is_connect() || e.is_request(),
            FetchError::Status { status, .. } => status.is_server_error(),
        }
    }
}

/// 核心进程启动器错误
#[derive(Error, Debug)]
pub enum LaunchError {
    #[error("proxy core executable not found: {0}")]
    NotInstalled(String),

    #[error("failed to spawn proxy core: {0}")]
    Spawn(#[from] std::io::Error),
}

/// 单节点探测失败 (Per-node Probe Failure)
#[derive(Error, Debug)]
pub enum ProbeError {
    #[error("node rejected: missing name or server")]
    Rejected,

    #[error("no outbound builder for {0}")]
    Unsupported(NodeKind),

    #[error("no free local port after {0} attempts")]
    PortAllocation(u32),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("launch failed: {0}")]
    Launch(#[from] LaunchError),

    #[error("proxy core exited before becoming ready")]
    CoreExited,

    #[error("http client error: {0}")]
    Client(#[from] reqwest::Error),

    #[error("all test urls unreachable")]
    Unreachable,

    #[error("latency {latency:?} exceeds {limit:?}")]
    TooSlow { latency: Duration, limit: Duration },

    #[error("probe panicked: {0}")]
    Panicked(String),
}

impl ProbeError {
    /// 本地资源竞争类错误可重试，网络不可达不重试
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            ProbeError::PortAllocation(_)
                | ProbeError::CoreExited
                | ProbeError::Launch(LaunchError::Spawn(_))
        )
    }

    /// 简短原因，用于进度事件
    pub fn reason(&self) -> &'static str {
        match self {
            ProbeError::Rejected => "rejected",
            ProbeError::Unsupported(_) => "unsupported",
            ProbeError::PortAllocation(_) => "port",
            ProbeError::Io(_) => "io",
            ProbeError::Launch(_) => "launch",
            ProbeError::CoreExited => "core-exited",
            ProbeError::Client(_) => "client",
            ProbeError::Unreachable => "unreachable",
            ProbeError::TooSlow { .. } => "too-slow",
            ProbeError::Panicked(_) => "panic",
        }
    }
}

/// 全局错误定义 (Pipeline Errors)
#[derive(Error, Debug)]
pub enum SieveError {
    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),

    #[error("Encode error: {0}")]
    Encode(#[from] EncodeError),

    /// 核心程序不可用，无法验证任何节点
    #[error("Cannot validate any node: {0}")]
    CoreUnavailable(#[from] LaunchError),

    #[error("Other error: {0}")]
    Custom(String),
}

/// 全局 Result 别名
pub type Result<T> = std::result::Result<T, SieveError>;
