//! 节点数据模型 (Node Data Model)
//!
//! 所有订阅格式最终都归一化为 [`Node`]，协议相关的凭据由 [`Protocol`] 标签联合承载。

use strum::{Display, EnumString, IntoStaticStr};

/// 节点缺省名称
pub const UNKNOWN_NAME: &str = "Unknown";

/// 协议类别 (Closed Kind Enumeration)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, IntoStaticStr)]
#[strum(serialize_all = "lowercase")]
pub enum NodeKind {
    Vmess,
    Vless,
    Trojan,
    Shadowsocks,
    Shadowsocksr,
    Http,
    Https,
    Socks,
    Hysteria,
    Wireguard,
}

/// 协议凭据 (Per-Kind Credentials)
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Protocol {
    Vmess {
        uuid: String,
        alter_id: u32,
        cipher: String,
    },
    Vless {
        uuid: String,
        flow: Option<String>,
    },
    Trojan {
        password: String,
    },
    Shadowsocks {
        cipher: String,
        password: String,
        plugin: Option<String>,
    },
    Shadowsocksr {
        cipher: String,
        password: String,
        protocol: String,
        obfs: String,
        protocol_param: Option<String>,
        obfs_param: Option<String>,
    },
    Http {
        auth: Auth,
    },
    Https {
        auth: Auth,
    },
    Socks {
        auth: Auth,
    },
    Hysteria {
        auth: Option<String>,
        protocol: Option<String>,
        peer: Option<String>,
        insecure: bool,
        up_mbps: Option<u32>,
        down_mbps: Option<u32>,
    },
    Wireguard {
        private_key: String,
        public_key: String,
        allowed_ips: Vec<String>,
    },
}

impl Protocol {
    pub fn kind(&self) -> NodeKind {
        match self {
            Protocol::Vmess { .. } => NodeKind::Vmess,
            Protocol::Vless { .. } => NodeKind::Vless,
            Protocol::Trojan { .. } => NodeKind::Trojan,
            Protocol::Shadowsocks { .. } => NodeKind::Shadowsocks,
            Protocol::Shadowsocksr { .. } => NodeKind::Shadowsocksr,
            Protocol::Http { .. } => NodeKind::Http,
            Protocol::Https { .. } => NodeKind::Https,
            Protocol::Socks { .. } => NodeKind::Socks,
            Protocol::Hysteria { .. } => NodeKind::Hysteria,
            Protocol::Wireguard { .. } => NodeKind::Wireguard,
        }
    }
}

/// 用户名/密码认证 (http/socks)
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Auth {
    pub username: Option<String>,
    pub password: Option<String>,
}

impl Auth {
    pub fn new(username: Option<String>, password: Option<String>) -> Self {
        Self {
            username: username.filter(|s| !s.is_empty()),
            password: password.filter(|s| !s.is_empty()),
        }
    }

    /// 用户名与密码均存在时才视为需要认证
    pub fn credentials(&self) -> Option<(&str, &str)> {
        Some((self.username.as_deref()?, self.password.as_deref()?))
    }
}

/// 传输层网络类型
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Display, EnumString, IntoStaticStr)]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
pub enum Network {
    #[default]
    Tcp,
    Ws,
    Grpc,
    H2,
    Quic,
}

/// 传输层描述 (Transport Descriptor)
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Transport {
    pub network: Network,
    pub path: Option<String>,
    pub host: Option<String>,
    pub tls: bool,
    pub sni: Option<String>,
    pub allow_insecure: bool,
    /// tcp 伪装头类型，仅 `http` 有意义
    pub header_type: Option<String>,
}

impl Transport {
    /// 空字段归一化为 `None`；与默认值相同的传输层视为不存在
    pub fn normalized(mut self) -> Option<Self> {
        for field in [
            &mut self.path,
            &mut self.host,
            &mut self.sni,
            &mut self.header_type,
        ] {
            if field.as_deref().is_some_and(str::is_empty) {
                *field = None;
            }
        }
        if self.header_type.as_deref() == Some("none") {
            self.header_type = None;
        }
        (self != Transport::default()).then_some(self)
    }
}

/// 代理节点 (Canonical Proxy Node)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Node {
    pub name: String,
    pub server: String,
    pub port: u16,
    pub protocol: Protocol,
    pub transport: Option<Transport>,
    pub latency_ms: Option<u64>,
}

impl Node {
    pub fn new(name: impl Into<String>, server: impl Into<String>, port: u16, protocol: Protocol) -> Self {
        let name = name.into();
        Self {
            name: if name.trim().is_empty() {
                UNKNOWN_NAME.to_string()
            } else {
                name
            },
            server: server.into(),
            port,
            protocol,
            transport: None,
            latency_ms: None,
        }
    }

    pub fn with_transport(mut self, transport: Transport) -> Self {
        self.transport = transport.normalized();
        self
    }

    pub fn kind(&self) -> NodeKind {
        self.protocol.kind()
    }

    /// 去重标识 `server:port`
    pub fn identity_key(&self) -> String {
        format!("{}:{}", self.server, self.port)
    }

    /// 名称、地址、端口缺一不可
    pub fn is_valid(&self) -> bool {
        !self.name.trim().is_empty() && !self.server.trim().is_empty() && self.port != 0
    }

    pub fn tls_enabled(&self) -> bool {
        self.transport.as_ref().is_some_and(|t| t.tls)
    }
}

impl std::fmt::Display for Node {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{}] {} ({}:{})", self.kind(), self.name, self.server, self.port)
    }
}
