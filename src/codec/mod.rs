//! 节点 URI 编解码 (UriCodec)
//!
//! 按协议前缀分派到各协议的 `decode`/`encode`，二者互为结构逆运算：
//! `decode(encode(node))` 还原该协议 URI 能承载的全部字段。

use std::collections::HashMap;

use serde_json::Value;
use url::{Host, Url};

use crate::core::error::{DecodeError, EncodeError};
use crate::core::model::{Node, Protocol};
use crate::utils::percent_decode;

mod hysteria;
mod shadowsocks;
mod standard;
pub(crate) mod vmess;
mod wireguard;

pub(crate) use wireguard::DEFAULT_ALLOWED_IPS;

/// 支持的协议前缀
pub const SUPPORTED_PREFIXES: &[&str] = &[
    "vmess://",
    "trojan://",
    "vless://",
    "ss://",
    "ssr://",
    "http://",
    "https://",
    "socks://",
    "socks5://",
    "hysteria://",
    "wireguard://",
];

/// 行首是否为已知协议前缀
pub fn has_known_prefix(line: &str) -> bool {
    SUPPORTED_PREFIXES.iter().any(|p| line.starts_with(p))
}

/// 解码单条节点 URI
pub fn decode(uri: &str) -> Result<Node, DecodeError> {
    let uri = uri.trim();
    let (scheme, body) = uri
        .split_once("://")
        .ok_or_else(|| DecodeError::UnsupportedScheme(uri.chars().take(16).collect()))?;

    let node = match scheme.to_ascii_lowercase().as_str() {
        "vmess" => vmess::decode(body),
        "vless" => standard::decode_vless(uri),
        "trojan" => standard::decode_trojan(uri),
        "ss" => shadowsocks::decode_ss(body),
        "ssr" => shadowsocks::decode_ssr(body),
        "http" | "https" | "socks" | "socks5" => standard::decode_plain(uri),
        "hysteria" => hysteria::decode(uri),
        "wireguard" => wireguard::decode(uri),
        other => Err(DecodeError::UnsupportedScheme(other.to_string())),
    }?;
    validated(node)
}

/// 最终把关：端口为 0 与地址缺失分别报告
fn validated(node: Node) -> Result<Node, DecodeError> {
    if node.port == 0 {
        Err(DecodeError::InvalidPort(node.port.to_string()))
    } else if node.server.trim().is_empty() {
        Err(DecodeError::MissingField("server"))
    } else if !node.is_valid() {
        Err(DecodeError::MissingField("name"))
    } else {
        Ok(node)
    }
}

/// 编码为协议原生 URI
pub fn encode(node: &Node) -> Result<String, EncodeError> {
    if !node.is_valid() {
        return Err(EncodeError::InvalidNode(node.to_string()));
    }
    match &node.protocol {
        Protocol::Vmess { .. } => vmess::encode(node),
        Protocol::Vless { .. } => standard::encode_vless(node),
        Protocol::Trojan { .. } => standard::encode_trojan(node),
        Protocol::Shadowsocks { .. } => shadowsocks::encode_ss(node),
        Protocol::Shadowsocksr { .. } => shadowsocks::encode_ssr(node),
        Protocol::Http { .. } | Protocol::Https { .. } | Protocol::Socks { .. } => {
            standard::encode_plain(node)
        }
        Protocol::Hysteria { .. } => hysteria::encode(node),
        Protocol::Wireguard { .. } => wireguard::encode(node),
    }
}

// --- URL helpers ---

pub(crate) fn host_of(url: &Url) -> Result<String, DecodeError> {
    let host = match url.host() {
        Some(Host::Domain(d)) => d.to_string(),
        Some(Host::Ipv4(ip)) => ip.to_string(),
        Some(Host::Ipv6(ip)) => ip.to_string(),
        None => String::new(),
    };
    if host.is_empty() {
        Err(DecodeError::MissingField("server"))
    } else {
        Ok(host)
    }
}

/// 显式端口优先，其次 scheme 已知默认端口，最后协议默认端口
pub(crate) fn port_or(url: &Url, default: u16) -> Result<u16, DecodeError> {
    match url.port_or_known_default() {
        Some(0) => Err(DecodeError::InvalidPort("0".into())),
        Some(port) => Ok(port),
        None => Ok(default),
    }
}

pub(crate) fn query_map(url: &Url) -> HashMap<String, String> {
    url.query_pairs()
        .map(|(k, v)| (k.into_owned(), v.into_owned()))
        .collect()
}

/// 名称来源：片段 (`#name`) 优先，其次 `remarks` 参数
pub(crate) fn display_name(url: &Url, query: &HashMap<String, String>) -> String {
    url.fragment()
        .map(percent_decode)
        .filter(|s| !s.trim().is_empty())
        .or_else(|| query.get("remarks").cloned())
        .unwrap_or_default()
}

/// userinfo 整体作为密钥，兼容未转义的 `:`
pub(crate) fn userinfo_secret(url: &Url) -> Option<String> {
    let user = percent_decode(url.username());
    let secret = match url.password() {
        Some(pass) => format!("{}:{}", user, percent_decode(pass)),
        None => user,
    };
    (!secret.is_empty()).then_some(secret)
}

pub(crate) fn is_truthy(v: &str) -> bool {
    matches!(v.trim().to_ascii_lowercase().as_str(), "1" | "true" | "yes" | "tls")
}

/// 拼接 `?query` 部分，空参数时省略
pub(crate) fn query_suffix(pairs: &[(&str, String)]) -> Result<String, EncodeError> {
    if pairs.is_empty() {
        return Ok(String::new());
    }
    Ok(format!("?{}", serde_urlencoded::to_string(pairs)?))
}

// --- JSON field helpers ---

/// 依次尝试多个键，返回第一个非空字符串 (数字也接受)
pub(crate) fn field_str(v: &Value, keys: &[&str]) -> Option<String> {
    keys.iter().find_map(|k| match v.get(*k)? {
        Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    })
}

pub(crate) fn field_u64(v: &Value, keys: &[&str]) -> Option<u64> {
    keys.iter().find_map(|k| match v.get(*k)? {
        Value::Number(n) => n.as_u64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    })
}

pub(crate) fn field_bool(v: &Value, keys: &[&str]) -> Option<bool> {
    keys.iter().find_map(|k| match v.get(*k)? {
        Value::Bool(b) => Some(*b),
        Value::String(s) => Some(is_truthy(s)),
        Value::Number(n) => Some(n.as_u64() == Some(1)),
        _ => None,
    })
}

/// 端口必须位于 [1, 65535]
pub(crate) fn field_port(v: &Value, keys: &[&str]) -> Result<u16, DecodeError> {
    let raw = keys
        .iter()
        .find_map(|k| v.get(*k))
        .ok_or(DecodeError::MissingField("port"))?;
    let parsed = match raw {
        Value::Number(n) => n.as_u64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    };
    parsed
        .and_then(|p| u16::try_from(p).ok())
        .filter(|p| *p != 0)
        .ok_or_else(|| DecodeError::InvalidPort(raw.to_string()))
}
