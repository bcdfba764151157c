//! 标准 URI 形式的协议：trojan、vless、http(s)、socks(5)

use std::collections::HashMap;

use url::Url;

use super::{display_name, host_of, is_truthy, port_or, query_map, query_suffix, userinfo_secret};
use crate::core::error::{DecodeError, EncodeError};
use crate::core::model::{Auth, Network, Node, Protocol, Transport};
use crate::utils::{format_host, percent_decode, percent_encode};

/// 从查询参数还原传输层
fn transport_from_query(q: &HashMap<String, String>, tls: bool) -> Transport {
    let network = q
        .get("type")
        .and_then(|t| t.parse::<Network>().ok())
        .unwrap_or_default();
    let path = match network {
        Network::Grpc => q.get("serviceName").or_else(|| q.get("path")),
        _ => q.get("path"),
    };
    Transport {
        network,
        path: path.cloned(),
        host: q.get("host").cloned(),
        tls,
        sni: q.get("sni").or_else(|| q.get("peer")).cloned(),
        allow_insecure: q.get("allowInsecure").is_some_and(|v| is_truthy(v)),
        header_type: q.get("headerType").cloned(),
    }
}

/// 传输层转为查询参数 (不含 `security`)
fn transport_to_query(t: &Transport, pairs: &mut Vec<(&'static str, String)>) {
    if t.network != Network::Tcp {
        pairs.push(("type", t.network.to_string()));
    }
    if let Some(path) = &t.path {
        let key = if t.network == Network::Grpc {
            "serviceName"
        } else {
            "path"
        };
        pairs.push((key, path.clone()));
    }
    if let Some(host) = &t.host {
        pairs.push(("host", host.clone()));
    }
    if let Some(sni) = &t.sni {
        pairs.push(("sni", sni.clone()));
    }
    if let Some(header) = &t.header_type {
        pairs.push(("headerType", header.clone()));
    }
    if t.allow_insecure {
        pairs.push(("allowInsecure", "1".into()));
    }
}

pub(super) fn decode_trojan(uri: &str) -> Result<Node, DecodeError> {
    let url = Url::parse(uri)?;
    let q = query_map(&url);
    let password = userinfo_secret(&url).ok_or(DecodeError::MissingField("password"))?;
    // trojan 默认走 TLS，除非显式 security=none
    let tls = q.get("security").is_none_or(|s| s != "none");

    Ok(Node::new(
        display_name(&url, &q),
        host_of(&url)?,
        port_or(&url, 443)?,
        Protocol::Trojan { password },
    )
    .with_transport(transport_from_query(&q, tls)))
}

pub(super) fn encode_trojan(node: &Node) -> Result<String, EncodeError> {
    let Protocol::Trojan { password } = &node.protocol else {
        return Err(EncodeError::InvalidNode(node.to_string()));
    };
    let t = node.transport.clone().unwrap_or_default();
    let mut pairs = Vec::new();
    if !t.tls {
        pairs.push(("security", "none".to_string()));
    }
    transport_to_query(&t, &mut pairs);

    Ok(format!(
        "trojan://{}@{}:{}{}#{}",
        percent_encode(password),
        format_host(&node.server),
        node.port,
        query_suffix(&pairs)?,
        percent_encode(&node.name)
    ))
}

pub(super) fn decode_vless(uri: &str) -> Result<Node, DecodeError> {
    let url = Url::parse(uri)?;
    let q = query_map(&url);
    let uuid = userinfo_secret(&url).ok_or(DecodeError::MissingField("uuid"))?;
    let tls = q
        .get("security")
        .is_some_and(|s| matches!(s.as_str(), "tls" | "xtls" | "reality"));
    let flow = q.get("flow").filter(|f| !f.is_empty()).cloned();

    Ok(Node::new(
        display_name(&url, &q),
        host_of(&url)?,
        port_or(&url, 443)?,
        Protocol::Vless { uuid, flow },
    )
    .with_transport(transport_from_query(&q, tls)))
}

pub(super) fn encode_vless(node: &Node) -> Result<String, EncodeError> {
    let Protocol::Vless { uuid, flow } = &node.protocol else {
        return Err(EncodeError::InvalidNode(node.to_string()));
    };
    let t = node.transport.clone().unwrap_or_default();
    let mut pairs = Vec::new();
    if t.tls {
        pairs.push(("security", "tls".to_string()));
    }
    if let Some(flow) = flow {
        pairs.push(("flow", flow.clone()));
    }
    transport_to_query(&t, &mut pairs);

    Ok(format!(
        "vless://{}@{}:{}{}#{}",
        percent_encode(uuid),
        format_host(&node.server),
        node.port,
        query_suffix(&pairs)?,
        percent_encode(&node.name)
    ))
}

/// http / https / socks / socks5
pub(super) fn decode_plain(uri: &str) -> Result<Node, DecodeError> {
    let url = Url::parse(uri)?;
    let q = query_map(&url);
    let auth = Auth::new(
        Some(percent_decode(url.username())),
        url.password().map(percent_decode),
    );

    let (protocol, default_port) = match url.scheme() {
        "http" => (Protocol::Http { auth }, 80),
        "https" => (Protocol::Https { auth }, 443),
        "socks" | "socks5" => (Protocol::Socks { auth }, 1080),
        other => return Err(DecodeError::UnsupportedScheme(other.to_string())),
    };

    // 带路径的 http 链接是普通网页而非代理
    if matches!(protocol, Protocol::Http { .. } | Protocol::Https { .. })
        && !matches!(url.path(), "" | "/")
    {
        return Err(DecodeError::NotAProxy(url.to_string()));
    }

    Ok(Node::new(
        display_name(&url, &q),
        host_of(&url)?,
        port_or(&url, default_port)?,
        protocol,
    ))
}

pub(super) fn encode_plain(node: &Node) -> Result<String, EncodeError> {
    let (scheme, auth) = match &node.protocol {
        Protocol::Http { auth } => ("http", auth),
        Protocol::Https { auth } => ("https", auth),
        Protocol::Socks { auth } => ("socks", auth),
        _ => return Err(EncodeError::InvalidNode(node.to_string())),
    };

    let userinfo = match (&auth.username, &auth.password) {
        (None, None) => String::new(),
        (user, None) => format!("{}@", percent_encode(user.as_deref().unwrap_or_default())),
        (user, Some(pass)) => format!(
            "{}:{}@",
            percent_encode(user.as_deref().unwrap_or_default()),
            percent_encode(pass)
        ),
    };

    Ok(format!(
        "{}://{}{}:{}#{}",
        scheme,
        userinfo,
        format_host(&node.server),
        node.port,
        percent_encode(&node.name)
    ))
}
