//! 单条 JSON / YAML 节点识别 (Single-item Recognizer)
//!
//! 依次尝试 Shadowsocks、VMess、Trojan 三种厂商 JSON 方言，最后回退到 Clash 风格字段。

use serde_json::Value;

use crate::codec::{DEFAULT_ALLOWED_IPS, field_bool, field_port, field_str, field_u64, vmess};
use crate::core::error::DecodeError;
use crate::core::model::{Auth, Network, Node, Protocol, Transport};

const DEFAULT_SS_CIPHER: &str = "aes-256-gcm";

fn has(v: &Value, keys: &[&str]) -> bool {
    keys.iter().all(|k| v.get(*k).is_some())
}

/// 识别单个节点对象
pub fn recognize(item: &Value) -> Result<Node, DecodeError> {
    if !item.is_object() {
        return Err(DecodeError::NotAProxy(truncate(item)));
    }

    if has(item, &["server", "server_port", "method", "password"]) {
        return shadowsocks_json(item);
    }
    if has(item, &["add", "port", "id"]) {
        let fallback = field_str(item, &["add"]).map(|add| format!("VMess-{}", add));
        return vmess::from_fields(item, fallback);
    }
    let kind = field_str(item, &["type"]).map(|t| t.to_ascii_lowercase());
    if kind.as_deref() == Some("trojan") && has(item, &["server", "port", "password"]) {
        return trojan_json(item);
    }
    if let Some(kind) = kind
        && has(item, &["server", "port"])
    {
        return clash(&kind, item);
    }

    Err(DecodeError::NotAProxy(truncate(item)))
}

fn truncate(v: &Value) -> String {
    v.to_string().chars().take(64).collect()
}

fn required(v: &Value, keys: &[&str], field: &'static str) -> Result<String, DecodeError> {
    field_str(v, keys).ok_or(DecodeError::MissingField(field))
}

fn server_of(v: &Value) -> Result<String, DecodeError> {
    required(v, &["server"], "server")
}

/// shadowsocks-libev / SIP008 风格
fn shadowsocks_json(v: &Value) -> Result<Node, DecodeError> {
    let server = server_of(v)?;
    let name = field_str(v, &["remarks"]).unwrap_or_else(|| format!("SS-{}", server));
    let plugin = field_str(v, &["plugin"]).map(|p| match field_str(v, &["plugin_opts"]) {
        Some(opts) => format!("{};{}", p, opts),
        None => p,
    });

    Ok(Node::new(
        name,
        server,
        field_port(v, &["server_port"])?,
        Protocol::Shadowsocks {
            cipher: required(v, &["method"], "method")?,
            password: required(v, &["password"], "password")?,
            plugin,
        },
    ))
}

fn trojan_json(v: &Value) -> Result<Node, DecodeError> {
    let server = server_of(v)?;
    let name = field_str(v, &["remarks", "name"]).unwrap_or_else(|| format!("Trojan-{}", server));
    let transport = Transport {
        tls: true,
        sni: field_str(v, &["sni", "peer"]),
        ..Default::default()
    };

    Ok(Node::new(
        name,
        server,
        field_port(v, &["port"])?,
        Protocol::Trojan {
            password: required(v, &["password"], "password")?,
        },
    )
    .with_transport(transport))
}

/// Clash 代理条目 (`type` + `server` + `port`)
fn clash(kind: &str, v: &Value) -> Result<Node, DecodeError> {
    let server = server_of(v)?;
    let port = field_port(v, &["port"])?;
    let name = field_str(v, &["name"])
        .unwrap_or_else(|| format!("{}-{}", kind.to_ascii_uppercase(), server));
    let auth = || Auth::new(field_str(v, &["username"]), field_str(v, &["password"]));
    let tls = field_bool(v, &["tls"]).unwrap_or(false);

    let (protocol, transport) = match kind {
        "ss" | "shadowsocks" => (
            Protocol::Shadowsocks {
                cipher: field_str(v, &["cipher"]).unwrap_or_else(|| DEFAULT_SS_CIPHER.into()),
                password: required(v, &["password"], "password")?,
                plugin: clash_plugin(v),
            },
            None,
        ),
        "ssr" | "shadowsocksr" => (
            Protocol::Shadowsocksr {
                cipher: required(v, &["cipher"], "cipher")?,
                password: required(v, &["password"], "password")?,
                protocol: field_str(v, &["protocol"]).unwrap_or_else(|| "origin".into()),
                obfs: field_str(v, &["obfs"]).unwrap_or_else(|| "plain".into()),
                protocol_param: field_str(v, &["protocol-param", "protocolparam"]),
                obfs_param: field_str(v, &["obfs-param", "obfsparam"]),
            },
            None,
        ),
        "vmess" => (
            Protocol::Vmess {
                uuid: required(v, &["uuid"], "uuid")?,
                alter_id: field_u64(v, &["alterId", "alter-id"])
                    .and_then(|a| u32::try_from(a).ok())
                    .unwrap_or(0),
                cipher: field_str(v, &["cipher"]).unwrap_or_else(|| "auto".into()),
            },
            Some(clash_transport(v, tls)),
        ),
        "vless" => (
            Protocol::Vless {
                uuid: required(v, &["uuid"], "uuid")?,
                flow: field_str(v, &["flow"]),
            },
            Some(clash_transport(v, tls)),
        ),
        "trojan" => (
            Protocol::Trojan {
                password: required(v, &["password"], "password")?,
            },
            // trojan 条目省略 tls 字段时同样走 TLS
            Some(clash_transport(v, field_bool(v, &["tls"]).unwrap_or(true))),
        ),
        "http" if tls => (Protocol::Https { auth: auth() }, None),
        "http" => (Protocol::Http { auth: auth() }, None),
        "https" => (Protocol::Https { auth: auth() }, None),
        "socks" | "socks5" => (Protocol::Socks { auth: auth() }, None),
        "hysteria" => (
            Protocol::Hysteria {
                auth: field_str(v, &["auth-str", "auth_str", "auth"]),
                protocol: field_str(v, &["protocol"]),
                peer: field_str(v, &["sni", "peer"]),
                insecure: field_bool(v, &["skip-cert-verify"]).unwrap_or(false),
                up_mbps: bandwidth(v, &["up", "up-mbps"]),
                down_mbps: bandwidth(v, &["down", "down-mbps"]),
            },
            None,
        ),
        "wireguard" => (
            Protocol::Wireguard {
                private_key: required(v, &["private-key", "privateKey"], "private-key")?,
                public_key: required(v, &["public-key", "publicKey"], "public-key")?,
                allowed_ips: allowed_ips(v),
            },
            None,
        ),
        other => return Err(DecodeError::UnsupportedScheme(other.to_string())),
    };

    let node = Node::new(name, server, port, protocol);
    Ok(match transport {
        Some(t) => node.with_transport(t),
        None => node,
    })
}

fn opts<'a>(v: &'a Value, key: &str) -> Option<&'a Value> {
    v.get(key).filter(|o| o.is_object())
}

/// 取字符串或字符串数组的第一个元素
fn first_str(v: Option<&Value>) -> Option<String> {
    match v? {
        Value::Array(items) => items
            .iter()
            .filter_map(Value::as_str)
            .find(|s| !s.is_empty())
            .map(String::from),
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        _ => None,
    }
}

fn clash_transport(v: &Value, tls: bool) -> Transport {
    let raw_network = field_str(v, &["network"]).unwrap_or_default();
    let mut t = Transport {
        tls,
        sni: field_str(v, &["servername", "sni"]),
        allow_insecure: field_bool(v, &["skip-cert-verify"]).unwrap_or(false),
        ..Default::default()
    };

    match raw_network.as_str() {
        "ws" => {
            t.network = Network::Ws;
            let ws = opts(v, "ws-opts");
            t.path = ws
                .and_then(|o| field_str(o, &["path"]))
                .or_else(|| field_str(v, &["ws-path"]));
            t.host = ws
                .and_then(|o| o.get("headers"))
                .and_then(|h| field_str(h, &["Host", "host"]))
                .or_else(|| v.get("ws-headers").and_then(|h| field_str(h, &["Host", "host"])));
        }
        "grpc" => {
            t.network = Network::Grpc;
            t.path = opts(v, "grpc-opts").and_then(|o| field_str(o, &["grpc-service-name"]));
        }
        "h2" => {
            t.network = Network::H2;
            let h2 = opts(v, "h2-opts");
            t.path = h2.and_then(|o| field_str(o, &["path"]));
            t.host = first_str(h2.and_then(|o| o.get("host")));
        }
        // tcp + http 伪装
        "http" => {
            t.header_type = Some("http".into());
            let http = opts(v, "http-opts");
            t.path = first_str(http.and_then(|o| o.get("path")));
            t.host = first_str(http.and_then(|o| o.get("headers")).and_then(|h| h.get("Host")));
        }
        other => t.network = other.parse().unwrap_or_default(),
    }
    t
}

/// `plugin` + `plugin-opts` 合并为 SIP003 插件字符串
fn clash_plugin(v: &Value) -> Option<String> {
    let plugin = field_str(v, &["plugin"])?;
    let Some(Value::Object(opts)) = v.get("plugin-opts") else {
        return Some(plugin);
    };
    let mut parts = vec![plugin];
    for (key, value) in opts {
        let value = match value {
            Value::String(s) => s.clone(),
            other => other.to_string(),
        };
        parts.push(format!("{}={}", key, value));
    }
    Some(parts.join(";"))
}

/// 带宽字段形如 `100`、`"100"` 或 `"100 Mbps"`
fn bandwidth(v: &Value, keys: &[&str]) -> Option<u32> {
    let raw = field_str(v, keys)?;
    let digits: String = raw.chars().take_while(char::is_ascii_digit).collect();
    digits.parse().ok()
}

fn allowed_ips(v: &Value) -> Vec<String> {
    let ips: Vec<String> = match v.get("allowed-ips").or_else(|| v.get("allowedIPs")) {
        Some(Value::Array(items)) => items
            .iter()
            .filter_map(|i| i.as_str())
            .map(String::from)
            .collect(),
        Some(Value::String(s)) => s.split(',').map(|s| s.trim().to_string()).collect(),
        _ => Vec::new(),
    };
    let ips: Vec<String> = ips.into_iter().filter(|s| !s.is_empty()).collect();
    if ips.is_empty() {
        vec![DEFAULT_ALLOWED_IPS.to_string()]
    } else {
        ips
    }
}
