//! 生成面向 xray 的单节点运行时配置
//!
//! 每个探测实例只有一个 SOCKS 入站和一个出站，出站按协议类别构造。

use serde_json::{Map, Value, json};

use crate::core::error::ProbeError;
use crate::core::model::{Auth, Network, Node, Protocol, Transport};

/// 构造节点出站；无对应构造器的协议返回 [`ProbeError::Unsupported`]
pub fn build_outbound(node: &Node) -> Result<Value, ProbeError> {
    let server = node.server.as_str();
    let port = node.port;

    let mut outbound = match &node.protocol {
        Protocol::Vmess {
            uuid,
            alter_id,
            cipher,
        } => json!({
            "protocol": "vmess",
            "settings": {"vnext": [{
                "address": server,
                "port": port,
                "users": [{"id": uuid, "alterId": alter_id, "security": cipher}]
            }]}
        }),
        Protocol::Vless { uuid, flow } => json!({
            "protocol": "vless",
            "settings": {"vnext": [{
                "address": server,
                "port": port,
                "users": [{"id": uuid, "encryption": "none", "flow": flow.as_deref().unwrap_or_default()}]
            }]}
        }),
        Protocol::Trojan { password } => json!({
            "protocol": "trojan",
            "settings": {"servers": [{"address": server, "port": port, "password": password}]}
        }),
        Protocol::Shadowsocks {
            cipher, password, ..
        } => json!({
            "protocol": "shadowsocks",
            "settings": {"servers": [{
                "address": server,
                "port": port,
                "method": cipher,
                "password": password
            }]}
        }),
        Protocol::Socks { auth } => plain_proxy("socks", server, port, auth),
        Protocol::Http { auth } => plain_proxy("http", server, port, auth),
        Protocol::Https { auth } => {
            let mut outbound = plain_proxy("http", server, port, auth);
            outbound["streamSettings"] = json!({
                "network": "tcp",
                "security": "tls",
                "tlsSettings": {"serverName": server, "allowInsecure": false}
            });
            outbound
        }
        Protocol::Wireguard {
            private_key,
            public_key,
            allowed_ips,
        } => json!({
            "protocol": "wireguard",
            "settings": {
                "secretKey": private_key,
                "peers": [{
                    "publicKey": public_key,
                    "endpoint": format!("{}:{}", crate::utils::format_host(server), port),
                    "allowedIPs": allowed_ips
                }]
            }
        }),
        Protocol::Shadowsocksr { .. } | Protocol::Hysteria { .. } => {
            return Err(ProbeError::Unsupported(node.kind()));
        }
    };

    if matches!(
        node.protocol,
        Protocol::Vmess { .. } | Protocol::Vless { .. } | Protocol::Trojan { .. }
    ) && let Some(transport) = &node.transport
    {
        outbound["streamSettings"] = stream_settings(server, transport);
    }

    Ok(outbound)
}

fn plain_proxy(protocol: &str, server: &str, port: u16, auth: &Auth) -> Value {
    let mut entry = json!({"address": server, "port": port});
    if let Some((user, pass)) = auth.credentials() {
        entry["users"] = json!([{"user": user, "pass": pass}]);
    }
    json!({"protocol": protocol, "settings": {"servers": [entry]}})
}

/// 传输层与 TLS 配置
fn stream_settings(server: &str, t: &Transport) -> Value {
    let host = t.host.as_deref().unwrap_or(server);
    let path = t.path.as_deref().unwrap_or("/");

    let mut settings = Map::new();
    settings.insert("network".into(), json!(t.network.to_string()));
    settings.insert("security".into(), json!(if t.tls { "tls" } else { "none" }));

    if t.tls {
        let server_name = t.sni.as_deref().or(t.host.as_deref()).unwrap_or(server);
        settings.insert(
            "tlsSettings".into(),
            json!({"serverName": server_name, "allowInsecure": t.allow_insecure}),
        );
    }

    match t.network {
        Network::Ws => {
            settings.insert(
                "wsSettings".into(),
                json!({"path": path, "headers": {"Host": host}}),
            );
        }
        Network::Grpc => {
            settings.insert(
                "grpcSettings".into(),
                json!({"serviceName": t.path.as_deref().unwrap_or_default(), "multiMode": false}),
            );
        }
        Network::H2 => {
            settings.insert("httpSettings".into(), json!({"path": path, "host": [host]}));
        }
        Network::Quic => {
            settings.insert(
                "quicSettings".into(),
                json!({
                    "security": "none",
                    "key": "",
                    "header": {"type": t.header_type.as_deref().unwrap_or("none")}
                }),
            );
        }
        Network::Tcp if t.header_type.as_deref() == Some("http") => {
            settings.insert(
                "tcpSettings".into(),
                json!({"header": {
                    "type": "http",
                    "request": {
                        "path": [path],
                        "headers": {"Host": [t.host.as_deref().unwrap_or_default()]}
                    }
                }}),
            );
        }
        Network::Tcp => {}
    }

    Value::Object(settings)
}

/// 完整核心配置：静默日志、本地 SOCKS 入站、单一出站
pub fn build_config(outbound: Value, local_port: u16) -> Value {
    json!({
        "log": {"loglevel": "none"},
        "inbounds": [{
            "port": local_port,
            "listen": "127.0.0.1",
            "protocol": "socks",
            "settings": {"auth": "noauth", "udp": true},
            "sniffing": {"enabled": true, "destOverride": ["http", "tls"]}
        }],
        "outbounds": [outbound]
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::model::NodeKind;

    fn vless_ws_tls() -> Node {
        Node::new(
            "v",
            "v.example.com",
            443,
            Protocol::Vless {
                uuid: "uuid-1".into(),
                flow: None,
            },
        )
        .with_transport(Transport {
            network: Network::Ws,
            path: Some("/ray".into()),
            host: Some("cdn.example.com".into()),
            tls: true,
            ..Default::default()
        })
    }

    #[test]
    fn inbound_is_local_socks_with_silent_log() {
        let config = build_config(json!({"protocol": "freedom"}), 23456);
        assert_eq!(config["log"]["loglevel"], "none");
        let inbound = &config["inbounds"][0];
        assert_eq!(inbound["port"], 23456);
        assert_eq!(inbound["listen"], "127.0.0.1");
        assert_eq!(inbound["protocol"], "socks");
        assert_eq!(inbound["settings"]["auth"], "noauth");
        assert_eq!(inbound["settings"]["udp"], true);
        assert_eq!(inbound["sniffing"]["destOverride"], json!(["http", "tls"]));
    }

    #[test]
    fn vless_stream_settings() {
        let outbound = build_outbound(&vless_ws_tls()).unwrap();
        assert_eq!(outbound["settings"]["vnext"][0]["users"][0]["encryption"], "none");
        let stream = &outbound["streamSettings"];
        assert_eq!(stream["network"], "ws");
        assert_eq!(stream["security"], "tls");
        assert_eq!(stream["tlsSettings"]["serverName"], "cdn.example.com");
        assert_eq!(stream["wsSettings"]["path"], "/ray");
        assert_eq!(stream["wsSettings"]["headers"]["Host"], "cdn.example.com");
    }

    #[test]
    fn vmess_link_with_http_header_gets_tcp_settings() {
        let doc = json!({"add":"a.com","port":80,"id":"u","net":"tcp","type":"http","host":"h","path":"/x"});
        let link = format!("vmess://{}", crate::utils::encode_base64(doc.to_string()));
        let node = crate::codec::decode(&link).unwrap();

        let outbound = build_outbound(&node).unwrap();

        let header = &outbound["streamSettings"]["tcpSettings"]["header"];
        assert_eq!(header["type"], "http");
        assert_eq!(header["request"]["path"], json!(["/x"]));
        assert_eq!(header["request"]["headers"]["Host"], json!(["h"]));
    }

    #[test]
    fn transportless_nodes_have_no_stream_settings() {
        let node = Node::new(
            "s",
            "1.1.1.1",
            8388,
            Protocol::Shadowsocks {
                cipher: "aes-256-gcm".into(),
                password: "pw".into(),
                plugin: None,
            },
        );
        let outbound = build_outbound(&node).unwrap();
        assert_eq!(outbound["protocol"], "shadowsocks");
        assert_eq!(outbound["settings"]["servers"][0]["method"], "aes-256-gcm");
        assert!(outbound.get("streamSettings").is_none());
    }

    #[test]
    fn socks_users_only_with_full_credentials() {
        let with = Node::new(
            "s",
            "1.1.1.1",
            1080,
            Protocol::Socks {
                auth: Auth::new(Some("u".into()), Some("p".into())),
            },
        );
        let without = Node::new(
            "s",
            "1.1.1.1",
            1080,
            Protocol::Socks {
                auth: Auth::new(Some("u".into()), None),
            },
        );
        assert_eq!(build_outbound(&with).unwrap()["settings"]["servers"][0]["users"][0]["user"], "u");
        assert!(build_outbound(&without).unwrap()["settings"]["servers"][0].get("users").is_none());
    }

    #[test]
    fn unsupported_kinds() {
        let node = Node::new(
            "h",
            "h.com",
            443,
            Protocol::Hysteria {
                auth: None,
                protocol: None,
                peer: None,
                insecure: false,
                up_mbps: None,
                down_mbps: None,
            },
        );
        assert!(matches!(
            build_outbound(&node),
            Err(ProbeError::Unsupported(NodeKind::Hysteria))
        ));
    }
}
