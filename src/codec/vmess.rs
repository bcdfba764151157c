//! VMess 分享链接：`vmess://` + Base64(JSON)

use serde_json::{Value, json};

use super::{field_bool, field_port, field_str, field_u64};
use crate::core::error::{DecodeError, EncodeError};
use crate::core::model::{Network, Node, Protocol, Transport};
use crate::utils::{decode_base64_str, encode_base64};

pub(super) fn decode(body: &str) -> Result<Node, DecodeError> {
    let json = decode_base64_str(body).ok_or(DecodeError::Base64)?;
    let v: Value = serde_json::from_str(&json)?;
    from_fields(&v, None)
}

/// 从 v2rayN 风格的 JSON 字段构造节点，兼容 `ps`/`remarks`、`net`/`type` 等变体
pub(crate) fn from_fields(v: &Value, fallback_name: Option<String>) -> Result<Node, DecodeError> {
    let server = field_str(v, &["add", "server", "address"]).ok_or(DecodeError::MissingField("add"))?;
    let port = field_port(v, &["port"])?;
    let uuid = field_str(v, &["id", "uuid"]).ok_or(DecodeError::MissingField("id"))?;
    let alter_id = field_u64(v, &["aid", "alterId"])
        .and_then(|a| u32::try_from(a).ok())
        .unwrap_or(0);
    let cipher = field_str(v, &["scy", "security", "cipher"]).unwrap_or_else(|| "auto".into());
    let name = field_str(v, &["ps", "remarks"])
        .or(fallback_name)
        .unwrap_or_default();

    // `type` 在标准格式中是伪装头类型，部分生成器却用它存放网络类型
    let type_field = field_str(v, &["type"]);
    let network = field_str(v, &["net", "network"])
        .and_then(|n| n.parse::<Network>().ok())
        .or_else(|| type_field.as_deref().and_then(|t| t.parse().ok()))
        .unwrap_or_default();
    let header_type =
        type_field.filter(|t| t.parse::<Network>().is_err() && !t.eq_ignore_ascii_case("vmess"));
    let tls = matches!(v.get("tls"), Some(Value::Bool(true)))
        || field_str(v, &["tls"]).is_some_and(|t| t.eq_ignore_ascii_case("tls"));

    let transport = Transport {
        network,
        path: field_str(v, &["path"]),
        host: field_str(v, &["host"]),
        tls,
        sni: field_str(v, &["sni", "servername"]),
        allow_insecure: field_bool(v, &["allowInsecure", "skip-cert-verify"]).unwrap_or(false),
        header_type,
    };

    Ok(Node::new(
        name,
        server,
        port,
        Protocol::Vmess {
            uuid,
            alter_id,
            cipher,
        },
    )
    .with_transport(transport))
}

pub(super) fn encode(node: &Node) -> Result<String, EncodeError> {
    let Protocol::Vmess {
        uuid,
        alter_id,
        cipher,
    } = &node.protocol
    else {
        return Err(EncodeError::InvalidNode(node.to_string()));
    };
    let t = node.transport.clone().unwrap_or_default();

    let mut doc = json!({
        "v": "2",
        "ps": node.name,
        "add": node.server,
        "port": node.port.to_string(),
        "id": uuid,
        "aid": alter_id.to_string(),
        "scy": cipher,
        "net": t.network.to_string(),
        "type": t.header_type.as_deref().unwrap_or("none"),
        "host": t.host.as_deref().unwrap_or_default(),
        "path": t.path.as_deref().unwrap_or_default(),
        "tls": if t.tls { "tls" } else { "" },
        "sni": t.sni.as_deref().unwrap_or_default(),
    });
    if t.allow_insecure {
        doc["allowInsecure"] = Value::Bool(true);
    }

    Ok(format!("vmess://{}", encode_base64(serde_json::to_string(&doc)?)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::model::NodeKind;

    fn link(doc: Value) -> String {
        encode_base64(doc.to_string())
    }

    #[test]
    fn decodes_minimal_payload() {
        let node = decode(&link(json!({"add":"1.2.3.4","port":443,"id":"uuid-1","ps":"test"}))).unwrap();
        assert_eq!(node.server, "1.2.3.4");
        assert_eq!(node.port, 443);
        assert_eq!(node.name, "test");
        assert_eq!(node.kind(), NodeKind::Vmess);
        assert_eq!(node.transport, None);
        assert!(matches!(node.protocol, Protocol::Vmess { ref cipher, alter_id: 0, .. } if cipher == "auto"));
    }

    #[test]
    fn tolerates_unpadded_payload_and_string_numbers() {
        let payload = link(json!({"add":"a.com","port":"8080","id":"u","aid":"2","remarks":"r","net":"ws","path":"/p","tls":"tls"}));
        let node = decode(payload.trim_end_matches('=')).unwrap();
        assert_eq!(node.port, 8080);
        assert_eq!(node.name, "r");
        let t = node.transport.unwrap();
        assert_eq!(t.network, Network::Ws);
        assert_eq!(t.path.as_deref(), Some("/p"));
        assert!(t.tls);
    }

    #[test]
    fn type_used_as_network_when_net_missing() {
        let node = decode(&link(json!({"add":"a.com","port":1,"id":"u","type":"grpc"}))).unwrap();
        let t = node.transport.unwrap();
        assert_eq!(t.network, Network::Grpc);
        assert_eq!(t.header_type, None);
    }

    #[test]
    fn http_header_obfuscation_is_kept() {
        let doc = json!({"add":"a.com","port":80,"id":"u","net":"tcp","type":"http","host":"h"});
        let node = decode(&link(doc)).unwrap();
        let t = node.transport.clone().unwrap();
        assert_eq!(t.network, Network::Tcp);
        assert_eq!(t.header_type.as_deref(), Some("http"));
        assert_eq!(t.host.as_deref(), Some("h"));

        let again = super::super::decode(&super::super::encode(&node).unwrap()).unwrap();
        assert_eq!(again, node);
    }

    #[test]
    fn protocol_name_in_type_is_not_a_header() {
        let node = decode(&link(json!({"add":"a.com","port":1,"id":"u","net":"ws","type":"vmess"}))).unwrap();
        assert_eq!(node.transport.unwrap().header_type, None);
    }

    #[test]
    fn missing_id_is_an_error() {
        assert!(matches!(
            decode(&link(json!({"add":"a.com","port":1}))),
            Err(DecodeError::MissingField("id"))
        ));
        assert!(matches!(decode("!!!not-base64"), Err(DecodeError::Base64)));
    }

    #[test]
    fn encoded_payload_uses_reference_keys() {
        let node = decode(&link(json!({"add":"a.com","port":443,"id":"u","ps":"n"}))).unwrap();
        let uri = encode(&node).unwrap();
        let payload = decode_base64_str(uri.strip_prefix("vmess://").unwrap()).unwrap();
        let doc: Value = serde_json::from_str(&payload).unwrap();
        for key in ["v", "ps", "add", "port", "id", "aid", "net", "type", "tls"] {
            assert!(doc.get(key).is_some(), "missing {}", key);
        }
        assert_eq!(doc["port"], "443");
    }
}
