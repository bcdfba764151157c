//! `wireguard://host:port?privateKey=&publicKey=&allowedIPs=a,b#name`

use url::Url;

use super::{display_name, host_of, port_or, query_map, query_suffix};
use crate::core::error::{DecodeError, EncodeError};
use crate::core::model::{Node, Protocol};
use crate::utils::{format_host, percent_encode};

const DEFAULT_PORT: u16 = 51820;
pub(crate) const DEFAULT_ALLOWED_IPS: &str = "0.0.0.0/0";

pub(super) fn decode(uri: &str) -> Result<Node, DecodeError> {
    let url = Url::parse(uri)?;
    let q = query_map(&url);
    // 未转义的 Base64 密钥中 `+` 会被表单解码为空格
    let key = |names: [&str; 2], field: &'static str| {
        names
            .iter()
            .find_map(|n| q.get(*n))
            .map(|v| v.trim().replace(' ', "+"))
            .filter(|v| !v.is_empty())
            .ok_or(DecodeError::MissingField(field))
    };

    let private_key = key(["privateKey", "secretKey"], "privateKey")?;
    let public_key = key(["publicKey", "peerPublicKey"], "publicKey")?;
    let allowed_ips = q
        .get("allowedIPs")
        .map(|v| v.split(',').map(str::trim).filter(|s| !s.is_empty()).map(String::from).collect())
        .filter(|ips: &Vec<String>| !ips.is_empty())
        .unwrap_or_else(|| vec![DEFAULT_ALLOWED_IPS.to_string()]);

    Ok(Node::new(
        display_name(&url, &q),
        host_of(&url)?,
        port_or(&url, DEFAULT_PORT)?,
        Protocol::Wireguard {
            private_key,
            public_key,
            allowed_ips,
        },
    ))
}

pub(super) fn encode(node: &Node) -> Result<String, EncodeError> {
    let Protocol::Wireguard {
        private_key,
        public_key,
        allowed_ips,
    } = &node.protocol
    else {
        return Err(EncodeError::InvalidNode(node.to_string()));
    };

    let pairs = [
        ("privateKey", private_key.clone()),
        ("publicKey", public_key.clone()),
        ("allowedIPs", allowed_ips.join(",")),
    ];

    Ok(format!(
        "wireguard://{}:{}{}#{}",
        format_host(&node.server),
        node.port,
        query_suffix(&pairs)?,
        percent_encode(&node.name)
    ))
}
