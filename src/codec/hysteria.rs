//! `hysteria://[auth@]host:port?protocol=&peer=&insecure=&upmbps=&downmbps=#name`

use url::Url;

use super::{display_name, host_of, is_truthy, port_or, query_map, query_suffix};
use crate::core::error::{DecodeError, EncodeError};
use crate::core::model::{Node, Protocol};
use crate::utils::{format_host, percent_decode, percent_encode};

pub(super) fn decode(uri: &str) -> Result<Node, DecodeError> {
    let url = Url::parse(uri)?;
    let q = query_map(&url);
    let non_empty = |key: &str| q.get(key).filter(|v| !v.is_empty()).cloned();
    let mbps = |keys: [&str; 2]| keys.iter().find_map(|k| q.get(*k)?.trim().parse::<u32>().ok());

    let auth = Some(percent_decode(url.username()))
        .filter(|u| !u.is_empty())
        .or_else(|| non_empty("auth"));

    Ok(Node::new(
        display_name(&url, &q),
        host_of(&url)?,
        port_or(&url, 443)?,
        Protocol::Hysteria {
            auth,
            protocol: non_empty("protocol"),
            peer: non_empty("peer"),
            insecure: q.get("insecure").is_some_and(|v| is_truthy(v)),
            up_mbps: mbps(["upmbps", "up"]),
            down_mbps: mbps(["downmbps", "down"]),
        },
    ))
}

pub(super) fn encode(node: &Node) -> Result<String, EncodeError> {
    let Protocol::Hysteria {
        auth,
        protocol,
        peer,
        insecure,
        up_mbps,
        down_mbps,
    } = &node.protocol
    else {
        return Err(EncodeError::InvalidNode(node.to_string()));
    };

    let mut pairs: Vec<(&str, String)> = Vec::new();
    if let Some(v) = protocol {
        pairs.push(("protocol", v.clone()));
    }
    if let Some(v) = auth {
        pairs.push(("auth", v.clone()));
    }
    if let Some(v) = peer {
        pairs.push(("peer", v.clone()));
    }
    if *insecure {
        pairs.push(("insecure", "1".into()));
    }
    if let Some(v) = up_mbps {
        pairs.push(("upmbps", v.to_string()));
    }
    if let Some(v) = down_mbps {
        pairs.push(("downmbps", v.to_string()));
    }

    Ok(format!(
        "hysteria://{}:{}{}#{}",
        format_host(&node.server),
        node.port,
        query_suffix(&pairs)?,
        percent_encode(&node.name)
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reads_userinfo_auth_and_bandwidth() {
        let node = decode("hysteria://token@h.example.com:8443?protocol=udp&peer=sni.example.com&insecure=1&up=50&downmbps=100#hy").unwrap();
        assert_eq!((node.name.as_str(), node.port), ("hy", 8443));
        assert_eq!(
            node.protocol,
            Protocol::Hysteria {
                auth: Some("token".into()),
                protocol: Some("udp".into()),
                peer: Some("sni.example.com".into()),
                insecure: true,
                up_mbps: Some(50),
                down_mbps: Some(100),
            }
        );
    }

    #[test]
    fn defaults_to_port_443() {
        let node = decode("hysteria://h.example.com?auth=abc").unwrap();
        assert_eq!(node.port, 443);
        assert!(matches!(node.protocol, Protocol::Hysteria { auth: Some(ref a), .. } if a == "abc"));
    }
}
