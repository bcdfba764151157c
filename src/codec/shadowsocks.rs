//! Shadowsocks (SIP002 与旧式整段 Base64) 以及 ShadowsocksR

use std::collections::HashMap;

use url::form_urlencoded;

use super::query_suffix;
use crate::core::error::{DecodeError, EncodeError};
use crate::core::model::{Node, Protocol};
use crate::utils::{decode_base64_str, encode_base64_url, format_host, percent_decode, percent_encode, split_host_port};

fn split_fragment(body: &str) -> (&str, String) {
    match body.split_once('#') {
        Some((rest, frag)) => (rest, percent_decode(frag)),
        None => (body, String::new()),
    }
}

/// 缺少加密方式时的缺省值
const DEFAULT_CIPHER: &str = "aes-256-gcm";

/// `method:password`，userinfo 可能是 Base64 也可能是百分号编码明文；
/// 仅有单个令牌时视为密码
fn parse_userinfo(userinfo: &str) -> Result<(String, String), DecodeError> {
    let plain = decode_base64_str(userinfo)
        .filter(|s| s.contains(':'))
        .unwrap_or_else(|| percent_decode(userinfo));
    let (method, password) = plain
        .split_once(':')
        .unwrap_or((DEFAULT_CIPHER, plain.as_str()));
    if password.is_empty() {
        return Err(DecodeError::MissingField("password"));
    }
    let method = if method.is_empty() { DEFAULT_CIPHER } else { method };
    Ok((method.to_string(), password.to_string()))
}

fn parse_endpoint(hostport: &str) -> Result<(String, u16), DecodeError> {
    let hostport = hostport.trim_end_matches('/');
    split_host_port(hostport).ok_or_else(|| DecodeError::InvalidPort(hostport.to_string()))
}

pub(super) fn decode_ss(body: &str) -> Result<Node, DecodeError> {
    let (rest, name) = split_fragment(body);
    let (rest, query) = rest.split_once('?').unwrap_or((rest, ""));
    let mut query: HashMap<String, String> = form_urlencoded::parse(query.as_bytes())
        .into_owned()
        .filter(|(_, v)| !v.is_empty())
        .collect();
    let plugin = query.remove("plugin");
    let name = if name.trim().is_empty() {
        query.remove("remarks").unwrap_or_default()
    } else {
        name
    };

    let (cipher, password, (server, port)) = match rest.rsplit_once('@') {
        // SIP002: userinfo@host:port
        Some((userinfo, hostport)) => {
            let (cipher, password) = parse_userinfo(userinfo)?;
            (cipher, password, parse_endpoint(hostport)?)
        }
        // 旧式：整段 Base64(method:password@host:port)
        None => {
            let plain = decode_base64_str(rest)
                .filter(|s| s.contains('@'))
                .or_else(|| decode_base64_str(rest.trim_end_matches('/')))
                .ok_or(DecodeError::Base64)?;
            let (userinfo, hostport) = plain
                .rsplit_once('@')
                .ok_or(DecodeError::MissingField("server"))?;
            let (method, password) = userinfo
                .split_once(':')
                .ok_or(DecodeError::MissingField("password"))?;
            (method.to_string(), password.to_string(), parse_endpoint(hostport)?)
        }
    };

    Ok(Node::new(
        name,
        server,
        port,
        Protocol::Shadowsocks {
            cipher,
            password,
            plugin,
        },
    ))
}

pub(super) fn encode_ss(node: &Node) -> Result<String, EncodeError> {
    let Protocol::Shadowsocks {
        cipher,
        password,
        plugin,
    } = &node.protocol
    else {
        return Err(EncodeError::InvalidNode(node.to_string()));
    };

    let userinfo = encode_base64_url(format!("{}:{}", cipher, password));
    let query = match plugin {
        Some(plugin) => format!("/{}", query_suffix(&[("plugin", plugin.clone())])?),
        None => String::new(),
    };

    Ok(format!(
        "ss://{}@{}:{}{}#{}",
        userinfo,
        format_host(&node.server),
        node.port,
        query,
        percent_encode(&node.name)
    ))
}

/// SSR 参数值统一为 URL-safe Base64
fn ssr_params(raw: &str) -> HashMap<&str, String> {
    raw.split('&')
        .filter_map(|pair| pair.split_once('='))
        .filter_map(|(k, v)| Some((k, decode_base64_str(v)?)))
        .filter(|(_, v)| !v.is_empty())
        .collect()
}

/// `ssr://` + Base64(`host:port:protocol:method:obfs:b64(password)/?params`)
pub(super) fn decode_ssr(body: &str) -> Result<Node, DecodeError> {
    let plain = decode_base64_str(body).ok_or(DecodeError::Base64)?;
    let (main, params) = match plain.split_once('?') {
        Some((main, params)) => (main.trim_end_matches('/'), params),
        None => (plain.trim_end_matches('/'), ""),
    };

    // 从右向左拆分，主机可能是含冒号的 IPv6
    let mut parts = main.rsplitn(6, ':');
    let password_b64 = parts.next().ok_or(DecodeError::MissingField("password"))?;
    let obfs = parts.next().ok_or(DecodeError::MissingField("obfs"))?;
    let cipher = parts.next().ok_or(DecodeError::MissingField("cipher"))?;
    let protocol = parts.next().ok_or(DecodeError::MissingField("protocol"))?;
    let port = parts.next().ok_or(DecodeError::MissingField("port"))?;
    let server = parts
        .next()
        .map(|h| h.trim_start_matches('[').trim_end_matches(']'))
        .filter(|h| !h.is_empty())
        .ok_or(DecodeError::MissingField("server"))?;

    let port = port
        .parse::<u16>()
        .ok()
        .filter(|p| *p != 0)
        .ok_or_else(|| DecodeError::InvalidPort(port.to_string()))?;
    let password = decode_base64_str(password_b64).ok_or(DecodeError::Base64)?;
    let mut params = ssr_params(params);

    Ok(Node::new(
        params.remove("remarks").unwrap_or_default(),
        server,
        port,
        Protocol::Shadowsocksr {
            cipher: cipher.to_string(),
            password,
            protocol: protocol.to_string(),
            obfs: obfs.to_string(),
            protocol_param: params.remove("protoparam"),
            obfs_param: params.remove("obfsparam"),
        },
    ))
}

pub(super) fn encode_ssr(node: &Node) -> Result<String, EncodeError> {
    let Protocol::Shadowsocksr {
        cipher,
        password,
        protocol,
        obfs,
        protocol_param,
        obfs_param,
    } = &node.protocol
    else {
        return Err(EncodeError::InvalidNode(node.to_string()));
    };

    let mut params = Vec::new();
    if let Some(v) = obfs_param {
        params.push(format!("obfsparam={}", encode_base64_url(v)));
    }
    if let Some(v) = protocol_param {
        params.push(format!("protoparam={}", encode_base64_url(v)));
    }
    params.push(format!("remarks={}", encode_base64_url(&node.name)));

    let plain = format!(
        "{}:{}:{}:{}:{}:{}/?{}",
        node.server,
        node.port,
        protocol,
        cipher,
        obfs,
        encode_base64_url(password),
        params.join("&")
    );
    Ok(format!("ssr://{}", encode_base64_url(plain)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::utils::encode_base64;

    #[test]
    fn sip002_with_base64_userinfo() {
        let body = format!("{}@1.2.3.4:8388#HK", encode_base64("aes-256-gcm:pass"));
        let node = decode_ss(&body).unwrap();
        assert_eq!(node.name, "HK");
        assert_eq!((node.server.as_str(), node.port), ("1.2.3.4", 8388));
        assert!(matches!(
            node.protocol,
            Protocol::Shadowsocks { ref cipher, ref password, plugin: None }
                if cipher == "aes-256-gcm" && password == "pass"
        ));
    }

    #[test]
    fn sip002_with_plain_userinfo_and_plugin() {
        let node = decode_ss("chacha20-ietf-poly1305:p%40ss@h.example.com:443/?plugin=obfs-local%3Bobfs%3Dhttp#x").unwrap();
        assert!(matches!(
            node.protocol,
            Protocol::Shadowsocks { ref password, plugin: Some(ref p), .. }
                if password == "p@ss" && p == "obfs-local;obfs=http"
        ));
    }

    #[test]
    fn legacy_whole_body_base64() {
        let body = format!("{}#legacy", encode_base64("aes-128-gcm:pw@5.6.7.8:8000"));
        let node = decode_ss(&body).unwrap();
        assert_eq!((node.server.as_str(), node.port, node.name.as_str()), ("5.6.7.8", 8000, "legacy"));
    }

    #[test]
    fn bare_token_becomes_password() {
        let node = decode_ss("onlytoken@1.2.3.4:8388").unwrap();
        assert!(matches!(
            node.protocol,
            Protocol::Shadowsocks { ref cipher, ref password, .. }
                if cipher == DEFAULT_CIPHER && password == "onlytoken"
        ));
    }

    #[test]
    fn ss_without_port_is_rejected() {
        let body = format!("{}@1.2.3.4", encode_base64("aes-256-gcm:pass"));
        assert!(decode_ss(&body).is_err());
    }

    #[test]
    fn ssr_decodes_params() {
        let plain = format!(
            "1.2.3.4:443:origin:aes-256-cfb:plain:{}/?remarks={}&protoparam=",
            encode_base64_url("secret"),
            encode_base64_url("节点")
        );
        let node = decode_ssr(&encode_base64_url(plain)).unwrap();
        assert_eq!(node.name, "节点");
        assert!(matches!(
            node.protocol,
            Protocol::Shadowsocksr { ref password, ref protocol, protocol_param: None, .. }
                if password == "secret" && protocol == "origin"
        ));
    }
}
