use std::borrow::Cow;
use std::path::Path;

use base64::alphabet;
use base64::engine::{DecodePaddingMode, GeneralPurpose, GeneralPurposeConfig};
use base64::prelude::*;
use percent_encoding::{AsciiSet, NON_ALPHANUMERIC, percent_decode_str, utf8_percent_encode};
use tokio::fs;

pub mod sink;
pub mod xray;

/// 容错解码引擎：填充可有可无，允许尾部多余比特
const LENIENT: GeneralPurpose = GeneralPurpose::new(
    &alphabet::STANDARD,
    GeneralPurposeConfig::new()
        .with_decode_allow_trailing_bits(true)
        .with_decode_padding_mode(DecodePaddingMode::Indifferent),
);

/// URI 组件编码集 (仅保留 RFC 3986 unreserved 字符)
const COMPONENT: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'.')
    .remove(b'_')
    .remove(b'~');

/// 执行启发式 Base64 解码 (Heuristic Decoding)
///
/// 同时接受标准与 URL-safe 字母表，自动修正 `len % 4` 填充。
pub fn decode_base64_auto(input: &str) -> Option<Vec<u8>> {
    let mut clean: String = input
        .chars()
        .filter(|c| !c.is_whitespace())
        .map(|c| match c {
            '-' => '+',
            '_' => '/',
            c => c,
        })
        .collect();
    while clean.ends_with('=') {
        clean.pop();
    }
    match clean.len() % 4 {
        1 => return None,
        0 => {}
        n => clean.extend(std::iter::repeat_n('=', 4 - n)),
    }
    LENIENT.decode(clean.as_bytes()).ok()
}

/// Base64 解码并要求结果为合法 UTF-8
pub fn decode_base64_str(input: &str) -> Option<String> {
    decode_base64_auto(input).and_then(|b| String::from_utf8(b).ok())
}

pub fn encode_base64(data: impl AsRef<[u8]>) -> String {
    BASE64_STANDARD.encode(data)
}

pub fn encode_base64_url(data: impl AsRef<[u8]>) -> String {
    BASE64_URL_SAFE_NO_PAD.encode(data)
}

pub fn percent_encode(s: &str) -> String {
    utf8_percent_encode(s, COMPONENT).to_string()
}

pub fn percent_decode(s: &str) -> String {
    percent_decode_str(s).decode_utf8_lossy().into_owned()
}

/// IPv6 地址在 authority 中需要方括号
pub fn format_host(server: &str) -> Cow<'_, str> {
    if server.contains(':') && !server.starts_with('[') {
        Cow::Owned(format!("[{}]", server))
    } else {
        Cow::Borrowed(server)
    }
}

/// 拆分 `host:port` / `[v6]:port`
pub fn split_host_port(addr: &str) -> Option<(String, u16)> {
    let (host, port) = if let Some(rest) = addr.strip_prefix('[') {
        let (host, tail) = rest.split_once(']')?;
        (host, tail.strip_prefix(':')?)
    } else {
        addr.rsplit_once(':')?
    };
    let port = port.trim().parse::<u16>().ok().filter(|p| *p != 0)?;
    let host = host.trim();
    (!host.is_empty()).then(|| (host.to_string(), port))
}

pub async fn save_file(path: impl AsRef<Path>, data: &[u8]) -> std::io::Result<()> {
    let path = path.as_ref();
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).await?;
    }
    fs::write(path, data).await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_unpadded_and_url_safe() {
        assert_eq!(decode_base64_str("aGVsbG8").as_deref(), Some("hello"));
        assert_eq!(decode_base64_str("aGVsbG8=").as_deref(), Some("hello"));
        assert_eq!(decode_base64_str("aGVs\nbG8=").as_deref(), Some("hello"));
        // "??>" 在 URL-safe 字母表下为 "Pz8-"
        assert_eq!(decode_base64_str("Pz8-").as_deref(), Some("??>"));
        assert_eq!(decode_base64_auto("abcde"), None);
    }

    #[test]
    fn splits_hosts() {
        assert_eq!(split_host_port("1.2.3.4:8388"), Some(("1.2.3.4".into(), 8388)));
        assert_eq!(split_host_port("[::1]:443"), Some(("::1".into(), 443)));
        assert_eq!(split_host_port("host:0"), None);
        assert_eq!(split_host_port("host"), None);
        assert_eq!(format_host("::1"), "[::1]");
        assert_eq!(format_host("a.com"), "a.com");
    }

    #[test]
    fn percent_round_trip() {
        let name = "香港 01 #a/b+c";
        assert_eq!(percent_decode(&percent_encode(name)), name);
    }
}
