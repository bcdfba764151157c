use std::sync::LazyLock;

use regex::Regex;

use super::{Extractor, decode_lines};
use crate::codec::SUPPORTED_PREFIXES;
use crate::core::model::Node;
use crate::utils::decode_base64_auto;

static NON_BASE64: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"[^A-Za-z0-9+/=]").unwrap());

/// 整段 Base64 编码的 URI 列表 (v2rayN 订阅)
pub struct Base64Extractor;

impl Extractor for Base64Extractor {
    fn name(&self) -> &'static str {
        "base64"
    }

    fn extract(&self, content: &str) -> Vec<Node> {
        let cleaned = NON_BASE64.replace_all(content, "");
        let Some(bytes) = decode_base64_auto(&cleaned) else {
            return Vec::new();
        };
        let decoded = String::from_utf8_lossy(&bytes);
        if !SUPPORTED_PREFIXES.iter().any(|p| decoded.contains(p)) {
            return Vec::new();
        }
        decode_lines(decoded.lines())
    }
}
