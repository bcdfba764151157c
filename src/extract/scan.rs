use std::sync::LazyLock;

use regex::Regex;

use super::{Extractor, decode_uri};
use crate::codec::SUPPORTED_PREFIXES;
use crate::core::model::Node;

/// 所有协议前缀合并为一个交替式，保持文档中的出现顺序
static URI_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    let alternatives: Vec<String> = SUPPORTED_PREFIXES
        .iter()
        .map(|prefix| match *prefix {
            "vmess://" => r"vmess://[A-Za-z0-9+/=_-]+".to_string(),
            other => format!(r#"{}[^"'<>\s]+"#, regex::escape(other)),
        })
        .collect();
    Regex::new(&format!(r"\b(?:{})", alternatives.join("|"))).unwrap()
});

/// 从 HTML / 任意文本中扫描裸 URI
pub struct ScanExtractor;

impl Extractor for ScanExtractor {
    fn name(&self) -> &'static str {
        "regex"
    }

    fn extract(&self, content: &str) -> Vec<Node> {
        URI_PATTERN
            .find_iter(content)
            .filter_map(|m| decode_uri(m.as_str()))
            .collect()
    }
}
