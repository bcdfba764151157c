//! 订阅文本级联解析 (Cascading Node Decoder)
//!
//! 四种提取策略按固定优先级依次尝试：Base64 → YAML → 正则 → JSON，
//! 第一个产出有效节点的策略即为最终结果。

use tracing::{debug, info};

use crate::codec::{self, has_known_prefix};
use crate::core::model::Node;

mod b64;
mod json;
mod recognize;
mod scan;
mod yaml;

pub use self::b64::Base64Extractor;
pub use self::json::JsonExtractor;
pub use self::recognize::recognize;
pub use self::scan::ScanExtractor;
pub use self::yaml::YamlExtractor;

/// 单一提取策略 (Format Extractor)
pub trait Extractor: Send + Sync {
    fn name(&self) -> &'static str;

    /// 返回的节点均已通过 [`Node::is_valid`]；无法识别时返回空列表
    fn extract(&self, content: &str) -> Vec<Node>;
}

/// 级联解码器
pub struct NodeDecoder {
    strategies: Vec<Box<dyn Extractor>>,
}

impl Default for NodeDecoder {
    fn default() -> Self {
        Self::new()
    }
}

impl NodeDecoder {
    pub fn new() -> Self {
        Self {
            strategies: vec![
                Box::new(Base64Extractor),
                Box::new(YamlExtractor),
                Box::new(ScanExtractor),
                Box::new(JsonExtractor),
            ],
        }
    }

    /// 解析任意订阅文本，全部策略失败时返回空列表
    pub fn decode(&self, content: &str) -> Vec<Node> {
        if content.trim().is_empty() {
            debug!("内容为空，跳过提取");
            return Vec::new();
        }

        for strategy in &self.strategies {
            let nodes = strategy.extract(content);
            if !nodes.is_empty() {
                info!("通过 {} 提取到 {} 个节点", strategy.name(), nodes.len());
                return nodes;
            }
        }

        debug!("内容中未找到节点 ({} 字节)", content.len());
        Vec::new()
    }
}

/// 解码以协议前缀开头的每一行
pub(crate) fn decode_lines<'a>(lines: impl IntoIterator<Item = &'a str>) -> Vec<Node> {
    lines
        .into_iter()
        .map(str::trim)
        .filter(|line| has_known_prefix(line))
        .filter_map(decode_uri)
        .collect()
}

/// 单条 URI 解码，失败仅记录日志
pub(crate) fn decode_uri(uri: &str) -> Option<Node> {
    match codec::decode(uri) {
        Ok(node) => Some(node),
        Err(e) => {
            debug!("跳过 {}: {}", uri.chars().take(48).collect::<String>(), e);
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::core::model::NodeKind;
    use crate::utils::encode_base64;

    fn vmess_uri(add: &str, name: &str) -> String {
        format!(
            "vmess://{}",
            encode_base64(json!({"add": add, "port": 443, "id": "uuid-1", "ps": name}).to_string())
        )
    }

    const YAML_SS: &str = "proxies:\n  - name: A\n    type: ss\n    server: 1.1.1.1\n    port: 8388\n    cipher: aes-256-gcm\n    password: pw";

    #[test]
    fn single_vmess_uri() {
        let nodes = NodeDecoder::new().decode(&vmess_uri("1.2.3.4", "test"));
        assert_eq!(nodes.len(), 1);
        assert_eq!(nodes[0].kind(), NodeKind::Vmess);
        assert_eq!((nodes[0].server.as_str(), nodes[0].port), ("1.2.3.4", 443));
    }

    #[test]
    fn clash_yaml_document() {
        let nodes = NodeDecoder::new().decode(YAML_SS);
        assert_eq!(nodes.len(), 1);
        assert_eq!(nodes[0].kind(), NodeKind::Shadowsocks);
        assert_eq!((nodes[0].server.as_str(), nodes[0].port), ("1.1.1.1", 8388));
    }

    #[test]
    fn base64_wins_over_yaml_tokens() {
        // "proxies: x" 去掉非 Base64 字符后恰好是 8 个字符，不破坏后续分组对齐
        let list = format!("\n{}\n{}", vmess_uri("1.2.3.4", "a"), vmess_uri("5.6.7.8", "b"));
        let content = format!("proxies: x\n{}", encode_base64(list));
        let nodes = NodeDecoder::new().decode(&content);
        let servers: Vec<_> = nodes.iter().map(|n| n.server.as_str()).collect();
        assert_eq!(servers, ["1.2.3.4", "5.6.7.8"]);
    }

    #[test]
    fn yaml_wins_over_embedded_uris() {
        let content = format!("# backup: {}\n{}", vmess_uri("9.9.9.9", "c"), YAML_SS);
        let nodes = NodeDecoder::new().decode(&content);
        assert_eq!(nodes.len(), 1);
        assert_eq!(nodes[0].kind(), NodeKind::Shadowsocks);
    }

    #[test]
    fn unrecognized_text_is_empty() {
        assert!(NodeDecoder::new().decode("hello world, nothing here").is_empty());
        assert!(NodeDecoder::new().decode("   ").is_empty());
    }
}
