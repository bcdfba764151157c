use std::sync::LazyLock;

use regex::Regex;
use serde_json::Value;
use tracing::debug;

use super::Extractor;
use super::recognize::recognize;
use crate::core::model::Node;

static HTML_TAGS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"!<str>|!&lt;str&gt;|<[^>]+>").unwrap());

/// 出现任一标记才尝试按 YAML 解析
const INDICATORS: &[&str] = &[
    "proxies:",
    "proxy-providers:",
    "type: vmess",
    "type: ss",
    "type: trojan",
    "type: vless",
];

/// 节点列表可能所在的键
const LIST_KEYS: &[&str] = &["proxies", "proxy-providers", "Proxy", "proxys"];

/// Clash 风格的 YAML 配置
pub struct YamlExtractor;

impl Extractor for YamlExtractor {
    fn name(&self) -> &'static str {
        "yaml"
    }

    fn extract(&self, content: &str) -> Vec<Node> {
        let text = HTML_TAGS.replace_all(content, "");
        if !INDICATORS.iter().any(|k| text.contains(k)) {
            return Vec::new();
        }

        match serde_yml::from_str::<Value>(&text) {
            Ok(root) => nodes_from_root(&root),
            Err(e) => {
                debug!("YAML 解析失败 ({}), 改用 proxies 片段重试", e);
                proxies_block(&text)
                    .and_then(|block| serde_yml::from_str::<Value>(&block).ok())
                    .map(|root| nodes_from_root(&root))
                    .unwrap_or_default()
            }
        }
    }
}

fn nodes_from_root(root: &Value) -> Vec<Node> {
    let Some(list) = LIST_KEYS
        .iter()
        .find_map(|k| root.get(*k).and_then(Value::as_array))
    else {
        return Vec::new();
    };

    list.iter()
        .filter_map(|item| match recognize(item) {
            Ok(node) => Some(node),
            Err(e) => {
                debug!("跳过 YAML 条目: {}", e);
                None
            }
        })
        .filter(Node::is_valid)
        .collect()
}

/// 截取顶层 `proxies:` 块：其后缩进行或列表项，直到下一个顶层键
fn proxies_block(text: &str) -> Option<String> {
    let mut lines = text.lines().skip_while(|l| l.trim_end() != "proxies:");
    let header = lines.next()?;
    let body: Vec<&str> = lines
        .take_while(|l| l.trim().is_empty() || l.starts_with([' ', '\t', '-']))
        .collect();
    (!body.is_empty()).then(|| format!("{}\n{}", header.trim_end(), body.join("\n")))
}
