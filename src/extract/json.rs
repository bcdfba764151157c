use std::sync::LazyLock;

use regex::Regex;
use serde_json::Value;
use tracing::debug;

use super::recognize::recognize;
use super::{Extractor, decode_uri};
use crate::codec::has_known_prefix;
use crate::core::model::Node;

static MARKUP: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"<[^>]+>|/\*[\s\S]*?\*/").unwrap());
// `//` 只在行首或空白之后视为注释，避免截断 `https://`
static LINE_COMMENT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?m)(^|[ \t])//[^\n]*").unwrap());
static FRAGMENT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\{[\s\S]*?\}|\[[\s\S]*?\]").unwrap());

/// 容器对象中可能存放节点数组的键
const CONTAINER_KEYS: &[&str] = &["proxies", "nodes", "configs"];

/// 各厂商 JSON 方言
pub struct JsonExtractor;

impl Extractor for JsonExtractor {
    fn name(&self) -> &'static str {
        "json"
    }

    fn extract(&self, content: &str) -> Vec<Node> {
        let cleaned = clean(content);
        match serde_json::from_str::<Value>(&cleaned) {
            Ok(doc) => nodes_from_json(&doc),
            Err(e) => {
                debug!("JSON 解析失败 ({}), 改为扫描片段", e);
                FRAGMENT
                    .find_iter(&cleaned)
                    .filter_map(|m| serde_json::from_str::<Value>(m.as_str()).ok())
                    .map(|doc| nodes_from_json(&doc))
                    .find(|nodes| !nodes.is_empty())
                    .unwrap_or_default()
            }
        }
    }
}

fn clean(content: &str) -> String {
    let without_markup = MARKUP.replace_all(content, "");
    LINE_COMMENT.replace_all(&without_markup, "$1").into_owned()
}

fn item_to_node(item: &Value) -> Option<Node> {
    if let Value::String(s) = item {
        let s = s.trim();
        return has_known_prefix(s).then(|| decode_uri(s)).flatten();
    }
    match recognize(item) {
        Ok(node) => Some(node),
        Err(e) => {
            debug!("跳过 JSON 条目: {}", e);
            None
        }
    }
}

fn nodes_from_array(items: &[Value]) -> Vec<Node> {
    items.iter().filter_map(item_to_node).collect()
}

fn nodes_from_json(doc: &Value) -> Vec<Node> {
    let mut nodes = match doc {
        Value::Array(items) => nodes_from_array(items),
        Value::Object(map) => {
            let mut nodes = Vec::new();
            if let Ok(node) = recognize(doc) {
                nodes.push(node);
            } else if let Some(Value::Array(servers)) = map.get("servers") {
                nodes.extend(nodes_from_array(servers));
            }
            for key in CONTAINER_KEYS {
                if let Some(Value::Array(items)) = map.get(*key) {
                    nodes.extend(nodes_from_array(items));
                }
            }
            nodes
        }
        _ => Vec::new(),
    };
    nodes.retain(Node::is_valid);
    nodes
}
