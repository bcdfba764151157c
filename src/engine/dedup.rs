use std::collections::HashSet;

use tracing::debug;

use crate::core::model::Node;

/// 按 `server:port` 去重，保留首次出现的节点及其顺序
pub fn deduplicate(nodes: Vec<Node>) -> Vec<Node> {
    let before = nodes.len();
    let mut seen = HashSet::with_capacity(before);
    let unique: Vec<Node> = nodes
        .into_iter()
        .filter(|node| seen.insert(node.identity_key()))
        .collect();
    debug!("去重 {} -> {} 个节点", before, unique.len());
    unique
}
