//! 文件结果落地 (File Sink)
//!
//! 每个阶段写出两份文件：换行分隔的 URI 明文，以及同一内容的 Base64 版本。

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tracing::{debug, info};

use crate::codec;
use crate::core::config::OutputConfig;
use crate::core::error::Result;
use crate::core::model::Node;
use crate::interfaces::{OutputStage, ResultSink};
use crate::utils::{encode_base64, save_file};

pub struct FileSink {
    dir: PathBuf,
    raw_file: String,
    valid_file: String,
}

impl FileSink {
    pub fn new(config: &OutputConfig) -> Self {
        Self {
            dir: PathBuf::from(&config.dir),
            raw_file: config.raw_file.clone(),
            valid_file: config.valid_file.clone(),
        }
    }

    pub fn path_for(&self, stage: OutputStage) -> PathBuf {
        let file = match stage {
            OutputStage::Raw => &self.raw_file,
            OutputStage::Validated => &self.valid_file,
        };
        self.dir.join(file)
    }
}

/// `v2ray.txt` -> `v2ray.b64.txt`
pub fn base64_sibling(path: &Path) -> PathBuf {
    let stem = path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    path.with_file_name(format!("{stem}.b64.txt"))
}

/// 节点列表编码为换行分隔的 URI，无法编码的节点被跳过
pub fn render(nodes: &[Node]) -> String {
    nodes
        .iter()
        .filter_map(|node| match codec::encode(node) {
            Ok(uri) => Some(uri),
            Err(e) => {
                debug!("节点编码失败 {node}: {e}");
                None
            }
        })
        .collect::<Vec<_>>()
        .join("\n")
}

#[async_trait]
impl ResultSink for FileSink {
    async fn store(&self, stage: OutputStage, nodes: &[Node]) -> Result<()> {
        if nodes.is_empty() {
            debug!("{stage} 阶段无节点，跳过写出");
            return Ok(());
        }
        let text = render(nodes);
        let path = self.path_for(stage);
        save_file(&path, text.as_bytes()).await?;
        save_file(base64_sibling(&path), encode_base64(&text).as_bytes()).await?;
        info!("已写出 {} 个节点 ({stage}) -> {}", nodes.len(), path.display());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::model::Protocol;

    fn sink_in(dir: &Path) -> FileSink {
        FileSink::new(
            &OutputConfig::builder()
                .dir(dir.to_string_lossy().into_owned())
                .build(),
        )
    }

    #[tokio::test]
    async fn writes_plain_and_base64_files() {
        let tmp = tempfile::tempdir().unwrap();
        let sink = sink_in(tmp.path());
        let node = Node::new(
            "a",
            "1.2.3.4",
            443,
            Protocol::Trojan {
                password: "pw".into(),
            },
        );

        sink.store(OutputStage::Validated, &[node]).await.unwrap();

        let plain = std::fs::read_to_string(tmp.path().join("v2ray.txt")).unwrap();
        assert!(plain.starts_with("trojan://"));
        let b64 = std::fs::read_to_string(tmp.path().join("v2ray.b64.txt")).unwrap();
        assert_eq!(crate::utils::decode_base64_str(&b64).as_deref(), Some(plain.as_str()));
    }

    #[tokio::test]
    async fn empty_list_writes_nothing() {
        let tmp = tempfile::tempdir().unwrap();
        let sink = sink_in(tmp.path());
        sink.store(OutputStage::Raw, &[]).await.unwrap();
        assert!(!tmp.path().join("v2ray_raw.txt").exists());
    }

    #[test]
    fn base64_sibling_name() {
        assert_eq!(
            base64_sibling(Path::new("out/v2ray_raw.txt")),
            PathBuf::from("out/v2ray_raw.b64.txt")
        );
    }
}
