//! 订阅处理流水线
//!
//! 负责协调一次完整运行：拉取 -> 解码 -> 去重 -> 落地原始列表 -> 测速 -> 落地可用列表

use std::sync::Arc;

use tracing::info;

use crate::core::error::Result;
use crate::core::model::Node;
use crate::engine::dedup::deduplicate;
use crate::engine::orchestrator::Orchestrator;
use crate::extract::NodeDecoder;
use crate::interfaces::{OutputStage, ResultSink, SubscriptionSource};
use crate::network::fetch::Subscriber;

/// 单次运行统计
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PipelineReport {
    pub subscriptions: usize,
    pub decoded: usize,
    pub unique: usize,
    /// 跳过测速时为 `None`
    pub validated: Option<usize>,
}

pub struct Pipeline {
    subscriber: Subscriber,
    decoder: NodeDecoder,
    /// `None` 表示跳过测速
    orchestrator: Option<Orchestrator>,
    sink: Arc<dyn ResultSink>,
}

impl Pipeline {
    pub fn new(
        subscriber: Subscriber,
        orchestrator: Option<Orchestrator>,
        sink: Arc<dyn ResultSink>,
    ) -> Self {
        Self {
            subscriber,
            decoder: NodeDecoder::new(),
            orchestrator,
            sink,
        }
    }

    /// 执行完整流程
    pub async fn run(&self, source: &dyn SubscriptionSource) -> Result<PipelineReport> {
        let texts = self.subscriber.fetch_all(source).await;
        self.process(texts).await
    }

    /// 处理已拉取的订阅文本
    pub async fn process(&self, texts: Vec<String>) -> Result<PipelineReport> {
        let mut report = PipelineReport {
            subscriptions: texts.len(),
            ..Default::default()
        };

        let nodes: Vec<Node> = texts
            .iter()
            .flat_map(|text| self.decoder.decode(text))
            .collect();
        report.decoded = nodes.len();

        let nodes = deduplicate(nodes);
        report.unique = nodes.len();
        info!("解码 {} 个节点，去重后 {} 个", report.decoded, report.unique);

        self.sink.store(OutputStage::Raw, &nodes).await?;

        if let Some(orchestrator) = &self.orchestrator {
            let valid = orchestrator.validate_all(nodes).await?;
            report.validated = Some(valid.len());
            self.sink.store(OutputStage::Validated, &valid).await?;
        }

        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use async_trait::async_trait;
    use parking_lot::Mutex;

    use super::*;
    use crate::core::config::FetchConfig;

    #[derive(Default)]
    struct MemorySink {
        stored: Mutex<Vec<(OutputStage, Vec<Node>)>>,
    }

    #[async_trait]
    impl ResultSink for MemorySink {
        async fn store(&self, stage: OutputStage, nodes: &[Node]) -> Result<()> {
            self.stored.lock().push((stage, nodes.to_vec()));
            Ok(())
        }
    }

    #[tokio::test]
    async fn skip_probe_stores_deduplicated_raw_list() {
        let sink = Arc::new(MemorySink::default());
        let pipeline = Pipeline::new(
            Subscriber::new(&FetchConfig::default()).unwrap(),
            None,
            sink.clone(),
        );
        let texts = vec![
            "trojan://pw@1.2.3.4:443#a\nsocks5://5.6.7.8:1080#b".to_string(),
            "trojan://other@1.2.3.4:443#dup".to_string(),
        ];

        let report = pipeline.process(texts).await.unwrap();

        assert_eq!(report.decoded, 3);
        assert_eq!(report.unique, 2);
        assert_eq!(report.validated, None);
        let stored = sink.stored.lock();
        assert_eq!(stored.len(), 1);
        assert_eq!(stored[0].0, OutputStage::Raw);
        assert_eq!(stored[0].1[0].name, "a");
    }
}
