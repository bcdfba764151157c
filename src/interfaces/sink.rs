use async_trait::async_trait;
use strum::Display;

use crate::core::error::Result;
use crate::core::model::Node;

/// 结果所处的流水线阶段
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
#[strum(serialize_all = "lowercase")]
pub enum OutputStage {
    /// 去重后、测速前
    Raw,
    /// 通过测速
    Validated,
}

/// 结果落地 (Result Sink)
#[async_trait]
pub trait ResultSink: Send + Sync {
    /// 存储节点列表；空列表不产生任何输出
    async fn store(&self, stage: OutputStage, nodes: &[Node]) -> Result<()>;
}
