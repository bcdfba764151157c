//! 并发测速编排 (Concurrency Orchestrator)
//!
//! 两种执行模式共享同一个并发上限：
//! - `Gate`：每个节点一个任务，由信号量准入
//! - `Pool`：固定数量的 worker 从通道拉取节点
//!
//! 单个探测的错误或 panic 只影响该节点。

use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use futures::FutureExt;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::core::config::{ExecutionMode, default_probe_concurrency};
use crate::core::error::{ProbeError, Result, SieveError};
use crate::core::event::{EventSender, ProbeOutcome};
use crate::core::model::Node;
use crate::engine::probe::LatencyProbe;

/// `None` 表示节点因取消而未被准入
type Verdict = Option<std::result::Result<Node, ProbeError>>;

pub struct Orchestrator {
    probe: Arc<LatencyProbe>,
    concurrency: usize,
    mode: ExecutionMode,
    events: Option<EventSender>,
    cancel: CancellationToken,
}

impl Orchestrator {
    pub fn new(probe: LatencyProbe) -> Self {
        Self {
            probe: Arc::new(probe),
            concurrency: default_probe_concurrency(),
            mode: ExecutionMode::default(),
            events: None,
            cancel: CancellationToken::new(),
        }
    }

    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency.max(1);
        self
    }

    pub fn with_mode(mut self, mode: ExecutionMode) -> Self {
        self.mode = mode;
        self
    }

    pub fn with_events(mut self, events: EventSender) -> Self {
        self.events = Some(events);
        self
    }

    pub fn with_cancel(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn concurrency(&self) -> usize {
        self.concurrency
    }

    /// 验证全部节点，按完成顺序返回通过者
    ///
    /// 核心程序不可用时直接失败，不启动任何探测。
    pub async fn validate_all(&self, nodes: Vec<Node>) -> Result<Vec<Node>> {
        self.probe.launcher().install().await.map_err(SieveError::CoreUnavailable)?;

        let total = nodes.len();
        if let Some(events) = &self.events {
            events.started(total);
        }
        info!(
            "开始测速: {} 个节点, 模式 {}, 并发 {}",
            total, self.mode, self.concurrency
        );

        let mut tally = Tally::new(total, self.events.clone());
        match self.mode {
            ExecutionMode::Gate => self.run_gate(nodes, &mut tally).await,
            ExecutionMode::Pool => self.run_pool(nodes, &mut tally).await,
        }

        if let Some(events) = &self.events {
            events.completed(tally.accepted.len(), total);
        }
        info!("测速完成: {}/{} 个节点可用", tally.accepted.len(), total);
        Ok(tally.accepted)
    }

    async fn run_gate(&self, nodes: Vec<Node>, tally: &mut Tally) {
        let semaphore = Arc::new(Semaphore::new(self.concurrency));
        let mut join_set = JoinSet::new();

        for node in nodes {
            let semaphore = semaphore.clone();
            let cancel = self.cancel.clone();
            let probe = self.probe.clone();
            join_set.spawn(async move {
                let permit = tokio::select! {
                    biased;
                    _ = cancel.cancelled() => None,
                    permit = semaphore.acquire_owned() => permit.ok(),
                };
                let verdict = match permit {
                    Some(_permit) if !cancel.is_cancelled() => Some(guarded_probe(&probe, &node).await),
                    _ => None,
                };
                (node, verdict)
            });
        }

        while let Some(joined) = join_set.join_next().await {
            match joined {
                Ok((node, verdict)) => tally.record(&node, verdict),
                Err(e) => warn!("测速任务异常终止: {e}"),
            }
        }
    }

    async fn run_pool(&self, nodes: Vec<Node>, tally: &mut Tally) {
        let workers = self.concurrency.min(nodes.len());
        let (job_tx, job_rx) = flume::unbounded::<Node>();
        let (result_tx, result_rx) = flume::unbounded::<(Node, Verdict)>();

        for node in nodes {
            let _ = job_tx.send(node);
        }
        drop(job_tx);

        for id in 0..workers {
            let jobs = job_rx.clone();
            let results = result_tx.clone();
            let cancel = self.cancel.clone();
            let probe = self.probe.clone();
            tokio::spawn(async move {
                while let Ok(node) = jobs.recv_async().await {
                    let verdict = if cancel.is_cancelled() {
                        None
                    } else {
                        Some(guarded_probe(&probe, &node).await)
                    };
                    if results.send((node, verdict)).is_err() {
                        break;
                    }
                }
                debug!("工作线程 {id} 退出");
            });
        }
        drop(result_tx);

        while let Ok((node, verdict)) = result_rx.recv_async().await {
            tally.record(&node, verdict);
        }
    }
}

/// 运行探测并把 panic 转为 [`ProbeError::Panicked`]
async fn guarded_probe(probe: &LatencyProbe, node: &Node) -> std::result::Result<Node, ProbeError> {
    AssertUnwindSafe(probe.probe(node))
        .catch_unwind()
        .await
        .unwrap_or_else(|payload| Err(ProbeError::Panicked(panic_message(payload.as_ref()))))
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

/// 单一收集者：计数、记录日志并发出进度事件
struct Tally {
    total: usize,
    completed: usize,
    accepted: Vec<Node>,
    events: Option<EventSender>,
}

impl Tally {
    fn new(total: usize, events: Option<EventSender>) -> Self {
        Self {
            total,
            completed: 0,
            accepted: Vec::new(),
            events,
        }
    }

    fn record(&mut self, node: &Node, verdict: Verdict) {
        self.completed += 1;
        let outcome = match verdict {
            Some(Ok(passed)) => {
                debug!("✓ {}", passed.name);
                let outcome = ProbeOutcome::Passed(passed.latency_ms.unwrap_or_default());
                self.accepted.push(passed);
                outcome
            }
            Some(Err(e)) => {
                match e {
                    ProbeError::Unreachable
                    | ProbeError::TooSlow { .. }
                    | ProbeError::Rejected
                    | ProbeError::Unsupported(_) => debug!("✗ {node}: {e}"),
                    _ => warn!("✗ {node}: {e}"),
                }
                ProbeOutcome::Failed(e.reason())
            }
            None => ProbeOutcome::Skipped,
        };

        if let Some(events) = &self.events {
            events.finished(self.completed, self.total, &node.name, outcome);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn panic_payloads_are_readable() {
        let payload: Box<dyn Any + Send> = Box::new("boom");
        assert_eq!(panic_message(payload.as_ref()), "boom");
        let payload: Box<dyn Any + Send> = Box::new(String::from("kaboom"));
        assert_eq!(panic_message(payload.as_ref()), "kaboom");
        let payload: Box<dyn Any + Send> = Box::new(7_u8);
        assert_eq!(panic_message(payload.as_ref()), "unknown panic");
    }
}
