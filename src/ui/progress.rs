//! 终端进度渲染引擎 (Terminal UI Progress Engine)
//!
//! 基于 `indicatif` 实现非阻塞式进度条编排，由测速事件驱动。

use std::sync::{Arc, OnceLock};

use indicatif::{MultiProgress, ProgressBar, ProgressStyle};
use parking_lot::RwLock;
use tokio::task::JoinHandle;

use crate::core::event::{EventReceiver, ProbeEvent, ProbeOutcome};

/// 全局 TUI 容器 (Singleton)
static MULTI: OnceLock<MultiProgress> = OnceLock::new();

/// 获取全局进度容器实例
pub fn get_multi() -> &'static MultiProgress {
    MULTI.get_or_init(MultiProgress::new)
}

/// TUI 状态容器
#[derive(Default)]
struct UiState {
    probe_bar: Option<ProgressBar>,
    passed: usize,
}

static STATE: OnceLock<Arc<RwLock<UiState>>> = OnceLock::new();

fn get_state() -> &'static Arc<RwLock<UiState>> {
    STATE.get_or_init(|| Arc::new(RwLock::new(UiState::default())))
}

fn bar_style() -> ProgressStyle {
    ProgressStyle::default_bar()
        .template("{spinner:.cyan} [{bar:40.cyan/blue}] {pos}/{len} ({percent}%) {msg}")
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("█▉▊▋▌▍▎▏  ")
}

/// 进度协调器 (Progress Orchestrator)
pub struct Ui;

impl Ui {
    /// 激活事件监听循环；发送端全部释放后任务结束
    pub fn run(receiver: EventReceiver) -> JoinHandle<()> {
        tokio::spawn(async move {
            while let Some(event) = receiver.recv_async().await {
                Self::handle_event(event);
            }
        })
    }

    fn handle_event(event: ProbeEvent) {
        let state = get_state();
        let mut ui = state.write();

        match event {
            ProbeEvent::Started { total } => {
                let bar = get_multi().add(ProgressBar::new(total as u64));
                bar.set_style(bar_style());
                bar.set_message("测速中");
                ui.probe_bar = Some(bar);
                ui.passed = 0;
            }
            ProbeEvent::Finished {
                completed,
                node,
                outcome,
                ..
            } => {
                if matches!(outcome, ProbeOutcome::Passed(_)) {
                    ui.passed += 1;
                }
                if let Some(ref bar) = ui.probe_bar {
                    bar.set_position(completed as u64);
                    bar.set_message(format!(
                        "✓{} {} {}",
                        ui.passed,
                        outcome_label(&outcome),
                        truncate_string(&node, 24)
                    ));
                }
            }
            ProbeEvent::Completed { passed, total } => {
                if let Some(bar) = ui.probe_bar.take() {
                    bar.finish_with_message(format!("✅ {passed}/{total} 可用"));
                }
            }
        }
    }
}

fn outcome_label(outcome: &ProbeOutcome) -> String {
    match outcome {
        ProbeOutcome::Passed(ms) => format!("{ms}ms"),
        ProbeOutcome::Failed(reason) => (*reason).to_string(),
        ProbeOutcome::Skipped => "skipped".to_string(),
    }
}

/// 执行语义化字符串截断
fn truncate_string(s: &str, max_len: usize) -> String {
    if s.chars().count() <= max_len {
        s.to_string()
    } else {
        let truncated: String = s.chars().take(max_len.saturating_sub(3)).collect();
        format!("{}...", truncated)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn truncates_by_chars() {
        assert_eq!(truncate_string("香港节点01", 10), "香港节点01");
        assert_eq!(truncate_string("abcdefghij", 6), "abc...");
    }
}
