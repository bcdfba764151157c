//! 事件系统定义
//!
//! 用于 Engine 与 UI 之间的完全解耦通信

use flume::{Receiver, Sender};

/// 单个探测的结果摘要
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProbeOutcome {
    /// 通过，附带延迟毫秒数
    Passed(u64),
    /// 失败原因 (简短标签)
    Failed(&'static str),
    /// 因取消未执行
    Skipped,
}

/// 测速事件类型
#[derive(Debug, Clone)]
pub enum ProbeEvent {
    /// 批次开始
    Started { total: usize },

    /// 单个探测结束
    Finished {
        completed: usize,
        total: usize,
        node: String,
        outcome: ProbeOutcome,
    },

    /// 批次完成
    Completed { passed: usize, total: usize },
}

/// 事件发送器
#[derive(Clone)]
pub struct EventSender {
    tx: Sender<ProbeEvent>,
}

impl EventSender {
    pub fn new(tx: Sender<ProbeEvent>) -> Self {
        Self { tx }
    }

    /// 发送事件；接收端已关闭时静默丢弃
    pub fn emit(&self, event: ProbeEvent) {
        let _ = self.tx.send(event);
    }

    pub fn started(&self, total: usize) {
        self.emit(ProbeEvent::Started { total });
    }

    pub fn finished(&self, completed: usize, total: usize, node: &str, outcome: ProbeOutcome) {
        self.emit(ProbeEvent::Finished {
            completed,
            total,
            node: node.to_string(),
            outcome,
        });
    }

    pub fn completed(&self, passed: usize, total: usize) {
        self.emit(ProbeEvent::Completed { passed, total });
    }
}

/// 事件接收器
pub struct EventReceiver {
    rx: Receiver<ProbeEvent>,
}

impl EventReceiver {
    pub fn new(rx: Receiver<ProbeEvent>) -> Self {
        Self { rx }
    }

    /// 异步接收事件；所有发送端释放后返回 `None`
    pub async fn recv_async(&self) -> Option<ProbeEvent> {
        self.rx.recv_async().await.ok()
    }

    /// 取出当前已缓冲的全部事件
    pub fn drain(&self) -> Vec<ProbeEvent> {
        self.rx.drain().collect()
    }
}

/// 创建事件通道
pub fn create_event_channel() -> (EventSender, EventReceiver) {
    let (tx, rx) = flume::unbounded();
    (EventSender::new(tx), EventReceiver::new(rx))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn events_arrive_in_order() {
        let (tx, rx) = create_event_channel();
        tx.started(2);
        tx.finished(1, 2, "a", ProbeOutcome::Passed(120));
        tx.completed(1, 2);

        let events = rx.drain();
        assert!(matches!(events[0], ProbeEvent::Started { total: 2 }));
        assert!(matches!(
            &events[1],
            ProbeEvent::Finished { outcome: ProbeOutcome::Passed(120), .. }
        ));
        assert!(matches!(events[2], ProbeEvent::Completed { passed: 1, total: 2 }));
    }

    #[test]
    fn emit_after_receiver_drop_is_silent() {
        let (tx, rx) = create_event_channel();
        drop(rx);
        tx.completed(0, 0);
    }
}
