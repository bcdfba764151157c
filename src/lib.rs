//! 代理订阅解析与节点测速
//!
//! 拉取订阅、解析多种订阅格式、按 `server:port` 去重，并通过临时代理核心实例验证节点延迟。

pub mod codec;
pub mod core;
pub mod engine;
pub mod extract;
pub mod interfaces;
pub mod network;
pub mod ui;
pub mod utils;
