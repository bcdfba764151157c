//! 应用程序入口 (Application Entrypoint)
//!
//! 负责 CLI 指令解析、遥测层初始化、依赖注入及系统生命周期管理。

use std::io::{self, Read};
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::{Parser, Subcommand};
use tokio_util::sync::CancellationToken;
use tracing_subscriber::fmt::MakeWriter;

use nodesieve::codec;
use nodesieve::core::config::{AppConfig, ExecutionMode};
use nodesieve::core::event::{EventSender, create_event_channel};
use nodesieve::engine::{LatencyProbe, Orchestrator, Pipeline, ProbeSettings};
use nodesieve::extract::NodeDecoder;
use nodesieve::interfaces::CoreLauncher;
use nodesieve::network::Subscriber;
use nodesieve::ui::{Ui, get_multi};
use nodesieve::utils::sink::FileSink;
use nodesieve::utils::xray::XrayLauncher;

/// 进度条感知的日志写入器 (TUI-aware Log Writer)
///
/// 确保非同步日志输出不会破坏终端进度条的渲染布局。
struct IndicatifWriter;

impl io::Write for IndicatifWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let s = String::from_utf8_lossy(buf);
        let _ = get_multi().println(s.trim_end());
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl<'a> MakeWriter<'a> for IndicatifWriter {
    type Writer = IndicatifWriter;

    fn make_writer(&self) -> Self::Writer {
        IndicatifWriter
    }
}

/// 命令行界面脚手架 (CLI Scaffolding)
#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// 配置文件路径
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// 拉取全部订阅、去重、测速并写出结果
    Run {
        /// 最大并发探测数
        #[arg(long)]
        concurrency: Option<usize>,
        /// 执行模式 (gate / pool)
        #[arg(long)]
        mode: Option<ExecutionMode>,
        /// 只解析与去重，不测速
        #[arg(long)]
        skip_probe: bool,
    },
    /// 解析订阅文件 (`-` 为标准输入) 并逐行输出节点 URI
    Decode { input: String },
    /// 对给定 URI 测速
    Probe {
        #[arg(required = true)]
        uris: Vec<String>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // 遥测层初始化 (Telemetry Layer Initialization)
    if std::env::var("RUST_LOG").is_err() {
        unsafe {
            std::env::set_var("RUST_LOG", "info");
        }
    }

    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(IndicatifWriter)
        .with_target(false)
        .with_ansi(true)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Decode { input } => decode(&input).await?,
        Commands::Run {
            concurrency,
            mode,
            skip_probe,
        } => {
            let mut config = AppConfig::load_from(cli.config.as_deref())?;
            if concurrency.is_some() {
                config.tester.concurrency = concurrency;
            }
            if let Some(mode) = mode {
                config.tester.mode = mode;
            }
            run(Arc::new(config), skip_probe).await?;
        }
        Commands::Probe { uris } => {
            let config = AppConfig::load_from(cli.config.as_deref())?;
            probe(&config, &uris).await?;
        }
    }

    Ok(())
}

async fn decode(input: &str) -> anyhow::Result<()> {
    let content = if input == "-" {
        let mut buf = String::new();
        io::stdin().read_to_string(&mut buf)?;
        buf
    } else {
        tokio::fs::read_to_string(input)
            .await
            .with_context(|| format!("无法读取 {input}"))?
    };

    for node in NodeDecoder::new().decode(&content) {
        match codec::encode(&node) {
            Ok(uri) => println!("{uri}"),
            Err(e) => tracing::debug!("跳过 {node}: {e}"),
        }
    }
    Ok(())
}

/// 组装测速编排器并挂接取消信号
fn build_orchestrator(config: &AppConfig, events: EventSender) -> Orchestrator {
    let launcher: Arc<dyn CoreLauncher> = Arc::new(XrayLauncher::from_config(&config.core));
    let probe = LatencyProbe::new(launcher, ProbeSettings::from_config(&config.tester, &config.core));

    // 信号处理与优雅退出 (Signal Handling)
    let cancel = CancellationToken::new();
    let token = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("收到中断信号，等待进行中的探测结束...");
            token.cancel();
        }
    });

    Orchestrator::new(probe)
        .with_concurrency(config.tester.effective_concurrency())
        .with_mode(config.tester.mode)
        .with_events(events)
        .with_cancel(cancel)
}

async fn run(config: Arc<AppConfig>, skip_probe: bool) -> anyhow::Result<()> {
    // 建立 UI 事件反馈链路 (Event feedback loop)
    let (event_sender, event_receiver) = create_event_channel();
    let ui_handle = Ui::run(event_receiver);

    // 任务域限制：pipeline 释放后事件通道关闭，UI 任务随之结束
    {
        let orchestrator = (!skip_probe).then(|| build_orchestrator(&config, event_sender.clone()));
        drop(event_sender);

        let pipeline = Pipeline::new(
            Subscriber::new(&config.fetch)?,
            orchestrator,
            Arc::new(FileSink::new(&config.output)),
        );
        let report = pipeline.run(config.as_ref()).await?;
        tracing::info!(
            "订阅 {} 个, 节点 {} 个, 去重后 {} 个, 可用 {}",
            report.subscriptions,
            report.decoded,
            report.unique,
            report
                .validated
                .map_or_else(|| "未测速".to_string(), |n| n.to_string())
        );
    }

    let _ = ui_handle.await;
    Ok(())
}

async fn probe(config: &AppConfig, uris: &[String]) -> anyhow::Result<()> {
    let nodes: Vec<_> = uris
        .iter()
        .filter_map(|uri| match codec::decode(uri) {
            Ok(node) => Some(node),
            Err(e) => {
                tracing::warn!("无法解析 {uri}: {e}");
                None
            }
        })
        .collect();

    let (event_sender, event_receiver) = create_event_channel();
    let ui_handle = Ui::run(event_receiver);
    let valid = {
        let orchestrator = build_orchestrator(config, event_sender);
        orchestrator.validate_all(nodes).await?
    };
    let _ = ui_handle.await;

    for node in valid {
        println!("{}\t{}", node.name, codec::encode(&node)?);
    }
    Ok(())
}
