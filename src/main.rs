//! hive - 智能体运行引擎命令行
//!
//! 用法：`hive <prompt…>`。使用确定性的 echo 模型与内置工具跑一次运行，
//! 结果打印到标准输出，运行记录写入 [artifacts].root/<run_id>/。
//! 配置：config/default.toml，可用 HIVE_CONFIG 指定额外文件，HIVE__* 环境变量覆盖。

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{bail, Context};
use hive::agent::{create_engine_components, run_and_persist};
use hive::config::load_config;
use hive::llm::{EchoModel, ModelRegistry};
use tokio_util::sync::CancellationToken;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // 日志：默认 info，可通过 RUST_LOG 覆盖
    hive::observability::init();

    let prompt = std::env::args().skip(1).collect::<Vec<_>>().join(" ");
    if prompt.trim().is_empty() {
        bail!("usage: hive <prompt…>");
    }

    let config_path = std::env::var_os("HIVE_CONFIG").map(PathBuf::from);
    let config = load_config(config_path).context("Failed to load config")?;
    let components = create_engine_components(config, ModelRegistry::single(Arc::new(EchoModel)))
        .context("Failed to create engine")?;

    // Ctrl-C 触发取消；引擎在下一个挂起点结束为 CANCELLED
    let cancel = CancellationToken::new();
    let on_signal = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            on_signal.cancel();
        }
    });

    let request = components
        .engine
        .config()
        .request(prompt)
        .with_cancel_token(cancel);
    let persisted = run_and_persist(&components, &request)
        .await
        .context("Run failed")?;

    println!(
        "{}",
        serde_json::to_string_pretty(&persisted.report.result).context("Failed to render result")?
    );
    tracing::info!(dir = %persisted.dir.display(), hash = %persisted.bundle.config_hash, "artifacts written");
    Ok(())
}
