use anyhow::Result;
use exam_paper_builder::utils::logging;
use exam_paper_builder::{App, Config};
use tracing::warn;

#[tokio::main]
async fn main() -> Result<()> {
    // 初始化日志
    logging::init();

    // 加载配置
    let config = Config::from_env();
    config.validate()?;

    // 初始化应用
    let app = App::initialize(config).await?;

    // Ctrl+C 取消：不再开始新的出题，已完成的部分照常输出
    let cancel = app.cancel_token();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("⚠️ 收到 Ctrl+C，正在取消...");
            cancel.cancel();
        }
    });

    app.run().await?;

    Ok(())
}
