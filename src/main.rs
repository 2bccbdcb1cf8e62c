//! Enbridge Gas 使用量履歴を取得して JSON で標準出力に書き出す
//!
//! 環境変数:
//! - `ENBRIDGE_USERNAME` / `ENBRIDGE_PASSWORD`: ログイン情報（必須）
//! - `ENBRIDGE_SAVE_SCREENSHOTS`: `true` でログイン後のスクリーンショットを保存
//! - `ENBRIDGE_HEADLESS`: `false` でブラウザを表示
//! - `CHROME_PATH` / `CHROMIUM_PATH`: Chrome 実行ファイル
//! - `RUST_LOG`: ログレベル（デフォルト: info）

use std::io::{stdout, Write};
use std::process::ExitCode;

use anyhow::{Context, Result};
use tower::Service;
use tracing::{error, info};

use enbridge_gas_usage::{logfmt, ScrapeRequest, ScraperService};

#[tokio::main]
async fn main() -> ExitCode {
    // 標準出力は結果専用なので、ログは stderr へ
    logfmt::init();

    match run().await {
        Ok(()) => {
            info!("finished");
            ExitCode::SUCCESS
        }
        Err(e) => {
            error!(error = %format!("{:#}", e), "scrape failed");
            ExitCode::FAILURE
        }
    }
}

async fn run() -> Result<()> {
    let request = ScrapeRequest::from_env()?;

    let mut service = ScraperService::new();
    let result = service.call(request).await?;

    let json = serde_json::to_string(&result.records).context("failed to serialize records")?;

    let mut out = stdout().lock();
    writeln!(out, "{}", json).context("failed to write records to stdout")?;
    out.flush()?;

    Ok(())
}
