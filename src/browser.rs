//! chromiumoxide による `Launcher` / `PageDriver` 実装

use std::future::Future;
use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use chromiumoxide::browser::{Browser, BrowserConfig};
use chromiumoxide::error::CdpError;
use chromiumoxide::page::ScreenshotParams;
use chromiumoxide::Page;
use futures::StreamExt;
use tokio::task::JoinHandle;
use tokio::time::{sleep, timeout, Instant};
use tracing::{debug, warn};

use crate::config::ScraperConfig;
use crate::error::ScraperError;
use crate::traits::{Launcher, PageDriver, WaitOptions};

/// 要素待機のポーリング間隔
const SELECTOR_POLL_INTERVAL_MS: u64 = 100;

/// Chromium を起動して1ページを開く
#[derive(Debug, Clone, Copy, Default)]
pub struct ChromiumLauncher;

#[async_trait]
impl Launcher for ChromiumLauncher {
    type Page = ChromiumPage;

    async fn launch(&self, config: &ScraperConfig) -> Result<ChromiumPage, ScraperError> {
        let (width, height) = config.viewport;

        let mut builder = BrowserConfig::builder()
            .window_size(width, height)
            .no_sandbox()
            .arg("--disable-dev-shm-usage")
            .arg("--disable-gpu");

        if !config.headless {
            builder = builder.with_head();
        }

        if let Some(path) = &config.chrome_path {
            builder = builder.chrome_executable(path);
        }

        let browser_config = builder
            .build()
            .map_err(|e| ScraperError::BrowserInit(format!("ブラウザ設定エラー: {}", e)))?;

        let (browser, mut handler) = Browser::launch(browser_config)
            .await
            .map_err(|e| ScraperError::BrowserInit(e.to_string()))?;

        // ブラウザイベントハンドラをバックグラウンドで実行
        let handler_task = tokio::spawn(async move {
            while let Some(event) = handler.next().await {
                if let Err(e) = event {
                    debug!(error = %e, "browser handler event error");
                }
            }
        });

        let page = match browser.new_page("about:blank").await {
            Ok(page) => page,
            Err(e) => {
                handler_task.abort();
                return Err(ScraperError::BrowserInit(e.to_string()));
            }
        };

        Ok(ChromiumPage {
            browser: Some(browser),
            page,
            handler_task: Some(handler_task),
        })
    }
}

/// 起動済みブラウザとそのページ
pub struct ChromiumPage {
    browser: Option<Browser>,
    page: Page,
    handler_task: Option<JoinHandle<()>>,
}

impl ChromiumPage {
    async fn evaluate_raw(&self, expression: &str) -> Result<serde_json::Value, CdpError> {
        let result = self.page.evaluate(expression).await?;

        // undefined を返す式は値を持たない
        Ok(result.value().cloned().unwrap_or(serde_json::Value::Null))
    }

    async fn eval_js(&self, expression: &str) -> Result<serde_json::Value, ScraperError> {
        self.evaluate_raw(expression)
            .await
            .map_err(|e| ScraperError::JavaScript(e.to_string()))
    }

    async fn find_and<F, Fut>(&self, selector: &str, action: F) -> Result<(), ScraperError>
    where
        F: FnOnce(chromiumoxide::Element) -> Fut,
        Fut: Future<Output = Result<(), CdpError>>,
    {
        let element = self
            .page
            .find_element(selector)
            .await
            .map_err(|e| ScraperError::ElementNotFound(format!("{}: {}", selector, e)))?;

        action(element)
            .await
            .map_err(|e| ScraperError::Navigation(format!("{}: {}", selector, e)))
    }
}

/// ページ内で起きた一時的なエラーか
///
/// 画面遷移中の実行コンテキスト破棄などはページ側のエラーとして返るので、次のポーリングで再確認する。
/// 接続断やチャネルのエラーはブラウザ側の障害なので待機を打ち切る。
fn is_transient(err: &CdpError) -> bool {
    matches!(
        err,
        CdpError::Chrome(_)
            | CdpError::ChromeMessage(_)
            | CdpError::JavascriptException(_)
            | CdpError::FrameNotFound(_)
    )
}

fn wait_timeout(selector: &str, limit: Duration) -> ScraperError {
    ScraperError::Timeout(format!(
        "{} が{}ms以内に見つかりませんでした",
        selector,
        limit.as_millis()
    ))
}

/// `probe` が true を返すまでポーリングする
///
/// 上限がある場合は1回の評価もその残り時間で打ち切る。
async fn poll_until<F, Fut>(
    selector: &str,
    options: WaitOptions,
    mut probe: F,
) -> Result<(), ScraperError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<bool, CdpError>>,
{
    let start = Instant::now();

    loop {
        let outcome = match options.timeout {
            Some(limit) => {
                let remaining = limit.saturating_sub(start.elapsed());
                if remaining.is_zero() {
                    return Err(wait_timeout(selector, limit));
                }
                timeout(remaining, probe())
                    .await
                    .map_err(|_| wait_timeout(selector, limit))?
            }
            None => probe().await,
        };

        match outcome {
            Ok(true) => {
                debug!(selector, elapsed_ms = start.elapsed().as_millis() as u64, "selector found");
                return Ok(());
            }
            Ok(false) => {}
            Err(e) if is_transient(&e) => {
                debug!(selector, error = %e, "selector check failed");
            }
            Err(e) => {
                return Err(ScraperError::JavaScript(format!("{}: {}", selector, e)));
            }
        }

        sleep(Duration::from_millis(SELECTOR_POLL_INTERVAL_MS)).await;
    }
}

/// セレクタ文字列をJSのリテラルへ埋め込む
fn js_string(value: &str) -> String {
    serde_json::Value::String(value.to_string()).to_string()
}

fn selector_probe(selector: &str, visible: bool) -> String {
    if visible {
        format!(
            r#"
            (() => {{
                const el = document.querySelector({});
                if (!el) return false;
                const style = window.getComputedStyle(el);
                const rect = el.getBoundingClientRect();
                return style.visibility !== 'hidden' && style.display !== 'none' &&
                       (rect.width > 0 || rect.height > 0);
            }})()
            "#,
            js_string(selector)
        )
    } else {
        format!("document.querySelector({}) !== null", js_string(selector))
    }
}

#[async_trait]
impl PageDriver for ChromiumPage {
    async fn navigate(&mut self, url: &str) -> Result<(), ScraperError> {
        self.page
            .goto(url)
            .await
            .map_err(|e| ScraperError::Navigation(e.to_string()))?;

        self.page
            .wait_for_navigation()
            .await
            .map_err(|e| ScraperError::Navigation(e.to_string()))?;

        Ok(())
    }

    async fn focus(&mut self, selector: &str) -> Result<(), ScraperError> {
        self.find_and(selector, |el| async move {
            el.focus().await?;
            Ok(())
        })
        .await
    }

    async fn type_text(&mut self, selector: &str, text: &str) -> Result<(), ScraperError> {
        let text = text.to_string();
        self.find_and(selector, |el| async move {
            el.type_str(&text).await?;
            Ok(())
        })
        .await
    }

    async fn click(&mut self, selector: &str) -> Result<(), ScraperError> {
        self.find_and(selector, |el| async move {
            el.click().await?;
            Ok(())
        })
        .await
    }

    async fn wait_for_selector(
        &mut self,
        selector: &str,
        options: WaitOptions,
    ) -> Result<(), ScraperError> {
        let script = selector_probe(selector, options.visible);
        let script = script.as_str();
        let page: &ChromiumPage = &*self;

        poll_until(selector, options, move || async move {
            page.evaluate_raw(script)
                .await
                .map(|value| value.as_bool().unwrap_or(false))
        })
        .await
    }

    async fn select_option(&mut self, selector: &str, value: &str) -> Result<(), ScraperError> {
        let script = format!(
            r#"
            (() => {{
                const el = document.querySelector({});
                if (!el) return false;
                el.value = {};
                el.dispatchEvent(new Event('input', {{ bubbles: true }}));
                el.dispatchEvent(new Event('change', {{ bubbles: true }}));
                return true;
            }})()
            "#,
            js_string(selector),
            js_string(value)
        );

        let selected = self.eval_js(&script).await?.as_bool().unwrap_or(false);
        if !selected {
            return Err(ScraperError::ElementNotFound(selector.to_string()));
        }
        Ok(())
    }

    async fn evaluate(&mut self, expression: &str) -> Result<serde_json::Value, ScraperError> {
        self.eval_js(expression).await
    }

    async fn fetch_text(&mut self, url: &str) -> Result<String, ScraperError> {
        let script = format!(
            "fetch({}, {{ method: 'GET', credentials: 'include' }}).then(r => r.text())",
            js_string(url)
        );

        let result = self
            .page
            .evaluate(script.as_str())
            .await
            .map_err(|e| ScraperError::Fetch(e.to_string()))?;

        result
            .into_value::<String>()
            .map_err(|e| ScraperError::Fetch(format!("レスポンス本文を取得できません: {}", e)))
    }

    async fn screenshot(&mut self, path: &Path) -> Result<(), ScraperError> {
        let png = self
            .page
            .screenshot(ScreenshotParams::builder().full_page(true).build())
            .await
            .map_err(|e| ScraperError::Screenshot(e.to_string()))?;

        std::fs::write(path, png)?;
        Ok(())
    }

    async fn close(&mut self) -> Result<(), ScraperError> {
        let Some(mut browser) = self.browser.take() else {
            return Ok(());
        };

        let result = browser
            .close()
            .await
            .map(|_| ())
            .map_err(|e| ScraperError::BrowserInit(format!("ブラウザ終了エラー: {}", e)));

        if let Err(e) = browser.wait().await {
            warn!(error = %e, "browser process did not exit cleanly");
        }

        if let Some(task) = self.handler_task.take() {
            task.abort();
        }

        result
    }
}
