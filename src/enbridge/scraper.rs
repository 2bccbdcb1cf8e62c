//! Enbridge スクレイパー実装
//!
//! ログイン → お知らせを閉じる → 使用量タブ → 6ヶ月フィルター → エクスポートID取得 → CSV取得
//! を1ステップずつ実行する。失敗時の扱いはステップごとに `FailurePolicy` で決まり、
//! 許容されるのはお知らせ待機のタイムアウトだけ。

use async_trait::async_trait;
use tokio::time::sleep;
use tracing::{debug, info, warn};

use crate::config::{ScraperConfig, HISTORY_FILTER};
use crate::error::ScraperError;
use crate::traits::{Launcher, PageDriver, Scraper, WaitOptions};

use super::types::ExportId;

const USERNAME_INPUT: &str = "#signin-username";
const PASSWORD_INPUT: &str = "#signin-password";
const SIGNIN_BUTTON: &str = "#signin-box button";
const CANCEL_NOTIFICATION: &str = "#cancelNotification";
const GAS_USE_TAB: &str = r#"#myTab a[href="/en/My-Account/My-Gas-Use"]"#;
const HISTORY_FILTER_SELECT: &str = "#gas-history-filter";
const FILTER_APPLY_BUTTON: &str = "#lba-filter-btn";
const ITEM_ID_SCRIPT: &str = r#"
    (() => {
        const el = document.getElementById('GasUsageHistoryItemId');
        return el ? el.value : null;
    })()
"#;

/// ステップ失敗時の扱い
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailurePolicy {
    /// 残りを中断してエラーを返す
    Fatal,
    /// 上限付き待機のタイムアウトだけは無視して続行する
    TolerateTimeout,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    Launch,
    Authenticate,
    DismissNotification,
    Settle,
    Screenshot,
    NavigateToUsage,
    ApplyFilter,
    ResolveItemId,
    FetchExport,
    Teardown,
}

impl Step {
    /// ログイン後、エクスポート取得までのステップ
    pub const DOWNLOAD: [Step; 7] = [
        Step::DismissNotification,
        Step::Settle,
        Step::Screenshot,
        Step::NavigateToUsage,
        Step::ApplyFilter,
        Step::ResolveItemId,
        Step::FetchExport,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Step::Launch => "launch",
            Step::Authenticate => "authenticate",
            Step::DismissNotification => "dismiss_notification",
            Step::Settle => "settle",
            Step::Screenshot => "screenshot",
            Step::NavigateToUsage => "navigate_to_usage",
            Step::ApplyFilter => "apply_filter",
            Step::ResolveItemId => "resolve_item_id",
            Step::FetchExport => "fetch_export",
            Step::Teardown => "teardown",
        }
    }

    pub fn policy(self) -> FailurePolicy {
        match self {
            Step::DismissNotification => FailurePolicy::TolerateTimeout,
            _ => FailurePolicy::Fatal,
        }
    }

    /// ステップの結果にポリシーを適用する。許容された失敗は `Ok(None)`
    pub fn guard<T>(self, result: Result<T, ScraperError>) -> Result<Option<T>, ScraperError> {
        match (result, self.policy()) {
            (Ok(value), _) => Ok(Some(value)),
            (Err(e), FailurePolicy::TolerateTimeout) if e.is_timeout() => {
                debug!(step = self.name(), error = %e, "tolerated timeout");
                Ok(None)
            }
            (Err(e), _) => Err(e),
        }
    }
}

/// Enbridge 使用量履歴スクレイパー
pub struct EnbridgeScraper<L: Launcher> {
    config: ScraperConfig,
    launcher: L,
    page: Option<L::Page>,
    item_id: Option<ExportId>,
    payload: Option<String>,
}

impl<L: Launcher> EnbridgeScraper<L> {
    pub fn new(config: ScraperConfig, launcher: L) -> Self {
        Self {
            config,
            launcher,
            page: None,
            item_id: None,
            payload: None,
        }
    }

    /// 取得済みのエクスポートID
    pub fn item_id(&self) -> Option<&ExportId> {
        self.item_id.as_ref()
    }

    async fn run_step(&mut self, step: Step) -> Result<(), ScraperError> {
        match step {
            Step::Launch => {
                info!("launching browser");
                if self.page.is_none() {
                    self.page = Some(self.launcher.launch(&self.config).await?);
                }
                Ok(())
            }
            Step::Teardown => {
                let Some(mut page) = self.page.take() else {
                    return Ok(());
                };
                info!("closing browser");
                page.close().await
            }
            _ => {
                let page = self
                    .page
                    .as_mut()
                    .ok_or_else(|| ScraperError::BrowserInit("ブラウザが初期化されていません".into()))?;
                let config = &self.config;

                match step {
                    Step::Authenticate => authenticate(page, config).await,
                    Step::DismissNotification => dismiss_notification(page, config).await,
                    Step::Settle => {
                        info!(time_s = config.settle_delay.as_secs_f64(), "waiting for page load");
                        sleep(config.settle_delay).await;
                        Ok(())
                    }
                    Step::Screenshot => save_screenshot(page, config).await,
                    Step::NavigateToUsage => navigate_to_usage(page).await,
                    Step::ApplyFilter => apply_filter(page, config).await,
                    Step::ResolveItemId => {
                        self.item_id = Some(resolve_item_id(page).await?);
                        Ok(())
                    }
                    Step::FetchExport => {
                        let item_id = self.item_id.as_ref().ok_or_else(|| {
                            ScraperError::MissingItemId("エクスポートIDが未取得です".into())
                        })?;
                        self.payload = Some(fetch_export(page, config, item_id).await?);
                        Ok(())
                    }
                    Step::Launch | Step::Teardown => unreachable!("handled above"),
                }
            }
        }
    }
}

async fn authenticate<P: PageDriver>(
    page: &mut P,
    config: &ScraperConfig,
) -> Result<(), ScraperError> {
    info!("navigating to enbridge");
    page.navigate(&config.base_url).await?;

    info!(username = %config.username, "logging in");
    fill_signin_form(page, config)
        .await
        .map_err(|e| ScraperError::Login(e.to_string()))
}

async fn fill_signin_form<P: PageDriver>(
    page: &mut P,
    config: &ScraperConfig,
) -> Result<(), ScraperError> {
    page.focus(USERNAME_INPUT).await?;
    page.type_text(USERNAME_INPUT, &config.username).await?;

    page.focus(PASSWORD_INPUT).await?;
    page.type_text(PASSWORD_INPUT, &config.password).await?;

    page.click(SIGNIN_BUTTON).await
}

async fn dismiss_notification<P: PageDriver>(
    page: &mut P,
    config: &ScraperConfig,
) -> Result<(), ScraperError> {
    info!("dismissing notification");

    let waited = page
        .wait_for_selector(CANCEL_NOTIFICATION, WaitOptions::bounded(config.notification_timeout))
        .await;

    match Step::DismissNotification.guard(waited)? {
        Some(()) => page.click(CANCEL_NOTIFICATION).await,
        None => {
            warn!("no notification found; trying to continue");
            Ok(())
        }
    }
}

async fn save_screenshot<P: PageDriver>(
    page: &mut P,
    config: &ScraperConfig,
) -> Result<(), ScraperError> {
    if !config.save_screenshots {
        return Ok(());
    }

    page.screenshot(&config.screenshot_path).await?;
    info!(path = %config.screenshot_path.display(), "saved main page screenshot");
    Ok(())
}

async fn navigate_to_usage<P: PageDriver>(page: &mut P) -> Result<(), ScraperError> {
    info!("navigating to the gas use tab");
    page.wait_for_selector(GAS_USE_TAB, WaitOptions::visible()).await?;
    page.click(GAS_USE_TAB).await
}

async fn apply_filter<P: PageDriver>(
    page: &mut P,
    config: &ScraperConfig,
) -> Result<(), ScraperError> {
    info!("selecting 6 months of history");
    page.wait_for_selector(HISTORY_FILTER_SELECT, WaitOptions::default()).await?;
    page.select_option(HISTORY_FILTER_SELECT, HISTORY_FILTER).await?;
    page.click(FILTER_APPLY_BUTTON).await?;

    // TODO: 一覧の再描画を示す要素が分かれば固定待機をその要素の待機に置き換える
    info!(time_s = config.filter_delay.as_secs_f64(), "waiting for filter");
    sleep(config.filter_delay).await;
    Ok(())
}

async fn resolve_item_id<P: PageDriver>(page: &mut P) -> Result<ExportId, ScraperError> {
    info!("getting item ID");

    let value = page.evaluate(ITEM_ID_SCRIPT).await?;
    let item_id = match value {
        serde_json::Value::String(s) => ExportId::new(s)
            .ok_or_else(|| ScraperError::MissingItemId("GasUsageHistoryItemId が空です".into()))?,
        serde_json::Value::Null => {
            return Err(ScraperError::MissingItemId(
                "GasUsageHistoryItemId が見つかりません".into(),
            ))
        }
        other => {
            return Err(ScraperError::MissingItemId(format!(
                "GasUsageHistoryItemId の値が文字列ではありません: {}",
                other
            )))
        }
    };

    debug!(item_id = %item_id, "got item ID");
    Ok(item_id)
}

async fn fetch_export<P: PageDriver>(
    page: &mut P,
    config: &ScraperConfig,
    item_id: &ExportId,
) -> Result<String, ScraperError> {
    info!("downloading history CSV");
    let url = config.export_url(item_id.as_str())?;
    let payload = page.fetch_text(url.as_str()).await?;
    debug!(bytes = payload.len(), "downloaded history CSV");
    Ok(payload)
}

#[async_trait]
impl<L: Launcher> Scraper for EnbridgeScraper<L> {
    async fn initialize(&mut self) -> Result<(), ScraperError> {
        self.run_step(Step::Launch).await
    }

    async fn login(&mut self) -> Result<(), ScraperError> {
        self.run_step(Step::Authenticate).await
    }

    async fn download(&mut self) -> Result<String, ScraperError> {
        self.item_id = None;
        self.payload = None;

        for step in Step::DOWNLOAD {
            self.run_step(step).await?;
        }

        self.payload
            .take()
            .ok_or_else(|| ScraperError::Fetch("エクスポートが取得されていません".into()))
    }

    async fn close(&mut self) -> Result<(), ScraperError> {
        self.run_step(Step::Teardown).await
    }
}
