use std::future::Future;
use std::path::PathBuf;
use std::pin::Pin;
use std::task::{Context, Poll};

use tower::Service;
use tracing::info;

use crate::browser::ChromiumLauncher;
use crate::config::ScraperConfig;
use crate::enbridge::{decode_export, BillingRecord, EnbridgeScraper};
use crate::error::ScraperError;
use crate::traits::{Launcher, Scraper};

/// スクレイピングリクエスト
#[derive(Clone)]
pub struct ScrapeRequest {
    pub username: String,
    pub password: String,
    pub save_screenshots: bool,
    pub headless: bool,
    pub chrome_path: Option<PathBuf>,
}

impl std::fmt::Debug for ScrapeRequest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ScrapeRequest")
            .field("username", &self.username)
            .field("save_screenshots", &self.save_screenshots)
            .field("headless", &self.headless)
            .field("chrome_path", &self.chrome_path)
            .finish_non_exhaustive()
    }
}

impl ScrapeRequest {
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
            save_screenshots: false,
            headless: true,
            chrome_path: None,
        }
    }

    /// `ENBRIDGE_*` 環境変数からリクエストを作成
    pub fn from_env() -> Result<Self, ScraperError> {
        let config = ScraperConfig::from_env()?;
        Ok(Self {
            username: config.username,
            password: config.password,
            save_screenshots: config.save_screenshots,
            headless: config.headless,
            chrome_path: config.chrome_path,
        })
    }

    pub fn with_save_screenshots(mut self, enabled: bool) -> Self {
        self.save_screenshots = enabled;
        self
    }

    pub fn with_headless(mut self, headless: bool) -> Self {
        self.headless = headless;
        self
    }

    pub fn with_chrome_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.chrome_path = Some(path.into());
        self
    }
}

impl From<ScrapeRequest> for ScraperConfig {
    fn from(req: ScrapeRequest) -> Self {
        ScraperConfig::new(req.username, req.password)
            .with_save_screenshots(req.save_screenshots)
            .with_headless(req.headless)
            .with_chrome_path(req.chrome_path)
    }
}

/// スクレイピング結果
#[derive(Debug)]
pub struct ScrapeResult {
    pub records: Vec<BillingRecord>,
    /// 取得したCSVのサイズ
    pub csv_bytes: usize,
}

/// tower::Serviceを実装したスクレイパーサービス
#[derive(Debug, Clone, Default)]
pub struct ScraperService<L = ChromiumLauncher> {
    launcher: L,
}

impl ScraperService {
    pub fn new() -> Self {
        Self::default()
    }
}

impl<L> ScraperService<L> {
    pub fn with_launcher(launcher: L) -> Self {
        Self { launcher }
    }
}

impl<L> Service<ScrapeRequest> for ScraperService<L>
where
    L: Launcher + Clone + 'static,
    L::Page: 'static,
{
    type Response = ScrapeResult;
    type Error = ScraperError;
    type Future = Pin<Box<dyn Future<Output = Result<Self::Response, Self::Error>> + Send>>;

    fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        Poll::Ready(Ok(()))
    }

    fn call(&mut self, req: ScrapeRequest) -> Self::Future {
        info!(username = %req.username, "scrape request received");
        let launcher = self.launcher.clone();

        Box::pin(async move {
            let config: ScraperConfig = req.into();
            let mut scraper = EnbridgeScraper::new(config, launcher);

            // スクレイピング実行（失敗してもブラウザは閉じられる）
            let csv = scraper.execute().await?;

            info!(bytes = csv.len(), "parsing downloaded CSV");
            let records = decode_export(&csv)?;

            info!(records = records.len(), "parsed billing records");
            Ok(ScrapeResult {
                records,
                csv_bytes: csv.len(),
            })
        })
    }
}
