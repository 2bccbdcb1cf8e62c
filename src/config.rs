use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

use url::Url;

use crate::error::ScraperError;

pub const DEFAULT_BASE_URL: &str = "https://myaccount.enbridgegas.com/";
const EXPORT_PATH: &str = "api/GasUse/GasUsageHistoryExport";

/// エクスポートの期間フィルター（直近6ヶ月）
pub const HISTORY_FILTER: &str = "6";

const ENV_USERNAME: &str = "ENBRIDGE_USERNAME";
const ENV_PASSWORD: &str = "ENBRIDGE_PASSWORD";
const ENV_SAVE_SCREENSHOTS: &str = "ENBRIDGE_SAVE_SCREENSHOTS";
const ENV_HEADLESS: &str = "ENBRIDGE_HEADLESS";

#[derive(Clone)]
pub struct ScraperConfig {
    pub username: String,
    pub password: String,
    pub base_url: String,
    pub headless: bool,
    pub chrome_path: Option<PathBuf>,
    pub viewport: (u32, u32),
    pub save_screenshots: bool,
    pub screenshot_path: PathBuf,
    /// お知らせダイアログの待機上限
    pub notification_timeout: Duration,
    /// ログイン後の描画待ち
    pub settle_delay: Duration,
    /// フィルター適用後の描画待ち
    pub filter_delay: Duration,
}

impl Default for ScraperConfig {
    fn default() -> Self {
        Self {
            username: String::new(),
            password: String::new(),
            base_url: DEFAULT_BASE_URL.to_string(),
            headless: true,
            chrome_path: None,
            viewport: (1920, 1080),
            save_screenshots: false,
            screenshot_path: PathBuf::from("after-notification.png"),
            notification_timeout: Duration::from_secs(5),
            settle_delay: Duration::from_secs(5),
            filter_delay: Duration::from_secs(2),
        }
    }
}

// パスワードはログに出さない
impl fmt::Debug for ScraperConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ScraperConfig")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .field("base_url", &self.base_url)
            .field("headless", &self.headless)
            .field("chrome_path", &self.chrome_path)
            .field("viewport", &self.viewport)
            .field("save_screenshots", &self.save_screenshots)
            .field("screenshot_path", &self.screenshot_path)
            .field("notification_timeout", &self.notification_timeout)
            .field("settle_delay", &self.settle_delay)
            .field("filter_delay", &self.filter_delay)
            .finish()
    }
}

impl ScraperConfig {
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
            ..Default::default()
        }
    }

    /// 環境変数から設定を読み込む
    pub fn from_env() -> Result<Self, ScraperError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ScraperError> {
        let required = |key: &str| {
            lookup(key).ok_or_else(|| ScraperError::Config(format!("{} が設定されていません", key)))
        };

        let username = required(ENV_USERNAME)?;
        let password = required(ENV_PASSWORD)?;

        let chrome_path = lookup("CHROME_PATH")
            .or_else(|| lookup("CHROMIUM_PATH"))
            .map(PathBuf::from);

        Ok(Self::new(username, password)
            .with_save_screenshots(lookup(ENV_SAVE_SCREENSHOTS).as_deref() == Some("true"))
            .with_headless(lookup(ENV_HEADLESS).as_deref() != Some("false"))
            .with_chrome_path(chrome_path))
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    pub fn with_headless(mut self, headless: bool) -> Self {
        self.headless = headless;
        self
    }

    pub fn with_chrome_path(mut self, path: Option<PathBuf>) -> Self {
        self.chrome_path = path;
        self
    }

    pub fn with_viewport(mut self, width: u32, height: u32) -> Self {
        self.viewport = (width, height);
        self
    }

    pub fn with_save_screenshots(mut self, enabled: bool) -> Self {
        self.save_screenshots = enabled;
        self
    }

    pub fn with_screenshot_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.screenshot_path = path.into();
        self
    }

    pub fn with_notification_timeout(mut self, timeout: Duration) -> Self {
        self.notification_timeout = timeout;
        self
    }

    pub fn with_settle_delay(mut self, delay: Duration) -> Self {
        self.settle_delay = delay;
        self
    }

    pub fn with_filter_delay(mut self, delay: Duration) -> Self {
        self.filter_delay = delay;
        self
    }

    /// CSVエクスポートのURLを組み立てる
    pub fn export_url(&self, item_id: &str) -> Result<Url, ScraperError> {
        let base = Url::parse(&self.base_url)
            .map_err(|e| ScraperError::Config(format!("base_url が不正です: {}", e)))?;
        let mut url = base
            .join(EXPORT_PATH)
            .map_err(|e| ScraperError::Config(format!("エクスポートURLが不正です: {}", e)))?;

        url.query_pairs_mut()
            .append_pair("type", "CSV")
            .append_pair("filter", HISTORY_FILTER)
            .append_pair("itemId", item_id);

        Ok(url)
    }
}
