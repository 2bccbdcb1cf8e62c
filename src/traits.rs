use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;

use crate::config::ScraperConfig;
use crate::error::ScraperError;

/// 要素待機のオプション
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WaitOptions {
    /// `None` の場合は要素が現れるまで待ち続ける
    pub timeout: Option<Duration>,
    /// 表示状態（サイズあり・非表示でない）になるまで待つ
    pub visible: bool,
}

impl WaitOptions {
    pub fn bounded(timeout: Duration) -> Self {
        Self {
            timeout: Some(timeout),
            visible: false,
        }
    }

    pub fn visible() -> Self {
        Self {
            timeout: None,
            visible: true,
        }
    }
}

/// ブラウザページ操作の抽象
///
/// 手順ロジックは実ブラウザを使わずにテストできるよう、この trait 越しにページを操作する。
#[async_trait]
pub trait PageDriver: Send {
    /// URLへ遷移し、読み込み完了を待つ
    async fn navigate(&mut self, url: &str) -> Result<(), ScraperError>;

    /// 要素にフォーカス
    async fn focus(&mut self, selector: &str) -> Result<(), ScraperError>;

    /// フォーカス中の要素へキー入力
    async fn type_text(&mut self, selector: &str, text: &str) -> Result<(), ScraperError>;

    async fn click(&mut self, selector: &str) -> Result<(), ScraperError>;

    /// 要素がDOMに現れるまで待機（上限付きの場合は `ScraperError::Timeout`）
    async fn wait_for_selector(
        &mut self,
        selector: &str,
        options: WaitOptions,
    ) -> Result<(), ScraperError>;

    /// `<select>` の値を選択して change イベントを発火
    async fn select_option(&mut self, selector: &str, value: &str) -> Result<(), ScraperError>;

    /// ページ内でJavaScript式を評価
    async fn evaluate(&mut self, expression: &str) -> Result<serde_json::Value, ScraperError>;

    /// セッションのクッキー付きでGETし、本文をテキストで返す
    async fn fetch_text(&mut self, url: &str) -> Result<String, ScraperError>;

    /// ページ全体のスクリーンショットを保存
    async fn screenshot(&mut self, path: &Path) -> Result<(), ScraperError>;

    /// セッションを解放
    async fn close(&mut self) -> Result<(), ScraperError>;
}

/// ブラウザ起動の抽象
#[async_trait]
pub trait Launcher: Send + Sync {
    type Page: PageDriver;

    async fn launch(&self, config: &ScraperConfig) -> Result<Self::Page, ScraperError>;
}

#[async_trait]
pub trait Scraper: Send {
    /// ブラウザ初期化
    async fn initialize(&mut self) -> Result<(), ScraperError>;

    /// ログイン実行
    async fn login(&mut self) -> Result<(), ScraperError>;

    /// CSVエクスポートを取得
    async fn download(&mut self) -> Result<String, ScraperError>;

    /// リソース解放
    async fn close(&mut self) -> Result<(), ScraperError>;

    /// 一括実行（initialize → login → download → close）
    ///
    /// 途中で失敗しても close は必ず実行し、最初のエラーを返す。
    async fn execute(&mut self) -> Result<String, ScraperError> {
        let result = async {
            self.initialize().await?;
            self.login().await?;
            self.download().await
        }
        .await;

        let closed = self.close().await;
        let payload = result?;
        closed?;
        Ok(payload)
    }
}
