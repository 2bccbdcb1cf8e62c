use thiserror::Error;

#[derive(Error, Debug)]
pub enum ScraperError {
    #[error("設定エラー: {0}")]
    Config(String),

    #[error("ブラウザ初期化エラー: {0}")]
    BrowserInit(String),

    #[error("ナビゲーションエラー: {0}")]
    Navigation(String),

    #[error("ログインエラー: {0}")]
    Login(String),

    #[error("タイムアウト: {0}")]
    Timeout(String),

    #[error("要素が見つかりません: {0}")]
    ElementNotFound(String),

    #[error("JavaScript実行エラー: {0}")]
    JavaScript(String),

    #[error("エクスポートIDが取得できません: {0}")]
    MissingItemId(String),

    #[error("エクスポート取得エラー: {0}")]
    Fetch(String),

    #[error("スクリーンショット保存エラー: {0}")]
    Screenshot(String),

    #[error("ファイル操作エラー: {0}")]
    FileIO(#[from] std::io::Error),

    #[error("CSV解析エラー: {0}")]
    Decode(#[from] DecodeError),
}

impl ScraperError {
    /// 上限付き待機のタイムアウトかどうか
    pub fn is_timeout(&self) -> bool {
        matches!(self, ScraperError::Timeout(_))
    }
}

/// CSVエクスポートの解析エラー
///
/// 行番号はヘッダーを除いたデータ行の1始まり。
#[derive(Error, Debug)]
pub enum DecodeError {
    #[error("CSV読み取りエラー: {0}")]
    Csv(#[from] csv::Error),

    #[error("ヘッダー行がありません")]
    Empty,

    #[error("ヘッダーに列 '{column}' がありません")]
    MissingColumn { column: &'static str },

    #[error("{row}行目: 列 '{column}' のセルがありません")]
    MissingCell { row: usize, column: &'static str },

    #[error("{row}行目: {field} の値 '{value}' を変換できません ({reason})")]
    InvalidField {
        row: usize,
        field: &'static str,
        value: String,
        reason: String,
    },
}
