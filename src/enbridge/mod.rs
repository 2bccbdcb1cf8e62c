//! Enbridge Gas 使用量履歴スクレイパーモジュール
//!
//! 使用量タブから直近6ヶ月のCSVエクスポートを取得し、`BillingRecord` に変換する

mod decode;
mod scraper;
mod types;

pub use decode::decode_export;
pub use scraper::{EnbridgeScraper, FailurePolicy, Step};
pub use types::{BillingRecord, ExportId};
