//! Enbridge Gas 使用量履歴スクレイパーライブラリ
//!
//! - マイアカウントにログインし、直近6ヶ月の使用量履歴CSVを取得
//! - CSVを型付きの `BillingRecord` 列に変換
//!
//! # 使用例
//!
//! ```rust,ignore
//! use enbridge_gas_usage::{ScraperService, ScrapeRequest};
//! use tower::Service;
//!
//! #[tokio::main]
//! async fn main() {
//!     let mut service = ScraperService::new();
//!
//!     let request = ScrapeRequest::new("user@example.com", "password")
//!         .with_save_screenshots(true);
//!
//!     let result = service.call(request).await.unwrap();
//!     println!("{}", serde_json::to_string(&result.records).unwrap());
//! }
//! ```
//!
//! # CSVだけを変換する場合
//!
//! ```rust
//! let csv = "Account ID,Name,Invoice Date,Invoice Number,Billing Period From,Billing Period To,Consumption,Gas Charge,Gas Charge HST,Invoice Amount\n\
//!            1001',A Smith,01/15/2023,INV-9,12/15/2022,01/15/2023,150,$45.00,$5.85,$50.85";
//!
//! let records = enbridge_gas_usage::decode_export(csv).unwrap();
//! assert_eq!(records[0].account_id, "1001");
//! ```

pub mod browser;
pub mod config;
pub mod enbridge;
pub mod error;
pub mod logfmt;
pub mod service;
pub mod traits;

// 主要な型をリエクスポート
pub use browser::{ChromiumLauncher, ChromiumPage};
pub use config::ScraperConfig;
pub use enbridge::{decode_export, BillingRecord, EnbridgeScraper, ExportId, FailurePolicy, Step};
pub use error::{DecodeError, ScraperError};
pub use service::{ScrapeRequest, ScrapeResult, ScraperService};
pub use traits::{Launcher, PageDriver, Scraper, WaitOptions};
