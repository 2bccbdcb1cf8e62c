//! Enbridge 使用量履歴の型定義

use std::fmt;

use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// 請求1件分のレコード（CSVエクスポート1行）
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BillingRecord {
    pub account_id: String,
    pub name: String,
    pub invoice_date: NaiveDate,
    pub invoice_number: String,
    pub billing_period_from: NaiveDate,
    pub billing_period_to: NaiveDate,
    /// 使用量（m³）
    pub consumption: f64,
    #[serde(with = "rust_decimal::serde::float")]
    pub gas_charge: Decimal,
    #[serde(with = "rust_decimal::serde::float")]
    pub gas_charge_hst: Decimal,
    #[serde(with = "rust_decimal::serde::float")]
    pub invoice_amount: Decimal,
}

/// エクスポートのダウンロードに必要なID
///
/// ページ内の隠しフィールドから取得する。セッションと選択中の期間にだけ有効。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExportId(String);

impl ExportId {
    /// 空文字列は無効
    pub fn new(value: impl Into<String>) -> Option<Self> {
        let value = value.into();
        if value.trim().is_empty() {
            None
        } else {
            Some(Self(value))
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ExportId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
