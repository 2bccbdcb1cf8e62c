//! CSVエクスポート → `BillingRecord` 変換
//!
//! 列はヘッダー名で引くため、列順が変わっても結果は同じ。
//! 必須列の欠落やセルの変換失敗はエクスポート全体のエラーとし、部分的な結果は返さない。

use std::collections::HashMap;
use std::str::FromStr;

use chrono::NaiveDate;
use csv::{ReaderBuilder, StringRecord, Trim};
use rust_decimal::Decimal;

use super::types::BillingRecord;
use crate::error::DecodeError;

#[derive(Debug, Clone, Copy)]
struct Field {
    index: usize,
    name: &'static str,
    column: &'static str,
}

const fn field(index: usize, name: &'static str, column: &'static str) -> Field {
    Field { index, name, column }
}

const ACCOUNT_ID: Field = field(0, "account_id", "Account ID");
const NAME: Field = field(1, "name", "Name");
const INVOICE_DATE: Field = field(2, "invoice_date", "Invoice Date");
const INVOICE_NUMBER: Field = field(3, "invoice_number", "Invoice Number");
const PERIOD_FROM: Field = field(4, "billing_period_from", "Billing Period From");
const PERIOD_TO: Field = field(5, "billing_period_to", "Billing Period To");
const CONSUMPTION: Field = field(6, "consumption", "Consumption");
const GAS_CHARGE: Field = field(7, "gas_charge", "Gas Charge");
const GAS_CHARGE_HST: Field = field(8, "gas_charge_hst", "Gas Charge HST");
const INVOICE_AMOUNT: Field = field(9, "invoice_amount", "Invoice Amount");

const FIELDS: [Field; 10] = [
    ACCOUNT_ID,
    NAME,
    INVOICE_DATE,
    INVOICE_NUMBER,
    PERIOD_FROM,
    PERIOD_TO,
    CONSUMPTION,
    GAS_CHARGE,
    GAS_CHARGE_HST,
    INVOICE_AMOUNT,
];

/// フィールドごとのCSV列位置
struct ColumnMap([usize; FIELDS.len()]);

impl ColumnMap {
    fn resolve(headers: &StringRecord) -> Result<Self, DecodeError> {
        // 同名の列が複数ある場合は後ろの列を使う
        let offsets: HashMap<&str, usize> = headers
            .iter()
            .enumerate()
            .map(|(i, header)| (header, i))
            .collect();

        let mut positions = [0; FIELDS.len()];
        for field in FIELDS {
            positions[field.index] = *offsets
                .get(field.column)
                .ok_or(DecodeError::MissingColumn { column: field.column })?;
        }

        Ok(Self(positions))
    }
}

/// データ行1行の読み取り
struct Row<'r> {
    number: usize,
    record: &'r StringRecord,
    columns: &'r ColumnMap,
}

impl<'r> Row<'r> {
    fn cell(&self, field: Field) -> Result<&'r str, DecodeError> {
        self.record
            .get(self.columns.0[field.index])
            .ok_or(DecodeError::MissingCell {
                row: self.number,
                column: field.column,
            })
    }

    fn coerce<T>(
        &self,
        field: Field,
        convert: impl FnOnce(&str) -> Result<T, String>,
    ) -> Result<T, DecodeError> {
        let value = self.cell(field)?;
        convert(value).map_err(|reason| DecodeError::InvalidField {
            row: self.number,
            field: field.name,
            value: value.to_string(),
            reason,
        })
    }

    fn text(&self, field: Field) -> Result<String, DecodeError> {
        self.cell(field).map(str::to_string)
    }

    fn into_record(self) -> Result<BillingRecord, DecodeError> {
        Ok(BillingRecord {
            account_id: self.coerce(ACCOUNT_ID, |s| Ok(strip_account_suffix(s).to_string()))?,
            name: self.text(NAME)?,
            invoice_date: self.coerce(INVOICE_DATE, parse_date)?,
            invoice_number: self.text(INVOICE_NUMBER)?,
            billing_period_from: self.coerce(PERIOD_FROM, parse_date)?,
            billing_period_to: self.coerce(PERIOD_TO, parse_date)?,
            consumption: self.coerce(CONSUMPTION, parse_number)?,
            gas_charge: self.coerce(GAS_CHARGE, parse_currency)?,
            gas_charge_hst: self.coerce(GAS_CHARGE_HST, parse_currency)?,
            invoice_amount: self.coerce(INVOICE_AMOUNT, parse_currency)?,
        })
    }
}

/// アカウントIDの末尾に付く `'` を1つ取り除く
fn strip_account_suffix(value: &str) -> &str {
    value.strip_suffix('\'').unwrap_or(value)
}

/// `MM/DD/YYYY` 形式の日付
fn parse_date(value: &str) -> Result<NaiveDate, String> {
    let parts: Vec<&str> = value.split('/').collect();
    let [month, day, year] = parts.as_slice() else {
        return Err("MM/DD/YYYY 形式ではありません".to_string());
    };

    let month: u32 = month.trim().parse().map_err(|e| format!("月: {}", e))?;
    let day: u32 = day.trim().parse().map_err(|e| format!("日: {}", e))?;
    let year: i32 = year.trim().parse().map_err(|e| format!("年: {}", e))?;

    NaiveDate::from_ymd_opt(year, month, day).ok_or_else(|| "存在しない日付です".to_string())
}

fn parse_number(value: &str) -> Result<f64, String> {
    let number: f64 = value.parse().map_err(|e| format!("{}", e))?;
    if !number.is_finite() {
        return Err("有限の数値ではありません".to_string());
    }
    Ok(number)
}

/// 先頭の `$` を1つだけ取り除いて10進数として読む（`$` の後の空白は無視）
fn parse_currency(value: &str) -> Result<Decimal, String> {
    let digits = value.strip_prefix('$').unwrap_or(value).trim();
    Decimal::from_str(digits).map_err(|e| e.to_string())
}

/// エクスポートCSVを行順のまま `BillingRecord` 列に変換
pub fn decode_export(text: &str) -> Result<Vec<BillingRecord>, DecodeError> {
    let mut reader = ReaderBuilder::new()
        .has_headers(true)
        .trim(Trim::All)
        .flexible(true)
        .from_reader(text.trim().as_bytes());

    let headers = reader.headers()?.clone();
    if headers.is_empty() {
        return Err(DecodeError::Empty);
    }

    let columns = ColumnMap::resolve(&headers)?;

    reader
        .records()
        .enumerate()
        .map(|(i, record)| {
            let record = record?;
            Row {
                number: i + 1,
                record: &record,
                columns: &columns,
            }
            .into_record()
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    const HEADER: &str = "Account ID,Name,Invoice Date,Invoice Number,Billing Period From,Billing Period To,Consumption,Gas Charge,Gas Charge HST,Invoice Amount";

    fn dec(s: &str) -> Decimal {
        Decimal::from_str(s).unwrap()
    }

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn test_decode_single_row() {
        let csv = format!(
            "{}\n1001',A Smith,01/15/2023,INV-9,12/15/2022,01/15/2023,150,$45.00,$5.85,$50.85\n",
            HEADER
        );

        let records = decode_export(&csv).unwrap();
        assert_eq!(
            records,
            vec![BillingRecord {
                account_id: "1001".into(),
                name: "A Smith".into(),
                invoice_date: date(2023, 1, 15),
                invoice_number: "INV-9".into(),
                billing_period_from: date(2022, 12, 15),
                billing_period_to: date(2023, 1, 15),
                consumption: 150.0,
                gas_charge: dec("45.00"),
                gas_charge_hst: dec("5.85"),
                invoice_amount: dec("50.85"),
            }]
        );
    }

    #[test]
    fn test_row_order_preserved() {
        let csv = format!(
            "{}\n\
             1',First,01/01/2023,INV-1,12/01/2022,01/01/2023,10,$1.00,$0.13,$1.13\n\
             2',Second,02/01/2023,INV-2,01/01/2023,02/01/2023,20,$2.00,$0.26,$2.26\n\
             3',Third,03/01/2023,INV-3,02/01/2023,03/01/2023,30,$3.00,$0.39,$3.39",
            HEADER
        );

        let records = decode_export(&csv).unwrap();
        let numbers: Vec<&str> = records.iter().map(|r| r.invoice_number.as_str()).collect();
        assert_eq!(numbers, vec!["INV-1", "INV-2", "INV-3"]);
        assert_eq!(records[2].consumption, 30.0);
    }

    #[test]
    fn test_column_order_does_not_matter() {
        let original = format!(
            "{}\n1001',A Smith,01/15/2023,INV-9,12/15/2022,01/15/2023,150,$45.00,$5.85,$50.85",
            HEADER
        );
        let reordered = "Invoice Amount,Consumption,Name,Billing Period To,Account ID,Gas Charge HST,Invoice Number,Billing Period From,Gas Charge,Invoice Date\n\
                         $50.85,150,A Smith,01/15/2023,1001',$5.85,INV-9,12/15/2022,$45.00,01/15/2023";

        assert_eq!(decode_export(&original).unwrap(), decode_export(reordered).unwrap());
    }

    #[test]
    fn test_extra_columns_and_whitespace() {
        let csv = "  Extra , Account ID,Name,Invoice Date,Invoice Number,Billing Period From,Billing Period To,Consumption,Gas Charge,Gas Charge HST,Invoice Amount\r\n\
                   x, 77' , B Jones ,07/04/2021,INV-10,06/04/2021,07/04/2021, 42 ,$123.45,$16.05,$139.50\r\n\n";

        let records = decode_export(csv).unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].account_id, "77");
        assert_eq!(records[0].name, "B Jones");
        assert_eq!(records[0].invoice_date, date(2021, 7, 4));
        assert_eq!(records[0].consumption, 42.0);
        assert_eq!(records[0].gas_charge, dec("123.45"));
    }

    #[test]
    fn test_header_only_yields_no_records() {
        assert!(decode_export(HEADER).unwrap().is_empty());
    }

    #[test]
    fn test_empty_payload() {
        assert!(matches!(decode_export(""), Err(DecodeError::Empty)));
        assert!(matches!(decode_export("  \n "), Err(DecodeError::Empty)));
    }

    #[test]
    fn test_missing_column_fails_before_rows() {
        let csv = "Account ID,Name,Invoice Date,Invoice Number,Billing Period From,Billing Period To,Consumption,Gas Charge,Invoice Amount\n\
                   1',A,01/01/2023,INV,12/01/2022,01/01/2023,1,$1,$1";

        let err = decode_export(csv).unwrap_err();
        assert!(matches!(err, DecodeError::MissingColumn { column: "Gas Charge HST" }));
    }

    #[test]
    fn test_header_lookup_is_case_sensitive() {
        let csv = HEADER.replace("Consumption", "consumption");
        let err = decode_export(&csv).unwrap_err();
        assert!(matches!(err, DecodeError::MissingColumn { column: "Consumption" }));
    }

    #[test]
    fn test_short_row() {
        let csv = format!("{}\n1001',A Smith,01/15/2023", HEADER);
        let err = decode_export(&csv).unwrap_err();
        assert!(matches!(
            err,
            DecodeError::MissingCell { row: 1, column: "Invoice Number" }
        ));
    }

    #[test]
    fn test_invalid_consumption_fails_whole_export() {
        let csv = format!(
            "{}\n\
             1',A,01/01/2023,INV-1,12/01/2022,01/01/2023,10,$1.00,$0.13,$1.13\n\
             2',B,02/01/2023,INV-2,01/01/2023,02/01/2023,n/a,$2.00,$0.26,$2.26",
            HEADER
        );

        match decode_export(&csv).unwrap_err() {
            DecodeError::InvalidField { row, field, value, .. } => {
                assert_eq!(row, 2);
                assert_eq!(field, "consumption");
                assert_eq!(value, "n/a");
            }
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[test]
    fn test_quoted_field_with_comma() {
        let csv = format!(
            "{}\n1001',\"Smith, A\",01/15/2023,INV-9,12/15/2022,01/15/2023,150,$45.00,$5.85,$50.85",
            HEADER
        );
        let records = decode_export(&csv).unwrap();
        assert_eq!(records[0].name, "Smith, A");
    }

    #[test]
    fn test_decode_is_deterministic() {
        let csv = format!(
            "{}\n1001',A Smith,01/15/2023,INV-9,12/15/2022,01/15/2023,150,$45.00,$5.85,$50.85",
            HEADER
        );
        assert_eq!(decode_export(&csv).unwrap(), decode_export(&csv).unwrap());
    }

    #[test]
    fn test_strip_account_suffix() {
        assert_eq!(strip_account_suffix("12345'"), "12345");
        assert_eq!(strip_account_suffix("12345"), "12345");
        assert_eq!(strip_account_suffix("12345''"), "12345'");
    }

    #[test]
    fn test_parse_date() {
        assert_eq!(parse_date("07/04/2021").unwrap(), date(2021, 7, 4));
        assert_eq!(parse_date("7/4/2021").unwrap(), date(2021, 7, 4));
        assert!(parse_date("2021-07-04").is_err());
        assert!(parse_date("13/01/2021").is_err());
        assert!(parse_date("02/30/2021").is_err());
        assert!(parse_date("").is_err());
    }

    #[test]
    fn test_parse_number() {
        assert_eq!(parse_number("42").unwrap(), 42.0);
        assert_eq!(parse_number("12.5").unwrap(), 12.5);
        assert!(parse_number("").is_err());
        assert!(parse_number("NaN").is_err());
        assert!(parse_number("12 m3").is_err());
    }

    #[test]
    fn test_parse_currency() {
        assert_eq!(parse_currency("$123.45").unwrap(), dec("123.45"));
        assert_eq!(parse_currency("0.99").unwrap(), dec("0.99"));
        assert_eq!(parse_currency("$ 45.00").unwrap(), dec("45.00"));
        assert!(parse_currency("$$1.00").is_err());
        assert!(parse_currency("").is_err());
    }
}
