//! 診断ログの logfmt 出力
//!
//! 1イベント1行、`key=value` をスペース区切りで並べる。
//!
//! - 値にスペースか `=` を含む場合はダブルクォートで囲む
//! - `"` と `\` はバックスラッシュでエスケープ
//! - 空文字列は `key=""`、値なし（null）は `key=`

use std::fmt::{self, Write as _};

use tracing::field::{Field, Visit};
use tracing::{Event, Subscriber};
use tracing_subscriber::fmt::format::Writer;
use tracing_subscriber::fmt::{FmtContext, FormatEvent, FormatFields};
use tracing_subscriber::registry::LookupSpan;
use tracing_subscriber::EnvFilter;

/// 1つの値を logfmt 表現に変換
pub fn format_value(value: Option<&str>) -> String {
    let Some(raw) = value else {
        return String::new();
    };

    if raw.is_empty() {
        return "\"\"".to_string();
    }

    let needs_quoting = raw.contains(' ') || raw.contains('=');

    let mut out = String::with_capacity(raw.len() + 2);
    if needs_quoting {
        out.push('"');
    }
    for ch in raw.chars() {
        if ch == '"' || ch == '\\' {
            out.push('\\');
        }
        out.push(ch);
    }
    if needs_quoting {
        out.push('"');
    }
    out
}

/// キーと値の組を1行に整形
pub fn encode<'a, I>(pairs: I) -> String
where
    I: IntoIterator<Item = (&'a str, Option<&'a str>)>,
{
    let mut line = String::new();
    for (i, (key, value)) in pairs.into_iter().enumerate() {
        if i > 0 {
            line.push(' ');
        }
        // String への write! は失敗しない
        let _ = write!(line, "{}={}", key, format_value(value));
    }
    line
}

/// イベントのフィールドを記録順に集める
#[derive(Default)]
struct FieldCollector {
    message: Option<String>,
    fields: Vec<(&'static str, String)>,
}

impl FieldCollector {
    fn push(&mut self, field: &Field, value: String) {
        if field.name() == "message" {
            self.message = Some(value);
        } else {
            self.fields.push((field.name(), value));
        }
    }
}

impl Visit for FieldCollector {
    fn record_str(&mut self, field: &Field, value: &str) {
        self.push(field, value.to_string());
    }

    fn record_i64(&mut self, field: &Field, value: i64) {
        self.push(field, value.to_string());
    }

    fn record_u64(&mut self, field: &Field, value: u64) {
        self.push(field, value.to_string());
    }

    fn record_f64(&mut self, field: &Field, value: f64) {
        self.push(field, value.to_string());
    }

    fn record_bool(&mut self, field: &Field, value: bool) {
        self.push(field, value.to_string());
    }

    fn record_error(&mut self, field: &Field, value: &(dyn std::error::Error + 'static)) {
        self.push(field, value.to_string());
    }

    fn record_debug(&mut self, field: &Field, value: &dyn fmt::Debug) {
        self.push(field, format!("{:?}", value));
    }
}

/// `tracing-subscriber` 用の logfmt イベントフォーマッタ
///
/// `level=info msg="..." key=value ...` の形で出力する。
#[derive(Debug, Clone, Copy, Default)]
pub struct Logfmt;

impl<S, N> FormatEvent<S, N> for Logfmt
where
    S: Subscriber + for<'a> LookupSpan<'a>,
    N: for<'a> FormatFields<'a> + 'static,
{
    fn format_event(
        &self,
        _ctx: &FmtContext<'_, S, N>,
        mut writer: Writer<'_>,
        event: &Event<'_>,
    ) -> fmt::Result {
        let mut collector = FieldCollector::default();
        event.record(&mut collector);

        let level = event.metadata().level().as_str().to_ascii_lowercase();

        let mut pairs: Vec<(&str, Option<&str>)> = Vec::with_capacity(collector.fields.len() + 2);
        pairs.push(("level", Some(level.as_str())));
        pairs.push(("msg", collector.message.as_deref()));
        pairs.extend(
            collector
                .fields
                .iter()
                .map(|(key, value)| (*key, Some(value.as_str()))),
        );

        writeln!(writer, "{}", encode(pairs))
    }
}

/// stderr へ logfmt で出力するサブスクライバを登録（`RUST_LOG` 未設定時は info）
pub fn init() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .event_format(Logfmt)
        .try_init();
}


#[cfg(test)]
mod tests {
    use super::*;

    /// logfmt 行を (key, value) に戻す
    fn parse_line(line: &str) -> Vec<(String, Option<String>)> {
        let mut pairs = Vec::new();
        let mut chars = line.chars().peekable();

        while chars.peek().is_some() {
            let mut key = String::new();
            while let Some(&c) = chars.peek() {
                chars.next();
                if c == '=' {
                    break;
                }
                key.push(c);
            }

            let mut value = String::new();
            let mut seen = false;
            let quoted = chars.peek() == Some(&'"');
            if quoted {
                chars.next();
                seen = true;
            }
            while let Some(c) = chars.next() {
                match c {
                    '\\' => {
                        if let Some(escaped) = chars.next() {
                            value.push(escaped);
                        }
                    }
                    '"' if quoted => break,
                    ' ' if !quoted => break,
                    _ => value.push(c),
                }
                seen = true;
            }
            if quoted && chars.peek() == Some(&' ') {
                chars.next();
            }

            pairs.push((key, if seen { Some(value) } else { None }));
        }

        pairs
    }

    #[test]
    fn test_plain_value() {
        assert_eq!(encode([("level", Some("info"))]), "level=info");
    }

    #[test]
    fn test_space_and_equals_are_quoted() {
        assert_eq!(
            encode([("msg", Some("logging in")), ("q", Some("a=b"))]),
            r#"msg="logging in" q="a=b""#
        );
    }

    #[test]
    fn test_quote_and_backslash_are_escaped() {
        assert_eq!(format_value(Some(r#"say "hi""#)), r#""say \"hi\"""#);
        assert_eq!(format_value(Some(r"C:\tmp")), r"C:\\tmp");
    }

    #[test]
    fn test_null_and_empty() {
        assert_eq!(encode([("item_id", None)]), "item_id=");
        assert_eq!(encode([("item_id", Some(""))]), r#"item_id="""#);
    }

    #[test]
    fn test_round_trip() {
        let values = [
            "plain",
            "has space",
            "k=v",
            r#"a "quoted" word"#,
            r"back\slash",
            r#"mix \ of = all "four""#,
            "",
        ];

        for value in values {
            let line = encode([("level", Some("info")), ("v", Some(value)), ("tail", None)]);
            let parsed = parse_line(&line);
            assert_eq!(parsed.len(), 3, "line: {}", line);
            assert_eq!(parsed[1], ("v".to_string(), Some(value.to_string())), "line: {}", line);
            assert_eq!(parsed[2], ("tail".to_string(), None), "line: {}", line);
        }
    }

    fn capture_logs(f: impl FnOnce()) -> String {
        let (capture, guard) = capture::install();
        f();
        drop(guard);
        capture.output()
    }

    #[test]
    fn test_event_format() {
        let output = capture_logs(|| {
            tracing::info!(username = "a smith", "logging in");
            tracing::warn!("no notification found; trying to continue");
            tracing::info!(time_s = 5u64, "waiting for page load");
        });

        let lines: Vec<&str> = output.lines().collect();
        assert_eq!(
            lines,
            vec![
                r#"level=info msg="logging in" username="a smith""#,
                r#"level=warn msg="no notification found; trying to continue""#,
                r#"level=info msg="waiting for page load" time_s=5"#,
            ]
        );
    }

    #[test]
    fn test_event_with_empty_string_field() {
        let output = capture_logs(|| {
            tracing::debug!(item_id = "", "got item ID");
        });

        assert_eq!(output.trim_end(), r#"level=debug msg="got item ID" item_id="""#);
    }
}
