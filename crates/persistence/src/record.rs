use chrono::NaiveDateTime;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::borrow::Cow;

/// Timestamp layout used in every exported row.
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Column names, in row order.
pub const HEADER: [&str; 9] = [
    "timestamp",
    "player",
    "final_total",
    "roi_pct",
    "event_cards",
    "allocation_year0",
    "allocation_year10",
    "allocation_year20",
    "feedback",
];

pub(crate) const UTF8_BOM: &[u8] = b"\xEF\xBB\xBF";

/// Summary of one finished game.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct GameRecord {
    pub recorded_at: NaiveDateTime,
    pub player: String,
    /// Final total in whole currency units, truncated.
    pub final_total: i64,
    /// Rounded to one decimal place.
    pub roi_pct: Decimal,
    /// Drawn-card log joined with `" | "`.
    pub event_cards: String,
    /// Allocation snapshots as JSON objects, empty when the year was never reached.
    pub allocation_year0: String,
    pub allocation_year10: String,
    pub allocation_year20: String,
    pub feedback: String,
}

impl GameRecord {
    /// Field values in [`HEADER`] order.
    pub fn fields(&self) -> [String; 9] {
        [
            self.recorded_at.format(TIMESTAMP_FORMAT).to_string(),
            self.player.clone(),
            self.final_total.to_string(),
            format!("{:.1}", self.roi_pct),
            self.event_cards.clone(),
            self.allocation_year0.clone(),
            self.allocation_year10.clone(),
            self.allocation_year20.clone(),
            self.feedback.clone(),
        ]
    }
}

/// Quote a CSV field when it contains a delimiter, quote or line break.
pub fn escape_field(field: &str) -> Cow<'_, str> {
    if field.contains([',', '"', '\n', '\r']) {
        Cow::Owned(format!("\"{}\"", field.replace('"', "\"\"")))
    } else {
        Cow::Borrowed(field)
    }
}

/// One CSV line terminated by CRLF.
pub fn encode_row<S: AsRef<str>>(fields: &[S]) -> String {
    let mut line = fields
        .iter()
        .map(|f| escape_field(f.as_ref()).into_owned())
        .collect::<Vec<_>>()
        .join(",");
    line.push_str("\r\n");
    line
}

/// Header plus rows, prefixed with a UTF-8 BOM.
pub fn render_csv(records: &[GameRecord]) -> Vec<u8> {
    let mut out = UTF8_BOM.to_vec();
    out.extend_from_slice(encode_row(&HEADER).as_bytes());
    for r in records {
        out.extend_from_slice(encode_row(&r.fields()).as_bytes());
    }
    out
}

/// Count CSV records (header included), honouring quoted line breaks.
pub fn count_csv_rows(text: &str) -> usize {
    let mut rows = 0;
    let mut in_quotes = false;
    let mut pending = false;
    for c in text.chars() {
        match c {
            '"' => {
                in_quotes = !in_quotes;
                pending = true;
            }
            '\n' if !in_quotes => {
                rows += 1;
                pending = false;
            }
            '\r' if !in_quotes => {}
            _ => pending = true,
        }
    }
    if pending {
        rows += 1;
    }
    rows
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use chrono::NaiveDate;
    use proptest::prelude::*;

    pub(crate) fn sample(player: &str, feedback: &str) -> GameRecord {
        GameRecord {
            recorded_at: NaiveDate::from_ymd_opt(2026, 10, 16)
                .unwrap()
                .and_hms_opt(9, 30, 0)
                .unwrap(),
            player: player.to_string(),
            final_total: 5_123_456,
            roi_pct: Decimal::new(4123, 1),
            event_cards: "Year 10: [101] Rate cut | Year 20: [102] Chip war".into(),
            allocation_year0: r#"{"dividend":20.0,"us_bond":20.0}"#.into(),
            allocation_year10: String::new(),
            allocation_year20: String::new(),
            feedback: feedback.to_string(),
        }
    }

    #[test]
    fn fields_follow_header_order() {
        let f = sample("Ava", "fun").fields();
        assert_eq!(f[0], "2026-10-16 09:30:00");
        assert_eq!(f[2], "5123456");
        assert_eq!(f[3], "412.3");
        assert_eq!(f[8], "fun");
    }

    #[test]
    fn roi_always_has_one_decimal() {
        let mut r = sample("Ava", "");
        r.roi_pct = Decimal::new(12, 0);
        assert_eq!(r.fields()[3], "12.0");
    }

    #[test]
    fn escaping_quotes_json_and_newlines() {
        assert_eq!(escape_field("plain"), "plain");
        assert_eq!(escape_field("a,b"), "\"a,b\"");
        assert_eq!(escape_field("say \"hi\""), "\"say \"\"hi\"\"\"");
        assert_eq!(escape_field("two\nlines"), "\"two\nlines\"");
    }

    #[test]
    fn render_starts_with_bom_and_header() {
        let bytes = render_csv(&[sample("小明", "很好玩")]);
        assert!(bytes.starts_with(UTF8_BOM));
        let text = String::from_utf8(bytes[UTF8_BOM.len()..].to_vec()).unwrap();
        assert!(text.starts_with("timestamp,player,"));
        assert!(text.contains("小明"));
        assert_eq!(count_csv_rows(&text), 2);
    }

    #[test]
    fn row_count_ignores_quoted_newlines() {
        let text = "h1,h2\r\n\"multi\nline\",x\r\nlast,row";
        assert_eq!(count_csv_rows(text), 3);
        assert_eq!(count_csv_rows(""), 0);
    }

    proptest! {
        #[test]
        fn any_feedback_is_one_row(feedback in ".*") {
            let line = encode_row(&sample("p", &feedback).fields());
            prop_assert_eq!(count_csv_rows(&line), 1);
        }
    }
}
