//! Record growth for a dataset, scraped from its IPT resource page.
//!
//! No public API exposes historical record counts, so the resource page's
//! embedded `aDataSet` JavaScript array (one row per published version) is
//! pulled out, massaged into JSON and compared against a target date.

use async_trait::async_trait;
use chrono::NaiveDateTime;
use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::Value;
use tracing::debug;

use crate::error::{Result, ScrapeError, ScrapeResult};
use crate::scraper::{fetch_html, script_bodies};

pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";
pub const DATASET_VARIABLE: &str = "aDataSet";

static BLOCK_COMMENT: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?s)/\*.*?\*/").expect("Failed to compile comment pattern")
});

static HTML_TAG: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"</?[A-Za-z!][^<>]*>").expect("Failed to compile tag pattern")
});

static TRAILING_COMMA: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r",\s*\]").expect("Failed to compile trailing comma pattern")
});

/// One published version of a dataset: `(label, "YYYY-MM-DD HH:MM:SS", "12,345")`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TimeSeriesPoint {
    pub label: String,
    pub timestamp: String,
    pub count: String,
}

impl TimeSeriesPoint {
    pub fn new(label: impl Into<String>, timestamp: impl Into<String>, count: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            timestamp: timestamp.into(),
            count: count.into(),
        }
    }

    pub fn published_at(&self) -> ScrapeResult<NaiveDateTime> {
        NaiveDateTime::parse_from_str(self.timestamp.trim(), TIMESTAMP_FORMAT)
            .map_err(|_| ScrapeError::InvalidTimestamp(self.timestamp.clone()))
    }

    pub fn record_count(&self) -> ScrapeResult<i64> {
        parse_count(&self.count)
    }
}

/// Extracts a time series from a statistics page.
pub trait TimeSeriesParser: Send + Sync {
    fn parse(&self, html: &str) -> ScrapeResult<Vec<TimeSeriesPoint>>;
}

/// Reads the array literal assigned to a JavaScript variable just before a
/// `$(document)` statement, the layout IPT resource pages use.
#[derive(Debug, Clone)]
pub struct EmbeddedArrayParser {
    variable: String,
    pattern: Regex,
}

impl EmbeddedArrayParser {
    pub fn new(variable: &str) -> std::result::Result<Self, regex::Error> {
        let pattern = Regex::new(&format!(
            r"(?s)var {} = (\[.*?\]);\s*\n\s*\$\(document\)",
            regex::escape(variable)
        ))?;
        Ok(Self {
            variable: variable.to_string(),
            pattern,
        })
    }

    /// Raw array literal, searched script by script and then across the whole page.
    pub fn extract(&self, html: &str) -> Option<String> {
        script_bodies(html)
            .iter()
            .find_map(|body| self.capture(body))
            .or_else(|| self.capture(html))
    }

    fn capture(&self, text: &str) -> Option<String> {
        self.pattern
            .captures(text)
            .and_then(|caps| caps.get(1))
            .map(|m| m.as_str().to_string())
    }
}

impl Default for EmbeddedArrayParser {
    fn default() -> Self {
        Self::new(DATASET_VARIABLE).expect("default dataset variable is a valid pattern")
    }
}

impl TimeSeriesParser for EmbeddedArrayParser {
    fn parse(&self, html: &str) -> ScrapeResult<Vec<TimeSeriesPoint>> {
        let raw = self
            .extract(html)
            .ok_or_else(|| ScrapeError::NoEmbeddedData(self.variable.clone()))?;
        parse_points(&clean_fragment(&raw))
    }
}

/// Turns the JavaScript array literal into JSON text.
pub fn clean_fragment(raw: &str) -> String {
    let no_comments = BLOCK_COMMENT.replace_all(raw, "");
    let spaced = no_comments.replace("&nbsp;", " ");
    let untagged = HTML_TAG.replace_all(&spaced, "");
    let single_line: String = untagged
        .chars()
        .filter(|c| *c != '\n' && *c != '\r')
        .collect();
    let quoted = normalize_quotes(&single_line);
    TRAILING_COMMA.replace_all(&quoted, "]").into_owned()
}

// `'` becomes `"`; `\'` becomes a bare apostrophe since JSON has no such escape.
fn normalize_quotes(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut prev = None;
    for c in text.chars() {
        if c == '\'' {
            if prev == Some('\\') {
                out.pop();
                out.push('\'');
            } else {
                out.push('"');
            }
        } else {
            out.push(c);
        }
        prev = Some(c);
    }
    out
}

pub fn parse_points(json: &str) -> ScrapeResult<Vec<TimeSeriesPoint>> {
    let rows: Vec<Vec<Value>> =
        serde_json::from_str(json).map_err(|e| ScrapeError::InvalidJson(e.to_string()))?;

    rows.into_iter()
        .enumerate()
        .map(|(index, row)| {
            if row.len() < 3 {
                return Err(ScrapeError::MalformedRow { index, fields: row.len() });
            }
            Ok(TimeSeriesPoint {
                label: field_text(&row[0]),
                timestamp: field_text(&row[1]),
                count: field_text(&row[2]),
            })
        })
        .collect()
}

fn field_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

/// `,` and `.` are both digit-group separators on these pages.
pub fn parse_count(raw: &str) -> ScrapeResult<i64> {
    raw.trim()
        .replace([',', '.'], "")
        .parse::<i64>()
        .map_err(|_| ScrapeError::InvalidCount(raw.to_string()))
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordDelta {
    pub latest: TimeSeriesPoint,
    pub baseline: TimeSeriesPoint,
    /// Negative when the publisher removed records.
    pub new_records: i64,
}

/// Compares the most recent point with the latest one strictly before `target`,
/// or with the oldest point overall when nothing predates `target`.
///
/// Ties on timestamp go to the point listed first.
pub fn record_delta(
    points: &[TimeSeriesPoint],
    target: NaiveDateTime,
) -> ScrapeResult<RecordDelta> {
    let dated = points
        .iter()
        .map(|p| Ok((p.published_at()?, p)))
        .collect::<ScrapeResult<Vec<_>>>()?;

    let (_, latest) = dated
        .iter()
        .rev()
        .max_by_key(|(ts, _)| *ts)
        .ok_or(ScrapeError::EmptySeries)?;

    let (_, baseline) = dated
        .iter()
        .filter(|(ts, _)| *ts < target)
        .rev()
        .max_by_key(|(ts, _)| *ts)
        .or_else(|| dated.iter().min_by_key(|(ts, _)| *ts))
        .ok_or(ScrapeError::EmptySeries)?;

    let new_records = latest.record_count()? - baseline.record_count()?;
    Ok(RecordDelta {
        latest: (*latest).clone(),
        baseline: (*baseline).clone(),
        new_records,
    })
}

/// IPT serves the human-facing page at `resource?r=` next to `archive.do?r=`.
pub fn resource_page_url(dwca_endpoint: &str) -> String {
    dwca_endpoint.replace("archive.do", "resource")
}

#[async_trait]
pub trait RecordCounter: Send + Sync {
    async fn record_delta(&self, dwca_endpoint: &str, target: NaiveDateTime) -> Result<RecordDelta>;
}

#[derive(Debug, Clone, Default)]
pub struct StatsPageScraper<P = EmbeddedArrayParser> {
    parser: P,
}

impl<P: TimeSeriesParser> StatsPageScraper<P> {
    pub fn new(parser: P) -> Self {
        Self { parser }
    }
}

#[async_trait]
impl<P: TimeSeriesParser> RecordCounter for StatsPageScraper<P> {
    async fn record_delta(&self, dwca_endpoint: &str, target: NaiveDateTime) -> Result<RecordDelta> {
        let url = resource_page_url(dwca_endpoint);
        debug!(%url, "fetching statistics page");
        let html = fetch_html(&url).await?;
        let points = self.parser.parse(&html)?;
        debug!(%url, points = points.len(), "parsed embedded time series");
        Ok(record_delta(&points, target)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn at(y: i32, m: u32, d: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(y, m, d).unwrap().and_hms_opt(0, 0, 0).unwrap()
    }

    fn series() -> Vec<TimeSeriesPoint> {
        vec![
            TimeSeriesPoint::new("1.4", "2024-03-01 09:00:00", "12,500"),
            TimeSeriesPoint::new("1.3", "2023-11-15 12:30:00", "11.900"),
            TimeSeriesPoint::new("1.2", "2023-02-01 08:00:00", "10,000"),
            TimeSeriesPoint::new("1.1", "2022-06-10 17:45:00", "8,250"),
        ]
    }

    const PAGE: &str = r#"<html><head><title>Resource</title></head><body>
<script type="text/javascript">
    var aDataSet = [
        /* latest published version */
        ['<a href="resource?r=herbarium&amp;v=1.4">1.4</a>', '2024-03-01 09:00:00', '12,500', 'Bob&nbsp;Smith'],
        ['1.3', '2023-11-15 12:30:00', '11.900', 'O\'Brien'],
        /* initial
           release */
        ['1.2', '2023-02-01 08:00:00', '10,000', 'Ann'],
    ];
    $(document).ready(function() {
        $('#rtable').dataTable({ "aaData": aDataSet });
    });
</script>
</body></html>"#;

    #[test]
    fn cleans_malformed_literal_into_json() {
        let raw = "['a', /* note */ '<b>2024-01-01 00:00:00</b>',\n '1,000',\n]";
        assert_eq!(clean_fragment(raw), r#"["a",  "2024-01-01 00:00:00", "1,000"]"#);
    }

    #[test]
    fn angle_brackets_in_free_text_keep_every_row() {
        let raw = "[['1.0','2024-01-01 00:00:00','10','fewer < 5'], ['0.9','2023-01-01 00:00:00','5','a > b']]";
        let points = parse_points(&clean_fragment(raw)).unwrap();
        assert_eq!(points.len(), 2);
        assert_eq!(points[1], TimeSeriesPoint::new("0.9", "2023-01-01 00:00:00", "5"));
    }

    #[test]
    fn escaped_apostrophes_survive_cleaning() {
        assert_eq!(clean_fragment(r"['O\'Brien']"), r#"["O'Brien"]"#);
    }

    #[test]
    fn parses_embedded_array_from_page() {
        let points = EmbeddedArrayParser::default().parse(PAGE).unwrap();
        assert_eq!(
            points,
            vec![
                TimeSeriesPoint::new("1.4", "2024-03-01 09:00:00", "12,500"),
                TimeSeriesPoint::new("1.3", "2023-11-15 12:30:00", "11.900"),
                TimeSeriesPoint::new("1.2", "2023-02-01 08:00:00", "10,000"),
            ]
        );
    }

    #[test]
    fn page_without_array_reports_no_data() {
        let html = "<html><script>var other = [];\n$(document).ready();</script></html>";
        let err = EmbeddedArrayParser::default().parse(html).unwrap_err();
        assert!(matches!(err, ScrapeError::NoEmbeddedData(var) if var == "aDataSet"));
    }

    #[test]
    fn unparseable_array_is_an_error() {
        let html = "<script>var aDataSet = [['a', 'b' 'c']];\n$(document).ready();</script>";
        let err = EmbeddedArrayParser::default().parse(html).unwrap_err();
        assert!(matches!(err, ScrapeError::InvalidJson(_)));
    }

    #[test]
    fn short_rows_are_rejected() {
        let err = parse_points(r#"[["1.0", "2024-01-01 00:00:00"]]"#).unwrap_err();
        assert!(matches!(err, ScrapeError::MalformedRow { index: 0, fields: 2 }));
    }

    #[test]
    fn numeric_fields_are_kept_as_text() {
        let points = parse_points(r#"[[1.5, "2024-01-01 00:00:00", 1200]]"#).unwrap();
        assert_eq!(points[0], TimeSeriesPoint::new("1.5", "2024-01-01 00:00:00", "1200"));
    }

    #[test]
    fn counts_drop_both_separators() {
        assert_eq!(parse_count("1,234,567").unwrap(), 1_234_567);
        assert_eq!(parse_count("1.234.567").unwrap(), 1_234_567);
        assert_eq!(parse_count(" 42 ").unwrap(), 42);
        assert!(matches!(parse_count("n/a"), Err(ScrapeError::InvalidCount(_))));
    }

    #[test]
    fn delta_against_latest_point_before_target() {
        let delta = record_delta(&series(), at(2023, 3, 1)).unwrap();
        assert_eq!(delta.baseline.label, "1.2");
        assert_eq!(delta.new_records, 12_500 - 10_000);
    }

    #[test]
    fn target_on_earliest_timestamp_falls_back_to_oldest() {
        let target = NaiveDateTime::parse_from_str("2022-06-10 17:45:00", TIMESTAMP_FORMAT).unwrap();
        let delta = record_delta(&series(), target).unwrap();
        assert_eq!(delta.baseline.label, "1.1");
        assert_eq!(delta.new_records, 12_500 - 8_250);
    }

    #[test]
    fn delta_may_be_negative() {
        let points = vec![
            TimeSeriesPoint::new("2.0", "2024-05-01 00:00:00", "900"),
            TimeSeriesPoint::new("1.0", "2023-01-01 00:00:00", "1,000"),
        ];
        assert_eq!(record_delta(&points, at(2024, 1, 1)).unwrap().new_records, -100);
    }

    #[test]
    fn most_recent_is_found_by_timestamp() {
        let mut points = series();
        points.reverse();
        let delta = record_delta(&points, at(2023, 3, 1)).unwrap();
        assert_eq!(delta.latest.label, "1.4");
        assert_eq!(delta.new_records, 2_500);
    }

    #[test]
    fn ties_prefer_the_point_listed_first() {
        let points = vec![
            TimeSeriesPoint::new("b", "2024-01-01 00:00:00", "30"),
            TimeSeriesPoint::new("a", "2024-01-01 00:00:00", "20"),
            TimeSeriesPoint::new("c", "2022-01-01 00:00:00", "10"),
        ];
        let delta = record_delta(&points, at(2025, 1, 1)).unwrap();
        assert_eq!(delta.latest.label, "b");
        assert_eq!(delta.baseline.label, "b");
        assert_eq!(delta.new_records, 0);
    }

    #[test]
    fn rigid_timestamp_format() {
        let points = vec![TimeSeriesPoint::new("1.0", "2024-01-01T00:00:00Z", "1")];
        let err = record_delta(&points, at(2024, 6, 1)).unwrap_err();
        assert!(matches!(err, ScrapeError::InvalidTimestamp(_)));
    }

    #[test]
    fn empty_series_has_no_delta() {
        assert!(matches!(record_delta(&[], at(2024, 1, 1)), Err(ScrapeError::EmptySeries)));
    }

    #[test]
    fn resource_url_replaces_archive_path() {
        assert_eq!(
            resource_page_url("https://ipt.example.org/archive.do?r=herbarium"),
            "https://ipt.example.org/resource?r=herbarium"
        );
    }
}
