//! InfluxDB v2 HTTP client.
//!
//! Writes use line protocol against `/api/v2/write`; queries run Flux against
//! `/api/v2/query` and read back plain CSV (header row, no annotations).

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::header::{ACCEPT, AUTHORIZATION, CONTENT_TYPE};
use serde_json::json;

use super::{FieldValue, QueryRecord, QueryRecords, Sample, TimeSeriesStore, TsdbError, MEASUREMENT};
use crate::config::TsdbConfig;

/// Client for a single InfluxDB bucket.
#[derive(Clone)]
pub struct InfluxClient {
    http: reqwest::Client,
    url: String,
    token: String,
    org: String,
    bucket: String,
}

impl InfluxClient {
    pub fn new(config: &TsdbConfig) -> Result<Self, TsdbError> {
        let http = reqwest::Client::builder().timeout(config.timeout).build()?;

        Ok(Self {
            http,
            url: config.url.trim_end_matches('/').to_string(),
            token: config.token.clone(),
            org: config.org.clone(),
            bucket: config.bucket.clone(),
        })
    }

    pub fn bucket(&self) -> &str {
        &self.bucket
    }

    async fn check(response: reqwest::Response) -> Result<reqwest::Response, TsdbError> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let body = response.text().await.unwrap_or_default();
        Err(TsdbError::Status {
            status: status.as_u16(),
            body,
        })
    }
}

#[async_trait]
impl TimeSeriesStore for InfluxClient {
    async fn write_samples(&self, samples: &[Sample]) -> Result<(), TsdbError> {
        if samples.is_empty() {
            return Ok(());
        }

        let body = samples
            .iter()
            .map(to_line_protocol)
            .collect::<Vec<_>>()
            .join("\n");

        let response = self
            .http
            .post(format!("{}/api/v2/write", self.url))
            .query(&[
                ("org", self.org.as_str()),
                ("bucket", self.bucket.as_str()),
                ("precision", "ns"),
            ])
            .header(AUTHORIZATION, format!("Token {}", self.token))
            .header(CONTENT_TYPE, "text/plain; charset=utf-8")
            .body(body)
            .send()
            .await?;

        Self::check(response).await?;
        Ok(())
    }

    async fn query(&self, query: &str) -> Result<QueryRecords, TsdbError> {
        let response = self
            .http
            .post(format!("{}/api/v2/query", self.url))
            .query(&[("org", self.org.as_str())])
            .header(AUTHORIZATION, format!("Token {}", self.token))
            .header(ACCEPT, "application/csv")
            .json(&json!({
                "query": query,
                "type": "flux",
                "dialect": {
                    "header": true,
                    "annotations": [],
                    "delimiter": ","
                }
            }))
            .send()
            .await?;

        let body = Self::check(response).await?.text().await?;
        Ok(QueryRecords::new(parse_csv_records(&body)?))
    }
}

/// Encode a sample as one line of InfluxDB line protocol.
pub fn to_line_protocol(sample: &Sample) -> String {
    let mut line = format!(
        "{},target={} status={}i",
        MEASUREMENT,
        escape_tag(&sample.target),
        sample.status()
    );

    if let Some(resp) = &sample.response {
        line.push_str(&format!(
            ",response_time={},status_code={}i",
            resp.response_time_ms, resp.status_code
        ));
    }

    if let Some(ns) = sample.time.timestamp_nanos_opt() {
        line.push_str(&format!(" {}", ns));
    }

    line
}

fn escape_tag(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    // Line protocol has no escape for line breaks.
    for c in value.chars().filter(|c| !matches!(c, '\n' | '\r')) {
        if matches!(c, ',' | '=' | ' ' | '\\') {
            out.push('\\');
        }
        out.push(c);
    }
    out
}

/// Parse the CSV body of a Flux query.
///
/// Each result table starts with its own header row; tables are separated by
/// blank lines. Only `target`, `_time` and `_value` are read.
pub fn parse_csv_records(body: &str) -> Result<Vec<QueryRecord>, TsdbError> {
    let mut records = Vec::new();
    let mut header: Option<Columns> = None;

    for line in body.lines() {
        let line = line.trim_end_matches('\r');
        if line.is_empty() {
            header = None;
            continue;
        }

        let cells = split_csv_line(line);
        let columns = match &header {
            Some(columns) => columns,
            None => {
                header = Some(Columns::from_header(&cells)?);
                continue;
            }
        };

        let cell = |idx: usize| cells.get(idx).map(String::as_str).unwrap_or("");

        let time = match columns.time {
            Some(idx) if !cell(idx).is_empty() => Some(
                DateTime::parse_from_rfc3339(cell(idx))
                    .map_err(|e| TsdbError::Malformed(format!("bad _time {:?}: {}", cell(idx), e)))?
                    .with_timezone(&Utc),
            ),
            _ => None,
        };

        records.push(QueryRecord {
            target: cell(columns.target).to_string(),
            time,
            value: FieldValue::parse(cell(columns.value)),
        });
    }

    Ok(records)
}

struct Columns {
    target: usize,
    time: Option<usize>,
    value: usize,
}

impl Columns {
    fn from_header(cells: &[String]) -> Result<Self, TsdbError> {
        let find = |name: &str| cells.iter().position(|c| c == name);

        Ok(Self {
            target: find("target")
                .ok_or_else(|| TsdbError::Malformed("missing target column".to_string()))?,
            time: find("_time"),
            value: find("_value")
                .ok_or_else(|| TsdbError::Malformed("missing _value column".to_string()))?,
        })
    }
}

/// Split one CSV line, honouring double-quoted cells and `""` escapes.
fn split_csv_line(line: &str) -> Vec<String> {
    let mut cells = Vec::new();
    let mut current = String::new();
    let mut quoted = false;
    let mut chars = line.chars().peekable();

    while let Some(c) = chars.next() {
        match c {
            '"' if quoted && chars.peek() == Some(&'"') => {
                current.push('"');
                chars.next();
            }
            '"' => quoted = !quoted,
            ',' if !quoted => cells.push(std::mem::take(&mut current)),
            _ => current.push(c),
        }
    }
    cells.push(current);
    cells
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tsdb::ResponseFields;
    use chrono::TimeZone;

    fn at(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(secs, 0).unwrap()
    }

    #[test]
    fn test_line_protocol_for_response() {
        let sample = Sample {
            target: "http://example.com/a b".to_string(),
            time: at(1_700_000_000),
            response: Some(ResponseFields {
                response_time_ms: 12.5,
                status_code: 200,
            }),
        };
        assert_eq!(
            to_line_protocol(&sample),
            "healthcheck,target=http://example.com/a\\ b status=1i,response_time=12.5,status_code=200i 1700000000000000000"
        );
    }

    #[test]
    fn test_line_protocol_for_failure_has_no_response_fields() {
        let sample = Sample {
            target: "http://down.test/?a=1,2".to_string(),
            time: at(10),
            response: None,
        };
        let line = to_line_protocol(&sample);
        assert_eq!(
            line,
            "healthcheck,target=http://down.test/?a\\=1\\,2 status=0i 10000000000"
        );
        assert!(!line.contains("response_time"));
        assert!(!line.contains("status_code"));
    }

    #[test]
    fn test_line_protocol_drops_line_breaks_in_tag() {
        let sample = Sample {
            target: "http://a.test/\nfoo x=1\r\nbar".to_string(),
            time: at(10),
            response: None,
        };
        let line = to_line_protocol(&sample);
        assert!(!line.contains('\n'));
        assert!(!line.contains('\r'));
        assert_eq!(
            line,
            "healthcheck,target=http://a.test/foo\\ x\\=1bar status=0i 10000000000"
        );
    }

    #[test]
    fn test_parse_multi_table_csv() {
        let body = "\
,result,table,_start,_stop,_time,_value,_field,_measurement,target\r
,_result,0,2024-01-01T00:00:00Z,2024-01-01T01:00:00Z,2024-01-01T00:10:00Z,12,response_time,healthcheck,http://a.test\r
,_result,0,2024-01-01T00:00:00Z,2024-01-01T01:00:00Z,2024-01-01T00:20:00Z,15.5,response_time,healthcheck,http://a.test\r
\r
,result,table,_start,_stop,_time,_value,_field,_measurement,target\r
,_result,1,2024-01-01T00:00:00Z,2024-01-01T01:00:00Z,2024-01-01T00:15:00Z,40,response_time,healthcheck,\"http://b.test/?x=1,2\"\r
";
        let records = parse_csv_records(body).unwrap();
        assert_eq!(records.len(), 3);
        assert_eq!(records[0].target, "http://a.test");
        assert_eq!(records[0].time, Some(Utc.with_ymd_and_hms(2024, 1, 1, 0, 10, 0).unwrap()));
        assert_eq!(records[0].value, FieldValue::Integer(12));
        assert_eq!(records[1].value, FieldValue::Float(15.5));
        assert_eq!(records[2].target, "http://b.test/?x=1,2");
    }

    #[test]
    fn test_parse_aggregated_csv_without_time() {
        let body = ",result,table,_start,_stop,_field,_measurement,target,_value\n\
                    ,_result,0,2024-01-01T00:00:00Z,2024-01-01T01:00:00Z,status,healthcheck,http://a.test,0.75\n";
        let records = parse_csv_records(body).unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].time, None);
        assert_eq!(records[0].value.to_string(), "0.75");
    }

    #[test]
    fn test_parse_empty_body() {
        assert!(parse_csv_records("").unwrap().is_empty());
        assert!(parse_csv_records("\r\n").unwrap().is_empty());
    }

    #[test]
    fn test_parse_rejects_missing_columns() {
        let err = parse_csv_records(",result,table,_value\n,_result,0,1\n").unwrap_err();
        assert!(matches!(err, TsdbError::Malformed(_)));
    }

    #[test]
    fn test_split_csv_line_escaped_quotes() {
        assert_eq!(
            split_csv_line("a,\"b \"\"c\"\"\",d"),
            vec!["a".to_string(), "b \"c\"".to_string(), "d".to_string()]
        );
    }
}
