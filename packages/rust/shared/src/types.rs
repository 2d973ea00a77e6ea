//! Core domain types for the deep-search pipeline.
//!
//! Every object here is created inside one pipeline run and owned by the run
//! context; only the company directory, the content cache, and the HTTP token
//! buckets outlive a run (and none of those live in this crate).

use std::collections::BTreeMap;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

/// Hard cap on filings surviving the filter phase.
pub const MAX_DOCS_TO_RETURN: usize = 30;

/// Hard cap on deduplicated candidates handed to the filter phase.
pub const MAX_DOCS_TO_FILTER: usize = 100;

// ---------------------------------------------------------------------------
// Run options
// ---------------------------------------------------------------------------

/// Caller-supplied knobs for a single deep-search run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunOptions {
    /// Maximum expand→search attempts (sufficiency loop bound).
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    /// Per-sub-query result cap, clamped to the catalogue's 100-row page.
    #[serde(default = "default_max_results_per_search")]
    pub max_results_per_search: usize,
    /// Language of the synthesized answer.
    #[serde(default = "default_language")]
    pub language: String,
}

fn default_max_attempts() -> u32 {
    3
}
fn default_max_results_per_search() -> usize {
    30
}
fn default_language() -> String {
    "ko".into()
}

impl Default for RunOptions {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            max_results_per_search: default_max_results_per_search(),
            language: default_language(),
        }
    }
}

// ---------------------------------------------------------------------------
// DateRange
// ---------------------------------------------------------------------------

/// Inclusive `[begin, end]` window in `YYYYMMDD`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DateRange {
    pub begin: String,
    pub end: String,
}

impl DateRange {
    /// Build from chrono dates.
    pub fn from_dates(begin: NaiveDate, end: NaiveDate) -> Self {
        Self {
            begin: begin.format("%Y%m%d").to_string(),
            end: end.format("%Y%m%d").to_string(),
        }
    }

    /// Whether a `YYYYMMDD` receipt date falls inside the window.
    ///
    /// Lexicographic comparison is date order for this fixed-width format.
    pub fn contains(&self, rcept_dt: &str) -> bool {
        self.begin.as_str() <= rcept_dt && rcept_dt <= self.end.as_str()
    }

    /// Whether the window reaches the given `today` (fresh data may still
    /// arrive for it, so tail cache pages need refreshing).
    pub fn includes(&self, today: NaiveDate) -> bool {
        let today = today.format("%Y%m%d").to_string();
        self.begin <= today && today <= self.end
    }

    /// `begin` as a chrono date, if well-formed.
    pub fn begin_date(&self) -> Option<NaiveDate> {
        NaiveDate::parse_from_str(&self.begin, "%Y%m%d").ok()
    }

    /// `end` as a chrono date, if well-formed.
    pub fn end_date(&self) -> Option<NaiveDate> {
        NaiveDate::parse_from_str(&self.end, "%Y%m%d").ok()
    }
}

// ---------------------------------------------------------------------------
// ExpandedQuery
// ---------------------------------------------------------------------------

/// Structured search parameters produced by the query expander.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExpandedQuery {
    /// Canonical company names (possibly empty).
    pub companies: Vec<String>,
    /// 8-digit corp codes aligned 1:1 with `companies`; `None` where the
    /// resolver found no confident match.
    pub corp_codes: Vec<Option<String>>,
    /// Ordered detail-type codes (`[A-J]\d{3}`); empty means "any".
    pub doc_types: Vec<String>,
    /// Inclusive search window.
    pub date_range: DateRange,
    /// Deduplicated non-empty tokens for downstream filtering.
    pub keywords: Vec<String>,
    /// Korean detail terms (merger, treasury stock, …) recognized in the
    /// query, used to pick structured sub-report endpoints.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub detail_terms: Vec<String>,
    /// Verbatim copy of the user query for provenance.
    pub original_query: String,
}

// ---------------------------------------------------------------------------
// FilingRef / Filing
// ---------------------------------------------------------------------------

/// Minimal identifier of a disclosure, as listed by the catalogue.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FilingRef {
    /// 14-char receipt number; primary key across all phases.
    pub rcept_no: String,
    pub corp_name: String,
    pub corp_code: String,
    pub report_nm: String,
    /// `YYYYMMDD` receipt date.
    pub rcept_dt: String,
    /// Filer name.
    #[serde(default)]
    pub flr_nm: String,
    /// Detail-type code when the catalogue provides one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pblntf_detail_ty: Option<String>,
}

/// Which source produced a filing's body.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FetchSource {
    /// A dedicated structured detail endpoint.
    StructuredApi,
    /// The ZIP-of-XML document archive.
    DocumentArchive,
    /// The HTML web viewer.
    WebViewer,
    /// Nothing succeeded; `fetch_error` is populated.
    None,
}

/// Error recorded on a filing whose every fetch source failed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FetchError {
    pub kind: String,
    pub message: String,
}

/// A disclosure enriched with body data after the fetch phase.
///
/// Invariant: `content`/`structured_data` non-empty XOR `fetch_error` set.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Filing {
    #[serde(flatten)]
    pub reference: FilingRef,
    /// Cleaned plain text, truncated for the prompt budget.
    #[serde(default)]
    pub content: String,
    /// Extracted fields (ratios, counterparties, amounts) when the
    /// structured API served this filing.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub structured_data: BTreeMap<String, serde_json::Value>,
    pub source: FetchSource,
    pub fetched_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fetch_error: Option<FetchError>,
    /// Web-viewer URL for provenance.
    pub source_url: String,
}

impl Filing {
    /// Whether any body data was retrieved.
    pub fn has_evidence(&self) -> bool {
        !self.content.is_empty() || !self.structured_data.is_empty()
    }
}

// ---------------------------------------------------------------------------
// Response envelope
// ---------------------------------------------------------------------------

/// Answer confidence bucket surfaced to the caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Confidence {
    High,
    Medium,
    Low,
}

/// Aggregate block of the response envelope.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EnvelopeSummary {
    pub total_documents: usize,
    pub date_range: DateRange,
    pub companies: Vec<String>,
    pub confidence: Confidence,
}

/// A single absorbed failure, reported in telemetry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PartialFailure {
    pub phase: String,
    pub kind: String,
    pub message: String,
}

/// Run telemetry attached to every envelope.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RunTelemetry {
    pub attempts: u32,
    pub partial_failures: Vec<PartialFailure>,
    pub cache_hit_rate: f64,
    pub llm_calls: u64,
    pub duration_ms: u64,
    /// Per-phase latencies, logged but not part of the wire schema.
    #[serde(skip)]
    pub phase_latencies_ms: BTreeMap<String, u64>,
}

/// The stable JSON structure returned over the tool boundary.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResponseEnvelope {
    pub query: String,
    /// Absent only on cancelled runs.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub answer: Option<String>,
    pub summary: EnvelopeSummary,
    pub documents: Vec<Filing>,
    pub telemetry: RunTelemetry,
    /// `"Cancelled"` on cancelled runs, absent otherwise.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn date_range_contains_is_inclusive() {
        let range = DateRange {
            begin: "20240101".into(),
            end: "20241231".into(),
        };
        assert!(range.contains("20240101"));
        assert!(range.contains("20241231"));
        assert!(range.contains("20240615"));
        assert!(!range.contains("20230101"));
        assert!(!range.contains("20250101"));
    }

    #[test]
    fn date_range_includes_today() {
        let range = DateRange {
            begin: "20240915".into(),
            end: "20241015".into(),
        };
        let inside = NaiveDate::from_ymd_opt(2024, 10, 15).unwrap();
        let after = NaiveDate::from_ymd_opt(2024, 10, 16).unwrap();
        assert!(range.includes(inside));
        assert!(!range.includes(after));
    }

    #[test]
    fn filing_serializes_flat() {
        let filing = Filing {
            reference: FilingRef {
                rcept_no: "20241001000123".into(),
                corp_name: "메리츠금융지주".into(),
                corp_code: "00123456".into(),
                report_nm: "주요사항보고서(자기주식취득결정)".into(),
                rcept_dt: "20241001".into(),
                flr_nm: "메리츠금융지주".into(),
                pblntf_detail_ty: Some("B001".into()),
            },
            content: "본문".into(),
            structured_data: BTreeMap::new(),
            source: FetchSource::DocumentArchive,
            fetched_at: Utc::now(),
            fetch_error: None,
            source_url: "https://dart.fss.or.kr/dsaf001/main.do?rcpNo=20241001000123".into(),
        };

        let json = serde_json::to_value(&filing).expect("serialize");
        // FilingRef fields are flattened onto the document object.
        assert_eq!(json["rcept_no"], "20241001000123");
        assert_eq!(json["source"], "document_archive");
        assert!(json.get("fetch_error").is_none());
    }

    #[test]
    fn cancelled_envelope_omits_answer() {
        let envelope = ResponseEnvelope {
            query: "q".into(),
            answer: None,
            summary: EnvelopeSummary {
                total_documents: 0,
                date_range: DateRange {
                    begin: "20240101".into(),
                    end: "20240101".into(),
                },
                companies: vec![],
                confidence: Confidence::Low,
            },
            documents: vec![],
            telemetry: RunTelemetry::default(),
            kind: Some("Cancelled".into()),
        };
        let json = serde_json::to_string(&envelope).expect("serialize");
        assert!(!json.contains("\"answer\""));
        assert!(json.contains("\"Cancelled\""));
        assert!(json.contains("\"confidence\":\"low\""));
    }

    #[test]
    fn expanded_query_equality_detects_refinement_novelty() {
        let base = ExpandedQuery {
            companies: vec!["삼성전자".into()],
            corp_codes: vec![Some("00126380".into())],
            doc_types: vec!["B001".into()],
            date_range: DateRange {
                begin: "20240101".into(),
                end: "20240630".into(),
            },
            keywords: vec!["합병".into()],
            detail_terms: vec![],
            original_query: "q".into(),
        };
        let mut broadened = base.clone();
        broadened.date_range.begin = "20230901".into();
        assert_ne!(base, broadened);
        assert_eq!(base, base.clone());
    }
}
