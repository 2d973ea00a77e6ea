//! Answer synthesis from the final filing list.
//!
//! Deterministic analysis (counts, date span, report-type histogram, key
//! findings, timeline) feeds either an LLM narrative or a template answer.
//! Synthesis never fails a run; the template is always available.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use dartsearch_llm::{LlmClient, Message};
use dartsearch_shared::{Confidence, DartSearchError, ExpandedQuery, Filing, Result};
use serde::Serialize;
use tokio_util::sync::CancellationToken;
use tracing::{instrument, warn};

/// Filings whose bodies are quoted in the narrative prompt.
const NARRATIVE_DOCS: usize = 5;

/// Key findings surfaced in the answer.
const KEY_FINDINGS: usize = 5;

/// Snippet length for key findings.
const SNIPPET_CHARS: usize = 280;

/// Timeline depth: most recent distinct dates.
const TIMELINE_DATES: usize = 10;

/// Events listed per timeline date.
const TIMELINE_EVENTS_PER_DATE: usize = 3;

/// Deterministic document statistics.
#[derive(Debug, Clone, Serialize)]
pub struct Analysis {
    pub total_count: usize,
    pub companies: Vec<String>,
    pub date_span: Option<(String, String)>,
    pub report_types: BTreeMap<String, usize>,
    pub keywords_found: Vec<String>,
}

/// One highlighted filing.
#[derive(Debug, Clone, Serialize)]
pub struct KeyFinding {
    pub corp_name: String,
    pub rcept_dt: String,
    pub report_nm: String,
    pub snippet: String,
    pub source_url: String,
    pub rcept_no: String,
}

/// Filings grouped under one receipt date.
#[derive(Debug, Clone, Serialize)]
pub struct TimelineEntry {
    pub date: String,
    pub count: usize,
    pub events: Vec<TimelineEvent>,
}

#[derive(Debug, Clone, Serialize)]
pub struct TimelineEvent {
    pub corp_name: String,
    pub report_nm: String,
    pub rcept_no: String,
}

/// Result of the synthesis phase.
#[derive(Debug, Clone)]
pub struct Synthesis {
    pub answer: String,
    pub confidence: Confidence,
    pub analysis: Analysis,
}

/// Builds the analytic answer from the run's evidence.
pub struct Synthesizer {
    llm: Option<Arc<LlmClient>>,
}

impl Synthesizer {
    pub fn new(llm: Option<Arc<LlmClient>>) -> Self {
        Self { llm }
    }

    #[instrument(skip_all, fields(filings = filings.len()))]
    pub async fn synthesize(
        &self,
        query: &str,
        expanded: &ExpandedQuery,
        filings: &[Filing],
        language: &str,
        cancel: &CancellationToken,
    ) -> Result<Synthesis> {
        let analysis = analyze(expanded, filings);
        let findings = key_findings(filings);
        let timeline = timeline(filings);

        let evidence_count = filings.iter().filter(|f| f.has_evidence()).count();

        let (answer, narrative_from_llm) = match &self.llm {
            Some(llm) => {
                match self
                    .narrative(llm, query, &analysis, &findings, &timeline, filings, language, cancel)
                    .await
                {
                    Ok(text) => (text, true),
                    Err(DartSearchError::Cancelled) => return Err(DartSearchError::Cancelled),
                    Err(e) => {
                        warn!(error = %e, "narrative LLM failed; using template answer");
                        (
                            template_answer(query, &analysis, &findings, evidence_count, language),
                            false,
                        )
                    }
                }
            }
            None => (
                template_answer(query, &analysis, &findings, evidence_count, language),
                false,
            ),
        };

        let confidence = if evidence_count == 0 {
            Confidence::Low
        } else if evidence_count < 3 || !narrative_from_llm {
            Confidence::Medium
        } else {
            Confidence::High
        };

        Ok(Synthesis {
            answer,
            confidence,
            analysis,
        })
    }

    #[allow(clippy::too_many_arguments)]
    async fn narrative(
        &self,
        llm: &LlmClient,
        query: &str,
        analysis: &Analysis,
        findings: &[KeyFinding],
        timeline: &[TimelineEntry],
        filings: &[Filing],
        language: &str,
        cancel: &CancellationToken,
    ) -> Result<String> {
        let mut documents = String::new();
        for (i, filing) in filings
            .iter()
            .filter(|f| f.has_evidence())
            .take(NARRATIVE_DOCS)
            .enumerate()
        {
            documents.push_str(&format!(
                "### 문서 {} — {} | {} | {}\n{}\n\n",
                i + 1,
                filing.reference.corp_name,
                filing.reference.report_nm,
                filing.reference.rcept_dt,
                filing.content,
            ));
        }

        let lang_instruction = if language == "en" {
            "Answer in English."
        } else {
            "한국어로 답변하세요."
        };

        let system = "당신은 DART 공시 정보를 분석하는 전문가입니다. \
                      제공된 공시 내용에 근거해서만 답변하고, 수치는 문서에 있는 그대로 인용하세요.";
        let user = format!(
            "사용자 질의: {query}\n\n\
             통계: {}\n\n주요 공시: {}\n\n타임라인: {}\n\n공시 본문:\n{documents}\n\
             위 자료를 종합해 질의에 대한 분석적 답변을 작성하세요. {lang_instruction}",
            serde_json::to_string(analysis).unwrap_or_default(),
            serde_json::to_string(findings).unwrap_or_default(),
            serde_json::to_string(&timeline.iter().take(3).collect::<Vec<_>>())
                .unwrap_or_default(),
        );

        llm.complete(&[Message::system(system), Message::user(user)], None, cancel)
            .await
    }
}

/// Compute the deterministic statistics block.
pub fn analyze(expanded: &ExpandedQuery, filings: &[Filing]) -> Analysis {
    let mut companies: BTreeSet<String> = BTreeSet::new();
    let mut report_types: BTreeMap<String, usize> = BTreeMap::new();
    let mut dates: Vec<&str> = Vec::new();

    for filing in filings {
        if !filing.reference.corp_name.is_empty() {
            companies.insert(filing.reference.corp_name.clone());
        }
        if !filing.reference.report_nm.is_empty() {
            *report_types
                .entry(filing.reference.report_nm.clone())
                .or_insert(0) += 1;
        }
        if !filing.reference.rcept_dt.is_empty() {
            dates.push(&filing.reference.rcept_dt);
        }
    }

    let date_span = match (dates.iter().min(), dates.iter().max()) {
        (Some(min), Some(max)) => Some((min.to_string(), max.to_string())),
        _ => None,
    };

    let keywords_found = expanded
        .keywords
        .iter()
        .filter(|kw| {
            filings.iter().any(|f| {
                f.reference.report_nm.contains(kw.as_str()) || f.content.contains(kw.as_str())
            })
        })
        .cloned()
        .collect();

    Analysis {
        total_count: filings.len(),
        companies: companies.into_iter().collect(),
        date_span,
        report_types,
        keywords_found,
    }
}

/// Up to five filings in the fetcher's order.
pub fn key_findings(filings: &[Filing]) -> Vec<KeyFinding> {
    filings
        .iter()
        .take(KEY_FINDINGS)
        .map(|filing| KeyFinding {
            corp_name: filing.reference.corp_name.clone(),
            rcept_dt: filing.reference.rcept_dt.clone(),
            report_nm: filing.reference.report_nm.clone(),
            snippet: filing.content.chars().take(SNIPPET_CHARS).collect(),
            source_url: filing.source_url.clone(),
            rcept_no: filing.reference.rcept_no.clone(),
        })
        .collect()
}

/// Filings grouped by receipt date, newest first.
pub fn timeline(filings: &[Filing]) -> Vec<TimelineEntry> {
    let mut by_date: BTreeMap<String, Vec<&Filing>> = BTreeMap::new();
    for filing in filings {
        by_date
            .entry(filing.reference.rcept_dt.clone())
            .or_default()
            .push(filing);
    }

    by_date
        .into_iter()
        .rev()
        .take(TIMELINE_DATES)
        .map(|(date, group)| TimelineEntry {
            date,
            count: group.len(),
            events: group
                .iter()
                .take(TIMELINE_EVENTS_PER_DATE)
                .map(|f| TimelineEvent {
                    corp_name: f.reference.corp_name.clone(),
                    report_nm: f.reference.report_nm.clone(),
                    rcept_no: f.reference.rcept_no.clone(),
                })
                .collect(),
        })
        .collect()
}

/// Deterministic answer used when no LLM narrative is available.
fn template_answer(
    query: &str,
    analysis: &Analysis,
    findings: &[KeyFinding],
    evidence_count: usize,
    language: &str,
) -> String {
    if language == "en" {
        return template_answer_en(query, analysis, findings, evidence_count);
    }

    let mut lines = Vec::new();
    lines.push(format!("'{query}'에 대한 검색 결과입니다."));
    if evidence_count == 0 && analysis.total_count > 0 {
        lines.push("공시 본문을 확보하지 못해 목록 정보만으로 답변합니다.".into());
    }
    lines.push(format!(
        "총 {}건의 관련 공시를 찾았습니다.",
        analysis.total_count
    ));
    if let Some((begin, end)) = &analysis.date_span {
        lines.push(format!("기간: {begin} ~ {end}"));
    }
    if !analysis.companies.is_empty() {
        let companies: Vec<&str> = analysis.companies.iter().take(5).map(String::as_str).collect();
        lines.push(format!("관련 기업: {}", companies.join(", ")));
    }
    if !analysis.report_types.is_empty() {
        let mut types: Vec<(&String, &usize)> = analysis.report_types.iter().collect();
        types.sort_by(|a, b| b.1.cmp(a.1).then(a.0.cmp(b.0)));
        let top: Vec<String> = types
            .iter()
            .take(3)
            .map(|(name, count)| format!("{name}({count}건)"))
            .collect();
        lines.push(format!("주요 공시 유형: {}", top.join(", ")));
    }
    if !findings.is_empty() {
        lines.push(String::new());
        lines.push("주요 공시:".into());
        for (i, finding) in findings.iter().take(3).enumerate() {
            lines.push(format!(
                "{}. [{}] {} ({})",
                i + 1,
                finding.corp_name,
                finding.report_nm,
                finding.rcept_dt
            ));
        }
    }
    if !analysis.keywords_found.is_empty() {
        lines.push(format!(
            "발견된 키워드: {}",
            analysis.keywords_found.join(", ")
        ));
    }
    lines.join("\n")
}

fn template_answer_en(
    query: &str,
    analysis: &Analysis,
    findings: &[KeyFinding],
    evidence_count: usize,
) -> String {
    let mut lines = Vec::new();
    lines.push(format!("Search results for '{query}'."));
    if evidence_count == 0 && analysis.total_count > 0 {
        lines.push("Document bodies could not be retrieved; this answer covers listings only.".into());
    }
    lines.push(format!(
        "{} related disclosures were found.",
        analysis.total_count
    ));
    if let Some((begin, end)) = &analysis.date_span {
        lines.push(format!("Period: {begin} – {end}"));
    }
    for (i, finding) in findings.iter().take(3).enumerate() {
        lines.push(format!(
            "{}. [{}] {} ({})",
            i + 1,
            finding.corp_name,
            finding.report_nm,
            finding.rcept_dt
        ));
    }
    lines.join("\n")
}
