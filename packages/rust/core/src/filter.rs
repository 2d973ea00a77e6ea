//! Relevance filtering of catalogue candidates.
//!
//! Two strategies share one boundary: at most 30 surviving references, in the
//! strategy's preferred order, with no score attached. The LLM strategy asks
//! for the relevant receipt numbers and rejects anything outside the input
//! set; the rule strategy scores on title keywords, exact company matches,
//! doc-type membership, and freshness.

use std::collections::HashSet;
use std::sync::Arc;

use dartsearch_llm::{extract_json, LlmClient, Message};
use dartsearch_shared::{
    DartSearchError, ExpandedQuery, FilingRef, PartialFailure, Result, MAX_DOCS_TO_RETURN,
};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

/// Candidates per LLM call; a single call is the typical case.
const LLM_BATCH_SIZE: usize = 100;

/// Rule strategy: when fewer than this many candidates score above zero,
/// the most recent ones are kept regardless.
const MIN_SCORED: usize = 5;

/// Result of the filter phase.
#[derive(Debug, Default)]
pub struct FilterOutcome {
    pub refs: Vec<FilingRef>,
    pub partial_failures: Vec<PartialFailure>,
}

/// Relevance filter with an LLM strategy and a rule fallback.
pub struct DocumentFilter {
    llm: Option<Arc<LlmClient>>,
}

impl DocumentFilter {
    pub fn new(llm: Option<Arc<LlmClient>>) -> Self {
        Self { llm }
    }

    /// Select up to 30 relevant candidates, in preference order.
    #[instrument(skip_all, fields(candidates = candidates.len()))]
    pub async fn filter(
        &self,
        original_query: &str,
        expanded: &ExpandedQuery,
        candidates: Vec<FilingRef>,
        cancel: &CancellationToken,
    ) -> Result<FilterOutcome> {
        if candidates.is_empty() {
            return Ok(FilterOutcome::default());
        }

        if let Some(llm) = &self.llm {
            match self
                .llm_filter(llm, original_query, &candidates, cancel)
                .await
            {
                Ok(refs) => {
                    info!(kept = refs.len(), "LLM filter selected candidates");
                    return Ok(FilterOutcome {
                        refs,
                        partial_failures: Vec::new(),
                    });
                }
                Err(DartSearchError::Cancelled) => return Err(DartSearchError::Cancelled),
                Err(e) => {
                    warn!(error = %e, "LLM filter failed; using rule strategy");
                    let refs = rule_filter(expanded, &candidates);
                    return Ok(FilterOutcome {
                        refs,
                        partial_failures: vec![PartialFailure {
                            phase: "filter".into(),
                            kind: e.kind().into(),
                            message: e.to_string(),
                        }],
                    });
                }
            }
        }

        Ok(FilterOutcome {
            refs: rule_filter(expanded, &candidates),
            partial_failures: Vec::new(),
        })
    }

    async fn llm_filter(
        &self,
        llm: &LlmClient,
        original_query: &str,
        candidates: &[FilingRef],
        cancel: &CancellationToken,
    ) -> Result<Vec<FilingRef>> {
        let known: HashSet<&str> = candidates.iter().map(|c| c.rcept_no.as_str()).collect();
        let mut kept: Vec<FilingRef> = Vec::new();
        let mut seen: HashSet<String> = HashSet::new();

        let schema = serde_json::json!({
            "type": "object",
            "properties": {
                "relevant": { "type": "array", "items": { "type": "string" } },
                "reason": { "type": "string" },
            },
            "required": ["relevant"],
        });

        for batch in candidates.chunks(LLM_BATCH_SIZE) {
            let listing: String = batch
                .iter()
                .map(|c| {
                    format!(
                        "- rcept_no={} | {} | {} | {}\n",
                        c.rcept_no, c.corp_name, c.report_nm, c.rcept_dt
                    )
                })
                .collect();

            let system = "당신은 DART 공시 문서의 관련성을 평가하는 전문가입니다. \
                          사용자 질의에 직접 필요한 문서만 선별하세요.";
            let user = format!(
                "사용자 질의: {original_query}\n\n공시 목록:\n{listing}\n\
                 질의와 관련 있는 문서의 rcept_no만 골라 JSON으로 답하세요: \
                 {{\"relevant\": [\"...\"], \"reason\": \"간단한 이유\"}}"
            );

            let response = llm
                .complete(
                    &[Message::system(system), Message::user(user)],
                    Some(&schema),
                    cancel,
                )
                .await?;

            let value = extract_json(&response).ok_or_else(|| {
                DartSearchError::LlmUnavailable("filter response was not JSON".into())
            })?;
            let Some(ids) = value["relevant"].as_array() else {
                return Err(DartSearchError::LlmUnavailable(
                    "filter response missing relevant list".into(),
                ));
            };

            for id in ids {
                let Some(id) = id.as_str() else { continue };
                // Unknown identifiers and duplicates are discarded.
                if !known.contains(id) || !seen.insert(id.to_string()) {
                    debug!(rcept_no = id, "discarded filter id");
                    continue;
                }
                if let Some(filing) = batch.iter().find(|c| c.rcept_no == id) {
                    kept.push(filing.clone());
                }
            }
        }

        kept.truncate(MAX_DOCS_TO_RETURN);
        Ok(kept)
    }
}

/// Rule strategy: keyword/company/doc-type scoring with a freshness tiebreak.
fn rule_filter(expanded: &ExpandedQuery, candidates: &[FilingRef]) -> Vec<FilingRef> {
    let mut scored: Vec<(i32, &FilingRef)> = candidates
        .iter()
        .map(|candidate| (score(expanded, candidate), candidate))
        .collect();

    scored.sort_by(|(score_a, a), (score_b, b)| {
        score_b
            .cmp(score_a)
            .then(b.rcept_dt.cmp(&a.rcept_dt))
            .then(a.rcept_no.cmp(&b.rcept_no))
    });

    let positive: Vec<FilingRef> = scored
        .iter()
        .filter(|(s, _)| *s > 0)
        .take(MAX_DOCS_TO_RETURN)
        .map(|(_, c)| (*c).clone())
        .collect();

    if positive.len() >= MIN_SCORED {
        return positive;
    }

    // Too little signal: keep the most recent candidates regardless.
    let mut recent: Vec<FilingRef> = candidates.to_vec();
    recent.sort_by(|a, b| b.rcept_dt.cmp(&a.rcept_dt).then(a.rcept_no.cmp(&b.rcept_no)));
    recent.truncate(MIN_SCORED);
    recent
}

fn score(expanded: &ExpandedQuery, candidate: &FilingRef) -> i32 {
    let mut score = 0;
    for keyword in &expanded.keywords {
        if candidate.report_nm.contains(keyword.as_str()) {
            score += 2;
        }
    }
    if expanded
        .companies
        .iter()
        .any(|company| company == &candidate.corp_name)
    {
        score += 3;
    }
    if let Some(doc_type) = &candidate.pblntf_detail_ty {
        if expanded.doc_types.contains(doc_type) {
            score += 1;
        }
    }
    score
}

#[cfg(test)]
mod tests {
    use super::*;
    use dartsearch_shared::DateRange;

    fn filing(rcept_no: &str, corp: &str, report: &str, date: &str, ty: Option<&str>) -> FilingRef {
        FilingRef {
            rcept_no: rcept_no.into(),
            corp_name: corp.into(),
            corp_code: "00000000".into(),
            report_nm: report.into(),
            rcept_dt: date.into(),
            flr_nm: corp.into(),
            pblntf_detail_ty: ty.map(String::from),
        }
    }

    fn expanded() -> ExpandedQuery {
        ExpandedQuery {
            companies: vec!["메리츠금융지주".into()],
            corp_codes: vec![Some("00155210".into())],
            doc_types: vec!["B001".into()],
            date_range: DateRange {
                begin: "20240701".into(),
                end: "20241015".into(),
            },
            keywords: vec!["스톡옵션".into(), "취소".into()],
            detail_terms: vec![],
            original_query: "q".into(),
        }
    }

    #[test]
    fn rule_scoring_prefers_keyword_company_and_type_hits() {
        let candidates = vec![
            filing("20241001000001", "다른회사", "사업보고서", "20241001", None),
            filing(
                "20240930000002",
                "메리츠금융지주",
                "주요사항보고서(스톡옵션 취소 결의)",
                "20240930",
                Some("B001"),
            ),
            filing(
                "20240929000003",
                "메리츠금융지주",
                "주요사항보고서",
                "20240929",
                Some("B001"),
            ),
            filing("20240801000004", "다른회사", "스톡옵션 부여", "20240801", None),
            filing("20240815000007", "별개회사", "스톡옵션 취소 안내", "20240815", None),
            filing("20240820000008", "기타회사", "취소 결정", "20240820", None),
            filing("20240701000005", "또다른회사", "증권신고서", "20240701", None),
            filing("20240601000006", "회사여섯", "분기보고서", "20240601", None),
        ];

        let kept = rule_filter(&expanded(), &candidates);
        // Keyword(4) + company(3) + type(1) dominates.
        assert_eq!(kept[0].rcept_no, "20240930000002");
        // Company + type beats lone keyword on one title.
        assert_eq!(kept[1].rcept_no, "20240929000003");
        // Only positive scorers survive when there are enough of them.
        assert!(kept.iter().all(|c| c.rcept_no != "20240601000006"
            && c.rcept_no != "20241001000001"
            && c.rcept_no != "20240701000005"));
    }

    #[test]
    fn rule_filter_falls_back_to_recency_on_weak_signal() {
        let candidates: Vec<FilingRef> = (1..=8)
            .map(|i| {
                filing(
                    &format!("2024090100000{i}"),
                    "무관한회사",
                    "무관한 보고서",
                    &format!("2024090{i}"),
                    None,
                )
            })
            .collect();

        let kept = rule_filter(&expanded(), &candidates);
        assert_eq!(kept.len(), MIN_SCORED);
        // Most recent first.
        assert_eq!(kept[0].rcept_dt, "20240908");
    }

    #[test]
    fn rule_filter_caps_at_thirty() {
        let candidates: Vec<FilingRef> = (0..60)
            .map(|i| {
                filing(
                    &format!("202409{:02}0000{:02}", i % 30 + 1, i),
                    "메리츠금융지주",
                    "주요사항보고서(스톡옵션)",
                    &format!("202409{:02}", i % 30 + 1),
                    Some("B001"),
                )
            })
            .collect();
        let kept = rule_filter(&expanded(), &candidates);
        assert_eq!(kept.len(), MAX_DOCS_TO_RETURN);
    }

    #[tokio::test]
    async fn no_llm_uses_rule_strategy() {
        let filter = DocumentFilter::new(None);
        let cancel = CancellationToken::new();
        let outcome = filter
            .filter(
                "스톡옵션 취소",
                &expanded(),
                vec![filing(
                    "20240930000002",
                    "메리츠금융지주",
                    "주요사항보고서(스톡옵션 취소 결의)",
                    "20240930",
                    Some("B001"),
                )],
                &cancel,
            )
            .await
            .unwrap();
        assert_eq!(outcome.refs.len(), 1);
        assert!(outcome.partial_failures.is_empty());
    }
}
