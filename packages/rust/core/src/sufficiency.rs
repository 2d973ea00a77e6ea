//! Evidence sufficiency decisions and search refinement.
//!
//! Ordering of the rules matters: the attempt bound is a hard stop, the
//! degraded-search rule is deterministic, and only then is the LLM consulted.
//! An unreachable LLM means "sufficient" — the loop never extends on doubt.

use std::sync::Arc;

use chrono::Days;
use dartsearch_llm::{extract_json, LlmClient, Message};
use dartsearch_shared::{DartSearchError, ExpandedQuery, Filing, Result};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

/// Below this many filings with body text, a degraded search is retried.
const MIN_EVIDENCE_DOCS: usize = 3;

/// Outcome of the sufficiency phase.
#[derive(Debug, Clone)]
pub struct SufficiencyOutcome {
    pub sufficient: bool,
    pub reasons: Vec<String>,
    pub missing_aspects: Vec<String>,
    /// A refined query to retry with; only honored when it differs from the
    /// attempt that produced it.
    pub proposed_refinement: Option<ExpandedQuery>,
}

impl SufficiencyOutcome {
    fn sufficient(reason: impl Into<String>) -> Self {
        Self {
            sufficient: true,
            reasons: vec![reason.into()],
            missing_aspects: Vec::new(),
            proposed_refinement: None,
        }
    }
}

/// Decides whether collected evidence answers the query.
pub struct SufficiencyChecker {
    llm: Option<Arc<LlmClient>>,
}

impl SufficiencyChecker {
    pub fn new(llm: Option<Arc<LlmClient>>) -> Self {
        Self { llm }
    }

    #[instrument(skip_all, fields(attempts_used = attempts_used, filings = filings.len()))]
    pub async fn check(
        &self,
        original_query: &str,
        expanded: &ExpandedQuery,
        filings: &[Filing],
        attempts_used: u32,
        max_attempts: u32,
        search_had_failures: bool,
        cancel: &CancellationToken,
    ) -> Result<SufficiencyOutcome> {
        // Hard stop: the loop bound always wins.
        if attempts_used >= max_attempts {
            info!(attempts_used, "attempt budget exhausted; accepting evidence");
            return Ok(SufficiencyOutcome::sufficient(format!(
                "attempt budget exhausted ({attempts_used}/{max_attempts})"
            )));
        }

        // Degraded search: thin evidence plus failed sub-queries get one
        // deterministic broadening.
        let evidence_count = filings.iter().filter(|f| f.has_evidence()).count();
        if evidence_count < MIN_EVIDENCE_DOCS && search_had_failures {
            debug!(evidence_count, "thin evidence after degraded search");
            return Ok(SufficiencyOutcome {
                sufficient: false,
                reasons: vec![format!(
                    "only {evidence_count} filings carry body text and part of the search failed"
                )],
                missing_aspects: vec!["broader date coverage".into()],
                proposed_refinement: Some(broaden(expanded)),
            });
        }

        let Some(llm) = &self.llm else {
            return Ok(SufficiencyOutcome::sufficient(
                "no LLM configured; evidence accepted",
            ));
        };

        match self
            .consult_llm(llm, original_query, expanded, filings, cancel)
            .await
        {
            Ok(outcome) => Ok(outcome),
            Err(DartSearchError::Cancelled) => Err(DartSearchError::Cancelled),
            Err(e) => {
                warn!(error = %e, "sufficiency LLM unavailable; treating evidence as sufficient");
                Ok(SufficiencyOutcome::sufficient(format!(
                    "sufficiency check unavailable ({})",
                    e.kind()
                )))
            }
        }
    }

    async fn consult_llm(
        &self,
        llm: &LlmClient,
        original_query: &str,
        expanded: &ExpandedQuery,
        filings: &[Filing],
        cancel: &CancellationToken,
    ) -> Result<SufficiencyOutcome> {
        let listing: String = filings
            .iter()
            .take(30)
            .map(|f| {
                format!(
                    "- {} | {} | {} | 본문 {}자\n",
                    f.reference.corp_name,
                    f.reference.report_nm,
                    f.reference.rcept_dt,
                    f.content.chars().count()
                )
            })
            .collect();

        let schema = serde_json::json!({
            "type": "object",
            "properties": {
                "sufficient": { "type": "boolean" },
                "reasons": { "type": "array", "items": { "type": "string" } },
                "missing_aspects": { "type": "array", "items": { "type": "string" } },
                "broaden_date_range": { "type": "boolean" },
            },
            "required": ["sufficient"],
        });

        let system = "당신은 DART 공시 정보의 충분성을 평가하는 전문가입니다. JSON으로만 답하세요.";
        let user = format!(
            "사용자 질의: {original_query}\n검색 기간: {} ~ {}\n수집된 공시 {}건:\n{listing}\n\
             이 정보로 질의에 답하기 충분한지 평가하세요. 부족하면 broaden_date_range를 true로 \
             제안하세요. JSON: {{\"sufficient\": bool, \"reasons\": [], \"missing_aspects\": [], \
             \"broaden_date_range\": bool}}",
            expanded.date_range.begin,
            expanded.date_range.end,
            filings.len(),
        );

        let response = llm
            .complete(
                &[Message::system(system), Message::user(user)],
                Some(&schema),
                cancel,
            )
            .await?;
        let value = extract_json(&response).ok_or_else(|| {
            DartSearchError::LlmUnavailable("sufficiency response was not JSON".into())
        })?;

        let sufficient = value["sufficient"].as_bool().unwrap_or(true);
        let reasons = string_list(&value["reasons"]);
        let missing_aspects = string_list(&value["missing_aspects"]);
        let proposed_refinement = (!sufficient && value["broaden_date_range"].as_bool() != Some(false))
            .then(|| broaden(expanded));

        Ok(SufficiencyOutcome {
            sufficient,
            reasons,
            missing_aspects,
            proposed_refinement,
        })
    }
}

fn string_list(value: &serde_json::Value) -> Vec<String> {
    value
        .as_array()
        .map(|items| {
            items
                .iter()
                .filter_map(|v| v.as_str().map(String::from))
                .collect()
        })
        .unwrap_or_default()
}

/// Deterministic refinement: extend the window 50 % further into the past
/// and drop the least-specific doc type (the last of the ordered list).
fn broaden(expanded: &ExpandedQuery) -> ExpandedQuery {
    let mut refined = expanded.clone();

    if let (Some(begin), Some(end)) = (
        expanded.date_range.begin_date(),
        expanded.date_range.end_date(),
    ) {
        let window_days = (end - begin).num_days().max(1) as u64;
        if let Some(new_begin) = begin.checked_sub_days(Days::new(window_days / 2)) {
            refined.date_range.begin = new_begin.format("%Y%m%d").to_string();
        }
    }

    refined.doc_types.pop();
    refined
}

#[cfg(test)]
mod tests {
    use super::*;
    use dartsearch_shared::DateRange;

    fn expanded() -> ExpandedQuery {
        ExpandedQuery {
            companies: vec![],
            corp_codes: vec![],
            doc_types: vec!["B001".into(), "E003".into()],
            date_range: DateRange {
                begin: "20240801".into(),
                end: "20241001".into(),
            },
            keywords: vec!["합병".into()],
            detail_terms: vec![],
            original_query: "q".into(),
        }
    }

    #[tokio::test]
    async fn attempt_budget_is_a_hard_stop() {
        let checker = SufficiencyChecker::new(None);
        let cancel = CancellationToken::new();
        let outcome = checker
            .check("q", &expanded(), &[], 3, 3, true, &cancel)
            .await
            .unwrap();
        assert!(outcome.sufficient);
        assert!(outcome.proposed_refinement.is_none());
    }

    #[tokio::test]
    async fn thin_evidence_after_failures_broadens() {
        let checker = SufficiencyChecker::new(None);
        let cancel = CancellationToken::new();
        let outcome = checker
            .check("q", &expanded(), &[], 1, 3, true, &cancel)
            .await
            .unwrap();

        assert!(!outcome.sufficient);
        let refined = outcome.proposed_refinement.expect("refinement");
        // Window extended 50% into the past: 61-day window → 30 more days.
        assert_eq!(refined.date_range.begin, "20240702");
        assert_eq!(refined.date_range.end, "20241001");
        // Least-specific doc type dropped.
        assert_eq!(refined.doc_types, vec!["B001".to_string()]);
        assert_ne!(&refined, &expanded());
    }

    #[tokio::test]
    async fn healthy_search_without_llm_is_sufficient() {
        let checker = SufficiencyChecker::new(None);
        let cancel = CancellationToken::new();
        let outcome = checker
            .check("q", &expanded(), &[], 1, 3, false, &cancel)
            .await
            .unwrap();
        assert!(outcome.sufficient);
    }

    #[test]
    fn broaden_twice_keeps_moving() {
        let first = broaden(&expanded());
        let second = broaden(&first);
        assert_ne!(first, second);
        assert!(second.date_range.begin < first.date_range.begin);
        assert!(second.doc_types.is_empty());
    }
}
