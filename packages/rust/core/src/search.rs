//! Search execution against the disclosure catalogue.
//!
//! One expanded query fans out into a Cartesian set of catalogue sub-queries
//! (company × doc-type, with company-less windows split into ≤90-day
//! segments). Sub-queries run under bounded parallelism, page forward, and
//! merge into a deduplicated, newest-first candidate list.

use std::collections::HashSet;
use std::sync::Arc;

use chrono::{Days, NaiveDate};
use dartsearch_client::{CatalogQuery, DartTransport};
use dartsearch_shared::{
    DartSearchError, DateRange, ExpandedQuery, FilingRef, PartialFailure, Result,
};
use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

/// Catalogue page size (the API caps rows per page at 100).
const PAGE_COUNT: u32 = 100;

/// Company-less windows are searched in segments of at most this many days.
const ROLLING_WINDOW_DAYS: u64 = 90;

/// Result of the search phase.
#[derive(Debug, Default)]
pub struct SearchOutcome {
    /// Deduplicated candidates, newest first, capped.
    pub refs: Vec<FilingRef>,
    /// Sub-queries that failed after retries.
    pub partial_failures: Vec<PartialFailure>,
}

/// Fans catalogue sub-queries out and merges their results.
pub struct SearchExecutor {
    transport: Arc<DartTransport>,
    /// Concurrent sub-queries.
    parallel: usize,
    /// Per-sub-query result cap.
    per_search_cap: usize,
    /// Post-dedup candidate cap.
    candidate_cap: usize,
}

impl SearchExecutor {
    pub fn new(
        transport: Arc<DartTransport>,
        parallel: usize,
        per_search_cap: usize,
        candidate_cap: usize,
    ) -> Self {
        Self {
            transport,
            parallel: parallel.max(1),
            per_search_cap: per_search_cap.clamp(1, PAGE_COUNT as usize),
            candidate_cap,
        }
    }

    /// Run every sub-query and merge. Fails only when all sub-queries fail.
    #[instrument(skip_all, fields(companies = expanded.companies.len(), doc_types = expanded.doc_types.len()))]
    pub async fn search(
        &self,
        expanded: &ExpandedQuery,
        today: NaiveDate,
        cancel: &CancellationToken,
    ) -> Result<SearchOutcome> {
        let sub_queries = build_sub_queries(expanded);
        info!(sub_queries = sub_queries.len(), "executing catalogue searches");

        let semaphore = Arc::new(Semaphore::new(self.parallel));
        let mut handles = Vec::with_capacity(sub_queries.len());

        for (index, sub) in sub_queries.iter().cloned().enumerate() {
            let transport = self.transport.clone();
            let semaphore = semaphore.clone();
            let cancel = cancel.clone();
            let range = expanded.date_range.clone();
            let cap = self.per_search_cap;

            handles.push(tokio::spawn(async move {
                let _permit = semaphore.acquire().await.expect("semaphore closed");
                let result = run_sub_query(&transport, &sub, &range, cap, today, &cancel).await;
                (index, sub, result)
            }));
        }

        let mut collected: Vec<(usize, Vec<FilingRef>)> = Vec::new();
        let mut failures: Vec<PartialFailure> = Vec::new();
        for handle in handles {
            let (index, sub, result) = handle
                .await
                .map_err(|e| DartSearchError::Internal(format!("search task: {e}")))?;
            match result {
                Ok(refs) => collected.push((index, refs)),
                Err(DartSearchError::Cancelled) => return Err(DartSearchError::Cancelled),
                Err(e) => {
                    warn!(error = %e, corp = ?sub.corp_code, doc_type = ?sub.pblntf_detail_ty, "sub-query failed");
                    failures.push(PartialFailure {
                        phase: "search".into(),
                        kind: e.kind().into(),
                        message: e.to_string(),
                    });
                }
            }
        }

        if collected.is_empty() && !failures.is_empty() {
            return Err(DartSearchError::SearchUnavailable(format!(
                "all {} sub-queries failed",
                failures.len()
            )));
        }

        // Stable merge in sub-query order, dedup keeping the first
        // occurrence's metadata.
        collected.sort_by_key(|(index, _)| *index);
        let mut seen: HashSet<String> = HashSet::new();
        let mut merged: Vec<FilingRef> = Vec::new();
        for (_, refs) in collected {
            for filing in refs {
                if seen.insert(filing.rcept_no.clone()) {
                    merged.push(filing);
                }
            }
        }

        // Newest filings preferred when trimming to the candidate cap.
        merged.sort_by(|a, b| b.rcept_dt.cmp(&a.rcept_dt));
        merged.truncate(self.candidate_cap);

        debug!(candidates = merged.len(), failures = failures.len(), "search merged");
        Ok(SearchOutcome {
            refs: merged,
            partial_failures: failures,
        })
    }
}

/// Page one sub-query forward until the catalogue runs out or the cap hits.
async fn run_sub_query(
    transport: &DartTransport,
    sub: &CatalogQuery,
    guard_range: &DateRange,
    cap: usize,
    today: NaiveDate,
    cancel: &CancellationToken,
) -> Result<Vec<FilingRef>> {
    let window = DateRange {
        begin: sub.bgn_de.clone(),
        end: sub.end_de.clone(),
    };
    let fresh_window = window.includes(today);

    let mut refs: Vec<FilingRef> = Vec::new();
    let mut page_no = 1u32;
    loop {
        // The catalogue sorts newest-first, so fresh filings for a window
        // that reaches today land on its first page; refetch that page and
        // serve the rest from cache.
        let bypass = fresh_window && page_no == 1;
        let page = transport.search_page(sub, page_no, bypass, cancel).await?;

        for mut filing in page.refs {
            // Defensive window guard: drop out-of-range rows even if the
            // API misbehaves.
            if !guard_range.contains(&filing.rcept_dt) {
                debug!(rcept_no = %filing.rcept_no, rcept_dt = %filing.rcept_dt, "dropped out-of-window filing");
                continue;
            }
            filing.pblntf_detail_ty = sub.pblntf_detail_ty.clone();
            refs.push(filing);
            if refs.len() >= cap {
                return Ok(refs);
            }
        }

        if page.total_page == 0 || page_no >= page.total_page {
            return Ok(refs);
        }
        page_no += 1;
    }
}

/// Build the Cartesian sub-query set for an expanded query.
fn build_sub_queries(expanded: &ExpandedQuery) -> Vec<CatalogQuery> {
    let corp_codes: Vec<Option<String>> = {
        let resolved: Vec<Option<String>> = expanded
            .corp_codes
            .iter()
            .filter(|c| c.is_some())
            .cloned()
            .collect();
        if resolved.is_empty() {
            vec![None]
        } else {
            resolved
        }
    };

    let doc_types: Vec<Option<String>> = if expanded.doc_types.is_empty() {
        vec![None]
    } else {
        expanded.doc_types.iter().cloned().map(Some).collect()
    };

    let mut sub_queries = Vec::new();
    for corp in &corp_codes {
        let windows = if corp.is_none() {
            split_window(&expanded.date_range)
        } else {
            vec![expanded.date_range.clone()]
        };
        for doc_type in &doc_types {
            for window in &windows {
                sub_queries.push(CatalogQuery {
                    bgn_de: window.begin.clone(),
                    end_de: window.end.clone(),
                    corp_code: corp.clone(),
                    pblntf_detail_ty: doc_type.clone(),
                    page_count: PAGE_COUNT,
                });
            }
        }
    }
    sub_queries
}

/// Split a window into ≤90-day segments, newest first. The catalogue
/// degrades on long company-less scans.
fn split_window(range: &DateRange) -> Vec<DateRange> {
    let (Some(begin), Some(end)) = (range.begin_date(), range.end_date()) else {
        return vec![range.clone()];
    };

    let total_days = (end - begin).num_days().max(0) as u64;
    if total_days <= ROLLING_WINDOW_DAYS {
        return vec![range.clone()];
    }

    let mut segments = Vec::new();
    let mut current_end = end;
    while current_end >= begin {
        let candidate_begin = current_end
            .checked_sub_days(Days::new(ROLLING_WINDOW_DAYS - 1))
            .unwrap_or(begin);
        let current_begin = candidate_begin.max(begin);
        segments.push(DateRange::from_dates(current_begin, current_end));
        match current_begin.checked_sub_days(Days::new(1)) {
            Some(next_end) if next_end >= begin => current_end = next_end,
            _ => break,
        }
    }
    segments
}

#[cfg(test)]
mod tests {
    use super::*;

    fn expanded(companies: &[(&str, &str)], doc_types: &[&str], begin: &str, end: &str) -> ExpandedQuery {
        ExpandedQuery {
            companies: companies.iter().map(|(n, _)| n.to_string()).collect(),
            corp_codes: companies.iter().map(|(_, c)| Some(c.to_string())).collect(),
            doc_types: doc_types.iter().map(|d| d.to_string()).collect(),
            date_range: DateRange {
                begin: begin.into(),
                end: end.into(),
            },
            keywords: vec![],
            detail_terms: vec![],
            original_query: "q".into(),
        }
    }

    #[test]
    fn cartesian_company_by_doc_type() {
        let q = expanded(
            &[("삼성전자", "00126380"), ("현대자동차", "00164742")],
            &["B001", "E004"],
            "20240901",
            "20241001",
        );
        let subs = build_sub_queries(&q);
        assert_eq!(subs.len(), 4);
        assert!(subs.iter().all(|s| s.corp_code.is_some()));
    }

    #[test]
    fn no_company_issues_one_search_per_doc_type() {
        let q = expanded(&[], &["B001", "E003"], "20240915", "20241015");
        let subs = build_sub_queries(&q);
        assert_eq!(subs.len(), 2);
        assert!(subs.iter().all(|s| s.corp_code.is_none()));
    }

    #[test]
    fn no_company_no_doc_type_is_a_single_search() {
        let q = expanded(&[], &[], "20240915", "20241015");
        let subs = build_sub_queries(&q);
        assert_eq!(subs.len(), 1);
        assert!(subs[0].corp_code.is_none());
        assert!(subs[0].pblntf_detail_ty.is_none());
    }

    #[test]
    fn long_company_less_window_is_split_newest_first() {
        let q = expanded(&[], &["B001"], "20240101", "20241001");
        let subs = build_sub_queries(&q);
        assert!(subs.len() > 1);
        // Newest segment first, segments contiguous and within bounds.
        assert_eq!(subs[0].end_de, "20241001");
        assert_eq!(subs.last().unwrap().bgn_de, "20240101");
        for pair in subs.windows(2) {
            assert!(pair[0].bgn_de > pair[1].end_de);
        }
    }

    #[test]
    fn company_window_is_not_split() {
        let q = expanded(&[("삼성전자", "00126380")], &[], "20230101", "20241001");
        let subs = build_sub_queries(&q);
        assert_eq!(subs.len(), 1);
    }

    #[test]
    fn split_segments_cover_whole_range() {
        let range = DateRange {
            begin: "20240101".into(),
            end: "20240615".into(),
        };
        let segments = split_window(&range);
        assert!(segments.len() >= 2);
        assert_eq!(segments[0].end, "20240615");
        assert_eq!(segments.last().unwrap().begin, "20240101");
        // Every day is covered exactly once: each next segment ends the day
        // before the previous one begins.
        for pair in segments.windows(2) {
            let prev_begin = pair[0].begin_date().unwrap();
            let next_end = pair[1].end_date().unwrap();
            assert_eq!(next_end.succ_opt().unwrap(), prev_begin);
        }
    }
}
