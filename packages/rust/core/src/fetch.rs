//! Concurrent retrieval of filing bodies.
//!
//! Source priority per filing: structured detail endpoint (when the doc type
//! has one), then the document archive, then the web viewer. Fetches run a
//! few at a time under a semaphore, each bounded by a timeout, and the output
//! preserves the filter phase's ordering regardless of completion order. A
//! filing whose every source failed is kept with its error recorded.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use dartsearch_client::{cleanup, DartTransport, StructuredEndpoint};
use dartsearch_shared::{
    DartSearchError, ExpandedQuery, FetchError, FetchSource, Filing, FilingRef, Result,
};
use serde_json::Value;
use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;
use tracing::{debug, instrument, warn};

/// Body characters forwarded to prompts; full text stays in the cache.
const CONTENT_BUDGET_CHARS: usize = 1500;

/// Fetches filing bodies while preserving input order.
pub struct DocumentFetcher {
    transport: Arc<DartTransport>,
    parallel: usize,
    timeout: Duration,
}

impl DocumentFetcher {
    pub fn new(transport: Arc<DartTransport>, parallel: usize, timeout: Duration) -> Self {
        Self {
            transport,
            parallel: parallel.max(1),
            timeout,
        }
    }

    /// Fetch every reference. The returned vector is index-aligned with the
    /// input; each element either carries evidence or a fetch error.
    #[instrument(skip_all, fields(count = refs.len()))]
    pub async fn fetch_all(
        &self,
        refs: &[FilingRef],
        expanded: &ExpandedQuery,
        cancel: &CancellationToken,
    ) -> Result<Vec<Filing>> {
        let semaphore = Arc::new(Semaphore::new(self.parallel));
        let mut handles = Vec::with_capacity(refs.len());

        for (index, reference) in refs.iter().cloned().enumerate() {
            let transport = self.transport.clone();
            let semaphore = semaphore.clone();
            let cancel = cancel.clone();
            let detail_terms = expanded.detail_terms.clone();
            let window = (
                expanded.date_range.begin.clone(),
                expanded.date_range.end.clone(),
            );
            let timeout = self.timeout;

            handles.push(tokio::spawn(async move {
                let _permit = semaphore.acquire().await.expect("semaphore closed");
                if cancel.is_cancelled() {
                    return (index, Err(DartSearchError::Cancelled));
                }
                let fetched = tokio::time::timeout(
                    timeout,
                    fetch_one(&transport, &reference, &detail_terms, &window, &cancel),
                )
                .await
                .unwrap_or_else(|_| {
                    Ok(failed_filing(
                        &transport,
                        &reference,
                        "FetchFailed",
                        format!("fetch timed out after {} ms", timeout.as_millis()),
                    ))
                });
                (index, fetched)
            }));
        }

        let mut filings: Vec<Option<Filing>> = vec![None; refs.len()];
        for handle in handles {
            let (index, result) = handle
                .await
                .map_err(|e| DartSearchError::Internal(format!("fetch task: {e}")))?;
            filings[index] = Some(result?);
        }

        Ok(filings.into_iter().flatten().collect())
    }
}

/// Try each source in priority order for one filing.
async fn fetch_one(
    transport: &DartTransport,
    reference: &FilingRef,
    detail_terms: &[String],
    window: &(String, String),
    cancel: &CancellationToken,
) -> Result<Filing> {
    let rcept_no = reference.rcept_no.clone();
    let mut last_error: Option<DartSearchError> = None;

    // 1. Structured detail endpoint, when one applies.
    if let Some(endpoint) = pick_endpoint(reference, detail_terms) {
        if !reference.corp_code.is_empty() {
            match transport
                .fetch_structured(
                    endpoint,
                    &reference.corp_code,
                    &rcept_no,
                    (window.0.as_str(), window.1.as_str()),
                    cancel,
                )
                .await
            {
                Ok(fields) if !fields.is_empty() => {
                    let content = render_structured(&fields);
                    return Ok(Filing {
                        reference: reference.clone(),
                        content: cleanup::truncate_chars(&content, CONTENT_BUDGET_CHARS),
                        structured_data: fields,
                        source: FetchSource::StructuredApi,
                        fetched_at: Utc::now(),
                        fetch_error: None,
                        source_url: transport.viewer_url(&rcept_no),
                    });
                }
                Ok(_) => debug!(%rcept_no, "structured endpoint had no matching entry"),
                Err(DartSearchError::Cancelled) => return Err(DartSearchError::Cancelled),
                Err(e) => {
                    warn!(%rcept_no, error = %e, "structured fetch failed");
                    last_error = Some(e);
                }
            }
        }
    }

    // 2. Document archive.
    match transport.fetch_archive(&rcept_no, cancel).await {
        Ok(full_text) => {
            return Ok(Filing {
                reference: reference.clone(),
                content: cleanup::truncate_chars(&full_text, CONTENT_BUDGET_CHARS),
                structured_data: BTreeMap::new(),
                source: FetchSource::DocumentArchive,
                fetched_at: Utc::now(),
                fetch_error: None,
                source_url: transport.viewer_url(&rcept_no),
            });
        }
        Err(DartSearchError::Cancelled) => return Err(DartSearchError::Cancelled),
        Err(e) => {
            warn!(%rcept_no, error = %e, "archive fetch failed");
            last_error = Some(e);
        }
    }

    // 3. Web viewer, last resort.
    match transport.fetch_viewer(&rcept_no, cancel).await {
        Ok(text) => Ok(Filing {
            reference: reference.clone(),
            content: cleanup::truncate_chars(&text, CONTENT_BUDGET_CHARS),
            structured_data: BTreeMap::new(),
            source: FetchSource::WebViewer,
            fetched_at: Utc::now(),
            fetch_error: None,
            source_url: transport.viewer_url(&rcept_no),
        }),
        Err(DartSearchError::Cancelled) => Err(DartSearchError::Cancelled),
        Err(e) => {
            let error = last_error.unwrap_or(e);
            Ok(failed_filing(
                transport,
                reference,
                error.kind(),
                error.to_string(),
            ))
        }
    }
}

/// A filing retained with its fetch error populated.
fn failed_filing(
    transport: &DartTransport,
    reference: &FilingRef,
    kind: &str,
    message: String,
) -> Filing {
    Filing {
        reference: reference.clone(),
        content: String::new(),
        structured_data: BTreeMap::new(),
        source: FetchSource::None,
        fetched_at: Utc::now(),
        fetch_error: Some(FetchError {
            kind: kind.to_string(),
            message,
        }),
        source_url: transport.viewer_url(&reference.rcept_no),
    }
}

/// Detail terms pick the sub-report endpoint; bare periodic-report codes map
/// to the financial-statements endpoint.
fn pick_endpoint(reference: &FilingRef, detail_terms: &[String]) -> Option<StructuredEndpoint> {
    for term in detail_terms {
        if let Some(endpoint) = StructuredEndpoint::for_detail_term(term) {
            return Some(endpoint);
        }
    }
    reference
        .pblntf_detail_ty
        .as_deref()
        .and_then(StructuredEndpoint::for_doc_type)
}

/// Flatten structured fields into the `key: value` text used for prompts.
fn render_structured(fields: &BTreeMap<String, Value>) -> String {
    fields
        .iter()
        .map(|(key, value)| match value {
            Value::String(s) => format!("{key}: {s}"),
            other => format!("{key}: {other}"),
        })
        .collect::<Vec<_>>()
        .join("\n")
}
