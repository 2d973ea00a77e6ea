//! The deep-search orchestrator.
//!
//! One pipeline run walks EXPAND → SEARCH → FILTER → FETCH → SUFFICIENCY and
//! either loops back with a refined query or ends in SYNTHESIZE. Hard
//! failures on the first attempt abort with a degraded envelope; on later
//! attempts the run synthesizes whatever it has. Only two shapes ever cross
//! the tool boundary: a populated envelope or a `Cancelled` envelope.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::{NaiveDate, Utc};
use dartsearch_client::{CompanyDirectory, DartTransport};
use dartsearch_llm::LlmClient;
use dartsearch_net::{ContentCache, RateLimitedClient};
use dartsearch_query::QueryExpander;
use dartsearch_shared::{
    AppConfig, Confidence, DartSearchError, DateRange, EnvelopeSummary, ExpandedQuery, Filing,
    PartialFailure, ResponseEnvelope, Result, RunOptions, RunTelemetry,
};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, info_span, warn, Instrument};
use url::Url;
use uuid::Uuid;

use crate::fetch::DocumentFetcher;
use crate::filter::DocumentFilter;
use crate::search::SearchExecutor;
use crate::sufficiency::SufficiencyChecker;
use crate::synthesize::{analyze, Synthesizer};

/// User agent for all outbound HTTP.
const USER_AGENT: &str = concat!("dartsearch/", env!("CARGO_PKG_VERSION"));

/// The deep-search pipeline, shared across runs.
pub struct DeepSearch {
    config: AppConfig,
    cache: Arc<ContentCache>,
    http: Arc<RateLimitedClient>,
    llm: Option<Arc<LlmClient>>,
    transport: Arc<DartTransport>,
    directory: Arc<CompanyDirectory>,
    expander: QueryExpander,
    filter: DocumentFilter,
    sufficiency: SufficiencyChecker,
    synthesizer: Synthesizer,
    /// Fixed "today" for deterministic tests; `None` means the wall clock.
    today_override: Option<NaiveDate>,
}

impl DeepSearch {
    /// Wire the pipeline from configuration.
    pub fn new(config: AppConfig) -> Result<Self> {
        let dart_host = Url::parse(&config.dart.base_url)
            .ok()
            .and_then(|u| u.host_str().map(String::from))
            .ok_or_else(|| {
                DartSearchError::config(format!("bad DART base url: {}", config.dart.base_url))
            })?;

        let http = Arc::new(
            RateLimitedClient::new(
                USER_AGENT,
                Duration::from_millis(config.pipeline.fetch_timeout_ms),
            )?
            .with_host_limit(
                &dart_host,
                config.dart.daily_rate_limit,
                config.dart.burst_per_second,
            ),
        );
        let cache = Arc::new(ContentCache::new(config.pipeline.cache_max_bytes));
        let llm = match &config.llm {
            Some(llm_config) => Some(Arc::new(LlmClient::new(llm_config)?)),
            None => None,
        };

        let transport = Arc::new(DartTransport::new(
            http.clone(),
            cache.clone(),
            config.dart.clone(),
        ));
        let directory = Arc::new(CompanyDirectory::new());

        Ok(Self {
            expander: QueryExpander::new(llm.clone(), directory.clone()),
            filter: DocumentFilter::new(llm.clone()),
            sufficiency: SufficiencyChecker::new(llm.clone()),
            synthesizer: Synthesizer::new(llm.clone()),
            config,
            cache,
            http,
            llm,
            transport,
            directory,
            today_override: None,
        })
    }

    /// Pin "today" (tests only; relative date phrases resolve against it).
    pub fn with_today(mut self, today: NaiveDate) -> Self {
        self.today_override = Some(today);
        self
    }

    /// Run one deep search. Never panics or errors outward: every failure
    /// mode maps to an envelope.
    pub async fn run(
        &self,
        query: &str,
        options: RunOptions,
        cancel: CancellationToken,
    ) -> ResponseEnvelope {
        let run_id = Uuid::now_v7();
        let span = info_span!("deep_search", %run_id);
        self.run_inner(query, options, cancel).instrument(span).await
    }

    async fn run_inner(
        &self,
        query: &str,
        options: RunOptions,
        cancel: CancellationToken,
    ) -> ResponseEnvelope {
        let started = Instant::now();
        let today = self.today_override.unwrap_or_else(|| Utc::now().date_naive());
        let max_attempts = options.max_attempts.max(1);

        let (hits_before, misses_before) = self.cache.stats();
        let llm_calls_before = self.llm.as_ref().map(|l| l.call_count()).unwrap_or(0);

        let mut telemetry = Telemetry {
            started,
            hits_before,
            misses_before,
            llm_calls_before,
            partial_failures: Vec::new(),
            phase_latencies_ms: BTreeMap::new(),
            attempts: 0,
        };

        info!(query, "deep search started");

        // The directory is process-wide; (re)build it on first use.
        if let Err(e) = self.ensure_directory(&cancel).await {
            if matches!(e, DartSearchError::Cancelled) {
                return self.cancelled_envelope(query, today, &telemetry);
            }
            warn!(error = %e, "company directory unavailable; resolver degraded");
            telemetry.record_failure("expand", &e);
        }

        // --- EXPAND (first attempt) ---
        let phase_start = Instant::now();
        let expansion = match self.expander.expand(query, today, &cancel).await {
            Ok(expansion) => expansion,
            Err(DartSearchError::Cancelled) => {
                return self.cancelled_envelope(query, today, &telemetry)
            }
            Err(e) => {
                error!(error = %e, "expansion failed on first attempt");
                telemetry.record_failure("expand", &e);
                return self.abort_envelope(query, today, None, telemetry, &e);
            }
        };
        telemetry.record_phase("expand", phase_start);
        for warning in &expansion.warnings {
            info!(warning = %warning, "expansion note");
        }

        let mut current = expansion.query;

        // Nothing usable was extracted: answer with guidance instead of
        // scanning the whole catalogue.
        if current.companies.is_empty()
            && current.doc_types.is_empty()
            && current.keywords.is_empty()
        {
            info!("no usable search parameters; returning guidance");
            return self.guidance_envelope(query, &current, telemetry, &options);
        }

        let mut filings: Vec<Filing> = Vec::new();
        let mut search_failed_late = false;

        // --- SEARCH → FILTER → FETCH → SUFFICIENCY loop ---
        loop {
            telemetry.attempts += 1;

            let phase_start = Instant::now();
            let search = SearchExecutor::new(
                self.transport.clone(),
                self.config.pipeline.parallel_searches,
                options.max_results_per_search,
                self.config.pipeline.max_docs_to_filter,
            );
            let outcome = match search.search(&current, today, &cancel).await {
                Ok(outcome) => outcome,
                Err(DartSearchError::Cancelled) => {
                    return self.cancelled_envelope(query, today, &telemetry)
                }
                Err(e) => {
                    telemetry.record_failure("search", &e);
                    if telemetry.attempts == 1 {
                        error!(error = %e, "search unavailable on first attempt");
                        return self.abort_envelope(query, today, Some(&current), telemetry, &e);
                    }
                    warn!(error = %e, "search unavailable on retry; synthesizing partial data");
                    search_failed_late = true;
                    break;
                }
            };
            telemetry.record_phase("search", phase_start);
            let search_had_failures = !outcome.partial_failures.is_empty();
            telemetry.partial_failures.extend(outcome.partial_failures);

            // --- FILTER ---
            let phase_start = Instant::now();
            let filtered = match self
                .filter
                .filter(query, &current, outcome.refs, &cancel)
                .await
            {
                Ok(filtered) => filtered,
                Err(DartSearchError::Cancelled) => {
                    return self.cancelled_envelope(query, today, &telemetry)
                }
                Err(e) => {
                    telemetry.record_failure("filter", &e);
                    break;
                }
            };
            telemetry.record_phase("filter", phase_start);
            telemetry.partial_failures.extend(filtered.partial_failures);

            // --- FETCH ---
            let phase_start = Instant::now();
            let fetcher = DocumentFetcher::new(
                self.transport.clone(),
                self.config.pipeline.parallel_downloads,
                Duration::from_millis(self.config.pipeline.fetch_timeout_ms),
            );
            filings = match fetcher.fetch_all(&filtered.refs, &current, &cancel).await {
                Ok(filings) => filings,
                Err(DartSearchError::Cancelled) => {
                    return self.cancelled_envelope(query, today, &telemetry)
                }
                Err(e) => {
                    telemetry.record_failure("fetch", &e);
                    Vec::new()
                }
            };
            telemetry.record_phase("fetch", phase_start);
            for filing in filings.iter().filter(|f| f.fetch_error.is_some()) {
                let fetch_error = filing.fetch_error.as_ref().expect("checked");
                telemetry.partial_failures.push(PartialFailure {
                    phase: "fetch".into(),
                    kind: fetch_error.kind.clone(),
                    message: format!("{}: {}", filing.reference.rcept_no, fetch_error.message),
                });
            }

            // --- SUFFICIENCY ---
            let phase_start = Instant::now();
            let verdict = match self
                .sufficiency
                .check(
                    query,
                    &current,
                    &filings,
                    telemetry.attempts,
                    max_attempts,
                    search_had_failures,
                    &cancel,
                )
                .await
            {
                Ok(verdict) => verdict,
                Err(DartSearchError::Cancelled) => {
                    return self.cancelled_envelope(query, today, &telemetry)
                }
                Err(e) => {
                    telemetry.record_failure("sufficiency", &e);
                    break;
                }
            };
            telemetry.record_phase("sufficiency", phase_start);

            if verdict.sufficient {
                break;
            }
            match verdict.proposed_refinement {
                Some(refined) if telemetry.attempts < max_attempts && refined != current => {
                    info!(
                        attempt = telemetry.attempts,
                        begin = %refined.date_range.begin,
                        doc_types = ?refined.doc_types,
                        "insufficient evidence; retrying with refined query"
                    );
                    current = refined;
                }
                _ => {
                    // Either the budget is spent or the refinement would
                    // repeat the same attempt; the loop terminates.
                    break;
                }
            }
        }

        if cancel.is_cancelled() {
            return self.cancelled_envelope(query, today, &telemetry);
        }

        // --- SYNTHESIZE ---
        let phase_start = Instant::now();
        let synthesis = match self
            .synthesizer
            .synthesize(query, &current, &filings, &options.language, &cancel)
            .await
        {
            Ok(synthesis) => synthesis,
            Err(DartSearchError::Cancelled) => {
                return self.cancelled_envelope(query, today, &telemetry)
            }
            Err(e) => {
                // Unreachable in practice (the template path cannot fail),
                // but degrade rather than abort.
                telemetry.record_failure("synthesize", &e);
                let analysis = analyze(&current, &filings);
                return ResponseEnvelope {
                    query: query.to_string(),
                    answer: Some("공시 검색 결과 요약을 생성하지 못했습니다.".into()),
                    summary: EnvelopeSummary {
                        total_documents: filings.len(),
                        date_range: current.date_range.clone(),
                        companies: analysis.companies,
                        confidence: Confidence::Low,
                    },
                    documents: filings,
                    telemetry: telemetry.finish(self),
                    kind: None,
                };
            }
        };
        telemetry.record_phase("synthesize", phase_start);

        let confidence = if search_failed_late {
            Confidence::Low
        } else {
            synthesis.confidence
        };

        let companies = if synthesis.analysis.companies.is_empty() {
            current.companies.clone()
        } else {
            synthesis.analysis.companies.clone()
        };

        info!(
            documents = filings.len(),
            attempts = telemetry.attempts,
            throttled = self.http.throttled_count().await,
            ?confidence,
            "deep search finished"
        );

        ResponseEnvelope {
            query: query.to_string(),
            answer: Some(synthesis.answer),
            summary: EnvelopeSummary {
                total_documents: filings.len(),
                date_range: current.date_range.clone(),
                companies,
                confidence,
            },
            documents: filings,
            telemetry: telemetry.finish(self),
            kind: None,
        }
    }

    /// Build or refresh the company directory snapshot.
    async fn ensure_directory(&self, cancel: &CancellationToken) -> Result<()> {
        if !self.directory.is_stale() {
            return Ok(());
        }
        let zip_bytes = self.transport.fetch_corp_catalogue(cancel).await?;
        self.directory.rebuild_from_zip(&zip_bytes)?;
        Ok(())
    }

    fn cancelled_envelope(
        &self,
        query: &str,
        today: NaiveDate,
        telemetry: &Telemetry,
    ) -> ResponseEnvelope {
        info!("run cancelled; partial results discarded");
        ResponseEnvelope {
            query: query.to_string(),
            answer: None,
            summary: EnvelopeSummary {
                total_documents: 0,
                date_range: default_range(today),
                companies: Vec::new(),
                confidence: Confidence::Low,
            },
            documents: Vec::new(),
            telemetry: telemetry.clone().finish(self),
            kind: Some("Cancelled".into()),
        }
    }

    fn abort_envelope(
        &self,
        query: &str,
        today: NaiveDate,
        expanded: Option<&ExpandedQuery>,
        telemetry: Telemetry,
        cause: &DartSearchError,
    ) -> ResponseEnvelope {
        ResponseEnvelope {
            query: query.to_string(),
            answer: Some(format!(
                "공시 검색을 수행하지 못했습니다 ({}). 잠시 후 다시 시도해 주세요.",
                cause.kind()
            )),
            summary: EnvelopeSummary {
                total_documents: 0,
                date_range: expanded
                    .map(|e| e.date_range.clone())
                    .unwrap_or_else(|| default_range(today)),
                companies: expanded.map(|e| e.companies.clone()).unwrap_or_default(),
                confidence: Confidence::Low,
            },
            documents: Vec::new(),
            telemetry: telemetry.finish(self),
            kind: None,
        }
    }

    fn guidance_envelope(
        &self,
        query: &str,
        expanded: &ExpandedQuery,
        telemetry: Telemetry,
        options: &RunOptions,
    ) -> ResponseEnvelope {
        let answer = if options.language == "en" {
            "The query did not contain a recognizable company, disclosure type, or keyword. \
             Try again with a listed company name (e.g. 삼성전자) or a disclosure term \
             (e.g. 유상증자, 자기주식)."
                .to_string()
        } else {
            "질의에서 기업명, 공시 유형, 키워드를 찾지 못했습니다. '삼성전자', '유상증자', \
             '자기주식'처럼 구체적인 기업명이나 공시 관련 용어로 다시 검색해 주세요."
                .to_string()
        };
        ResponseEnvelope {
            query: query.to_string(),
            answer: Some(answer),
            summary: EnvelopeSummary {
                total_documents: 0,
                date_range: expanded.date_range.clone(),
                companies: Vec::new(),
                confidence: Confidence::Low,
            },
            documents: Vec::new(),
            telemetry: telemetry.finish(self),
            kind: None,
        }
    }
}

/// Last-90-days window used by envelopes that never got an expansion.
fn default_range(today: NaiveDate) -> DateRange {
    let begin = today - chrono::Days::new(90);
    DateRange::from_dates(begin, today)
}

/// Run-scoped telemetry accumulator.
#[derive(Clone)]
struct Telemetry {
    started: Instant,
    hits_before: u64,
    misses_before: u64,
    llm_calls_before: u64,
    partial_failures: Vec<PartialFailure>,
    phase_latencies_ms: BTreeMap<String, u64>,
    attempts: u32,
}

impl Telemetry {
    fn record_phase(&mut self, phase: &str, started: Instant) {
        *self.phase_latencies_ms.entry(phase.to_string()).or_insert(0) +=
            started.elapsed().as_millis() as u64;
    }

    fn record_failure(&mut self, phase: &str, error: &DartSearchError) {
        self.partial_failures.push(PartialFailure {
            phase: phase.to_string(),
            kind: error.kind().to_string(),
            message: error.to_string(),
        });
    }

    fn finish(self, pipeline: &DeepSearch) -> RunTelemetry {
        let (hits_after, misses_after) = pipeline.cache.stats();
        let hits = hits_after.saturating_sub(self.hits_before);
        let misses = misses_after.saturating_sub(self.misses_before);
        let lookups = hits + misses;
        let cache_hit_rate = if lookups == 0 {
            0.0
        } else {
            hits as f64 / lookups as f64
        };

        let llm_calls_after = pipeline.llm.as_ref().map(|l| l.call_count()).unwrap_or(0);

        RunTelemetry {
            attempts: self.attempts,
            partial_failures: self.partial_failures,
            cache_hit_rate,
            llm_calls: llm_calls_after.saturating_sub(self.llm_calls_before),
            duration_ms: self.started.elapsed().as_millis() as u64,
            phase_latencies_ms: self.phase_latencies_ms,
        }
    }
}
