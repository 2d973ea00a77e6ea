//! Query expansion: free text → structured search parameters.
//!
//! The LLM does the heavy lifting when configured; date phrases are parsed
//! beforehand to keep the prompt small, and company strings are resolved
//! against the directory afterwards. Without an LLM (or when its output is
//! unusable) a rule-based extraction takes over, so expansion itself only
//! fails on validation.

use std::collections::HashSet;
use std::sync::Arc;
use std::sync::LazyLock;

use chrono::NaiveDate;
use dartsearch_client::CompanyDirectory;
use dartsearch_llm::{extract_json, LlmClient, Message};
use dartsearch_shared::{DartSearchError, ExpandedQuery, Result};
use regex::Regex;
use serde::Deserialize;
use tokio_util::sync::CancellationToken;
use tracing::{debug, instrument, warn};

use crate::dates::parse_date_phrase;
use crate::doc_types;

/// Keywords carried on an expanded query.
const MAX_KEYWORDS: usize = 10;

/// Result of expansion: the structured query plus non-fatal notes.
#[derive(Debug, Clone)]
pub struct Expansion {
    pub query: ExpandedQuery,
    pub warnings: Vec<String>,
}

/// LLM-assisted query expander with a rule-based fallback.
pub struct QueryExpander {
    llm: Option<Arc<LlmClient>>,
    directory: Arc<CompanyDirectory>,
}

#[derive(Debug, Default, Deserialize)]
struct Extraction {
    #[serde(default)]
    companies: Vec<String>,
    #[serde(default)]
    doc_types: Vec<String>,
    #[serde(default)]
    keywords: Vec<String>,
}

static STOCK_CODE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\b(\d{6})\b").expect("valid regex"));

static QUOTED_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"["'「『]([^"'」』]{2,30})["'」』]"#).expect("valid regex"));

static TOKEN_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[가-힣A-Za-z0-9]{2,}").expect("valid regex"));

static CORP_CODE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\d{8}$").expect("valid regex"));

/// Trailing particles stripped from candidate company tokens.
static PARTICLES: &[&str] = &["에서의", "에서", "으로", "의", "은", "는", "이", "가", "을", "를", "와", "과", "도", "로", "에"];

/// Tokens that never make useful keywords.
static STOPWORDS: &[&str] = &[
    "공시", "관련", "내용", "알려줘", "알려주세요", "보여줘", "최근", "지난", "검색", "결과",
    "대한", "대해", "정보", "어떤", "있는", "상장회사", "기업들", "회사들",
];

impl QueryExpander {
    pub fn new(llm: Option<Arc<LlmClient>>, directory: Arc<CompanyDirectory>) -> Self {
        Self { llm, directory }
    }

    /// Expand `query` into validated search parameters.
    #[instrument(skip_all, fields(query = %query))]
    pub async fn expand(
        &self,
        query: &str,
        today: NaiveDate,
        cancel: &CancellationToken,
    ) -> Result<Expansion> {
        let mut warnings = Vec::new();

        let window = parse_date_phrase(query, today);
        if !window.recognized {
            warnings.push("no date expression recognized; defaulting to the last 90 days".into());
        }

        let extraction = match &self.llm {
            Some(llm) => match self.extract_with_llm(llm, query, cancel).await {
                Ok(extraction) => extraction,
                Err(DartSearchError::Cancelled) => return Err(DartSearchError::Cancelled),
                Err(e) => {
                    warn!(error = %e, "LLM extraction failed; using rule-based extraction");
                    warnings.push(format!("LLM extraction unavailable ({})", e.kind()));
                    rule_based_extraction(query, &self.directory)
                }
            },
            None => rule_based_extraction(query, &self.directory),
        };

        // Resolve every company string against the directory.
        let mut companies = Vec::new();
        let mut corp_codes = Vec::new();
        let mut seen = HashSet::new();
        for raw_name in &extraction.companies {
            let (name, code, warning) = self.resolve_company(raw_name);
            if seen.insert(name.clone()) {
                companies.push(name);
                corp_codes.push(code);
            }
            if let Some(warning) = warning {
                warnings.push(warning);
            }
        }

        // Keep only taxonomy codes the LLM proposed; unknown codes are
        // dropped silently. An empty result falls back to keyword mapping.
        let mut doc_type_codes: Vec<String> = Vec::new();
        for code in &extraction.doc_types {
            let code = code.trim().to_uppercase();
            if doc_types::is_valid_code(&code)
                && doc_types::is_known_code(&code)
                && !doc_type_codes.contains(&code)
            {
                doc_type_codes.push(code);
            }
        }
        if doc_type_codes.is_empty() {
            doc_type_codes = doc_types::map_keywords_to_codes(query, &extraction.keywords);
        }

        let mut keywords: Vec<String> = Vec::new();
        for kw in &extraction.keywords {
            let kw = kw.trim();
            if !kw.is_empty()
                && !STOPWORDS.contains(&kw)
                && !keywords.iter().any(|k| k == kw)
            {
                keywords.push(kw.to_string());
            }
            if keywords.len() == MAX_KEYWORDS {
                break;
            }
        }

        let detail_terms = doc_types::detect_detail_terms(query, &keywords);

        let expanded = ExpandedQuery {
            companies,
            corp_codes,
            doc_types: doc_type_codes,
            date_range: window.range,
            keywords,
            detail_terms,
            original_query: query.to_string(),
        };
        validate(&expanded)?;

        debug!(
            companies = expanded.companies.len(),
            doc_types = ?expanded.doc_types,
            keywords = expanded.keywords.len(),
            "query expanded"
        );
        Ok(Expansion {
            query: expanded,
            warnings,
        })
    }

    async fn extract_with_llm(
        &self,
        llm: &LlmClient,
        query: &str,
        cancel: &CancellationToken,
    ) -> Result<Extraction> {
        let taxonomy: String = doc_types::TAXONOMY
            .iter()
            .map(|m| format!("- {}: {}\n", m.code, m.name))
            .collect();

        let schema = serde_json::json!({
            "type": "object",
            "properties": {
                "companies": { "type": "array", "items": { "type": "string" } },
                "doc_types": { "type": "array", "items": { "type": "string" } },
                "keywords": { "type": "array", "items": { "type": "string" } },
            },
            "required": ["companies", "doc_types", "keywords"],
        });

        let system = "당신은 한국 DART 공시 검색 파라미터 추출 전문가입니다. \
                      사용자 질의에서 기업명, 공시 상세유형 코드, 핵심 키워드를 JSON으로 추출하세요.";
        let user = format!(
            "질의: {query}\n\n\
             사용 가능한 공시 상세유형:\n{taxonomy}\n\
             위 목록에 있는 코드만 doc_types에 넣으세요. 날짜 표현은 무시하세요.\n\
             JSON 객체 {{\"companies\": [], \"doc_types\": [], \"keywords\": []}} 형식으로만 답하세요."
        );

        let response = llm
            .complete(
                &[Message::system(system), Message::user(user)],
                Some(&schema),
                cancel,
            )
            .await?;

        let value = extract_json(&response)
            .ok_or_else(|| DartSearchError::LlmUnavailable("extraction was not JSON".into()))?;
        serde_json::from_value(value)
            .map_err(|e| DartSearchError::LlmUnavailable(format!("extraction shape: {e}")))
    }

    /// Canonicalize one company string. Returns `(name, corp_code, warning)`.
    fn resolve_company(&self, raw: &str) -> (String, Option<String>, Option<String>) {
        let raw = raw.trim();

        // 6-digit tokens are ticker codes.
        if raw.len() == 6 && raw.chars().all(|c| c.is_ascii_digit()) {
            return match self.directory.by_stock_code(raw) {
                Some(record) => (record.corp_name, Some(record.corp_code), None),
                None => (
                    raw.to_string(),
                    None,
                    Some(format!("stock code {raw} not found in the directory")),
                ),
            };
        }

        if let Some(best) = self.directory.best(raw) {
            return (best.corp_name, Some(best.corp_code), None);
        }
        if let Some(candidate) = self.directory.resolve(raw).into_iter().next() {
            let note = format!(
                "fuzzy company match: {raw} -> {} (score {})",
                candidate.corp_name, candidate.score
            );
            return (candidate.corp_name, Some(candidate.corp_code), Some(note));
        }
        (
            raw.to_string(),
            None,
            Some(format!("company not resolved: {raw}")),
        )
    }
}

// ---------------------------------------------------------------------------
// Rule-based extraction
// ---------------------------------------------------------------------------

/// Extraction without an LLM: quoted names, ticker codes, directory-backed
/// token scanning, and keyword harvesting.
fn rule_based_extraction(query: &str, directory: &CompanyDirectory) -> Extraction {
    let mut companies: Vec<String> = Vec::new();

    for caps in QUOTED_RE.captures_iter(query) {
        companies.push(caps[1].trim().to_string());
    }
    for caps in STOCK_CODE_RE.captures_iter(query) {
        companies.push(caps[1].to_string());
    }

    // Scan whitespace tokens for directory matches, shedding one trailing
    // particle ("메리츠금융의" → "메리츠금융").
    for token in query.split_whitespace() {
        let token: String = token
            .chars()
            .filter(|c| c.is_alphanumeric())
            .collect();
        if token.chars().count() < 2 || token.chars().all(|c| c.is_ascii_digit()) {
            continue;
        }
        for candidate in token_variants(&token) {
            if companies.iter().any(|c| c == &candidate) {
                break;
            }
            if !directory.resolve(&candidate).is_empty() {
                companies.push(candidate);
                break;
            }
        }
    }

    let mut keywords = Vec::new();
    for caps in TOKEN_RE.find_iter(query) {
        let token = caps.as_str();
        if token.chars().all(|c| c.is_ascii_digit()) {
            continue;
        }
        if STOPWORDS.contains(&token) || companies.iter().any(|c| c.contains(token)) {
            continue;
        }
        if !keywords.iter().any(|k| k == token) {
            keywords.push(token.to_string());
        }
        if keywords.len() == MAX_KEYWORDS {
            break;
        }
    }

    Extraction {
        companies,
        doc_types: Vec::new(),
        keywords,
    }
}

/// The token itself, then the token with one trailing particle removed.
fn token_variants(token: &str) -> Vec<String> {
    let mut variants = vec![token.to_string()];
    for particle in PARTICLES {
        if let Some(stripped) = token.strip_suffix(particle) {
            if stripped.chars().count() >= 2 {
                variants.push(stripped.to_string());
            }
            break;
        }
    }
    variants
}

// ---------------------------------------------------------------------------
// Validation
// ---------------------------------------------------------------------------

/// Reject malformed expansions; a failure here fails the whole pipeline with
/// `ExpansionFailed`.
fn validate(expanded: &ExpandedQuery) -> Result<()> {
    let range = &expanded.date_range;
    let well_formed = |s: &str| s.len() == 8 && s.chars().all(|c| c.is_ascii_digit());
    if !well_formed(&range.begin) || !well_formed(&range.end) {
        return Err(DartSearchError::ExpansionFailed(format!(
            "malformed date range {}..{}",
            range.begin, range.end
        )));
    }
    if range.begin > range.end {
        return Err(DartSearchError::ExpansionFailed(format!(
            "date range begins after it ends: {}..{}",
            range.begin, range.end
        )));
    }
    if expanded.companies.len() != expanded.corp_codes.len() {
        return Err(DartSearchError::ExpansionFailed(
            "companies and corp_codes are misaligned".into(),
        ));
    }
    for code in expanded.corp_codes.iter().flatten() {
        if !CORP_CODE_RE.is_match(code) {
            return Err(DartSearchError::ExpansionFailed(format!(
                "bad corp_code: {code}"
            )));
        }
    }
    for code in &expanded.doc_types {
        if !doc_types::is_valid_code(code) {
            return Err(DartSearchError::ExpansionFailed(format!(
                "bad doc type: {code}"
            )));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use dartsearch_shared::LlmConfig;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn today() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 10, 15).unwrap()
    }

    fn sample_directory() -> Arc<CompanyDirectory> {
        let records: &[(&str, &str, &str)] = &[
            ("00126380", "삼성전자", "005930"),
            ("00155210", "메리츠금융지주", "138040"),
            ("00164742", "현대자동차", "005380"),
        ];
        let xml_entries: String = records
            .iter()
            .map(|(code, name, stock)| {
                format!(
                    "<list><corp_code>{code}</corp_code><corp_name>{name}</corp_name>\
                     <stock_code>{stock}</stock_code></list>"
                )
            })
            .collect();
        let xml = format!("<result>{xml_entries}</result>");

        let mut zip_bytes = Vec::new();
        {
            let mut writer = zip::ZipWriter::new(std::io::Cursor::new(&mut zip_bytes));
            writer
                .start_file("CORPCODE.xml", zip::write::SimpleFileOptions::default())
                .unwrap();
            std::io::Write::write_all(&mut writer, xml.as_bytes()).unwrap();
            writer.finish().unwrap();
        }

        let directory = CompanyDirectory::new();
        directory.rebuild_from_zip(&zip_bytes).unwrap();
        Arc::new(directory)
    }

    #[tokio::test]
    async fn fallback_resolves_fuzzy_company_and_maps_doc_types() {
        let expander = QueryExpander::new(None, sample_directory());
        let cancel = CancellationToken::new();
        let expansion = expander
            .expand("메리츠금융의 지난 3개월 스톡옵션 취소결의", today(), &cancel)
            .await
            .unwrap();

        let q = &expansion.query;
        assert_eq!(q.companies, vec!["메리츠금융지주".to_string()]);
        assert_eq!(q.corp_codes, vec![Some("00155210".to_string())]);
        assert!(q.doc_types.contains(&"B001".to_string()));
        assert!(q.doc_types.contains(&"E004".to_string()));
        assert_eq!(q.date_range.begin, "20240717");
        assert_eq!(q.date_range.end, "20241015");
        assert!(q.keywords.iter().any(|k| k == "스톡옵션"));
    }

    #[tokio::test]
    async fn broad_query_without_company() {
        let expander = QueryExpander::new(None, sample_directory());
        let cancel = CancellationToken::new();
        let expansion = expander
            .expand(
                "최근 1개월 상장회사의 인수 합병 공시에서 합병 비율",
                today(),
                &cancel,
            )
            .await
            .unwrap();

        let q = &expansion.query;
        assert!(q.companies.is_empty());
        assert_eq!(q.date_range.begin, "20240915");
        assert_eq!(q.date_range.end, "20241015");
        assert!(q.doc_types.contains(&"B001".to_string()));
        assert!(q.doc_types.contains(&"E003".to_string()));
    }

    #[tokio::test]
    async fn ticker_code_resolves_directly() {
        let expander = QueryExpander::new(None, sample_directory());
        let cancel = CancellationToken::new();
        let expansion = expander
            .expand("005930 자기주식 취득 공시", today(), &cancel)
            .await
            .unwrap();

        let q = &expansion.query;
        assert_eq!(q.companies, vec!["삼성전자".to_string()]);
        assert_eq!(q.corp_codes, vec![Some("00126380".to_string())]);
    }

    #[tokio::test]
    async fn quoted_name_is_treated_as_company() {
        let expander = QueryExpander::new(None, sample_directory());
        let cancel = CancellationToken::new();
        let expansion = expander
            .expand("\"현대자동차\" 2024년 1분기 공시", today(), &cancel)
            .await
            .unwrap();
        assert_eq!(expansion.query.companies, vec!["현대자동차".to_string()]);
    }

    #[tokio::test]
    async fn unresolved_company_keeps_raw_name_with_warning() {
        let expander = QueryExpander::new(None, sample_directory());
        let cancel = CancellationToken::new();
        let expansion = expander
            .expand("「없는회사」 최근 1개월 공시", today(), &cancel)
            .await
            .unwrap();

        let q = &expansion.query;
        assert_eq!(q.companies, vec!["없는회사".to_string()]);
        assert_eq!(q.corp_codes, vec![None]);
        assert!(expansion
            .warnings
            .iter()
            .any(|w| w.contains("없는회사")));
    }

    #[tokio::test]
    async fn llm_extraction_is_used_and_filtered_to_taxonomy() {
        let server = MockServer::start().await;
        let extraction = serde_json::json!({
            "companies": ["삼성전자"],
            "doc_types": ["B001", "Z999", "E004"],
            "keywords": ["스톡옵션", "취소"]
        });
        Mock::given(method("POST"))
            .and(path("/v1/chat/completions"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "choices": [{"message": {"role": "assistant", "content": extraction.to_string()}}]
            })))
            .mount(&server)
            .await;

        let llm = Arc::new(
            LlmClient::new(&LlmConfig {
                base_url: format!("{}/v1", server.uri()),
                api_key: String::new(),
                model: "test".into(),
                temperature: 0.2,
            })
            .unwrap(),
        );

        let expander = QueryExpander::new(Some(llm), sample_directory());
        let cancel = CancellationToken::new();
        let expansion = expander
            .expand("삼성전자 스톡옵션 취소 공시", today(), &cancel)
            .await
            .unwrap();

        let q = &expansion.query;
        assert_eq!(q.companies, vec!["삼성전자".to_string()]);
        // Z999 is not in the taxonomy and is dropped silently.
        assert_eq!(q.doc_types, vec!["B001".to_string(), "E004".to_string()]);
    }

    #[tokio::test]
    async fn llm_failure_falls_back_to_rules() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/chat/completions"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;

        let llm = Arc::new(
            LlmClient::new(&LlmConfig {
                base_url: format!("{}/v1", server.uri()),
                api_key: String::new(),
                model: "test".into(),
                temperature: 0.2,
            })
            .unwrap(),
        );

        let expander = QueryExpander::new(Some(llm), sample_directory());
        let cancel = CancellationToken::new();
        let expansion = expander
            .expand("메리츠금융의 지난 3개월 스톡옵션 취소결의", today(), &cancel)
            .await
            .unwrap();

        assert_eq!(expansion.query.companies, vec!["메리츠금융지주".to_string()]);
        assert!(expansion
            .warnings
            .iter()
            .any(|w| w.contains("LLM extraction unavailable")));
    }

    #[test]
    fn validation_rejects_inverted_range() {
        let expanded = ExpandedQuery {
            companies: vec![],
            corp_codes: vec![],
            doc_types: vec![],
            date_range: dartsearch_shared::DateRange {
                begin: "20241231".into(),
                end: "20240101".into(),
            },
            keywords: vec![],
            detail_terms: vec![],
            original_query: "q".into(),
        };
        assert!(matches!(
            validate(&expanded),
            Err(DartSearchError::ExpansionFailed(_))
        ));
    }

    #[test]
    fn validation_rejects_bad_corp_code() {
        let expanded = ExpandedQuery {
            companies: vec!["회사".into()],
            corp_codes: vec![Some("1234".into())],
            doc_types: vec![],
            date_range: dartsearch_shared::DateRange {
                begin: "20240101".into(),
                end: "20240601".into(),
            },
            keywords: vec![],
            detail_terms: vec![],
            original_query: "q".into(),
        };
        assert!(validate(&expanded).is_err());
    }
}
