//! Wire adapter for the DART open API.
//!
//! Speaks the catalogue's JSON list endpoint, the ZIP-of-XML document
//! archive, the HTML web viewer, and the structured major-report detail
//! endpoints. Everything goes through the shared rate-limited client, and
//! every body lands in the content cache under its namespace.

use std::collections::BTreeMap;
use std::io::Read;
use std::sync::Arc;

use dartsearch_net::{fingerprint, ContentCache, RateLimitedClient, TTL_BODY, TTL_SEARCH};
use dartsearch_shared::{DartConfig, DartSearchError, FilingRef, Result};
use serde::Deserialize;
use serde_json::Value;
use tokio_util::sync::CancellationToken;
use tracing::{debug, instrument, warn};

use crate::cleanup;

/// Catalogue status meaning "no matching data".
const STATUS_NO_DATA: &str = "013";

/// Catalogue status meaning success.
const STATUS_OK: &str = "000";

// ---------------------------------------------------------------------------
// Catalogue search
// ---------------------------------------------------------------------------

/// One catalogue sub-query, before pagination.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CatalogQuery {
    pub bgn_de: String,
    pub end_de: String,
    pub corp_code: Option<String>,
    pub pblntf_detail_ty: Option<String>,
    pub page_count: u32,
}

/// One page of catalogue results.
#[derive(Debug, Clone)]
pub struct CatalogPage {
    pub page_no: u32,
    pub total_page: u32,
    pub total_count: u32,
    pub refs: Vec<FilingRef>,
}

#[derive(Debug, Deserialize)]
struct RawCatalogPage {
    status: String,
    #[serde(default)]
    message: String,
    #[serde(default)]
    page_no: u32,
    #[serde(default)]
    total_page: u32,
    #[serde(default)]
    total_count: u32,
    #[serde(default)]
    list: Vec<RawCatalogEntry>,
}

#[derive(Debug, Deserialize)]
struct RawCatalogEntry {
    #[serde(default)]
    corp_code: String,
    #[serde(default)]
    corp_name: String,
    #[serde(default)]
    report_nm: String,
    #[serde(default)]
    rcept_no: String,
    #[serde(default)]
    flr_nm: String,
    #[serde(default)]
    rcept_dt: String,
}

/// Structured detail endpoints for doc types that have one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StructuredEndpoint {
    /// 자기주식취득 결정
    TreasuryStockAcquisition,
    /// 자기주식처분 결정
    TreasuryStockDisposal,
    /// 유상증자 결정
    PaidInCapitalIncrease,
    /// 무상증자 결정
    FreeCapitalIncrease,
    /// 회사합병 결정
    Merger,
    /// 회사분할 결정
    Division,
    /// 전환사채 발행 결정
    ConvertibleBond,
    /// 정기보고서 재무제표
    FinancialStatements,
}

impl StructuredEndpoint {
    /// API path segment under the DART root.
    pub fn path(self) -> &'static str {
        match self {
            Self::TreasuryStockAcquisition => "tsstkAqDecsn.json",
            Self::TreasuryStockDisposal => "tsstkDpDecsn.json",
            Self::PaidInCapitalIncrease => "piicDecsn.json",
            Self::FreeCapitalIncrease => "fricDecsn.json",
            Self::Merger => "cmpMgDecsn.json",
            Self::Division => "cmpDvDecsn.json",
            Self::ConvertibleBond => "cvbdIsDecsn.json",
            Self::FinancialStatements => "fnlttSinglAcntAll.json",
        }
    }

    /// Endpoint for a Korean detail term recognized in the query.
    pub fn for_detail_term(term: &str) -> Option<Self> {
        match term {
            "자기주식취득" => Some(Self::TreasuryStockAcquisition),
            "자기주식처분" => Some(Self::TreasuryStockDisposal),
            "유상증자" => Some(Self::PaidInCapitalIncrease),
            "무상증자" => Some(Self::FreeCapitalIncrease),
            "회사합병" | "합병" => Some(Self::Merger),
            "회사분할" | "분할" => Some(Self::Division),
            "전환사채발행" | "전환사채" => Some(Self::ConvertibleBond),
            _ => None,
        }
    }

    /// Endpoint for a bare doc-type code (periodic reports only; major-issue
    /// reports need a detail term to pick the sub-report).
    pub fn for_doc_type(code: &str) -> Option<Self> {
        match code {
            "A001" | "A002" | "A003" => Some(Self::FinancialStatements),
            _ => None,
        }
    }
}

// ---------------------------------------------------------------------------
// Transport
// ---------------------------------------------------------------------------

/// Shared adapter over the DART endpoints.
pub struct DartTransport {
    http: Arc<RateLimitedClient>,
    cache: Arc<ContentCache>,
    config: DartConfig,
}

impl DartTransport {
    pub fn new(
        http: Arc<RateLimitedClient>,
        cache: Arc<ContentCache>,
        config: DartConfig,
    ) -> Self {
        Self {
            http,
            cache,
            config,
        }
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}/{}", self.config.base_url.trim_end_matches('/'), path)
    }

    /// Web-viewer URL for a receipt number (provenance and HTML fallback).
    pub fn viewer_url(&self, rcept_no: &str) -> String {
        format!(
            "{}/dsaf001/main.do?rcpNo={rcept_no}",
            self.config.viewer_url.trim_end_matches('/')
        )
    }

    /// Fetch one catalogue page, through the cache unless `bypass_cache`.
    ///
    /// A bypassed fetch still refreshes the cached entry, so later pages of
    /// the same window stay warm.
    #[instrument(skip(self, cancel, query))]
    pub async fn search_page(
        &self,
        query: &CatalogQuery,
        page_no: u32,
        bypass_cache: bool,
        cancel: &CancellationToken,
    ) -> Result<CatalogPage> {
        let canonical = format!(
            "bgn={}&end={}&corp={}&ty={}&page={}&count={}",
            query.bgn_de,
            query.end_de,
            query.corp_code.as_deref().unwrap_or(""),
            query.pblntf_detail_ty.as_deref().unwrap_or(""),
            page_no,
            query.page_count,
        );
        let key = fingerprint("search", &canonical);

        let body = if bypass_cache {
            let fresh = self.fetch_list_body(query, page_no, cancel).await?;
            let fresh = Arc::new(fresh);
            self.cache.put(&key, fresh.clone(), TTL_SEARCH);
            fresh
        } else {
            self.cache
                .get_or_fetch(&key, TTL_SEARCH, || {
                    self.fetch_list_body(query, page_no, cancel)
                })
                .await?
        };

        parse_catalog_page(&body)
    }

    async fn fetch_list_body(
        &self,
        query: &CatalogQuery,
        page_no: u32,
        cancel: &CancellationToken,
    ) -> Result<String> {
        let page_no_s = page_no.to_string();
        let page_count_s = query.page_count.to_string();
        let mut params: Vec<(&str, &str)> = vec![
            ("crtfc_key", self.config.api_key.as_str()),
            ("bgn_de", query.bgn_de.as_str()),
            ("end_de", query.end_de.as_str()),
            ("page_no", page_no_s.as_str()),
            ("page_count", page_count_s.as_str()),
            ("sort", "date"),
            ("sort_mth", "desc"),
        ];
        if let Some(corp) = query.corp_code.as_deref() {
            params.push(("corp_code", corp));
        }
        if let Some(ty) = query.pblntf_detail_ty.as_deref() {
            params.push(("pblntf_detail_ty", ty));
        }

        let response = self
            .http
            .get(&self.endpoint("list.json"), &params, cancel)
            .await?;
        if !response.is_success() {
            return Err(DartSearchError::Network(format!(
                "catalogue search: HTTP {}",
                response.status
            )));
        }

        let body = response.text();
        // Validate before the cache sees it: quota or key errors come back
        // as 200 with a non-zero status field.
        let raw: RawCatalogPage = serde_json::from_str(&body)
            .map_err(|e| DartSearchError::parse(format!("catalogue response: {e}")))?;
        match raw.status.as_str() {
            STATUS_OK | STATUS_NO_DATA => Ok(body),
            "020" | "021" => Err(DartSearchError::RateLimited(format!(
                "catalogue quota: {}",
                raw.message
            ))),
            other => Err(DartSearchError::Network(format!(
                "catalogue status {other}: {}",
                raw.message
            ))),
        }
    }

    /// Download and extract the ZIP-of-XML original document. Returns the
    /// cleaned full text (the cache keeps it untruncated).
    #[instrument(skip(self, cancel))]
    pub async fn fetch_archive(
        &self,
        rcept_no: &str,
        cancel: &CancellationToken,
    ) -> Result<Arc<String>> {
        let key = fingerprint("archive", rcept_no);
        self.cache
            .get_or_fetch(&key, TTL_BODY, || async {
                let params = [
                    ("crtfc_key", self.config.api_key.as_str()),
                    ("rcept_no", rcept_no),
                ];
                let response = self
                    .http
                    .get(&self.endpoint("document.xml"), &params, cancel)
                    .await?;
                if !response.is_success() {
                    return Err(DartSearchError::fetch(
                        rcept_no,
                        format!("archive HTTP {}", response.status),
                    ));
                }
                extract_archive_text(&response.body, rcept_no)
            })
            .await
    }

    /// Fetch the web-viewer page and reduce it to text. Last-resort source.
    #[instrument(skip(self, cancel))]
    pub async fn fetch_viewer(
        &self,
        rcept_no: &str,
        cancel: &CancellationToken,
    ) -> Result<Arc<String>> {
        let key = fingerprint("viewer", rcept_no);
        self.cache
            .get_or_fetch(&key, TTL_BODY, || async {
                let url = self.viewer_url(rcept_no);
                let response = self.http.get(&url, &[], cancel).await?;
                if !response.is_success() {
                    return Err(DartSearchError::fetch(
                        rcept_no,
                        format!("viewer HTTP {}", response.status),
                    ));
                }
                let text = cleanup::html_to_text(&response.text());
                if text.is_empty() {
                    return Err(DartSearchError::fetch(rcept_no, "viewer page had no text"));
                }
                Ok(text)
            })
            .await
    }

    /// Query a structured detail endpoint and return the fields of the entry
    /// matching `rcept_no`. An empty map means the endpoint had nothing for
    /// this filing; callers fall back to the archive.
    #[instrument(skip(self, cancel, window))]
    pub async fn fetch_structured(
        &self,
        endpoint: StructuredEndpoint,
        corp_code: &str,
        rcept_no: &str,
        window: (&str, &str),
        cancel: &CancellationToken,
    ) -> Result<BTreeMap<String, Value>> {
        let canonical = format!("{}:{corp_code}:{rcept_no}", endpoint.path());
        let key = fingerprint("major-report", &canonical);

        let body = self
            .cache
            .get_or_fetch(&key, TTL_BODY, || async {
                let year = &rcept_no[..rcept_no.len().min(4)];
                let (bgn_de, end_de) = window;
                let mut params: Vec<(&str, &str)> = vec![
                    ("crtfc_key", self.config.api_key.as_str()),
                    ("corp_code", corp_code),
                ];
                if endpoint == StructuredEndpoint::FinancialStatements {
                    params.push(("bsns_year", year));
                    params.push(("reprt_code", "11011"));
                } else {
                    params.push(("bgn_de", bgn_de));
                    params.push(("end_de", end_de));
                }

                let response = self
                    .http
                    .get(&self.endpoint(endpoint.path()), &params, cancel)
                    .await?;
                if !response.is_success() {
                    return Err(DartSearchError::fetch(
                        rcept_no,
                        format!("structured HTTP {}", response.status),
                    ));
                }
                Ok(response.text())
            })
            .await?;

        let parsed: Value = serde_json::from_str(&body)
            .map_err(|e| DartSearchError::parse(format!("structured response: {e}")))?;
        let status = parsed["status"].as_str().unwrap_or_default();
        if status == STATUS_NO_DATA {
            return Ok(BTreeMap::new());
        }
        if status != STATUS_OK {
            warn!(status, "structured endpoint returned non-ok status");
            return Ok(BTreeMap::new());
        }

        let entries = parsed["list"].as_array().cloned().unwrap_or_default();
        let matched = entries.iter().find(|entry| {
            entry["rcept_no"].as_str() == Some(rcept_no)
                || entry["rcp_no"].as_str() == Some(rcept_no)
        });

        let mut fields = BTreeMap::new();
        if let Some(Value::Object(map)) = matched {
            for (field, value) in map {
                let skip = matches!(field.as_str(), "rcept_no" | "rcp_no" | "corp_code");
                let empty = value.as_str().is_some_and(|s| s.trim().is_empty() || s == "-");
                if !skip && !empty && !value.is_null() {
                    fields.insert(field.clone(), value.clone());
                }
            }
        }
        debug!(fields = fields.len(), "structured entry matched");
        Ok(fields)
    }

    /// Download the corp-code catalogue ZIP for the company directory.
    pub async fn fetch_corp_catalogue(&self, cancel: &CancellationToken) -> Result<Vec<u8>> {
        let params = [("crtfc_key", self.config.api_key.as_str())];
        let response = self
            .http
            .get(&self.endpoint("corpCode.xml"), &params, cancel)
            .await?;
        if !response.is_success() {
            return Err(DartSearchError::Network(format!(
                "corp catalogue: HTTP {}",
                response.status
            )));
        }
        if !is_zip(&response.body) {
            return Err(DartSearchError::parse(
                "corp catalogue response is not a ZIP (bad API key?)",
            ));
        }
        Ok(response.body)
    }
}

// ---------------------------------------------------------------------------
// Body helpers
// ---------------------------------------------------------------------------

fn is_zip(bytes: &[u8]) -> bool {
    bytes.starts_with(b"PK\x03\x04")
}

fn parse_catalog_page(body: &str) -> Result<CatalogPage> {
    let raw: RawCatalogPage = serde_json::from_str(body)
        .map_err(|e| DartSearchError::parse(format!("catalogue page: {e}")))?;

    if raw.status == STATUS_NO_DATA {
        return Ok(CatalogPage {
            page_no: raw.page_no.max(1),
            total_page: 0,
            total_count: 0,
            refs: Vec::new(),
        });
    }

    let refs = raw
        .list
        .into_iter()
        .filter(|e| !e.rcept_no.is_empty())
        .map(|e| FilingRef {
            rcept_no: e.rcept_no,
            corp_name: e.corp_name,
            corp_code: e.corp_code,
            report_nm: e.report_nm,
            rcept_dt: e.rcept_dt,
            flr_nm: e.flr_nm,
            pblntf_detail_ty: None,
        })
        .collect();

    Ok(CatalogPage {
        page_no: raw.page_no.max(1),
        total_page: raw.total_page,
        total_count: raw.total_count,
        refs,
    })
}

/// Unzip the archive and assemble cleaned text, main document first.
fn extract_archive_text(bytes: &[u8], rcept_no: &str) -> Result<String> {
    if !is_zip(bytes) {
        // Error responses come back as bare XML.
        let message = cleanup::clean_markup(&String::from_utf8_lossy(bytes));
        return Err(DartSearchError::fetch(
            rcept_no,
            format!("archive error: {}", cleanup::truncate_chars(&message, 200)),
        ));
    }

    let cursor = std::io::Cursor::new(bytes);
    let mut archive = zip::ZipArchive::new(cursor)
        .map_err(|e| DartSearchError::fetch(rcept_no, format!("bad archive zip: {e}")))?;

    let mut sections: Vec<(bool, String)> = Vec::new();
    for index in 0..archive.len() {
        let mut member = archive
            .by_index(index)
            .map_err(|e| DartSearchError::fetch(rcept_no, format!("archive member: {e}")))?;
        let name = member.name().to_string();
        let mut raw = Vec::new();
        member
            .read_to_end(&mut raw)
            .map_err(|e| DartSearchError::fetch(rcept_no, format!("archive read: {e}")))?;

        let text = cleanup::clean_markup(&String::from_utf8_lossy(&raw));
        if text.is_empty() {
            continue;
        }
        let lower = name.to_lowercase();
        let is_main = lower.contains(rcept_no) || lower.contains("main") || lower.contains("body");
        sections.push((is_main, text));
    }

    // Main document first, attachments after.
    sections.sort_by_key(|(is_main, _)| !*is_main);
    let text = sections
        .into_iter()
        .map(|(_, t)| t)
        .collect::<Vec<_>>()
        .join("\n\n");

    if text.is_empty() {
        return Err(DartSearchError::fetch(rcept_no, "archive held no text"));
    }
    Ok(text)
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn transport_for(server: &MockServer) -> DartTransport {
        let http = Arc::new(
            RateLimitedClient::new("dartsearch-test", std::time::Duration::from_secs(5)).unwrap(),
        );
        let cache = Arc::new(ContentCache::new(8 * 1024 * 1024));
        DartTransport::new(
            http,
            cache,
            DartConfig {
                api_key: "test-key".into(),
                base_url: server.uri(),
                viewer_url: server.uri(),
                daily_rate_limit: 1000,
                burst_per_second: 5,
            },
        )
    }

    fn catalog_body() -> serde_json::Value {
        serde_json::json!({
            "status": "000",
            "message": "정상",
            "page_no": 1,
            "page_count": 100,
            "total_count": 2,
            "total_page": 1,
            "list": [
                {
                    "corp_code": "00126380",
                    "corp_name": "삼성전자",
                    "report_nm": "주요사항보고서(합병결정)",
                    "rcept_no": "20241001000123",
                    "flr_nm": "삼성전자",
                    "rcept_dt": "20241001",
                    "rm": ""
                },
                {
                    "corp_code": "00155210",
                    "corp_name": "메리츠금융지주",
                    "report_nm": "주요사항보고서(자기주식취득결정)",
                    "rcept_no": "20240930000077",
                    "flr_nm": "메리츠금융지주",
                    "rcept_dt": "20240930",
                    "rm": ""
                }
            ]
        })
    }

    fn sample_query() -> CatalogQuery {
        CatalogQuery {
            bgn_de: "20240901".into(),
            end_de: "20241015".into(),
            corp_code: None,
            pblntf_detail_ty: Some("B001".into()),
            page_count: 100,
        }
    }

    #[tokio::test]
    async fn search_page_parses_and_caches() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/list.json"))
            .and(query_param("pblntf_detail_ty", "B001"))
            .respond_with(ResponseTemplate::new(200).set_body_json(catalog_body()))
            .expect(1)
            .mount(&server)
            .await;

        let transport = transport_for(&server);
        let cancel = CancellationToken::new();

        for _ in 0..2 {
            let page = transport
                .search_page(&sample_query(), 1, false, &cancel)
                .await
                .unwrap();
            assert_eq!(page.total_page, 1);
            assert_eq!(page.refs.len(), 2);
            assert_eq!(page.refs[0].rcept_no, "20241001000123");
        }
    }

    #[tokio::test]
    async fn no_data_status_yields_empty_page() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/list.json"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "status": "013", "message": "조회된 데이타가 없습니다."
            })))
            .mount(&server)
            .await;

        let transport = transport_for(&server);
        let cancel = CancellationToken::new();
        let page = transport
            .search_page(&sample_query(), 1, false, &cancel)
            .await
            .unwrap();
        assert!(page.refs.is_empty());
        assert_eq!(page.total_page, 0);
    }

    #[tokio::test]
    async fn quota_status_maps_to_rate_limited() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/list.json"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "status": "020", "message": "요청 제한을 초과하였습니다."
            })))
            .mount(&server)
            .await;

        let transport = transport_for(&server);
        let cancel = CancellationToken::new();
        let err = transport
            .search_page(&sample_query(), 1, false, &cancel)
            .await
            .unwrap_err();
        assert!(matches!(err, DartSearchError::RateLimited(_)));
    }

    #[tokio::test]
    async fn archive_extracts_main_document_first() {
        let rcept_no = "20241001000123";
        let mut zip_bytes = Vec::new();
        {
            let mut writer = zip::ZipWriter::new(std::io::Cursor::new(&mut zip_bytes));
            let options = zip::write::SimpleFileOptions::default();
            writer.start_file("attachment_1.xml", options).unwrap();
            std::io::Write::write_all(&mut writer, "<P>첨부 문서</P>".as_bytes()).unwrap();
            writer
                .start_file(format!("{rcept_no}.xml"), options)
                .unwrap();
            std::io::Write::write_all(
                &mut writer,
                "<DOCUMENT><P>합병비율은 1 : 0.5 입니다</P></DOCUMENT>".as_bytes(),
            )
            .unwrap();
            writer.finish().unwrap();
        }

        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/document.xml"))
            .and(query_param("rcept_no", rcept_no))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(zip_bytes))
            .mount(&server)
            .await;

        let transport = transport_for(&server);
        let cancel = CancellationToken::new();
        let text = transport.fetch_archive(rcept_no, &cancel).await.unwrap();
        let main_pos = text.find("합병비율").unwrap();
        let attach_pos = text.find("첨부 문서").unwrap();
        assert!(main_pos < attach_pos);
    }

    #[tokio::test]
    async fn archive_error_xml_is_a_fetch_failure() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/document.xml"))
            .respond_with(ResponseTemplate::new(200).set_body_string(
                "<?xml version=\"1.0\"?><result><err_code>013</err_code>\
                 <err_msg>조회된 데이타가 없습니다.</err_msg></result>",
            ))
            .mount(&server)
            .await;

        let transport = transport_for(&server);
        let cancel = CancellationToken::new();
        let err = transport
            .fetch_archive("20240101000001", &cancel)
            .await
            .unwrap_err();
        assert!(matches!(err, DartSearchError::FetchFailed { .. }));
    }

    #[tokio::test]
    async fn structured_endpoint_matches_by_rcept_no() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/tsstkAqDecsn.json"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "status": "000",
                "message": "정상",
                "list": [
                    {"rcept_no": "20240930000077", "aqpln_stk_ostk": "1,000,000",
                     "aq_pp": "주주가치 제고", "corp_code": "00155210", "blank": " "},
                    {"rcept_no": "20240801000011", "aqpln_stk_ostk": "500,000"}
                ]
            })))
            .mount(&server)
            .await;

        let transport = transport_for(&server);
        let cancel = CancellationToken::new();
        let fields = transport
            .fetch_structured(
                StructuredEndpoint::TreasuryStockAcquisition,
                "00155210",
                "20240930000077",
                ("20240701", "20241015"),
                &cancel,
            )
            .await
            .unwrap();

        assert_eq!(fields["aqpln_stk_ostk"], "1,000,000");
        assert_eq!(fields["aq_pp"], "주주가치 제고");
        // Identity and empty fields are dropped.
        assert!(!fields.contains_key("corp_code"));
        assert!(!fields.contains_key("blank"));
    }

    #[tokio::test]
    async fn viewer_fallback_extracts_text() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/dsaf001/main.do"))
            .respond_with(ResponseTemplate::new(200).set_body_string(
                "<html><body><nav>메뉴</nav><main><p>스톡옵션 취소 결의</p></main></body></html>",
            ))
            .mount(&server)
            .await;

        let transport = transport_for(&server);
        let cancel = CancellationToken::new();
        let text = transport
            .fetch_viewer("20240101000001", &cancel)
            .await
            .unwrap();
        assert!(text.contains("스톡옵션 취소 결의"));
        assert!(!text.contains("메뉴"));
    }

    #[test]
    fn detail_term_mapping() {
        assert_eq!(
            StructuredEndpoint::for_detail_term("자기주식취득"),
            Some(StructuredEndpoint::TreasuryStockAcquisition)
        );
        assert_eq!(
            StructuredEndpoint::for_detail_term("합병"),
            Some(StructuredEndpoint::Merger)
        );
        assert_eq!(StructuredEndpoint::for_detail_term("배당"), None);
        assert_eq!(
            StructuredEndpoint::for_doc_type("A001"),
            Some(StructuredEndpoint::FinancialStatements)
        );
        assert_eq!(StructuredEndpoint::for_doc_type("B001"), None);
    }
}
