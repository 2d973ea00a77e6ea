//! Company directory and fuzzy name resolution.
//!
//! The full corp-code catalogue is downloaded once (a ZIP holding one XML
//! file), parsed into an immutable snapshot, and rebuilt only after its TTL
//! lapses. Rebuilds swap the snapshot atomically; readers never observe a
//! half-built directory.

use std::io::Read;
use std::sync::{Arc, RwLock};
use std::sync::LazyLock;
use std::time::Instant;

use dartsearch_net::TTL_DIRECTORY;
use dartsearch_shared::{DartSearchError, Result};
use regex::Regex;
use tracing::{info, instrument};

/// Candidates returned by [`CompanyDirectory::resolve`].
const MAX_CANDIDATES: usize = 5;

/// Minimum score to appear in the candidate list.
const RESOLVE_THRESHOLD: u8 = 60;

/// Minimum score for the single best-match shortcut.
const BEST_THRESHOLD: u8 = 80;

/// One directory row.
#[derive(Debug, Clone)]
pub struct CompanyRecord {
    pub corp_code: String,
    pub corp_name: String,
    pub stock_code: Option<String>,
}

/// A scored resolution candidate.
#[derive(Debug, Clone)]
pub struct Candidate {
    pub corp_name: String,
    pub corp_code: String,
    /// Similarity in `[0, 100]`.
    pub score: u8,
}

struct Snapshot {
    records: Vec<CompanyRecord>,
    /// Normalized names aligned 1:1 with `records`.
    normalized: Vec<String>,
    built_at: Instant,
}

/// Process-wide company directory with copy-on-rebuild snapshots.
pub struct CompanyDirectory {
    snapshot: RwLock<Option<Arc<Snapshot>>>,
}

impl Default for CompanyDirectory {
    fn default() -> Self {
        Self::new()
    }
}

impl CompanyDirectory {
    pub fn new() -> Self {
        Self {
            snapshot: RwLock::new(None),
        }
    }

    /// Whether the directory needs (re)building.
    pub fn is_stale(&self) -> bool {
        let guard = self.snapshot.read().expect("directory lock poisoned");
        match guard.as_ref() {
            Some(snap) => snap.built_at.elapsed() >= TTL_DIRECTORY,
            None => true,
        }
    }

    /// Replace the snapshot with one built from catalogue ZIP bytes.
    #[instrument(skip_all)]
    pub fn rebuild_from_zip(&self, zip_bytes: &[u8]) -> Result<usize> {
        let xml = read_first_member(zip_bytes)?;
        let records = parse_corp_catalogue(&xml)?;
        if records.is_empty() {
            return Err(DartSearchError::parse("corp catalogue held no companies"));
        }

        let normalized = records.iter().map(|r| normalize_name(&r.corp_name)).collect();
        let count = records.len();
        let snap = Arc::new(Snapshot {
            records,
            normalized,
            built_at: Instant::now(),
        });

        *self.snapshot.write().expect("directory lock poisoned") = Some(snap);
        info!(companies = count, "company directory rebuilt");
        Ok(count)
    }

    fn current(&self) -> Option<Arc<Snapshot>> {
        self.snapshot
            .read()
            .expect("directory lock poisoned")
            .clone()
    }

    /// Fuzzy-match `name`: up to five candidates scoring ≥ 60, best first.
    /// Ties break toward the shorter canonical name, then lexicographic.
    pub fn resolve(&self, name: &str) -> Vec<Candidate> {
        let Some(snap) = self.current() else {
            return Vec::new();
        };
        let query_norm = normalize_name(name);
        if query_norm.is_empty() {
            return Vec::new();
        }

        let mut candidates: Vec<Candidate> = snap
            .records
            .iter()
            .zip(snap.normalized.iter())
            .filter_map(|(record, norm)| {
                let score = similarity(&query_norm, name, norm, &record.corp_name);
                (score >= RESOLVE_THRESHOLD).then(|| Candidate {
                    corp_name: record.corp_name.clone(),
                    corp_code: record.corp_code.clone(),
                    score,
                })
            })
            .collect();

        candidates.sort_by(|a, b| {
            b.score
                .cmp(&a.score)
                .then(a.corp_name.chars().count().cmp(&b.corp_name.chars().count()))
                .then(a.corp_name.cmp(&b.corp_name))
        });
        candidates.truncate(MAX_CANDIDATES);
        candidates
    }

    /// The single top candidate scoring ≥ 80, if any.
    pub fn best(&self, name: &str) -> Option<Candidate> {
        self.resolve(name)
            .into_iter()
            .next()
            .filter(|c| c.score >= BEST_THRESHOLD)
    }

    /// Exact lookup by 6-digit stock (ticker) code.
    pub fn by_stock_code(&self, stock_code: &str) -> Option<CompanyRecord> {
        let snap = self.current()?;
        snap.records
            .iter()
            .find(|r| r.stock_code.as_deref() == Some(stock_code))
            .cloned()
    }
}

// ---------------------------------------------------------------------------
// Catalogue parsing
// ---------------------------------------------------------------------------

/// Read the first file inside the catalogue ZIP as text.
fn read_first_member(zip_bytes: &[u8]) -> Result<String> {
    let cursor = std::io::Cursor::new(zip_bytes);
    let mut archive = zip::ZipArchive::new(cursor)
        .map_err(|e| DartSearchError::parse(format!("corp catalogue zip: {e}")))?;
    if archive.is_empty() {
        return Err(DartSearchError::parse("corp catalogue zip is empty"));
    }
    let mut member = archive
        .by_index(0)
        .map_err(|e| DartSearchError::parse(format!("corp catalogue member: {e}")))?;
    let mut raw = Vec::new();
    member
        .read_to_end(&mut raw)
        .map_err(|e| DartSearchError::parse(format!("corp catalogue read: {e}")))?;
    Ok(String::from_utf8_lossy(&raw).into_owned())
}

/// Parse `<list>` entries from the catalogue XML. The file is flat and
/// machine-generated, so field-level extraction is sufficient.
fn parse_corp_catalogue(xml: &str) -> Result<Vec<CompanyRecord>> {
    static LIST_RE: LazyLock<Regex> =
        LazyLock::new(|| Regex::new(r"(?s)<list>(.*?)</list>").expect("valid regex"));

    let mut records = Vec::new();
    for caps in LIST_RE.captures_iter(xml) {
        let block = &caps[1];
        let corp_code = xml_field(block, "corp_code");
        let corp_name = xml_field(block, "corp_name");
        if corp_code.is_empty() || corp_name.is_empty() {
            continue;
        }
        let stock_code = {
            let sc = xml_field(block, "stock_code");
            let sc = sc.trim();
            (!sc.is_empty()).then(|| sc.to_string())
        };
        records.push(CompanyRecord {
            corp_code,
            corp_name,
            stock_code,
        });
    }
    Ok(records)
}

fn xml_field(block: &str, tag: &str) -> String {
    let open = format!("<{tag}>");
    let close = format!("</{tag}>");
    match (block.find(&open), block.find(&close)) {
        (Some(start), Some(end)) if start + open.len() <= end => {
            block[start + open.len()..end].trim().to_string()
        }
        _ => String::new(),
    }
}

// ---------------------------------------------------------------------------
// Scoring
// ---------------------------------------------------------------------------

/// Strip corporate suffixes, whitespace, and casing.
pub fn normalize_name(name: &str) -> String {
    let mut out = name.to_lowercase();
    for suffix in ["주식회사", "(주)", "㈜", "유한회사", "(유)"] {
        out = out.replace(suffix, "");
    }
    out.chars().filter(|c| !c.is_whitespace()).collect()
}

/// Blend of bigram Jaccard on the normalized names and edit-distance
/// similarity on the raw names, in `[0, 100]`.
fn similarity(query_norm: &str, query_raw: &str, cand_norm: &str, cand_raw: &str) -> u8 {
    if query_norm == cand_norm {
        return 100;
    }
    let jaccard = bigram_jaccard(query_norm, cand_norm);
    let edit = edit_similarity(query_raw, cand_raw);
    ((jaccard * 0.5 + edit * 0.5) * 100.0).round() as u8
}

/// Jaccard coefficient over character bigrams.
fn bigram_jaccard(a: &str, b: &str) -> f64 {
    let grams_a = bigrams(a);
    let grams_b = bigrams(b);
    if grams_a.is_empty() || grams_b.is_empty() {
        return if a == b { 1.0 } else { 0.0 };
    }
    let intersection = grams_a.iter().filter(|g| grams_b.contains(*g)).count();
    let union = grams_a.len() + grams_b.len() - intersection;
    intersection as f64 / union as f64
}

fn bigrams(text: &str) -> Vec<(char, char)> {
    let chars: Vec<char> = text.chars().collect();
    let mut grams: Vec<(char, char)> = chars.windows(2).map(|w| (w[0], w[1])).collect();
    grams.sort_unstable();
    grams.dedup();
    grams
}

/// `1 - levenshtein/max_len`, on normalized-whitespace raw names.
fn edit_similarity(a: &str, b: &str) -> f64 {
    let a: Vec<char> = a.chars().filter(|c| !c.is_whitespace()).collect();
    let b: Vec<char> = b.chars().filter(|c| !c.is_whitespace()).collect();
    let max_len = a.len().max(b.len());
    if max_len == 0 {
        return 1.0;
    }
    1.0 - levenshtein(&a, &b) as f64 / max_len as f64
}

fn levenshtein(a: &[char], b: &[char]) -> usize {
    let mut prev: Vec<usize> = (0..=b.len()).collect();
    let mut current = vec![0usize; b.len() + 1];

    for (i, ca) in a.iter().enumerate() {
        current[0] = i + 1;
        for (j, cb) in b.iter().enumerate() {
            let substitution = prev[j] + usize::from(ca != cb);
            current[j + 1] = substitution.min(prev[j + 1] + 1).min(current[j] + 1);
        }
        std::mem::swap(&mut prev, &mut current);
    }
    prev[b.len()]
}

#[cfg(test)]
mod tests {
    use super::*;

    fn directory_with(records: &[(&str, &str, Option<&str>)]) -> CompanyDirectory {
        let xml_entries: String = records
            .iter()
            .map(|(code, name, stock)| {
                format!(
                    "<list><corp_code>{code}</corp_code><corp_name>{name}</corp_name>\
                     <stock_code>{}</stock_code><modify_date>20240101</modify_date></list>",
                    stock.unwrap_or(" ")
                )
            })
            .collect();
        let xml = format!("<result>{xml_entries}</result>");

        let mut zip_bytes = Vec::new();
        {
            let mut writer =
                zip::ZipWriter::new(std::io::Cursor::new(&mut zip_bytes));
            writer
                .start_file("CORPCODE.xml", zip::write::SimpleFileOptions::default())
                .unwrap();
            std::io::Write::write_all(&mut writer, xml.as_bytes()).unwrap();
            writer.finish().unwrap();
        }

        let directory = CompanyDirectory::new();
        directory.rebuild_from_zip(&zip_bytes).unwrap();
        directory
    }

    fn sample_directory() -> CompanyDirectory {
        directory_with(&[
            ("00126380", "삼성전자", Some("005930")),
            ("00126390", "삼성전기", Some("009150")),
            ("00155210", "메리츠금융지주", Some("138040")),
            ("00155220", "메리츠증권", None),
            ("00164742", "현대자동차", Some("005380")),
        ])
    }

    #[test]
    fn normalization_strips_corporate_suffixes() {
        assert_eq!(normalize_name("주식회사 메리츠금융지주"), "메리츠금융지주");
        assert_eq!(normalize_name("(주)카카오"), "카카오");
        assert_eq!(normalize_name("삼성전자 "), "삼성전자");
    }

    #[test]
    fn exact_name_scores_100() {
        let directory = sample_directory();
        let candidates = directory.resolve("삼성전자");
        assert_eq!(candidates[0].corp_name, "삼성전자");
        assert_eq!(candidates[0].score, 100);
        assert_eq!(candidates[0].corp_code, "00126380");
    }

    #[test]
    fn suffixed_query_still_matches_exactly() {
        let directory = sample_directory();
        let best = directory.best("주식회사 삼성전자").expect("match");
        assert_eq!(best.corp_name, "삼성전자");
        assert_eq!(best.score, 100);
    }

    #[test]
    fn fuzzy_prefix_query_resolves() {
        let directory = sample_directory();
        let candidates = directory.resolve("메리츠금융");
        assert!(!candidates.is_empty());
        assert_eq!(candidates[0].corp_name, "메리츠금융지주");
        assert!(candidates[0].score >= RESOLVE_THRESHOLD);
    }

    #[test]
    fn unrelated_names_do_not_resolve() {
        let directory = sample_directory();
        assert!(directory.resolve("한국조선해양").is_empty());
        assert!(directory.best("한국조선해양").is_none());
    }

    #[test]
    fn ties_prefer_shorter_then_lexicographic() {
        let directory = directory_with(&[
            ("00000001", "가나다홀딩스", None),
            ("00000002", "가나다", None),
        ]);
        let candidates = directory.resolve("가나다");
        assert_eq!(candidates[0].corp_name, "가나다");
    }

    #[test]
    fn stock_code_lookup_is_exact() {
        let directory = sample_directory();
        let record = directory.by_stock_code("005930").expect("found");
        assert_eq!(record.corp_name, "삼성전자");
        assert!(directory.by_stock_code("999999").is_none());
    }

    #[test]
    fn empty_directory_is_stale() {
        let directory = CompanyDirectory::new();
        assert!(directory.is_stale());
        assert!(directory.resolve("삼성전자").is_empty());
    }

    #[test]
    fn levenshtein_basics() {
        let a: Vec<char> = "삼성전자".chars().collect();
        let b: Vec<char> = "삼성전기".chars().collect();
        assert_eq!(levenshtein(&a, &b), 1);
        assert_eq!(levenshtein(&a, &a), 0);
    }
}
