//! Disclosure detail-type taxonomy.
//!
//! Codes follow the `[A-J]\d{3}` scheme of the filing authority. The keyword
//! tables drive the rule-based mapping used when the LLM is unavailable, and
//! membership filtering of the codes the LLM proposes.

use std::sync::LazyLock;

use regex::Regex;

/// At most this many codes are attached to an expanded query.
const MAX_MAPPED_TYPES: usize = 3;

/// One taxonomy row: code, display name, trigger keywords, priority.
pub struct DocTypeMapping {
    pub code: &'static str,
    pub name: &'static str,
    pub keywords: &'static [&'static str],
    pub priority: u8,
}

/// The fixed taxonomy, higher priority first where it matters.
pub static TAXONOMY: &[DocTypeMapping] = &[
    DocTypeMapping {
        code: "C001",
        name: "증권신고(지분증권)",
        keywords: &["증권신고서", "지분증권", "주식발행", "공모", "상장"],
        priority: 20,
    },
    DocTypeMapping {
        code: "C002",
        name: "증권신고(채무증권)",
        keywords: &["채무증권", "회사채", "사채발행", "채권발행"],
        priority: 19,
    },
    DocTypeMapping {
        code: "C003",
        name: "증권신고(파생결합증권)",
        keywords: &["파생결합증권", "파생상품", "구조화상품"],
        priority: 18,
    },
    DocTypeMapping {
        code: "C004",
        name: "증권신고(합병등)",
        keywords: &["합병신고", "주식교환신고", "증권신고합병"],
        priority: 17,
    },
    DocTypeMapping {
        code: "E003",
        name: "합병등종료보고서",
        keywords: &["합병", "합병종료", "합병완료", "인수합병", "분할합병"],
        priority: 16,
    },
    DocTypeMapping {
        code: "B001",
        name: "주요사항보고서",
        keywords: &[
            "주요사항보고서",
            "주요사항",
            "자기주식",
            "자사주",
            "매수선택권",
            "스톡옵션",
            "유상증자",
            "무상증자",
            "감자",
            "합병",
            "영업양도",
            "영업양수",
            "자산양수도",
            "전환사채",
            "소송",
        ],
        priority: 15,
    },
    DocTypeMapping {
        code: "E001",
        name: "자기주식취득/처분",
        keywords: &["자기주식취득", "자기주식처분", "자사주매입", "자사주매도", "자기주식"],
        priority: 14,
    },
    DocTypeMapping {
        code: "E002",
        name: "자기주식취득신탁계약",
        keywords: &["신탁계약", "취득신탁", "신탁계약체결", "신탁계약해지"],
        priority: 14,
    },
    DocTypeMapping {
        code: "E004",
        name: "주식매수선택권부여에관한신고",
        keywords: &["주식매수선택권", "스톡옵션부여", "스톡옵션"],
        priority: 13,
    },
    DocTypeMapping {
        code: "D001",
        name: "주식등의대량보유상황보고서",
        keywords: &["대량보유", "5%룰", "지분보고", "대량보유상황"],
        priority: 13,
    },
    DocTypeMapping {
        code: "A001",
        name: "사업보고서",
        keywords: &["사업보고서", "연간보고서", "연차보고서"],
        priority: 12,
    },
    DocTypeMapping {
        code: "D004",
        name: "공개매수",
        keywords: &["공개매수"],
        priority: 12,
    },
    DocTypeMapping {
        code: "E006",
        name: "주주총회소집보고서",
        keywords: &["주주총회", "정기주주총회", "임시주주총회"],
        priority: 12,
    },
    DocTypeMapping {
        code: "A002",
        name: "반기보고서",
        keywords: &["반기보고서", "반기실적"],
        priority: 11,
    },
    DocTypeMapping {
        code: "F001",
        name: "감사보고서",
        keywords: &["감사보고서", "외부감사", "회계감사"],
        priority: 11,
    },
    DocTypeMapping {
        code: "A003",
        name: "분기보고서",
        keywords: &["분기보고서", "분기실적"],
        priority: 10,
    },
    DocTypeMapping {
        code: "F002",
        name: "연결감사보고서",
        keywords: &["연결감사보고서", "연결감사"],
        priority: 10,
    },
    DocTypeMapping {
        code: "I002",
        name: "공정공시",
        keywords: &["공정공시"],
        priority: 8,
    },
];

/// Korean detail terms that select a structured sub-report endpoint.
pub static DETAIL_TERMS: &[&str] = &[
    "자기주식취득",
    "자기주식처분",
    "유상증자",
    "무상증자",
    "회사합병",
    "합병",
    "회사분할",
    "전환사채발행",
    "전환사채",
    "신주인수권부사채발행",
    "영업양도",
    "영업양수",
    "주식교환",
    "감자",
];

static CODE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-J]\d{3}$").expect("valid regex"));

/// Whether `code` is syntactically a detail-type code.
pub fn is_valid_code(code: &str) -> bool {
    CODE_RE.is_match(code)
}

/// Whether `code` exists in the taxonomy.
pub fn is_known_code(code: &str) -> bool {
    TAXONOMY.iter().any(|m| m.code == code)
}

/// Display name for a known code.
pub fn code_name(code: &str) -> Option<&'static str> {
    TAXONOMY.iter().find(|m| m.code == code).map(|m| m.name)
}

/// Rule-based mapping: codes whose keywords occur in the de-spaced query
/// text, highest priority first, capped at three.
pub fn map_keywords_to_codes(query: &str, keywords: &[String]) -> Vec<String> {
    let mut haystack: String = query.chars().filter(|c| !c.is_whitespace()).collect();
    for kw in keywords {
        haystack.extend(kw.chars().filter(|c| !c.is_whitespace()));
    }
    let haystack = haystack.to_lowercase();

    let mut matched: Vec<&DocTypeMapping> = TAXONOMY
        .iter()
        .filter(|m| m.keywords.iter().any(|kw| haystack.contains(kw)))
        .collect();
    matched.sort_by(|a, b| b.priority.cmp(&a.priority).then(a.code.cmp(b.code)));
    matched
        .into_iter()
        .take(MAX_MAPPED_TYPES)
        .map(|m| m.code.to_string())
        .collect()
}

/// Detail terms present in the de-spaced query text, longest first so that
/// e.g. 자기주식취득 wins over 자기주식 prefixes.
pub fn detect_detail_terms(query: &str, keywords: &[String]) -> Vec<String> {
    let mut haystack: String = query.chars().filter(|c| !c.is_whitespace()).collect();
    for kw in keywords {
        haystack.extend(kw.chars().filter(|c| !c.is_whitespace()));
    }

    let mut terms: Vec<&str> = DETAIL_TERMS
        .iter()
        .copied()
        .filter(|term| haystack.contains(term))
        .collect();
    terms.sort_by_key(|t| std::cmp::Reverse(t.chars().count()));

    // Drop terms that are substrings of an already-kept longer term.
    let mut kept: Vec<String> = Vec::new();
    for term in terms {
        if !kept.iter().any(|k| k.contains(term)) {
            kept.push(term.to_string());
        }
    }
    kept
}
