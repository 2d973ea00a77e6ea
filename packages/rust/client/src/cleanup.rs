//! Text cleanup for fetched filing bodies.
//!
//! Each cleanup pass is a function `&str -> String` applied in sequence:
//! scripts and styles are dropped, tables collapse to `key: value` lines,
//! remaining markup is stripped, entities decoded, and whitespace normalized.

use std::sync::LazyLock;

use regex::Regex;
use scraper::{Html, Selector};

/// Run the full cleanup pipeline on raw XML/SGML filing markup.
pub fn clean_markup(raw: &str) -> String {
    let mut result = strip_blocks(raw);
    result = collapse_tables(&result);
    result = strip_tags(&result);
    result = decode_entities(&result);
    normalize_whitespace(&result)
}

/// Extract readable text from viewer HTML, skipping navigation chrome.
pub fn html_to_text(html: &str) -> String {
    static CONTENT: LazyLock<Selector> =
        LazyLock::new(|| Selector::parse("main, article, body").expect("valid selector"));
    static SKIP: LazyLock<Selector> = LazyLock::new(|| {
        Selector::parse("script, style, nav, header, footer, aside").expect("valid selector")
    });

    let doc = Html::parse_document(html);

    let root = match doc.select(&CONTENT).next() {
        Some(el) => el,
        None => return normalize_whitespace(&strip_tags(html)),
    };

    let skipped: Vec<_> = root.select(&SKIP).map(|el| el.id()).collect();
    let mut out = String::new();
    for node in root.descendants() {
        if let Some(text) = node.value().as_text() {
            let inside_skipped = node
                .ancestors()
                .any(|a| skipped.contains(&a.id()));
            if !inside_skipped {
                out.push_str(text);
                out.push('\n');
            }
        }
    }

    normalize_whitespace(&out)
}

/// Truncate to at most `max_chars` characters on a char boundary.
pub fn truncate_chars(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        text.to_string()
    } else {
        text.chars().take(max_chars).collect()
    }
}

// ---------------------------------------------------------------------------
// Pass 1: drop script/style blocks wholesale
// ---------------------------------------------------------------------------

fn strip_blocks(text: &str) -> String {
    static BLOCK_RE: LazyLock<Regex> = LazyLock::new(|| {
        Regex::new(r"(?is)<(script|style)\b[^>]*>.*?</(script|style)>").expect("valid regex")
    });
    BLOCK_RE.replace_all(text, " ").to_string()
}

// ---------------------------------------------------------------------------
// Pass 2: collapse table rows into key: value lines
// ---------------------------------------------------------------------------

/// Rewrite `<TR>` rows as `first-cell: rest | rest` lines. DART filing markup
/// uses `TH`/`TD`/`TE`/`TU` cells inside `TR` rows.
fn collapse_tables(text: &str) -> String {
    static ROW_RE: LazyLock<Regex> =
        LazyLock::new(|| Regex::new(r"(?is)<tr\b[^>]*>(.*?)</tr>").expect("valid regex"));
    static CELL_RE: LazyLock<Regex> = LazyLock::new(|| {
        Regex::new(r"(?is)<t[hdeu]\b[^>]*>(.*?)</t[hdeu]>").expect("valid regex")
    });

    ROW_RE
        .replace_all(text, |caps: &regex::Captures| {
            let row = &caps[1];
            let cells: Vec<String> = CELL_RE
                .captures_iter(row)
                .map(|c| strip_tags(&c[1]).trim().to_string())
                .filter(|c| !c.is_empty())
                .collect();
            match cells.split_first() {
                Some((key, rest)) if !rest.is_empty() => {
                    format!("\n{key}: {}\n", rest.join(" | "))
                }
                Some((only, _)) => format!("\n{only}\n"),
                None => "\n".to_string(),
            }
        })
        .to_string()
}

// ---------------------------------------------------------------------------
// Pass 3: strip remaining tags
// ---------------------------------------------------------------------------

fn strip_tags(text: &str) -> String {
    static TAG_RE: LazyLock<Regex> =
        LazyLock::new(|| Regex::new(r"<[^>]+>").expect("valid regex"));
    TAG_RE.replace_all(text, " ").to_string()
}

// ---------------------------------------------------------------------------
// Pass 4: decode the entities that actually occur in filings
// ---------------------------------------------------------------------------

fn decode_entities(text: &str) -> String {
    text.replace("&nbsp;", " ")
        .replace("&amp;", "&")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&#39;", "'")
}

// ---------------------------------------------------------------------------
// Pass 5: normalize whitespace
// ---------------------------------------------------------------------------

fn normalize_whitespace(text: &str) -> String {
    static SPACES_RE: LazyLock<Regex> =
        LazyLock::new(|| Regex::new(r"[ \t\u{00a0}]+").expect("valid regex"));
    static BLANKS_RE: LazyLock<Regex> =
        LazyLock::new(|| Regex::new(r"\n{3,}").expect("valid regex"));

    let collapsed = SPACES_RE.replace_all(text, " ");
    let lines: Vec<&str> = collapsed.lines().map(str::trim).collect();
    let joined = lines.join("\n");
    BLANKS_RE.replace_all(&joined, "\n\n").trim().to_string()
}
