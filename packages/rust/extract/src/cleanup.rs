//! Post-conversion cleanup pipeline for extracted text.
//!
//! Each cleanup pass is a function `&str -> String` applied in sequence.
//! The output is Markdown-flavoured plain text: headings and list markers
//! survive, links and images do not.

use std::sync::LazyLock;

use regex::Regex;

/// Run the full cleanup pipeline on raw Markdown text.
pub(crate) fn run_pipeline(md: &str) -> String {
    let mut result = md.to_string();

    result = strip_images(&result);
    result = flatten_links(&result);
    result = strip_leftover_html(&result);
    result = drop_empty_markers(&result);
    result = normalize_whitespace(&result);
    result = clean_blank_lines(&result);

    result.trim().to_string()
}

// ---------------------------------------------------------------------------
// Pass 1: Remove images
// ---------------------------------------------------------------------------

fn strip_images(md: &str) -> String {
    static IMAGE_RE: LazyLock<Regex> =
        LazyLock::new(|| Regex::new(r"!\[[^\]]*\]\([^)]*\)").expect("valid regex"));

    IMAGE_RE.replace_all(md, "").to_string()
}

// ---------------------------------------------------------------------------
// Pass 2: Flatten links to their text
// ---------------------------------------------------------------------------

/// `[text](url)` becomes `text`; reference-style `[text][id]` likewise.
fn flatten_links(md: &str) -> String {
    static LINK_RE: LazyLock<Regex> =
        LazyLock::new(|| Regex::new(r"\[([^\]]*)\](?:\([^)]*\)|\[[^\]]*\])").expect("valid regex"));
    static REF_DEF_RE: LazyLock<Regex> =
        LazyLock::new(|| Regex::new(r"(?m)^\s*\[[^\]]+\]:\s+\S+.*$").expect("valid regex"));

    let flattened = LINK_RE.replace_all(md, "$1");
    REF_DEF_RE.replace_all(&flattened, "").to_string()
}

// ---------------------------------------------------------------------------
// Pass 3: Strip leftover HTML tags
// ---------------------------------------------------------------------------

/// Remove stray tags that survived conversion, keeping their text.
fn strip_leftover_html(md: &str) -> String {
    static HTML_TAG_RE: LazyLock<Regex> = LazyLock::new(|| {
        Regex::new(r"</?[a-zA-Z][a-zA-Z0-9-]*(?:\s[^<>]*)?/?>").expect("valid regex")
    });
    static HTML_COMMENT_RE: LazyLock<Regex> =
        LazyLock::new(|| Regex::new(r"(?s)<!--.*?-->").expect("valid regex"));

    let without_comments = HTML_COMMENT_RE.replace_all(md, "");
    HTML_TAG_RE.replace_all(&without_comments, "").to_string()
}

// ---------------------------------------------------------------------------
// Pass 4: Drop lines left with only markup
// ---------------------------------------------------------------------------

/// Lines such as `*`, `-`, `#` or `>` carry no text once links are gone.
fn drop_empty_markers(md: &str) -> String {
    static MARKER_ONLY_RE: LazyLock<Regex> =
        LazyLock::new(|| Regex::new(r"^\s*(?:[-*+>#]+|\d+\.)\s*$").expect("valid regex"));

    md.lines()
        .filter(|line| !MARKER_ONLY_RE.is_match(line))
        .collect::<Vec<_>>()
        .join("\n")
}

// ---------------------------------------------------------------------------
// Pass 5: Normalize whitespace
// ---------------------------------------------------------------------------

fn normalize_whitespace(md: &str) -> String {
    md.lines()
        .map(|line| line.trim_end())
        .collect::<Vec<_>>()
        .join("\n")
}

// ---------------------------------------------------------------------------
// Pass 6: Collapse blank lines
// ---------------------------------------------------------------------------

/// Collapse runs of blank lines into a single paragraph break.
fn clean_blank_lines(md: &str) -> String {
    static MULTI_BLANK_RE: LazyLock<Regex> =
        LazyLock::new(|| Regex::new(r"\n{3,}").expect("valid regex"));

    MULTI_BLANK_RE.replace_all(md, "\n\n").to_string()
}
