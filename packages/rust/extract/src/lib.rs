//! Main-text extraction from fetched HTML pages.
//!
//! Strips page chrome (navigation, headers, footers, sidebars, forms),
//! tables and comment sections, picks the most likely content region,
//! converts it to Markdown with `htmd`, then runs a cleanup pipeline that
//! flattens links and images to plain text.

mod cleanup;

use std::sync::LazyLock;

use scraper::{Html, Selector};
use tracing::{debug, instrument, warn};

/// A content region must carry at least this many characters of text to be
/// preferred over `<body>`.
const MIN_REGION_CHARS: usize = 200;

/// Tags dropped together with their content during conversion.
const SKIP_TAGS: &[&str] = &[
    "script", "style", "nav", "header", "footer", "aside", "table", "form", "iframe",
    "noscript", "svg", "button",
];

/// Elements removed before picking a content region.
static BOILERPLATE: LazyLock<Selector> = LazyLock::new(|| {
    Selector::parse(concat!(
        "script, style, noscript, template, svg, iframe, form, button, ",
        "nav, header, footer, aside, table, ",
        "[role=\"navigation\"], [role=\"banner\"], [role=\"contentinfo\"], [role=\"complementary\"], ",
        "[aria-hidden=\"true\"], ",
        "#comments, .comments, .comment, .comment-list, #disqus_thread, .sidebar, ",
        ".cookie-banner, .newsletter, .share, .social-share, .breadcrumb, .breadcrumbs"
    ))
    .expect("valid selector")
});

/// Candidate content regions in priority order.
const CONTENT_SELECTORS: &[&str] = &[
    "article",
    "main",
    "[role=\"main\"]",
    ".post-content",
    ".article-content",
    ".entry-content",
    ".article-body",
    ".article__body",
    ".story-body",
    ".content-body",
    "#article-body",
    "#content",
    ".content",
    ".prose",
];

/// Extract the main readable text of an HTML page.
///
/// Returns `None` when nothing readable remains.
#[instrument(skip_all, fields(html_len = html.len()))]
pub fn extract_main_text(html: &str) -> Option<String> {
    let mut doc = Html::parse_document(html);
    let removed = strip_boilerplate(&mut doc);
    let region = select_content_html(&doc);

    let converter = htmd::HtmlToMarkdown::builder()
        .skip_tags(SKIP_TAGS.to_vec())
        .build();

    let raw = match converter.convert(&region) {
        Ok(md) => md,
        Err(e) => {
            warn!(error = %e, "htmd conversion failed");
            return None;
        }
    };

    let text = cleanup::run_pipeline(&raw);
    debug!(removed, raw_len = raw.len(), text_len = text.len(), "extraction complete");

    if text.is_empty() { None } else { Some(text) }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// Detach every boilerplate element from the tree. Returns how many were removed.
fn strip_boilerplate(doc: &mut Html) -> usize {
    let ids: Vec<_> = doc.select(&BOILERPLATE).map(|el| el.id()).collect();
    let mut removed = 0;
    for id in ids {
        if let Some(mut node) = doc.tree.get_mut(id) {
            node.detach();
            removed += 1;
        }
    }
    removed
}

/// Inner HTML of the first substantial content region, falling back to `<body>`.
fn select_content_html(doc: &Html) -> String {
    for sel_str in CONTENT_SELECTORS {
        let Ok(selector) = Selector::parse(sel_str) else {
            continue;
        };
        if let Some(el) = doc
            .select(&selector)
            .find(|el| visible_text_len(el) >= MIN_REGION_CHARS)
        {
            debug!(selector = sel_str, "content region selected");
            return el.inner_html();
        }
    }

    if let Ok(body_sel) = Selector::parse("body") {
        if let Some(body) = doc.select(&body_sel).next() {
            return body.inner_html();
        }
    }

    doc.root_element().inner_html()
}

fn visible_text_len(el: &scraper::ElementRef) -> usize {
    el.text().map(|t| t.trim().chars().count()).sum()
}

#[cfg(test)]
mod tests {
    use super::*;

    const FILLER: &str = "Carbon pricing assigns a cost to greenhouse gas emissions so that \
        polluters pay for the damage they cause. Economists broadly agree it is among the \
        cheapest ways to cut emissions at scale, and many jurisdictions now run schemes.";

    #[test]
    fn extracts_article_and_drops_chrome() {
        let html = format!(
            r#"<html><head><title>T</title><style>p {{ color: red; }}</style></head><body>
            <header><h1>Site Name</h1></header>
            <nav><a href="/">Home</a> <a href="/about">About</a></nav>
            <article><h1>Carbon pricing</h1><p>{FILLER}</p></article>
            <aside>Related posts</aside>
            <footer><p>Copyright 2025</p></footer>
            <script>var tracking = true;</script>
            </body></html>"#
        );

        let text = extract_main_text(&html).expect("text");
        assert!(text.contains("Carbon pricing"));
        assert!(text.contains("polluters pay"));
        assert!(!text.contains("Site Name"));
        assert!(!text.contains("About"));
        assert!(!text.contains("Related posts"));
        assert!(!text.contains("Copyright"));
        assert!(!text.contains("tracking"));
        assert!(!text.contains("color: red"));
    }

    #[test]
    fn drops_tables_and_comment_sections() {
        let html = format!(
            r#"<html><body><main>
            <p>{FILLER}</p>
            <table><tr><th>Year</th><th>Price</th></tr><tr><td>2024</td><td>85</td></tr></table>
            <div id="comments"><p>First! Great article.</p></div>
            <section class="comment-list"><p>Spam comment</p></section>
            </main></body></html>"#
        );

        let text = extract_main_text(&html).expect("text");
        assert!(text.contains("Carbon pricing"));
        assert!(!text.contains("Price"));
        assert!(!text.contains("First! Great article."));
        assert!(!text.contains("Spam comment"));
    }

    #[test]
    fn links_become_plain_text() {
        let html = format!(
            r#"<html><body><article><p>{FILLER} See <a href="https://example.org/report">the full report</a> for details.</p>
            <img src="chart.png" alt="chart"></article></body></html>"#
        );

        let text = extract_main_text(&html).expect("text");
        assert!(text.contains("See the full report for details."));
        assert!(!text.contains("https://example.org/report"));
        assert!(!text.contains("chart.png"));
    }

    #[test]
    fn short_region_falls_back_to_body() {
        let html = r#"<html><body>
            <article><p>Teaser.</p></article>
            <div class="story"><p>The real story lives outside the article element.</p></div>
            </body></html>"#;

        let text = extract_main_text(html).expect("text");
        assert!(text.contains("Teaser."));
        assert!(text.contains("The real story"));
    }

    #[test]
    fn empty_page_yields_none() {
        assert!(extract_main_text("<html><body></body></html>").is_none());
        assert!(extract_main_text("").is_none());
    }

    #[test]
    fn chrome_only_page_yields_none() {
        let html = r#"<html><body>
            <nav><a href="/">Home</a></nav>
            <footer>Copyright</footer>
            <script>console.log(1)</script>
            </body></html>"#;
        assert!(extract_main_text(html).is_none());
    }

    #[test]
    fn plain_text_without_markup_is_kept() {
        let text = extract_main_text("Just a sentence.").expect("text");
        assert_eq!(text, "Just a sentence.");
    }
}
