//! Content normalization — HTML stripping, quoted-reply removal, signature
//! removal, and whitespace cleanup.
//!
//! Pure string processing, no I/O. Normalization is idempotent: running
//! `normalize` over already-clean text yields the same text. Malformed HTML
//! degrades to best-effort extraction and never fails.

use std::sync::LazyLock;

use regex::Regex;

use crate::mail::types::ContentType;

/// Reply-splitter patterns: everything from the first match onward is a
/// quoted earlier message, not new content.
static REPLY_SPLITTER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?im)^\s*(?:On .{0,200}wrote:|From:[ \t].*|Sent:[ \t].*|-{3,}\s*Original Message\s*-{3,}|-{4,}\s*Forwarded message\s*-{4,})\s*$",
    )
    .expect("reply splitter pattern is valid")
});

/// Normalize a raw message body into clean plain text.
pub fn normalize(raw: &str, content_type: ContentType) -> String {
    let text = match content_type {
        ContentType::Html => html_to_text(raw),
        ContentType::Plain => raw.to_string(),
    };
    let text = strip_quoted(&text);
    let text = strip_signature(&text);
    collapse_whitespace(&text)
}

// ── HTML extraction ─────────────────────────────────────────────────

/// Extract visible text from an HTML body.
///
/// Quote containers (`<blockquote>`) are removed structurally before tag
/// stripping so nested quoted history never leaks into the text. Unbalanced
/// markup falls back to leaving the affected region in place; the tag
/// stripper then does what it can.
pub fn html_to_text(html: &str) -> String {
    let text = remove_element(html, "blockquote");
    let text = remove_element(&text, "style");
    let text = remove_element(&text, "script");
    decode_entities(&strip_tags(&text))
}

/// Remove every `<tag>…</tag>` region, handling nesting by depth count.
///
/// Case-insensitive on the tag name. If a closing tag is missing, the
/// opening tag and everything after it are kept untouched (best effort).
fn remove_element(html: &str, tag: &str) -> String {
    let lower = html.to_ascii_lowercase();
    let open = format!("<{tag}");
    let close = format!("</{tag}");

    let mut out = String::with_capacity(html.len());
    let mut pos = 0;

    while let Some(rel) = lower[pos..].find(&open) {
        let start = pos + rel;
        let mut depth = 1usize;
        let mut cursor = start + open.len();
        let mut end = None;

        while depth > 0 {
            let next_open = lower[cursor..].find(&open);
            let next_close = lower[cursor..].find(&close);
            match (next_open, next_close) {
                (Some(o), Some(c)) if o < c => {
                    depth += 1;
                    cursor += o + open.len();
                }
                (_, Some(c)) => {
                    depth -= 1;
                    let close_at = cursor + c;
                    cursor = lower[close_at..]
                        .find('>')
                        .map_or(lower.len(), |g| close_at + g + 1);
                    if depth == 0 {
                        end = Some(cursor);
                    }
                }
                (_, None) => break,
            }
        }

        match end {
            Some(e) => {
                out.push_str(&html[pos..start]);
                pos = e;
            }
            // Unbalanced — keep the remainder as-is.
            None => break,
        }
    }

    out.push_str(&html[pos..]);
    out
}

/// Strip remaining tags, turning block-level boundaries into newlines.
///
/// Only a closing block tag (or `<br>`, which never closes) emits a
/// newline; otherwise `</p><p>` would double up.
fn strip_tags(html: &str) -> String {
    const BLOCK_TAGS: &[&str] = &["p", "div", "tr", "li", "h1", "h2", "h3", "h4", "h5", "h6"];

    let mut out = String::with_capacity(html.len());
    let mut rest = html;

    while let Some(open) = rest.find('<') {
        out.push_str(&rest[..open]);
        match rest[open..].find('>') {
            Some(rel_close) => {
                let tag = rest[open + 1..open + rel_close].trim_start();
                let is_closing = tag.starts_with('/');
                let name: String = tag
                    .trim_start_matches('/')
                    .chars()
                    .take_while(|c| c.is_ascii_alphanumeric())
                    .collect::<String>()
                    .to_ascii_lowercase();
                if name == "br" || (is_closing && BLOCK_TAGS.contains(&name.as_str())) {
                    out.push('\n');
                }
                rest = &rest[open + rel_close + 1..];
            }
            // Malformed: a lone '<' with no close — keep the text.
            None => {
                out.push_str(&rest[open..]);
                rest = "";
            }
        }
    }
    out.push_str(rest);
    out
}

/// Decode the entities that show up in real email HTML.
fn decode_entities(text: &str) -> String {
    text.replace("&nbsp;", " ")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&#39;", "'")
        .replace("&apos;", "'")
        .replace("&amp;", "&")
}

// ── Quoted-reply removal ────────────────────────────────────────────

/// Remove quoted reply content from plain text.
///
/// Drops `>`-prefixed lines and truncates at the first reply-splitter line
/// (`On … wrote:`, `From:`, `Sent:`, original-message / forwarded-message
/// separators).
pub fn strip_quoted(text: &str) -> String {
    let text = match REPLY_SPLITTER.find(text) {
        Some(m) => &text[..m.start()],
        None => text,
    };

    text.lines()
        .filter(|line| !line.trim_start().starts_with('>'))
        .collect::<Vec<_>>()
        .join("\n")
}

// ── Signature removal ───────────────────────────────────────────────

/// Drop a trailing signature block: everything from a line that is exactly
/// `--` (the conventional delimiter, trailing space allowed) onward.
pub fn strip_signature(text: &str) -> String {
    let mut kept = Vec::new();
    for line in text.lines() {
        if line.trim_end() == "--" {
            break;
        }
        kept.push(line);
    }
    kept.join("\n")
}

// ── Whitespace normalization ────────────────────────────────────────

/// Normalize line endings, collapse horizontal whitespace runs to a single
/// space, and collapse runs of 3+ blank lines to exactly one.
pub fn collapse_whitespace(text: &str) -> String {
    let text = text.replace("\r\n", "\n").replace('\r', "\n");

    let mut out: Vec<&str> = Vec::new();
    let mut collapsed: Vec<String> = Vec::new();
    let mut blank_run = 0usize;

    let flush_blanks = |collapsed: &mut Vec<String>, run: usize| {
        let emit = if run >= 3 { 1 } else { run };
        for _ in 0..emit {
            collapsed.push(String::new());
        }
    };

    for line in text.lines() {
        let line = line.split_whitespace().collect::<Vec<_>>().join(" ");
        if line.is_empty() {
            blank_run += 1;
        } else {
            flush_blanks(&mut collapsed, blank_run);
            blank_run = 0;
            collapsed.push(line);
        }
    }
    // Trailing blank lines are dropped entirely.

    for line in &collapsed {
        out.push(line);
    }
    let joined = out.join("\n");
    joined.trim_matches('\n').to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    // ── HTML tests ──────────────────────────────────────────────────

    #[test]
    fn html_tags_stripped() {
        let out = normalize("<p>Hello <b>world</b></p>", ContentType::Html);
        assert_eq!(out, "Hello world");
    }

    #[test]
    fn html_blockquote_removed_structurally() {
        let html = "<div>New reply</div><blockquote>Old message<blockquote>Older</blockquote></blockquote>";
        let out = normalize(html, ContentType::Html);
        assert_eq!(out, "New reply");
    }

    #[test]
    fn html_unbalanced_blockquote_degrades() {
        let html = "<div>Reply</div><blockquote>dangling quote";
        let out = normalize(html, ContentType::Html);
        // Structural removal bails, tag stripping still applies.
        assert!(out.contains("Reply"));
        assert!(out.contains("dangling quote"));
    }

    #[test]
    fn html_entities_decoded() {
        let out = normalize("Q&amp;A about &quot;pricing&quot;", ContentType::Html);
        assert_eq!(out, "Q&A about \"pricing\"");
    }

    #[test]
    fn html_style_and_script_dropped() {
        let html = "<style>p { color: red; }</style><p>Visible</p><script>alert(1)</script>";
        assert_eq!(normalize(html, ContentType::Html), "Visible");
    }

    #[test]
    fn html_block_tags_become_newlines() {
        let out = normalize("<p>First</p><p>Second</p>", ContentType::Html);
        assert_eq!(out, "First\nSecond");
    }

    #[test]
    fn html_br_breaks_lines() {
        assert_eq!(normalize("one<br>two<br/>three", ContentType::Html), "one\ntwo\nthree");
    }

    #[test]
    fn html_never_panics_on_garbage() {
        let out = normalize("<<<><>>>&&&<p", ContentType::Html);
        // Best-effort: no panic, some string comes back.
        assert!(out.len() < 20);
    }

    // ── Quote stripping tests ───────────────────────────────────────

    #[test]
    fn quoted_lines_removed() {
        let out = normalize("Reply here\n> quoted\n> more quoted", ContentType::Plain);
        assert_eq!(out, "Reply here");
    }

    #[test]
    fn on_wrote_splitter_truncates() {
        let text = "Sounds good!\n\nOn Mon, Jan 5, 2026 at 9:00 AM Alice <a@x.com> wrote:\nolder content";
        assert_eq!(normalize(text, ContentType::Plain), "Sounds good!");
    }

    #[test]
    fn original_message_splitter_truncates() {
        let text = "New part\n-----Original Message-----\nFrom: bob\nold part";
        assert_eq!(normalize(text, ContentType::Plain), "New part");
    }

    #[test]
    fn forwarded_message_splitter_truncates() {
        let text = "FYI\n---------- Forwarded message ---------\nFrom: carol\nbody";
        assert_eq!(normalize(text, ContentType::Plain), "FYI");
    }

    #[test]
    fn from_header_splitter_case_insensitive() {
        let text = "Latest\nfrom: someone@x.com\nhistory";
        assert_eq!(normalize(text, ContentType::Plain), "Latest");
    }

    // ── Signature tests ─────────────────────────────────────────────

    #[test]
    fn signature_block_dropped() {
        let text = "Body text\n--\nJane Doe\nVP Sales";
        assert_eq!(normalize(text, ContentType::Plain), "Body text");
    }

    #[test]
    fn signature_delimiter_with_trailing_space() {
        let text = "Body\n-- \nSig";
        assert_eq!(normalize(text, ContentType::Plain), "Body");
    }

    #[test]
    fn dashes_inside_text_kept() {
        let text = "a -- b stays inline";
        assert_eq!(normalize(text, ContentType::Plain), "a -- b stays inline");
    }

    // ── Whitespace tests ────────────────────────────────────────────

    #[test]
    fn horizontal_whitespace_collapsed() {
        assert_eq!(
            normalize("too   many\t\tspaces", ContentType::Plain),
            "too many spaces"
        );
    }

    #[test]
    fn blank_line_runs_collapsed() {
        assert_eq!(
            normalize("a\n\n\n\n\nb", ContentType::Plain),
            "a\n\nb"
        );
        // Two blank lines are within tolerance and kept.
        assert_eq!(normalize("a\n\nb", ContentType::Plain), "a\n\nb");
    }

    #[test]
    fn crlf_normalized() {
        assert_eq!(normalize("a\r\nb\r\nc", ContentType::Plain), "a\nb\nc");
    }

    // ── Idempotence ─────────────────────────────────────────────────

    #[test]
    fn normalization_is_idempotent() {
        let inputs = [
            ("Hello\n> quoted\n\n\n\n\nworld\n--\nsig", ContentType::Plain),
            ("<p>Hi</p><blockquote>old</blockquote><p>Bye&amp;</p>", ContentType::Html),
            ("Plain  with   spaces\r\nand lines", ContentType::Plain),
        ];
        for (raw, ct) in inputs {
            let once = normalize(raw, ct);
            let twice = normalize(&once, ContentType::Plain);
            assert_eq!(once, twice, "normalize must be a fixed point for {raw:?}");
        }
    }

    #[test]
    fn empty_input_is_empty() {
        assert_eq!(normalize("", ContentType::Plain), "");
        assert_eq!(normalize("", ContentType::Html), "");
    }
}
