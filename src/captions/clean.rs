// src/captions/clean.rs
//! Caption payload → plain text.

use once_cell::sync::OnceCell;
use regex::Regex;

fn tag_re() -> &'static Regex {
    static RE: OnceCell<Regex> = OnceCell::new();
    RE.get_or_init(|| Regex::new(r"<[^>]+>").expect("static tag regex"))
}

const HEADER_KEYWORDS: [&str; 6] = ["WEBVTT", "NOTE", "STYLE", "REGION", "KIND", "LANGUAGE"];

/// Header or block marker: a keyword standing alone or followed by
/// whitespace or `:`. Only consulted before the first cue.
fn is_header_line(s: &str) -> bool {
    HEADER_KEYWORDS.iter().any(|kw| {
        let Some(head) = s.get(..kw.len()) else {
            return false;
        };
        head.eq_ignore_ascii_case(kw)
            && s[kw.len()..]
                .chars()
                .next()
                .map_or(true, |c| c.is_whitespace() || c == ':')
    })
}

/// Strip cue timing, cue indexes, preamble header lines and markup; collapse
/// consecutive duplicate lines; join with single spaces.
///
/// `ext` only matters for XML-ish timed text (`srv1/2/3`, `ttml`), whose
/// cue text lives inside tags and so is flattened line by line first.
pub fn clean_captions(raw: &str, ext: Option<&str>) -> String {
    let xml_like = matches!(ext, Some("srv1" | "srv2" | "srv3" | "ttml"))
        || raw.trim_start().starts_with("<?xml");
    let source: String = if xml_like {
        // one cue per closing tag
        raw.replace("</p>", "</p>\n").replace("</text>", "</text>\n")
    } else {
        raw.to_string()
    };

    let mut lines: Vec<String> = Vec::new();
    let mut in_preamble = !xml_like;
    // inside a preamble header block, which runs until the next blank line
    let mut in_header_block = false;
    for ln in source.lines() {
        let s = ln.trim();
        if s.contains("-->") {
            in_preamble = false;
            in_header_block = false;
            continue;
        }
        if s.is_empty() {
            in_header_block = false;
            continue;
        }
        if s.chars().all(|c| c.is_ascii_digit()) {
            continue;
        }
        if in_preamble && (in_header_block || is_header_line(s)) {
            in_header_block = true;
            continue;
        }
        let stripped = tag_re().replace_all(s, "");
        let decoded = html_escape::decode_html_entities(stripped.trim()).to_string();
        let text = decoded.split_whitespace().collect::<Vec<_>>().join(" ");
        if text.is_empty() {
            continue;
        }
        if lines.last().is_some_and(|prev| *prev == text) {
            continue;
        }
        lines.push(text);
    }
    lines.join(" ")
}
