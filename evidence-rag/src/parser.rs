//! Best-effort extraction of abstracts from PubMed `efetch` XML.
//!
//! The markup is treated as text, not validated against a schema: each
//! `<PubmedArticle>` block is searched for the fields we need and a block
//! that lacks a title or an abstract is dropped on its own, without failing
//! the rest of the batch.

use crate::models::LiteratureRecord;
use tracing::debug;

const ARTICLE_TAG: &str = "PubmedArticle";
const UNKNOWN_IDENTIFIER: &str = "unknown";

/// Parses every usable record in document order.
pub fn parse_records(xml: &str) -> Vec<LiteratureRecord> {
    let mut records = Vec::new();

    for block in article_blocks(xml) {
        match parse_article(block) {
            Some(record) => records.push(record),
            None => debug!("Skipping literature record without title or abstract"),
        }
    }

    records
}

fn parse_article(block: &str) -> Option<LiteratureRecord> {
    let title = first_element(block, "ArticleTitle")
        .map(|(_, inner)| clean_text(inner))
        .filter(|title| !title.is_empty())?;

    let abstract_text = extract_abstract(block).filter(|text| !text.is_empty())?;

    let identifier = first_element(block, "PMID")
        .map(|(_, inner)| clean_text(inner))
        .filter(|id| !id.is_empty())
        .unwrap_or_else(|| UNKNOWN_IDENTIFIER.to_string());

    Some(LiteratureRecord::new(
        identifier,
        title,
        abstract_text,
        extract_year(block),
    ))
}

/// Joins all sections of a (possibly structured) abstract, prefixing labelled ones.
fn extract_abstract(block: &str) -> Option<String> {
    // Keep to the primary <Abstract>, so translated <OtherAbstract> sections are ignored.
    let scope = first_element(block, "Abstract")
        .map(|(_, inner)| inner)
        .unwrap_or(block);

    let sections: Vec<String> = elements(scope, "AbstractText")
        .into_iter()
        .filter_map(|(attributes, inner)| {
            let text = clean_text(inner);
            if text.is_empty() {
                return None;
            }
            match attribute(attributes, "Label") {
                Some(label) if !label.trim().is_empty() => Some(format!("{}: {}", label.trim(), text)),
                _ => Some(text),
            }
        })
        .collect();

    if sections.is_empty() {
        None
    } else {
        Some(sections.join("\n"))
    }
}

fn extract_year(block: &str) -> Option<u16> {
    let (_, pub_date) = first_element(block, "PubDate")?;

    if let Some((_, year)) = first_element(pub_date, "Year") {
        return year.trim().parse().ok();
    }

    // e.g. <MedlineDate>1998 Dec-1999 Jan</MedlineDate>
    let (_, medline) = first_element(pub_date, "MedlineDate")?;
    let medline = medline.trim();
    medline
        .get(..4)
        .filter(|prefix| prefix.chars().all(|c| c.is_ascii_digit()))
        .and_then(|prefix| prefix.parse().ok())
}

/// Slices between `<PubmedArticle>` and `</PubmedArticle>`. An unterminated
/// block runs to the next opening tag or the end of input.
fn article_blocks(xml: &str) -> Vec<&str> {
    let mut blocks = Vec::new();
    let mut rest = xml;

    while let Some((_, content_start)) = find_open_tag(rest, ARTICLE_TAG) {
        let body = &rest[content_start..];
        let close = format!("</{}>", ARTICLE_TAG);
        let end = body
            .find(&close)
            .or_else(|| find_open_tag(body, ARTICLE_TAG).map(|(start, _)| start))
            .unwrap_or(body.len());
        blocks.push(&body[..end]);
        rest = &body[end..];
    }

    blocks
}

/// Locates `<tag ...>` whose name matches exactly; returns the offset of `<`
/// and the offset just past the closing `>` of the open tag.
fn find_open_tag(xml: &str, tag: &str) -> Option<(usize, usize)> {
    let needle = format!("<{}", tag);
    let mut offset = 0;

    while let Some(found) = xml[offset..].find(&needle) {
        let start = offset + found;
        let after_name = start + needle.len();
        let boundary = xml[after_name..].chars().next();
        if matches!(boundary, Some(c) if c == '>' || c == '/' || c.is_whitespace()) {
            let open_end = xml[after_name..].find('>')? + after_name + 1;
            return Some((start, open_end));
        }
        offset = after_name;
    }
    None
}

fn first_element<'a>(xml: &'a str, tag: &str) -> Option<(&'a str, &'a str)> {
    elements(xml, tag).into_iter().next()
}

/// All `(attributes, inner)` pairs for `tag`, in order. Self-closing elements
/// have empty content; an element with no closing tag is ignored.
fn elements<'a>(xml: &'a str, tag: &str) -> Vec<(&'a str, &'a str)> {
    let close = format!("</{}>", tag);
    let mut found = Vec::new();
    let mut rest = xml;

    while let Some((start, open_end)) = find_open_tag(rest, tag) {
        let open_tag = &rest[start..open_end];
        let attributes = open_tag[tag.len() + 1..open_tag.len() - 1].trim_end_matches('/');

        if open_tag.ends_with("/>") {
            found.push((attributes, ""));
            rest = &rest[open_end..];
            continue;
        }

        match rest[open_end..].find(&close) {
            Some(len) => {
                found.push((attributes, &rest[open_end..open_end + len]));
                rest = &rest[open_end + len + close.len()..];
            }
            None => break,
        }
    }

    found
}

fn attribute<'a>(attributes: &'a str, name: &str) -> Option<&'a str> {
    let needle = format!("{}=\"", name);
    let start = attributes.find(&needle)? + needle.len();
    let len = attributes[start..].find('"')?;
    Some(&attributes[start..start + len])
}

/// Strips embedded markup, decodes entities and collapses whitespace.
pub fn clean_text(raw: &str) -> String {
    let mut stripped = String::with_capacity(raw.len());
    let mut in_tag = false;
    for c in raw.chars() {
        match c {
            '<' => in_tag = true,
            '>' if in_tag => in_tag = false,
            _ if !in_tag => stripped.push(c),
            _ => {}
        }
    }

    decode_entities(&stripped)
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

fn decode_entities(text: &str) -> String {
    let mut decoded = String::with_capacity(text.len());
    let mut rest = text;

    while let Some(amp) = rest.find('&') {
        decoded.push_str(&rest[..amp]);
        let candidate = &rest[amp..];
        let replacement = candidate
            .find(';')
            .filter(|semi| *semi <= 10)
            .and_then(|semi| decode_entity(&candidate[1..semi]).map(|c| (c, semi + 1)));

        match replacement {
            Some((c, consumed)) => {
                decoded.push(c);
                rest = &candidate[consumed..];
            }
            None => {
                decoded.push('&');
                rest = &candidate[1..];
            }
        }
    }

    decoded.push_str(rest);
    decoded
}

fn decode_entity(name: &str) -> Option<char> {
    match name {
        "amp" => Some('&'),
        "lt" => Some('<'),
        "gt" => Some('>'),
        "quot" => Some('"'),
        "apos" => Some('\''),
        _ => {
            let code = if let Some(hex) = name.strip_prefix("#x").or_else(|| name.strip_prefix("#X")) {
                u32::from_str_radix(hex, 16).ok()?
            } else {
                name.strip_prefix('#')?.parse().ok()?
            };
            char::from_u32(code)
        }
    }
}
