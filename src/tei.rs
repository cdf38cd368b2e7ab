//! TEI XML parsing for GROBID output.
//!
//! GROBID returns TEI documents: bibliographic metadata in `teiHeader`, the
//! running text as `div` sections under `text/body`, and references as
//! `biblStruct` entries in the back matter. This module walks the XML once
//! with a streaming reader and produces [`DocumentMeta`], the ordered
//! [`RawSection`]s for chunking, and the bibliography.

use anyhow::{bail, Context, Result};
use quick_xml::events::Event;
use quick_xml::Reader;

use crate::models::{DocumentMeta, RawSection};

/// A bibliographic reference from the TEI back matter.
#[derive(Debug, Clone, Default)]
pub struct BibReference {
    pub title: Option<String>,
    /// Author full names joined with `"; "`.
    pub authors: Option<String>,
    pub date: Option<String>,
}

/// Everything extracted from one TEI document.
#[derive(Debug, Clone)]
pub struct TeiDocument {
    pub meta: DocumentMeta,
    pub sections: Vec<RawSection>,
    pub references: Vec<BibReference>,
}

/// Spanish vs English stopword indicators, checked over the first 100 words.
const SPANISH_INDICATORS: [&str; 13] = [
    "de", "la", "el", "en", "que", "con", "por", "para", "del", "los", "las", "una", "uno",
];
const ENGLISH_INDICATORS: [&str; 13] = [
    "the", "of", "and", "to", "in", "for", "with", "on", "at", "by", "from", "this", "that",
];

struct OpenSection {
    heading: Option<String>,
    paragraphs: Vec<String>,
}

/// Parse a TEI XML string into metadata, body sections, and references.
pub fn parse_tei(xml: &str) -> Result<TeiDocument> {
    let mut reader = Reader::from_str(xml);
    reader.config_mut().trim_text(true);

    let mut meta = DocumentMeta::default();
    let mut sections: Vec<RawSection> = Vec::new();
    let mut references: Vec<BibReference> = Vec::new();

    // Element ancestry, local names only (TEI is namespaced).
    let mut stack: Vec<String> = Vec::new();

    // Text capture for the leaf element currently being read.
    let mut capture = false;
    let mut capture_depth = 0usize;
    let mut text_buf = String::new();

    // Author assembly (shared between header and bibliography authors).
    let mut forename = String::new();
    let mut surname = String::new();
    let mut header_authors: Vec<String> = Vec::new();
    let mut affiliations: Vec<String> = Vec::new();
    let mut keywords: Vec<String> = Vec::new();
    let mut abstract_parts: Vec<String> = Vec::new();

    let mut current_ref: Option<BibReference> = None;
    let mut ref_authors: Vec<String> = Vec::new();

    // Body sections may nest; paragraphs belong to the innermost open div.
    let mut div_stack: Vec<OpenSection> = Vec::new();

    let mut idno_type = String::new();
    let mut orgname_is_institution = false;

    loop {
        match reader.read_event().context("malformed TEI XML")? {
            Event::Start(e) => {
                let name = local_name(e.name().as_ref());

                if capture {
                    capture_depth += 1;
                } else if is_captured_leaf(&name) {
                    capture = true;
                    capture_depth = 0;
                    text_buf.clear();
                }

                match name.as_str() {
                    "div" if in_body(&stack) => {
                        div_stack.push(OpenSection {
                            heading: None,
                            paragraphs: Vec::new(),
                        });
                    }
                    "biblStruct" if stack.iter().any(|s| s == "listBibl") => {
                        current_ref = Some(BibReference::default());
                        ref_authors.clear();
                    }
                    "author" => {
                        forename.clear();
                        surname.clear();
                    }
                    "idno" => {
                        idno_type = attr_value(&e, b"type").unwrap_or_default();
                    }
                    "orgName" => {
                        orgname_is_institution =
                            attr_value(&e, b"type").as_deref() == Some("institution");
                    }
                    "date" => {
                        if let Some(when) = attr_value(&e, b"when") {
                            record_date(&stack, &mut meta, &mut current_ref, when);
                        }
                    }
                    _ => {}
                }

                stack.push(name);
            }
            Event::Empty(e) => {
                let name = local_name(e.name().as_ref());
                if name == "date" {
                    if let Some(when) = attr_value(&e, b"when") {
                        record_date(&stack, &mut meta, &mut current_ref, when);
                    }
                }
            }
            Event::Text(t) => {
                if capture {
                    let piece = t.unescape().unwrap_or_default();
                    if !text_buf.is_empty() && !piece.is_empty() {
                        text_buf.push(' ');
                    }
                    text_buf.push_str(piece.trim());
                }
            }
            Event::End(e) => {
                let name = local_name(e.name().as_ref());
                stack.pop();

                if capture {
                    if capture_depth > 0 {
                        capture_depth -= 1;
                    } else {
                        capture = false;
                        let text = text_buf.trim().to_string();
                        if !text.is_empty() {
                            dispatch_text(
                                &name,
                                text,
                                &stack,
                                &mut meta,
                                &mut div_stack,
                                &mut current_ref,
                                &mut forename,
                                &mut surname,
                                &mut keywords,
                                &mut abstract_parts,
                                &mut affiliations,
                                &idno_type,
                                orgname_is_institution,
                            );
                        }
                    }
                }

                match name.as_str() {
                    "author" => {
                        let full = format!("{} {}", forename.trim(), surname.trim())
                            .trim()
                            .to_string();
                        if !full.is_empty() {
                            if current_ref.is_some() {
                                ref_authors.push(full);
                            } else if stack.iter().any(|s| s == "sourceDesc") {
                                header_authors.push(full);
                            }
                        }
                        forename.clear();
                        surname.clear();
                    }
                    "biblStruct" => {
                        if let Some(mut r) = current_ref.take() {
                            if !ref_authors.is_empty() {
                                r.authors = Some(ref_authors.join("; "));
                            }
                            references.push(r);
                        }
                    }
                    "div" => {
                        if let Some(open) = div_stack.pop() {
                            finish_section(open, &mut sections);
                        }
                    }
                    "orgName" => {
                        orgname_is_institution = false;
                    }
                    "idno" => {
                        idno_type.clear();
                    }
                    _ => {}
                }
            }
            Event::Eof => break,
            _ => {}
        }
    }

    // quick-xml does not treat EOF with open elements as an error; a
    // truncated GROBID response would otherwise parse as an empty document.
    if let Some(unclosed) = stack.last() {
        bail!("malformed TEI XML: unclosed element <{}>", unclosed);
    }

    if !header_authors.is_empty() {
        meta.authors = Some(header_authors.join("; "));
    }
    if !affiliations.is_empty() {
        meta.affiliations = Some(affiliations.join("; "));
    }
    if !keywords.is_empty() {
        meta.keywords = Some(keywords.join(", "));
    }
    if !abstract_parts.is_empty() {
        meta.abstract_text = Some(abstract_parts.join(" "));
    }

    let all_body_text: String = sections
        .iter()
        .map(|s| s.body.as_str())
        .collect::<Vec<_>>()
        .join(" ");
    meta.language = detect_language(&all_body_text).to_string();

    Ok(TeiDocument {
        meta,
        sections,
        references,
    })
}

/// Leaf elements whose text content we collect.
fn is_captured_leaf(name: &str) -> bool {
    matches!(
        name,
        "title" | "forename" | "surname" | "p" | "head" | "term" | "orgName" | "publisher"
            | "idno" | "meeting"
    )
}

fn in_body(stack: &[String]) -> bool {
    stack.iter().any(|s| s == "body")
}

fn in_header(stack: &[String]) -> bool {
    stack.iter().any(|s| s == "teiHeader")
}

#[allow(clippy::too_many_arguments)]
fn dispatch_text(
    name: &str,
    text: String,
    stack: &[String],
    meta: &mut DocumentMeta,
    div_stack: &mut [OpenSection],
    current_ref: &mut Option<BibReference>,
    forename: &mut String,
    surname: &mut String,
    keywords: &mut Vec<String>,
    abstract_parts: &mut Vec<String>,
    affiliations: &mut Vec<String>,
    idno_type: &str,
    orgname_is_institution: bool,
) {
    match name {
        "title" => {
            if let Some(r) = current_ref.as_mut() {
                if r.title.is_none() {
                    r.title = Some(text);
                }
            } else if stack.iter().any(|s| s == "titleStmt") {
                if meta.title.is_none() {
                    meta.title = Some(text);
                }
            } else if in_header(stack) && stack.iter().any(|s| s == "monogr") {
                if meta.journal.is_none() {
                    meta.journal = Some(text);
                }
            }
        }
        "forename" => {
            if !forename.is_empty() {
                forename.push(' ');
            }
            forename.push_str(&text);
        }
        "surname" => {
            if !surname.is_empty() {
                surname.push(' ');
            }
            surname.push_str(&text);
        }
        "p" => {
            if stack.iter().any(|s| s == "abstract") {
                abstract_parts.push(text);
            } else if let Some(open) = div_stack.last_mut() {
                open.paragraphs.push(text);
            }
        }
        "head" => {
            if let Some(open) = div_stack.last_mut() {
                if open.heading.is_none() {
                    open.heading = Some(text);
                }
            }
        }
        "term" => {
            if stack.iter().any(|s| s == "keywords") {
                keywords.push(text);
            }
        }
        "orgName" => {
            if orgname_is_institution && stack.iter().any(|s| s == "affiliation") {
                affiliations.push(text);
            }
        }
        "publisher" => {
            if current_ref.is_none()
                && in_header(stack)
                && stack.iter().any(|s| s == "imprint")
                && meta.editorial.is_none()
            {
                meta.editorial = Some(text);
            }
        }
        "idno" => {
            if current_ref.is_none() && in_header(stack) {
                match idno_type {
                    "DOI" if meta.doi.is_none() => meta.doi = Some(text),
                    "ISBN" if meta.isbn.is_none() => meta.isbn = Some(text),
                    _ => {}
                }
            }
        }
        "meeting" => {
            if current_ref.is_none() && in_header(stack) && meta.conference.is_none() {
                meta.conference = Some(text);
            }
        }
        _ => {}
    }
}

fn record_date(
    stack: &[String],
    meta: &mut DocumentMeta,
    current_ref: &mut Option<BibReference>,
    when: String,
) {
    if let Some(r) = current_ref.as_mut() {
        if r.date.is_none() {
            r.date = Some(when);
        }
    } else if in_header(stack) && meta.date.is_none() {
        meta.date = Some(when);
    }
}

/// Close a body div: join its paragraphs and keep it if there is any text.
/// Appendix sections are dropped, matching the upstream corpus convention.
fn finish_section(open: OpenSection, sections: &mut Vec<RawSection>) {
    if open.paragraphs.is_empty() {
        return;
    }
    if let Some(ref heading) = open.heading {
        let lower = heading.to_lowercase();
        if lower.contains("appendix") || lower.contains("apéndice") {
            return;
        }
    }
    sections.push(RawSection {
        heading: open.heading,
        body: open.paragraphs.join(" "),
    });
}

/// Classify the document as mostly Spanish or mostly English by counting
/// stopword indicators over the first 100 words.
pub fn detect_language(text: &str) -> &'static str {
    let words: Vec<String> = text
        .to_lowercase()
        .split_whitespace()
        .take(100)
        .map(|w| w.to_string())
        .collect();

    let spanish = words
        .iter()
        .filter(|w| SPANISH_INDICATORS.contains(&w.as_str()))
        .count();
    let english = words
        .iter()
        .filter(|w| ENGLISH_INDICATORS.contains(&w.as_str()))
        .count();

    if spanish > english {
        "spanish"
    } else {
        "english"
    }
}

fn local_name(qname: &[u8]) -> String {
    let name = match qname.iter().rposition(|&b| b == b':') {
        Some(pos) => &qname[pos + 1..],
        None => qname,
    };
    String::from_utf8_lossy(name).into_owned()
}

fn attr_value(e: &quick_xml::events::BytesStart<'_>, key: &[u8]) -> Option<String> {
    e.attributes().flatten().find_map(|a| {
        if a.key.local_name().as_ref() == key {
            Some(String::from_utf8_lossy(&a.value).into_owned())
        } else {
            None
        }
    })
}
