//! Strict and lenient XML parsing.
use libxml::{
    parser::{Parser, ParserOptions},
    tree::{Document, SaveOptions},
};
use quick_xml::{events::Event, Reader};
use thiserror::Error;

/// Errors emitted while parsing a document.
#[derive(Debug, Error)]
pub enum ParseError {
    #[error("malformed XML: {details}")]
    MalformedXml { details: String },
    #[error("XML could not be recovered: {details}")]
    Unrecoverable { details: String },
}

/// A parsed document together with the text it should be reported as.
///
/// `text` is the caller's input when the strict parse succeeded and the
/// re-serialized tree when recovery was needed.
pub struct ParsedDocument {
    document: Document,
    text: String,
    recovered: bool,
}

impl std::fmt::Debug for ParsedDocument {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ParsedDocument")
            .field("text", &self.text)
            .field("recovered", &self.recovered)
            .finish_non_exhaustive()
    }
}

impl ParsedDocument {
    pub fn document(&self) -> &Document {
        &self.document
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn into_text(self) -> String {
        self.text
    }

    pub fn recovered(&self) -> bool {
        self.recovered
    }
}

/// Location and reason of the first well-formedness error found in a text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyntaxError {
    pub line: usize,
    pub column: usize,
    pub reason: String,
}

impl std::fmt::Display for SyntaxError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "line {}, column {}: {}", self.line, self.column, self.reason)
    }
}

/// Parse `xml`, falling back to libxml2's recovery mode when `allow_recovery`
/// is set and the strict parse fails.
///
/// # Errors
/// Returns [`ParseError::MalformedXml`] when the text is not well formed and
/// recovery is disabled, and [`ParseError::Unrecoverable`] when even the
/// recovering parser cannot produce a tree with a root element.
///
/// # Examples
/// ```rust
/// use comprobante_core::validation::parse::parse_document;
///
/// let parsed = parse_document("<Invoice><ID>F001-1</Invoice>", true)?;
/// assert!(parsed.recovered());
/// assert!(parsed.text().contains("F001-1"));
/// # Ok::<(), comprobante_core::validation::parse::ParseError>(())
/// ```
pub fn parse_document(xml: &str, allow_recovery: bool) -> Result<ParsedDocument, ParseError> {
    if let Some(document) = parse_strict(xml) {
        return Ok(ParsedDocument {
            document,
            text: xml.to_string(),
            recovered: false,
        });
    }

    let details = describe_failure(xml);
    if !allow_recovery {
        return Err(ParseError::MalformedXml { details });
    }

    tracing::warn!(%details, "strict parse failed, retrying with recovery");
    let options = ParserOptions {
        recover: true,
        ..ParserOptions::default()
    };
    let document = Parser::default()
        .parse_string_with_options(xml, options)
        .map_err(|e| ParseError::Unrecoverable {
            details: format!("{details} ({e:?})"),
        })?;
    if document.get_root_element().is_none() {
        return Err(ParseError::Unrecoverable { details });
    }

    let text = document.to_string_with_options(SaveOptions {
        format: true,
        ..SaveOptions::default()
    });
    Ok(ParsedDocument {
        document,
        text,
        recovered: true,
    })
}

fn parse_strict(xml: &str) -> Option<Document> {
    let options = ParserOptions {
        recover: false,
        ..ParserOptions::default()
    };
    Parser::default()
        .parse_string_with_options(xml, options)
        .ok()
}

fn describe_failure(xml: &str) -> String {
    match find_syntax_error(xml) {
        Some(error) => error.to_string(),
        None => "document is not well-formed XML".to_string(),
    }
}

/// Scan `xml` for the first well-formedness error.
pub fn find_syntax_error(xml: &str) -> Option<SyntaxError> {
    let xml = xml.strip_prefix('\u{feff}').unwrap_or(xml);
    let mut reader = Reader::from_str(xml);
    reader.config_mut().check_end_names = true;

    let mut open: Vec<String> = Vec::new();
    let mut seen_root = false;
    loop {
        let event = match reader.read_event() {
            Ok(event) => event,
            Err(e) => {
                let position = usize::try_from(reader.error_position()).unwrap_or(xml.len());
                return Some(syntax_error_at(xml, position, e.to_string()));
            }
        };
        let position = usize::try_from(reader.buffer_position()).unwrap_or(xml.len());
        match event {
            Event::Start(start) => {
                if open.is_empty() && seen_root {
                    return Some(syntax_error_at(xml, position, "more than one root element".into()));
                }
                if let Some(Err(e)) = start.attributes().find(Result::is_err) {
                    return Some(syntax_error_at(xml, position, e.to_string()));
                }
                open.push(String::from_utf8_lossy(start.name().as_ref()).into_owned());
                seen_root = true;
            }
            Event::Empty(empty) => {
                if open.is_empty() && seen_root {
                    return Some(syntax_error_at(xml, position, "more than one root element".into()));
                }
                if let Some(Err(e)) = empty.attributes().find(Result::is_err) {
                    return Some(syntax_error_at(xml, position, e.to_string()));
                }
                seen_root = true;
            }
            Event::End(_) => {
                open.pop();
            }
            Event::Text(text) => {
                if open.is_empty() && !text.iter().all(u8::is_ascii_whitespace) {
                    return Some(syntax_error_at(
                        xml,
                        position,
                        "text outside of the root element".into(),
                    ));
                }
            }
            Event::Eof => {
                if let Some(name) = open.last() {
                    return Some(syntax_error_at(
                        xml,
                        xml.len(),
                        format!("unexpected end of document, <{name}> is not closed"),
                    ));
                }
                if !seen_root {
                    return Some(syntax_error_at(xml, xml.len(), "no root element".into()));
                }
                return None;
            }
            _ => {}
        }
    }
}

fn syntax_error_at(xml: &str, position: usize, reason: String) -> SyntaxError {
    let mut end = position.min(xml.len());
    while !xml.is_char_boundary(end) {
        end -= 1;
    }
    let before = &xml[..end];
    let line = before.matches('\n').count() + 1;
    let column = before
        .rsplit('\n')
        .next()
        .map(|tail| tail.chars().count() + 1)
        .unwrap_or(1);
    SyntaxError {
        line,
        column,
        reason,
    }
}
