//! Rewrites raw schema-engine diagnostics into explanations a person can act on.
use super::{known::KnownElements, parse::ParseError, schema::ResolveError, ValidationError};
use crate::config::Language;
use libxml::error::StructuredError;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::{Arc, OnceLock};

/// One raw message reported by the schema engine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Diagnostic {
    line: Option<u32>,
    message: String,
}

impl Diagnostic {
    pub fn new(line: Option<u32>, message: impl Into<String>) -> Self {
        Self {
            line,
            message: message.into(),
        }
    }

    pub fn line(&self) -> Option<u32> {
        self.line
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}

impl From<&StructuredError> for Diagnostic {
    fn from(error: &StructuredError) -> Self {
        let line = error
            .line
            .and_then(|line| u32::try_from(line).ok())
            .filter(|line| *line > 0);
        let message = error
            .message
            .as_deref()
            .unwrap_or_default()
            .trim()
            .to_string();
        Self { line, message }
    }
}

/// Translates [`Diagnostic`]s, enriching misplaced-element errors with the
/// injected [`KnownElements`] table.
///
/// # Examples
/// ```rust
/// use std::sync::Arc;
/// use comprobante_core::config::Language;
/// use comprobante_core::validation::known::KnownElements;
/// use comprobante_core::validation::translate::{Diagnostic, ErrorTranslator};
///
/// let translator = ErrorTranslator::new(Language::En, Arc::new(KnownElements::empty()));
/// let text = translator.translate(&Diagnostic::new(Some(3), "Something odd."));
/// assert_eq!(text, "Line 3: Something odd.");
/// ```
#[derive(Debug, Clone)]
pub struct ErrorTranslator {
    language: Language,
    known: Arc<KnownElements>,
}

struct Misplaced<'a> {
    element: &'a str,
    expected: Vec<&'a str>,
}

impl ErrorTranslator {
    pub fn new(language: Language, known: Arc<KnownElements>) -> Self {
        Self { language, known }
    }

    pub fn language(&self) -> Language {
        self.language
    }

    /// Never fails: shapes that are not recognised come back as the raw
    /// message with a line prefix.
    pub fn translate(&self, diagnostic: &Diagnostic) -> String {
        let prefix = self.line_prefix(diagnostic.line());
        match parse_misplaced(diagnostic.message()) {
            Some(misplaced) => format!("{prefix}{}", self.explain_misplaced(&misplaced)),
            None => format!("{prefix}{}", diagnostic.message()),
        }
    }

    pub fn translate_all(&self, diagnostics: &[Diagnostic]) -> Vec<String> {
        diagnostics.iter().map(|d| self.translate(d)).collect()
    }

    pub fn success_message(&self) -> &'static str {
        match self.language {
            Language::Es => "XML válido y conforme al esquema XSD.",
            Language::En => "XML is valid and conforms to the XSD schema.",
        }
    }

    pub fn recovery_notice(&self) -> &'static str {
        match self.language {
            Language::Es => {
                "El XML se analizó con recuperación: parte del contenido mal formado pudo descartarse."
            }
            Language::En => {
                "The XML was parsed with recovery: some malformed content may have been dropped."
            }
        }
    }

    /// Localized lines for a failed validation.
    pub fn explain_failure(&self, error: &ValidationError) -> Vec<String> {
        let es = self.language == Language::Es;
        let line = match error {
            ValidationError::SchemaViolation(diagnostics) => return self.translate_all(diagnostics),
            ValidationError::Parse(ParseError::MalformedXml { details }) if es => {
                format!("XML mal formado: {details}")
            }
            ValidationError::Parse(ParseError::MalformedXml { details }) => {
                format!("Malformed XML: {details}")
            }
            ValidationError::Parse(ParseError::Unrecoverable { details }) if es => {
                format!("El XML no pudo recuperarse: {details}")
            }
            ValidationError::Parse(ParseError::Unrecoverable { details }) => {
                format!("The XML could not be recovered: {details}")
            }
            ValidationError::Resolve(resolve) => self.explain_resolve(resolve),
            ValidationError::Unexpected(details) if es => format!("Error inesperado: {details}"),
            ValidationError::Unexpected(details) => format!("Unexpected error: {details}"),
        };
        vec![line]
    }

    fn explain_resolve(&self, error: &ResolveError) -> String {
        match (self.language, error) {
            (Language::Es, ResolveError::MissingRoot) => "El documento no tiene elemento raíz.".into(),
            (Language::En, ResolveError::MissingRoot) => "The document has no root element.".into(),
            (Language::Es, ResolveError::MissingVersion) => {
                "No se pudo detectar la versión del XML (falta <cbc:UBLVersionID>).".into()
            }
            (Language::En, ResolveError::MissingVersion) => {
                "Could not detect the XML version (missing <cbc:UBLVersionID>).".into()
            }
            (Language::Es, ResolveError::UnsupportedVersion { version, path }) => {
                format!("Versión UBL no soportada: {version} (no hay esquemas en {path}).")
            }
            (Language::En, ResolveError::UnsupportedVersion { version, path }) => {
                format!("Unsupported UBL version: {version} (no schemas at {path}).")
            }
            (Language::Es, ResolveError::SchemaNotFound { path }) => {
                format!("No se encontró el esquema XSD: {path}")
            }
            (Language::En, ResolveError::SchemaNotFound { path }) => {
                format!("XSD schema not found: {path}")
            }
            (Language::Es, ResolveError::UnsupportedDocumentType { element, path }) => format!(
                "Tipo de comprobante no soportado: <{element}> (no existe el esquema {path})."
            ),
            (Language::En, ResolveError::UnsupportedDocumentType { element, path }) => {
                format!("Unsupported document type: <{element}> (no schema at {path}).")
            }
            (Language::Es, ResolveError::InvalidSchema { path, details }) => {
                format!("Esquema XSD inválido {path}: {details}")
            }
            (Language::En, ResolveError::InvalidSchema { path, details }) => {
                format!("Invalid XSD schema {path}: {details}")
            }
        }
    }

    fn line_prefix(&self, line: Option<u32>) -> String {
        match (line, self.language) {
            (Some(line), Language::Es) => format!("Línea {line}: "),
            (Some(line), Language::En) => format!("Line {line}: "),
            (None, _) => String::new(),
        }
    }

    fn explain_misplaced(&self, misplaced: &Misplaced<'_>) -> String {
        let mut text = match self.language {
            Language::Es => format!(
                "Usaste la etiqueta <{}> en una ubicación no válida.",
                misplaced.element
            ),
            Language::En => format!("you used <{}> in an invalid location.", misplaced.element),
        };

        if !misplaced.expected.is_empty() {
            let options = tag_list(&misplaced.expected);
            match self.language {
                Language::Es => text.push_str(&format!(
                    " En su lugar, deberías usar una de las siguientes etiquetas: {options}."
                )),
                Language::En => text.push_str(&format!(" Use one of: {options}.")),
            }
        }

        if let Some(info) = self.known.get(misplaced.element) {
            let parents = tag_list(info.allowed_parents());
            match self.language {
                Language::Es => text.push_str(&format!(
                    " Esta etiqueta normalmente debe ir dentro de: {parents}. {}",
                    info.description()
                )),
                Language::En => text.push_str(&format!(
                    " This element normally belongs inside: {parents}. {}",
                    info.description()
                )),
            }
        }

        text
    }
}

fn tag_list<S: AsRef<str>>(names: &[S]) -> String {
    names
        .iter()
        .map(|name| format!("<{}>", name.as_ref()))
        .collect::<Vec<_>>()
        .join(", ")
}

fn element_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"Element '(?:\{[^}]*\})?([^']+)'").expect("element pattern is valid")
    })
}

fn expected_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"Expected is(?: one of)?\s*\(\s*([^)]*?)\s*\)").expect("expected pattern is valid")
    })
}

fn parse_misplaced(message: &str) -> Option<Misplaced<'_>> {
    if !message.contains("This element is not expected") {
        return None;
    }
    let element = element_pattern().captures(message)?.get(1)?.as_str();
    let expected = expected_pattern()
        .captures(message)
        .and_then(|caps| caps.get(1))
        .map(|list| {
            list.as_str()
                .split(',')
                .map(|name| local_name(name.trim()))
                .filter(|name| !name.is_empty())
                .collect()
        })
        .unwrap_or_default();
    Some(Misplaced { element, expected })
}

/// Strips a `{namespace}` or `prefix:` qualifier from an element name.
pub fn local_name(qualified: &str) -> &str {
    let name = qualified.rsplit('}').next().unwrap_or(qualified);
    name.rsplit(':').next().unwrap_or(name)
}
