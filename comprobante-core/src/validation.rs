//! Validation of UBL documents against their XSD schemas.
//!
//! The pipeline parses the text (optionally recovering malformed XML), derives
//! the schema from the document's own `cbc:UBLVersionID` and root element,
//! validates, and translates every diagnostic into a readable message.
pub mod known;
pub mod parse;
pub mod schema;
pub mod translate;

use crate::config::Config;
use known::KnownElements;
use parse::{parse_document, ParseError, ParsedDocument};
use schema::{ResolveError, SchemaResolver};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use thiserror::Error;
use translate::{Diagnostic, ErrorTranslator};

/// Every way a validation can fail.
#[derive(Debug, Error)]
pub enum ValidationError {
    #[error(transparent)]
    Parse(#[from] ParseError),
    #[error(transparent)]
    Resolve(#[from] ResolveError),
    #[error("document violates its schema ({} errors)", .0.len())]
    SchemaViolation(Vec<Diagnostic>),
    #[error("unexpected failure: {0}")]
    Unexpected(String),
}

/// Result of a validation call. Always produced, never an error.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationOutcome {
    is_valid: bool,
    messages: Vec<String>,
    corrected_document: Option<String>,
    recovered: bool,
}

impl ValidationOutcome {
    pub fn is_valid(&self) -> bool {
        self.is_valid
    }

    pub fn messages(&self) -> &[String] {
        &self.messages
    }

    /// All messages joined with newlines.
    pub fn message(&self) -> String {
        self.messages.join("\n")
    }

    /// The text the caller can keep: the input as given, or the repaired
    /// serialization when recovery was needed.
    pub fn corrected_document(&self) -> Option<&str> {
        self.corrected_document.as_deref()
    }

    /// Whether the document was only readable with recovery.
    pub fn recovered(&self) -> bool {
        self.recovered
    }

    pub fn report(&self) -> ValidationReport {
        ValidationReport::from(self)
    }
}

/// Wire shape of an outcome: `message` and `error` are mutually exclusive.
///
/// # Examples
/// ```rust
/// use comprobante_core::validation::ValidationReport;
///
/// let json = r#"{"valid":false,"message":null,"error":"boom","correctedXml":null,"recovered":false}"#;
/// let report: ValidationReport = serde_json::from_str(json)?;
/// assert_eq!(report.error(), Some("boom"));
/// # Ok::<(), serde_json::Error>(())
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidationReport {
    valid: bool,
    message: Option<String>,
    error: Option<String>,
    corrected_xml: Option<String>,
    #[serde(default)]
    recovered: bool,
}

impl ValidationReport {
    pub fn valid(&self) -> bool {
        self.valid
    }

    pub fn message(&self) -> Option<&str> {
        self.message.as_deref()
    }

    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    pub fn corrected_xml(&self) -> Option<&str> {
        self.corrected_xml.as_deref()
    }

    pub fn recovered(&self) -> bool {
        self.recovered
    }
}

impl From<&ValidationOutcome> for ValidationReport {
    fn from(outcome: &ValidationOutcome) -> Self {
        let text = outcome.message();
        let (message, error) = if outcome.is_valid {
            (Some(text), None)
        } else {
            (None, Some(text))
        };
        Self {
            valid: outcome.is_valid,
            message,
            error,
            corrected_xml: outcome.corrected_document.clone(),
            recovered: outcome.recovered,
        }
    }
}

/// Validates documents against the schema tree described by a [`Config`].
///
/// Holds no per-call state, so one instance can be shared across threads.
///
/// # Examples
/// ```rust,no_run
/// use comprobante_core::config::Config;
/// use comprobante_core::validation::Validator;
///
/// let validator = Validator::new(&Config::default());
/// let xml = std::fs::read_to_string("F001-1.xml")?;
/// let outcome = validator.validate(&xml, Some("factura"), true);
/// println!("{} {}", outcome.is_valid(), outcome.message());
/// # Ok::<(), std::io::Error>(())
/// ```
#[derive(Debug, Clone)]
pub struct Validator {
    resolver: SchemaResolver,
    translator: ErrorTranslator,
}

impl Validator {
    /// Validator using the built-in known-element table.
    pub fn new(config: &Config) -> Self {
        Self::with_known_elements(config, Arc::new(KnownElements::builtin(config.language())))
    }

    pub fn with_known_elements(config: &Config, known: Arc<KnownElements>) -> Self {
        Self::from_parts(
            SchemaResolver::from_config(config),
            ErrorTranslator::new(config.language(), known),
        )
    }

    pub fn from_parts(resolver: SchemaResolver, translator: ErrorTranslator) -> Self {
        Self {
            resolver,
            translator,
        }
    }

    pub fn resolver(&self) -> &SchemaResolver {
        &self.resolver
    }

    pub fn translator(&self) -> &ErrorTranslator {
        &self.translator
    }

    /// Validate `xml`.
    ///
    /// `document_type` is informational only: the schema is always chosen from
    /// the document's root element. With `allow_recovery`, malformed XML is
    /// repaired on a best-effort basis and the repaired text is returned even
    /// when the document then fails schema validation.
    pub fn validate(
        &self,
        xml: &str,
        document_type: Option<&str>,
        allow_recovery: bool,
    ) -> ValidationOutcome {
        let parsed = match parse_document(xml, allow_recovery) {
            Ok(parsed) => parsed,
            Err(e) => return self.failure(&e.into(), None, false),
        };
        if let (Some(hint), Some(root)) = (document_type, parsed.document().get_root_element()) {
            tracing::debug!(hint, root = %root.get_name(), "document type hint is not used for schema selection");
        }

        let recovered = parsed.recovered();
        match self.check(&parsed) {
            Ok(()) => {
                tracing::info!(recovered, "document is valid");
                let mut messages = self.recovery_lines(recovered);
                messages.push(self.translator.success_message().to_string());
                ValidationOutcome {
                    is_valid: true,
                    messages,
                    corrected_document: Some(parsed.into_text()),
                    recovered,
                }
            }
            Err(error @ ValidationError::SchemaViolation(_)) => {
                let corrected = allow_recovery.then(|| parsed.into_text());
                self.failure(&error, corrected, recovered)
            }
            Err(error) => self.failure(&error, None, recovered),
        }
    }

    /// Like [`Validator::validate`] but exposes the typed failure.
    ///
    /// # Errors
    /// Returns the first [`ValidationError`] met along the pipeline.
    pub fn try_validate(
        &self,
        xml: &str,
        allow_recovery: bool,
    ) -> Result<ParsedDocument, ValidationError> {
        let parsed = parse_document(xml, allow_recovery)?;
        self.check(&parsed)?;
        Ok(parsed)
    }

    /// Run [`Validator::validate`] on tokio's blocking pool, since schema
    /// loading reads from disk.
    pub async fn validate_blocking(
        self: Arc<Self>,
        xml: String,
        document_type: Option<String>,
        allow_recovery: bool,
    ) -> ValidationOutcome {
        let validator = Arc::clone(&self);
        let task = tokio::task::spawn_blocking(move || {
            validator.validate(&xml, document_type.as_deref(), allow_recovery)
        });
        match task.await {
            Ok(outcome) => outcome,
            Err(e) => self.failure(&ValidationError::Unexpected(e.to_string()), None, false),
        }
    }

    fn check(&self, parsed: &ParsedDocument) -> Result<(), ValidationError> {
        let mut schema = self.resolver.resolve(parsed.document())?;
        schema
            .validate(parsed.document())
            .map_err(|diagnostics| {
                if diagnostics.is_empty() {
                    ValidationError::Unexpected(format!(
                        "schema engine rejected the document without diagnostics ({})",
                        schema.path().display()
                    ))
                } else {
                    ValidationError::SchemaViolation(diagnostics)
                }
            })
    }

    fn recovery_lines(&self, recovered: bool) -> Vec<String> {
        if recovered {
            vec![self.translator.recovery_notice().to_string()]
        } else {
            Vec::new()
        }
    }

    fn failure(
        &self,
        error: &ValidationError,
        corrected_document: Option<String>,
        recovered: bool,
    ) -> ValidationOutcome {
        tracing::info!(%error, "document is not valid");
        let mut messages = self.recovery_lines(recovered);
        messages.extend(self.translator.explain_failure(error));
        ValidationOutcome {
            is_valid: false,
            messages,
            corrected_document,
            recovered,
        }
    }
}
