//! Schema resolution: from a parsed document to a compiled XSD.
use super::translate::Diagnostic;
use crate::config::{Config, SchemaNaming};
use libxml::{
    parser::Parser,
    schemas::{SchemaParserContext, SchemaValidationContext},
    tree::{Document, Node, SaveOptions},
};
use std::{
    collections::HashMap,
    fmt,
    path::{Path, PathBuf},
    str::FromStr,
};
use thiserror::Error;

pub(crate) const CBC_NS: &str =
    "urn:oasis:names:specification:ubl:schema:xsd:CommonBasicComponents-2";
pub(crate) const XSD_NS: &str = "http://www.w3.org/2001/XMLSchema";

const VERSION_ELEMENT: &str = "UBLVersionID";
const INCLUDE_ELEMENTS: [&str; 4] = ["include", "import", "redefine", "override"];

/// Errors emitted while resolving or loading a schema.
#[derive(Debug, Error)]
pub enum ResolveError {
    #[error("document has no root element")]
    MissingRoot,
    #[error("missing <cbc:UBLVersionID>, the UBL version could not be detected")]
    MissingVersion,
    #[error("unsupported UBL version {version:?} (no schemas at {path})")]
    UnsupportedVersion { version: String, path: String },
    #[error("XSD schema not found: {path}")]
    SchemaNotFound { path: String },
    #[error("unsupported document type <{element}> (no schema at {path})")]
    UnsupportedDocumentType { element: String, path: String },
    #[error("invalid XSD schema {path}: {details}")]
    InvalidSchema { path: String, details: String },
}

/// The four UBL document kinds accepted for Peruvian e-invoicing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DocumentKind {
    Invoice,
    CreditNote,
    DebitNote,
    DespatchAdvice,
}

impl DocumentKind {
    pub fn element_name(&self) -> &'static str {
        match self {
            DocumentKind::Invoice => "Invoice",
            DocumentKind::CreditNote => "CreditNote",
            DocumentKind::DebitNote => "DebitNote",
            DocumentKind::DespatchAdvice => "DespatchAdvice",
        }
    }
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DocumentKindParseError {
    #[error("unknown document type: {input}")]
    Invalid { input: String },
}

impl FromStr for DocumentKind {
    type Err = DocumentKindParseError;
    fn from_str(name: &str) -> Result<Self, Self::Err> {
        match name {
            "Invoice" => Ok(DocumentKind::Invoice),
            "CreditNote" => Ok(DocumentKind::CreditNote),
            "DebitNote" => Ok(DocumentKind::DebitNote),
            "DespatchAdvice" => Ok(DocumentKind::DespatchAdvice),
            _ => Err(DocumentKindParseError::Invalid {
                input: name.to_string(),
            }),
        }
    }
}

impl fmt::Display for DocumentKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.element_name())
    }
}

/// Version and root element that together select a schema file.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SchemaDescriptor {
    version: String,
    element: String,
}

impl SchemaDescriptor {
    pub fn new(version: impl Into<String>, element: impl Into<String>) -> Self {
        Self {
            version: version.into(),
            element: element.into(),
        }
    }

    pub fn version(&self) -> &str {
        &self.version
    }

    pub fn element(&self) -> &str {
        &self.element
    }

    pub fn kind(&self) -> Option<DocumentKind> {
        self.element.parse().ok()
    }

    /// `UBL-<Element>-<label>.xsd`, where the label comes from `naming`.
    pub fn file_name(&self, naming: &SchemaNaming) -> String {
        format!(
            "UBL-{}-{}.xsd",
            self.element,
            naming.file_label(&self.version)
        )
    }
}

/// Maps a `schemaLocation` found in a schema to a local file.
pub trait IncludeResolver {
    /// `None` leaves the location untouched.
    fn resolve_include(&self, location: &str) -> Option<PathBuf>;
}

/// Resolves every include to `<common_dir>/<last path segment>`, so remote
/// URLs and relative paths alike are served from disk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocalIncludeResolver {
    common_dir: PathBuf,
}

impl LocalIncludeResolver {
    pub fn new(common_dir: impl Into<PathBuf>) -> Self {
        Self {
            common_dir: common_dir.into(),
        }
    }

    pub fn common_dir(&self) -> &Path {
        &self.common_dir
    }
}

impl IncludeResolver for LocalIncludeResolver {
    fn resolve_include(&self, location: &str) -> Option<PathBuf> {
        let file_name = location
            .rsplit(['/', '\\'])
            .find(|segment| !segment.is_empty())?;
        let candidate = self.common_dir.join(file_name);
        Some(candidate.canonicalize().unwrap_or(candidate))
    }
}

/// A compiled schema ready to validate documents.
pub struct CompiledSchema {
    context: SchemaValidationContext,
    path: PathBuf,
    // The parsed schema tree outlives the validation context built from it.
    _source: Document,
}

impl fmt::Debug for CompiledSchema {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CompiledSchema")
            .field("path", &self.path)
            .finish_non_exhaustive()
    }
}

impl CompiledSchema {
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Validate `document`, returning every diagnostic the engine reports.
    pub fn validate(&mut self, document: &Document) -> Result<(), Vec<Diagnostic>> {
        self.context
            .validate_document(document)
            .map_err(|errors| errors.iter().map(Diagnostic::from).collect())
    }
}

/// Load the schema at `xsd_path`, sending every include/import it reaches,
/// at any depth, through `includes` before compiling it.
///
/// Dependencies are rewritten and staged in a scratch directory for the
/// duration of the compile, so libxml only ever opens local files.
///
/// # Errors
/// Returns [`ResolveError::SchemaNotFound`] when the file is missing and
/// [`ResolveError::InvalidSchema`] when it cannot be parsed or compiled.
pub fn load_schema(
    xsd_path: &Path,
    includes: &dyn IncludeResolver,
) -> Result<CompiledSchema, ResolveError> {
    if !xsd_path.is_file() {
        return Err(ResolveError::SchemaNotFound {
            path: xsd_path.display().to_string(),
        });
    }
    let invalid = |details: String| ResolveError::InvalidSchema {
        path: xsd_path.display().to_string(),
        details,
    };

    let staging = tempfile::Builder::new()
        .prefix("comprobante-xsd-")
        .tempdir()
        .map_err(|e| invalid(format!("cannot create staging directory: {e}")))?;
    let mut stager = IncludeStager {
        includes,
        staging: staging.path(),
        staged: HashMap::new(),
    };
    let source = parse_schema_file(xsd_path).map_err(invalid)?;
    stager.rewrite(&source, xsd_path).map_err(invalid)?;

    let mut parser_ctx = SchemaParserContext::from_document(&source);
    let context = SchemaValidationContext::from_parser(&mut parser_ctx).map_err(|errors| {
        invalid(
            errors
                .iter()
                .map(|e| Diagnostic::from(e).message().to_string())
                .collect::<Vec<_>>()
                .join("; "),
        )
    })?;
    tracing::debug!(
        schema = %xsd_path.display(),
        dependencies = stager.staged.len(),
        "compiled schema"
    );

    Ok(CompiledSchema {
        context,
        path: xsd_path.to_path_buf(),
        _source: source,
    })
}

fn parse_schema_file(path: &Path) -> Result<Document, String> {
    let path_str = path
        .to_str()
        .ok_or_else(|| format!("{} is not valid UTF-8", path.display()))?;
    Parser::default()
        .parse_file(path_str)
        .map_err(|e| format!("cannot parse {}: {e:?}", path.display()))
}

/// Walks the include graph of a schema, keyed by canonical local path so a
/// file reached twice (or through a cycle) is staged once.
struct IncludeStager<'a> {
    includes: &'a dyn IncludeResolver,
    staging: &'a Path,
    staged: HashMap<PathBuf, PathBuf>,
}

impl IncludeStager<'_> {
    fn rewrite(&mut self, schema: &Document, schema_path: &Path) -> Result<(), String> {
        let root = schema
            .get_root_element()
            .ok_or_else(|| format!("{} has no root element", schema_path.display()))?;

        for mut child in root.get_child_elements() {
            if !is_include(&child) {
                continue;
            }
            let Some(location) = child.get_property("schemaLocation") else {
                continue;
            };
            let Some(local) = self.local_path(&location, schema_path) else {
                continue;
            };
            let target = self.stage(&local)?.to_string_lossy().into_owned();
            tracing::debug!(%location, local = %local.display(), "resolved schema include");
            child
                .set_property("schemaLocation", &target)
                .map_err(|e| format!("cannot rewrite {location}: {e}"))?;
        }
        Ok(())
    }

    fn local_path(&self, location: &str, schema_path: &Path) -> Option<PathBuf> {
        if let Some(local) = self.includes.resolve_include(location) {
            return Some(local);
        }
        // Relative locations must keep pointing next to the file that names them.
        if location.contains("://") {
            return None;
        }
        Some(schema_path.parent()?.join(location))
    }

    fn stage(&mut self, local: &Path) -> Result<PathBuf, String> {
        let local = local.canonicalize().unwrap_or_else(|_| local.to_path_buf());
        if let Some(staged) = self.staged.get(&local) {
            return Ok(staged.clone());
        }
        if !local.is_file() {
            return Ok(local);
        }

        let name = local
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_default();
        let staged = self.staging.join(format!("{}-{name}", self.staged.len()));
        self.staged.insert(local.clone(), staged.clone());

        let dependency = parse_schema_file(&local)?;
        self.rewrite(&dependency, &local)?;
        std::fs::write(
            &staged,
            dependency.to_string_with_options(SaveOptions::default()),
        )
        .map_err(|e| format!("cannot stage {}: {e}", local.display()))?;
        Ok(staged)
    }
}

fn is_include(node: &Node) -> bool {
    let in_xsd = node
        .get_namespace()
        .map(|ns| ns.get_href() == XSD_NS)
        .unwrap_or(false);
    in_xsd && INCLUDE_ELEMENTS.contains(&node.get_name().as_str())
}

/// Text of the `cbc:UBLVersionID` child of the root element, if present and
/// not blank.
pub fn extract_version(document: &Document) -> Option<String> {
    let root = document.get_root_element()?;
    root.get_child_elements()
        .into_iter()
        .find(|child| {
            child.get_name() == VERSION_ELEMENT
                && child
                    .get_namespace()
                    .map(|ns| ns.get_href() == CBC_NS)
                    .unwrap_or(false)
        })
        .map(|node| node.get_content().trim().to_string())
        .filter(|version| !version.is_empty())
}

fn is_version_token(version: &str) -> bool {
    !version.is_empty()
        && version.chars().all(|c| c.is_ascii_digit() || c == '.')
        && !version.starts_with('.')
        && !version.contains("..")
}

/// Finds the schema for a document under `<root>/<version>/maindoc/` and
/// loads it with includes served from `<root>/<version>/common/`.
///
/// # Examples
/// ```rust,no_run
/// use comprobante_core::config::Config;
/// use comprobante_core::validation::parse::parse_document;
/// use comprobante_core::validation::schema::SchemaResolver;
///
/// let resolver = SchemaResolver::from_config(&Config::default());
/// let xml = std::fs::read_to_string("F001-1.xml")?;
/// let parsed = parse_document(&xml, false)?;
/// let schema = resolver.resolve(parsed.document())?;
/// println!("{}", schema.path().display());
/// # Ok::<(), Box<dyn std::error::Error>>(())
/// ```
#[derive(Debug, Clone)]
pub struct SchemaResolver {
    root: PathBuf,
    naming: SchemaNaming,
}

impl SchemaResolver {
    pub fn new(root: impl Into<PathBuf>, naming: SchemaNaming) -> Self {
        Self {
            root: root.into(),
            naming,
        }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(config.schemas_root(), config.schema_naming().clone())
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Derive the descriptor from the document's own structure.
    pub fn describe(&self, document: &Document) -> Result<SchemaDescriptor, ResolveError> {
        let root = document
            .get_root_element()
            .ok_or(ResolveError::MissingRoot)?;
        let version = extract_version(document).ok_or(ResolveError::MissingVersion)?;
        Ok(SchemaDescriptor::new(version, root.get_name()))
    }

    pub fn version_dir(&self, version: &str) -> PathBuf {
        self.root.join(version)
    }

    pub fn schema_path(&self, descriptor: &SchemaDescriptor) -> PathBuf {
        self.version_dir(descriptor.version())
            .join("maindoc")
            .join(descriptor.file_name(&self.naming))
    }

    pub fn include_resolver(&self, version: &str) -> LocalIncludeResolver {
        LocalIncludeResolver::new(self.version_dir(version).join("common"))
    }

    /// Locate the schema file for `descriptor` without loading it.
    pub fn locate(&self, descriptor: &SchemaDescriptor) -> Result<PathBuf, ResolveError> {
        let version_dir = self.version_dir(descriptor.version());
        if !is_version_token(descriptor.version()) || !version_dir.is_dir() {
            return Err(ResolveError::UnsupportedVersion {
                version: descriptor.version().to_string(),
                path: version_dir.display().to_string(),
            });
        }

        let path = self.schema_path(descriptor);
        if path.is_file() {
            return Ok(path);
        }
        match descriptor.kind() {
            Some(_) => Err(ResolveError::SchemaNotFound {
                path: path.display().to_string(),
            }),
            None => Err(ResolveError::UnsupportedDocumentType {
                element: descriptor.element().to_string(),
                path: path.display().to_string(),
            }),
        }
    }

    pub fn resolve(&self, document: &Document) -> Result<CompiledSchema, ResolveError> {
        let descriptor = self.describe(document)?;
        let path = self.locate(&descriptor)?;
        tracing::debug!(
            version = descriptor.version(),
            element = descriptor.element(),
            path = %path.display(),
            "resolved schema"
        );
        load_schema(&path, &self.include_resolver(descriptor.version()))
    }
}
