//! Configuration, environment and language selection.
use serde::{Deserialize, Serialize};
use std::{
    collections::HashMap,
    path::{Path, PathBuf},
    str::FromStr,
};
use thiserror::Error;

/// SUNAT environment selection for the billService endpoint.
/// - Beta: the public test environment, accepts `MODDATOS` credentials.
/// - Production: the live environment.
///
/// # Examples
/// ```rust
/// use std::str::FromStr;
/// use comprobante_core::config::EnvironmentType;
///
/// let env = EnvironmentType::from_str("production")?;
/// assert_eq!(env, EnvironmentType::Production);
/// # Ok::<(), comprobante_core::config::EnvironmentParseError>(())
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum EnvironmentType {
    #[default]
    Beta,
    Production,
}

/// Error returned when parsing an [`EnvironmentType`] from a string.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EnvironmentParseError {
    #[error("invalid environment type: {input}")]
    Invalid { input: String },
}

impl FromStr for EnvironmentType {
    type Err = EnvironmentParseError;
    fn from_str(env: &str) -> Result<EnvironmentType, EnvironmentParseError> {
        match env.to_ascii_lowercase().as_str() {
            "beta" => Ok(EnvironmentType::Beta),
            "production" => Ok(EnvironmentType::Production),
            _ => Err(EnvironmentParseError::Invalid {
                input: env.to_string(),
            }),
        }
    }
}

impl EnvironmentType {
    pub fn as_str(&self) -> &'static str {
        match self {
            EnvironmentType::Beta => "beta",
            EnvironmentType::Production => "production",
        }
    }

    pub fn endpoint_url(&self) -> &'static str {
        match self {
            EnvironmentType::Beta => {
                "https://e-beta.sunat.gob.pe/ol-ti-itcpfegem-beta/billService"
            }
            EnvironmentType::Production => {
                "https://e-factura.sunat.gob.pe/ol-ti-itcpfegem/billService"
            }
        }
    }
}

/// Language used for human-facing validation messages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum Language {
    #[default]
    Es,
    En,
}

/// Error returned when parsing a [`Language`] from a string.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LanguageParseError {
    #[error("unsupported language: {input}")]
    Invalid { input: String },
}

impl FromStr for Language {
    type Err = LanguageParseError;
    fn from_str(lang: &str) -> Result<Language, LanguageParseError> {
        match lang.to_ascii_lowercase().as_str() {
            "es" => Ok(Language::Es),
            "en" => Ok(Language::En),
            _ => Err(LanguageParseError::Invalid {
                input: lang.to_string(),
            }),
        }
    }
}

impl Language {
    pub fn as_str(&self) -> &'static str {
        match self {
            Language::Es => "es",
            Language::En => "en",
        }
    }
}

/// Maps a UBL version to the label its schema files carry.
///
/// Some schema distributions name the UBL 2.0 files `UBL-<Type>-1.0.xsd`, so the
/// label is looked up here instead of being derived per document type.
///
/// # Examples
/// ```rust
/// use comprobante_core::config::SchemaNaming;
///
/// let naming = SchemaNaming::default();
/// assert_eq!(naming.file_label("2.0"), "1.0");
/// assert_eq!(naming.file_label("2.1"), "2.1");
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SchemaNaming {
    labels: HashMap<String, String>,
}

impl SchemaNaming {
    /// A table with no exceptions: every version labels its files with itself.
    pub fn identity() -> Self {
        Self {
            labels: HashMap::new(),
        }
    }

    pub fn with_label(mut self, version: impl Into<String>, label: impl Into<String>) -> Self {
        self.labels.insert(version.into(), label.into());
        self
    }

    pub fn file_label<'a>(&'a self, version: &'a str) -> &'a str {
        self.labels
            .get(version)
            .map(String::as_str)
            .unwrap_or(version)
    }
}

impl Default for SchemaNaming {
    fn default() -> Self {
        Self::identity().with_label("2.0", "1.0")
    }
}

/// Configuration for validation and submission.
///
/// # Examples
/// ```rust
/// use comprobante_core::config::{Config, EnvironmentType, Language};
///
/// let config = Config::new(EnvironmentType::Beta, "assets/schemas").with_language(Language::En);
/// assert_eq!(config.language(), Language::En);
/// ```
#[derive(Debug, Clone)]
pub struct Config {
    env: EnvironmentType,
    schemas_root: PathBuf,
    language: Language,
    ose_endpoint: Option<String>,
    schema_naming: SchemaNaming,
}

/// Error returned by [`Config::from_env`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error(transparent)]
    Environment(#[from] EnvironmentParseError),
    #[error(transparent)]
    Language(#[from] LanguageParseError),
}

impl Config {
    pub fn new(env: EnvironmentType, schemas_root: impl Into<PathBuf>) -> Self {
        Self {
            env,
            schemas_root: schemas_root.into(),
            language: Language::default(),
            ose_endpoint: None,
            schema_naming: SchemaNaming::default(),
        }
    }

    /// Build a configuration from `COMPROBANTE_*` environment variables, falling
    /// back to [`Config::default`] for anything unset.
    ///
    /// # Errors
    /// Returns [`ConfigError`] if `COMPROBANTE_ENV` or `COMPROBANTE_LANGUAGE` hold
    /// unknown values.
    pub fn from_env() -> Result<Self, ConfigError> {
        let mut config = Config::default();
        if let Ok(root) = std::env::var("COMPROBANTE_SCHEMAS_ROOT") {
            config.schemas_root = PathBuf::from(root);
        }
        if let Ok(env) = std::env::var("COMPROBANTE_ENV") {
            config.env = env.parse()?;
        }
        if let Ok(language) = std::env::var("COMPROBANTE_LANGUAGE") {
            config.language = language.parse()?;
        }
        if let Ok(url) = std::env::var("COMPROBANTE_OSE_URL") {
            config.ose_endpoint = Some(url);
        }
        Ok(config)
    }

    pub fn with_env(mut self, env: EnvironmentType) -> Self {
        self.env = env;
        self
    }

    pub fn with_language(mut self, language: Language) -> Self {
        self.language = language;
        self
    }

    pub fn with_schemas_root(mut self, schemas_root: impl Into<PathBuf>) -> Self {
        self.schemas_root = schemas_root.into();
        self
    }

    pub fn with_ose_endpoint(mut self, url: impl Into<String>) -> Self {
        self.ose_endpoint = Some(url.into());
        self
    }

    pub fn with_file_label(mut self, version: impl Into<String>, label: impl Into<String>) -> Self {
        self.schema_naming = self.schema_naming.with_label(version, label);
        self
    }

    pub fn with_schema_naming(mut self, naming: SchemaNaming) -> Self {
        self.schema_naming = naming;
        self
    }

    pub fn env(&self) -> EnvironmentType {
        self.env
    }

    pub fn schemas_root(&self) -> &Path {
        &self.schemas_root
    }

    pub fn language(&self) -> Language {
        self.language
    }

    pub fn ose_endpoint(&self) -> Option<&str> {
        self.ose_endpoint.as_deref()
    }

    pub fn schema_naming(&self) -> &SchemaNaming {
        &self.schema_naming
    }
}

// static function to get default config
impl Default for Config {
    fn default() -> Self {
        Config::new(EnvironmentType::Beta, "./assets/schemas")
    }
}
