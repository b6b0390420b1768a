//! Rust toolkit for Peruvian UBL 2.x e-invoicing: XSD validation with readable
//! diagnostics, lenient XML recovery, and `sendBill` submission to SUNAT or an OSE.
//!
//! # Examples
//! ```rust
//! use comprobante_core::config::{Config, EnvironmentType, Language};
//! use comprobante_core::validation::Validator;
//!
//! let config = Config::new(EnvironmentType::Beta, "./assets/schemas").with_language(Language::En);
//! let validator = Validator::new(&config);
//! # let _ = validator;
//! ```
pub mod api;
pub mod config;
pub mod validation;

use thiserror::Error;

/// Top-level error wrapper for core operations.
#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Config(#[from] config::ConfigError),
    #[error(transparent)]
    Parse(#[from] validation::parse::ParseError),
    #[error(transparent)]
    Resolve(#[from] validation::schema::ResolveError),
    #[error(transparent)]
    Validation(#[from] validation::ValidationError),
    #[error(transparent)]
    KnownElements(#[from] validation::known::KnownElementsError),
    #[error(transparent)]
    Api(#[from] api::SunatError),
}
