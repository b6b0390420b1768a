//! Reference table of elements that are frequently misplaced.
use crate::config::Language;
use serde::{Deserialize, Serialize};
use std::{collections::HashMap, path::Path};
use thiserror::Error;

/// Where an element is allowed and what it is for.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KnownElementInfo {
    allowed_parents: Vec<String>,
    description: String,
}

impl KnownElementInfo {
    pub fn new<I, S>(allowed_parents: I, description: impl Into<String>) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            allowed_parents: allowed_parents.into_iter().map(Into::into).collect(),
            description: description.into(),
        }
    }

    pub fn allowed_parents(&self) -> &[String] {
        &self.allowed_parents
    }

    pub fn description(&self) -> &str {
        &self.description
    }
}

/// Errors returned while loading a custom table.
#[derive(Debug, Error)]
pub enum KnownElementsError {
    #[error("failed to read known elements file {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid known elements JSON: {0}")]
    Json(#[from] serde_json::Error),
}

/// Immutable lookup keyed by element local name.
///
/// # Examples
/// ```rust
/// use comprobante_core::config::Language;
/// use comprobante_core::validation::known::KnownElements;
///
/// let table = KnownElements::builtin(Language::En);
/// let package = table.get("Package").expect("builtin entry");
/// assert_eq!(package.allowed_parents(), ["Shipment", "GoodsItem"]);
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct KnownElements {
    entries: HashMap<String, KnownElementInfo>,
}

impl KnownElements {
    pub fn empty() -> Self {
        Self::default()
    }

    /// The despatch-advice table shipped with the crate.
    pub fn builtin(language: Language) -> Self {
        let rows: [(&str, &[&str], &str, &str); 5] = [
            (
                "AttachedTransportEquipment",
                &["TransportEquipment"],
                "Información sobre equipos de transporte asociados como contenedores, remolques, etc.",
                "Information about associated transport equipment such as containers, trailers, etc.",
            ),
            (
                "ShipmentDocumentReference",
                &["Shipment"],
                "Referencia a documentos de envío relacionados.",
                "Reference to related shipment documents.",
            ),
            (
                "ContainedInTransportEquipment",
                &["Shipment"],
                "Relación del envío con un equipo de transporte.",
                "Relation between the shipment and a piece of transport equipment.",
            ),
            (
                "Package",
                &["Shipment", "GoodsItem"],
                "Información de los paquetes enviados.",
                "Information about the packages shipped.",
            ),
            (
                "GoodsItem",
                &["Shipment"],
                "Detalles de los bienes incluidos en el envío.",
                "Details of the goods included in the shipment.",
            ),
        ];

        let entries = rows
            .into_iter()
            .map(|(name, parents, es, en)| {
                let description = match language {
                    Language::Es => es,
                    Language::En => en,
                };
                (
                    name.to_string(),
                    KnownElementInfo::new(parents.iter().copied(), description),
                )
            })
            .collect();
        Self { entries }
    }

    /// Parse a table from JSON shaped as
    /// `{"Name": {"allowed_parents": [..], "description": ".."}}`.
    pub fn from_json_str(json: &str) -> Result<Self, KnownElementsError> {
        let entries: HashMap<String, KnownElementInfo> = serde_json::from_str(json)?;
        Ok(Self { entries })
    }

    pub fn from_json_file(path: &Path) -> Result<Self, KnownElementsError> {
        let json = std::fs::read_to_string(path).map_err(|source| KnownElementsError::Read {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_json_str(&json)
    }

    pub fn with_entry(mut self, name: impl Into<String>, info: KnownElementInfo) -> Self {
        self.entries.insert(name.into(), info);
        self
    }

    pub fn get(&self, name: &str) -> Option<&KnownElementInfo> {
        self.entries.get(name)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
