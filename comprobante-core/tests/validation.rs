mod common;

use comprobante_core::config::Language;
use comprobante_core::validation::{
    known::KnownElements, parse::ParseError, schema::ResolveError, ValidationError, Validator,
};
use std::sync::Arc;

fn validator(language: Language) -> Validator {
    Validator::new(&common::config(language))
}

#[test]
fn valid_invoice_passes_and_returns_original_text() {
    let xml = common::document("invoice-valid.xml");
    let outcome = validator(Language::Es).validate(&xml, Some("factura"), false);
    assert!(outcome.is_valid(), "{}", outcome.message());
    assert_eq!(outcome.message(), "XML válido y conforme al esquema XSD.");
    assert_eq!(outcome.corrected_document(), Some(xml.as_str()));
    assert!(!outcome.recovered());
}

#[test]
fn validating_twice_gives_identical_outcomes() {
    let xml = common::document("invoice-valid.xml");
    let validator = validator(Language::En);
    let first = validator.validate(&xml, None, true);
    let second = validator.validate(&xml, None, true);
    assert_eq!(first, second);
}

#[test]
fn document_type_hint_does_not_select_schema() {
    let xml = common::document("invoice-valid.xml");
    let validator = validator(Language::En);
    let outcome = validator.validate(&xml, Some("DespatchAdvice"), false);
    assert!(outcome.is_valid(), "{}", outcome.message());
}

#[test]
fn version_2_0_uses_table_driven_file_label() {
    let xml = common::document("invoice-2.0.xml");
    let outcome = validator(Language::En).validate(&xml, None, false);
    assert!(outcome.is_valid(), "{}", outcome.message());
}

#[test]
fn despatch_advice_validates() {
    let xml = common::document("despatch-valid.xml");
    let outcome = validator(Language::En).validate(&xml, Some("guia"), false);
    assert!(outcome.is_valid(), "{}", outcome.message());
}

#[test]
fn missing_version_fails_regardless_of_recovery() {
    let xml = common::document("invoice-missing-version.xml");
    for allow_recovery in [false, true] {
        let outcome = validator(Language::Es).validate(&xml, None, allow_recovery);
        assert!(!outcome.is_valid());
        assert!(
            outcome.message().contains("UBLVersionID"),
            "{}",
            outcome.message()
        );
        assert_eq!(outcome.corrected_document(), None);
    }
}

#[test]
fn unsupported_version_is_not_substituted() {
    let xml = common::document("invoice-unsupported-version.xml");
    let outcome = validator(Language::En).validate(&xml, None, false);
    assert!(!outcome.is_valid());
    assert!(outcome.message().contains("Unsupported UBL version: 9.9"), "{}", outcome.message());

    let err = validator(Language::En)
        .try_validate(&xml, false)
        .expect_err("unsupported version");
    assert!(matches!(
        err,
        ValidationError::Resolve(ResolveError::UnsupportedVersion { ref version, .. }) if version == "9.9"
    ));
}

#[test]
fn known_kind_without_schema_reports_probed_path() {
    let xml = common::document("creditnote.xml");
    let outcome = validator(Language::En).validate(&xml, None, false);
    assert!(!outcome.is_valid());
    assert!(
        outcome.message().contains("UBL-CreditNote-2.1.xsd"),
        "{}",
        outcome.message()
    );
    assert!(outcome.message().contains("2.1/maindoc"), "{}", outcome.message());
}

#[test]
fn unknown_root_is_unsupported_document_type() {
    let xml = common::document("order.xml");
    let err = validator(Language::En)
        .try_validate(&xml, false)
        .expect_err("unsupported type");
    match err {
        ValidationError::Resolve(ResolveError::UnsupportedDocumentType { element, path }) => {
            assert_eq!(element, "Order");
            assert!(path.ends_with("UBL-Order-2.1.xsd"), "{path}");
        }
        other => panic!("unexpected error: {other:?}"),
    }
}

#[test]
fn misplaced_element_names_offender_and_alternatives() {
    let xml = common::document("invoice-misplaced.xml");
    let outcome = validator(Language::En).validate(&xml, None, false);
    assert!(!outcome.is_valid());
    let message = outcome.message();
    assert!(message.starts_with("Line 8: you used <InvoiceLine> in an invalid location."), "{message}");
    assert!(message.contains("Use one of:"), "{message}");
    assert!(message.contains("<AccountingSupplierParty>"), "{message}");
    assert_eq!(outcome.corrected_document(), None);
}

#[test]
fn misplaced_package_is_enriched_from_builtin_table() {
    let xml = common::document("despatch-package-misplaced.xml");
    let outcome = validator(Language::Es).validate(&xml, None, false);
    assert!(!outcome.is_valid());
    let message = outcome.message();
    assert!(message.contains("Usaste la etiqueta <Package>"), "{message}");
    assert!(message.contains("<Shipment>"), "{message}");
    assert!(
        message.contains("Esta etiqueta normalmente debe ir dentro de: <Shipment>, <GoodsItem>."),
        "{message}"
    );
}

#[test]
fn injected_table_replaces_builtin_enrichment() {
    let known = KnownElements::from_json_file(&common::fixtures_dir().join("known-elements.json"))
        .expect("known elements fixture");
    let validator = Validator::with_known_elements(&common::config(Language::Es), Arc::new(known));
    let outcome = validator.validate(&common::document("invoice-misplaced.xml"), None, false);
    assert!(outcome.message().contains("Detalle de cada ítem facturado."), "{}", outcome.message());

    let outcome = validator.validate(&common::document("despatch-package-misplaced.xml"), None, false);
    assert!(!outcome.message().contains("normalmente debe ir dentro de"), "{}", outcome.message());
}

#[test]
fn every_diagnostic_is_reported() {
    let xml = common::document("invoice-two-errors.xml");
    let err = validator(Language::En)
        .try_validate(&xml, false)
        .expect_err("schema violation");
    let ValidationError::SchemaViolation(diagnostics) = err else {
        panic!("expected schema violation, got {err:?}");
    };
    assert!(diagnostics.len() >= 2, "{diagnostics:?}");

    let outcome = validator(Language::En).validate(&xml, None, false);
    assert_eq!(outcome.messages().len(), diagnostics.len());
    assert!(outcome.messages().iter().all(|line| line.starts_with("Line ")));
    assert!(outcome.message().contains("IssueDate"), "{}", outcome.message());
}

#[test]
fn violation_with_recovery_returns_text() {
    let xml = common::document("invoice-misplaced.xml");
    let outcome = validator(Language::En).validate(&xml, None, true);
    assert!(!outcome.is_valid());
    assert!(!outcome.recovered());
    assert_eq!(outcome.corrected_document(), Some(xml.as_str()));
}

#[test]
fn broken_xml_without_recovery_is_malformed() {
    let xml = common::document("invoice-unclosed.xml");
    let outcome = validator(Language::En).validate(&xml, None, false);
    assert!(!outcome.is_valid());
    assert!(outcome.message().starts_with("Malformed XML:"), "{}", outcome.message());
    assert_eq!(outcome.corrected_document(), None);

    let err = validator(Language::En)
        .try_validate(&xml, false)
        .expect_err("malformed");
    assert!(matches!(err, ValidationError::Parse(ParseError::MalformedXml { .. })));
}

#[test]
fn broken_xml_with_recovery_reports_recovery() {
    let xml = common::document("invoice-unclosed.xml");
    let outcome = validator(Language::En).validate(&xml, None, true);
    assert!(outcome.recovered());
    assert!(outcome.messages()[0].contains("parsed with recovery"), "{}", outcome.message());
    let repaired = outcome.corrected_document().expect("repaired text");
    assert!(repaired.contains("F001-4"));
    assert!(repaired.contains("Invoice>"));
}

#[test]
fn report_serializes_to_wire_shape() {
    let outcome = validator(Language::Es).validate(&common::document("invoice-misplaced.xml"), None, false);
    let json = serde_json::to_value(outcome.report()).expect("json");
    assert_eq!(json["valid"], false);
    assert!(json["message"].is_null());
    assert!(json["error"].as_str().is_some_and(|e| e.starts_with("Línea 8:")));
    assert!(json["correctedXml"].is_null());
}

#[tokio::test]
async fn validate_blocking_matches_sync_result() {
    let xml = common::document("invoice-valid.xml");
    let validator = Arc::new(validator(Language::En));
    let expected = validator.validate(&xml, None, false);
    let outcome = Arc::clone(&validator)
        .validate_blocking(xml, Some("factura".into()), false)
        .await;
    assert_eq!(outcome, expected);
}

#[test]
fn concurrent_validations_share_one_validator() {
    let validator = Arc::new(validator(Language::En));
    // initialise libxml2 on this thread before fanning out
    assert!(validator.validate(&common::document("invoice-valid.xml"), None, false).is_valid());
    let handles: Vec<_> = ["invoice-valid.xml", "invoice-misplaced.xml", "despatch-valid.xml"]
        .into_iter()
        .map(|name| {
            let validator = Arc::clone(&validator);
            std::thread::spawn(move || {
                let outcome = validator.validate(&common::document(name), None, false);
                (name, outcome.is_valid())
            })
        })
        .collect();
    for handle in handles {
        let (name, valid) = handle.join().expect("validation thread");
        assert_eq!(valid, name != "invoice-misplaced.xml", "{name}");
    }
}
