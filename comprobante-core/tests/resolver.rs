mod common;

use comprobante_core::config::SchemaNaming;
use comprobante_core::validation::parse::parse_document;
use comprobante_core::validation::schema::{
    load_schema, IncludeResolver, LocalIncludeResolver, ResolveError, SchemaDescriptor,
    SchemaResolver,
};
use std::cell::RefCell;
use std::path::{Path, PathBuf};

struct RecordingResolver {
    inner: LocalIncludeResolver,
    seen: RefCell<Vec<String>>,
}

impl IncludeResolver for RecordingResolver {
    fn resolve_include(&self, location: &str) -> Option<PathBuf> {
        self.seen.borrow_mut().push(location.to_string());
        self.inner.resolve_include(location)
    }
}

fn resolver() -> SchemaResolver {
    SchemaResolver::new(common::schemas_root(), SchemaNaming::default())
}

#[test]
fn resolves_invoice_schema_from_document() {
    let parsed = parse_document(&common::document("invoice-valid.xml"), false).expect("parse");
    let mut schema = resolver().resolve(parsed.document()).expect("schema");
    assert!(schema.path().ends_with("2.1/maindoc/UBL-Invoice-2.1.xsd"));
    assert!(schema.validate(parsed.document()).is_ok());
}

#[test]
fn locate_uses_alternate_label_for_2_0() {
    let path = resolver()
        .locate(&SchemaDescriptor::new("2.0", "Invoice"))
        .expect("2.0 invoice schema");
    assert!(path.ends_with("2.0/maindoc/UBL-Invoice-1.0.xsd"), "{}", path.display());
}

#[test]
fn locate_without_alternate_label_misses_2_0_file() {
    let resolver = SchemaResolver::new(common::schemas_root(), SchemaNaming::identity());
    let err = resolver
        .locate(&SchemaDescriptor::new("2.0", "Invoice"))
        .expect_err("identity naming");
    assert!(
        matches!(err, ResolveError::SchemaNotFound { ref path } if path.ends_with("UBL-Invoice-2.0.xsd")),
        "{err:?}"
    );
}

#[test]
fn every_import_goes_through_the_hook() {
    let root = common::schemas_root();
    let recording = RecordingResolver {
        inner: LocalIncludeResolver::new(root.join("2.1/common")),
        seen: RefCell::new(Vec::new()),
    };
    let schema = load_schema(&root.join("2.1/maindoc/UBL-Invoice-2.1.xsd"), &recording)
        .expect("compile with local imports");
    assert!(schema.path().ends_with("UBL-Invoice-2.1.xsd"));

    let seen = recording.seen.into_inner();
    assert_eq!(seen.len(), 3, "{seen:?}");
    assert!(seen.iter().any(|l| l.starts_with("http://docs.oasis-open.org/")));
    assert!(seen.iter().any(|l| l == "../common/UBL-CommonAggregateComponents-2.1.xsd"));
    // Imported from inside the aggregate components file.
    assert!(seen.iter().any(|l| l == "UBL-CommonBasicComponents-2.1.xsd"));
}

const NESTED_MAIN: &str = r#"<xsd:schema xmlns:xsd="http://www.w3.org/2001/XMLSchema"
    xmlns:a="urn:a" targetNamespace="urn:m" elementFormDefault="qualified">
  <xsd:import namespace="urn:a" schemaLocation="http://example.invalid/xsd/common/A.xsd"/>
  <xsd:element name="Doc">
    <xsd:complexType>
      <xsd:sequence>
        <xsd:element ref="a:Code"/>
      </xsd:sequence>
    </xsd:complexType>
  </xsd:element>
</xsd:schema>"#;

const NESTED_A: &str = r#"<xsd:schema xmlns:xsd="http://www.w3.org/2001/XMLSchema"
    xmlns:b="urn:b" targetNamespace="urn:a" elementFormDefault="qualified">
  <xsd:import namespace="urn:b" schemaLocation="http://example.invalid/xsd/common/B.xsd"/>
  <xsd:element name="Code" type="b:V"/>
</xsd:schema>"#;

const NESTED_B: &str = r#"<xsd:schema xmlns:xsd="http://www.w3.org/2001/XMLSchema"
    targetNamespace="urn:b">
  <xsd:simpleType name="V">
    <xsd:restriction base="xsd:string">
      <xsd:maxLength value="3"/>
    </xsd:restriction>
  </xsd:simpleType>
</xsd:schema>"#;

#[test]
fn remote_import_inside_common_file_is_served_locally() {
    let dir = tempfile::tempdir().expect("tempdir");
    let maindoc = dir.path().join("maindoc");
    let common_dir = dir.path().join("common");
    std::fs::create_dir_all(&maindoc).expect("maindoc dir");
    std::fs::create_dir_all(&common_dir).expect("common dir");
    let main = maindoc.join("UBL-Invoice-2.1.xsd");
    std::fs::write(&main, NESTED_MAIN).expect("write main schema");
    std::fs::write(common_dir.join("A.xsd"), NESTED_A).expect("write A");
    std::fs::write(common_dir.join("B.xsd"), NESTED_B).expect("write B");

    let recording = RecordingResolver {
        inner: LocalIncludeResolver::new(&common_dir),
        seen: RefCell::new(Vec::new()),
    };
    let mut schema = load_schema(&main, &recording).expect("nested imports resolve locally");
    assert_eq!(
        recording.seen.into_inner(),
        [
            "http://example.invalid/xsd/common/A.xsd",
            "http://example.invalid/xsd/common/B.xsd",
        ]
    );

    let valid = parse_document(
        r#"<m:Doc xmlns:m="urn:m" xmlns:a="urn:a"><a:Code>abc</a:Code></m:Doc>"#,
        false,
    )
    .expect("parse");
    assert!(schema.validate(valid.document()).is_ok());

    // The type from B.xsd is enforced, so it was really loaded.
    let too_long = parse_document(
        r#"<m:Doc xmlns:m="urn:m" xmlns:a="urn:a"><a:Code>abcd</a:Code></m:Doc>"#,
        false,
    )
    .expect("parse");
    assert!(schema.validate(too_long.document()).is_err());

    // Sources on disk are left untouched.
    let a = std::fs::read_to_string(common_dir.join("A.xsd")).expect("read A");
    assert!(a.contains("http://example.invalid/xsd/common/B.xsd"));
}

#[test]
fn import_cycles_are_staged_once() {
    let dir = tempfile::tempdir().expect("tempdir");
    let main = dir.path().join("Main.xsd");
    std::fs::write(
        &main,
        r#"<xsd:schema xmlns:xsd="http://www.w3.org/2001/XMLSchema" xmlns:x="urn:x" targetNamespace="urn:m">
  <xsd:import namespace="urn:x" schemaLocation="http://example.invalid/X.xsd"/>
  <xsd:element name="Doc" type="x:T"/>
</xsd:schema>"#,
    )
    .expect("write main");
    std::fs::write(
        dir.path().join("X.xsd"),
        r#"<xsd:schema xmlns:xsd="http://www.w3.org/2001/XMLSchema" targetNamespace="urn:x">
  <xsd:import namespace="urn:y" schemaLocation="http://example.invalid/Y.xsd"/>
  <xsd:simpleType name="T"><xsd:restriction base="xsd:string"/></xsd:simpleType>
</xsd:schema>"#,
    )
    .expect("write X");
    std::fs::write(
        dir.path().join("Y.xsd"),
        r#"<xsd:schema xmlns:xsd="http://www.w3.org/2001/XMLSchema" targetNamespace="urn:y">
  <xsd:import namespace="urn:x" schemaLocation="http://example.invalid/X.xsd"/>
</xsd:schema>"#,
    )
    .expect("write Y");

    let recording = RecordingResolver {
        inner: LocalIncludeResolver::new(dir.path()),
        seen: RefCell::new(Vec::new()),
    };
    load_schema(&main, &recording).expect("cyclic imports compile");
    assert_eq!(recording.seen.into_inner().len(), 3);
}

#[test]
fn hook_can_redirect_imports_to_another_directory() {
    let dir = tempfile::tempdir().expect("tempdir");
    let common_dir = common::schemas_root().join("2.1/common");
    for name in [
        "UBL-CommonBasicComponents-2.1.xsd",
        "UBL-CommonAggregateComponents-2.1.xsd",
    ] {
        std::fs::copy(common_dir.join(name), dir.path().join(name)).expect("copy common schema");
    }
    let main = dir.path().join("UBL-DespatchAdvice-2.1.xsd");
    std::fs::copy(
        common::schemas_root().join("2.1/maindoc/UBL-DespatchAdvice-2.1.xsd"),
        &main,
    )
    .expect("copy main schema");

    let mut schema = load_schema(&main, &LocalIncludeResolver::new(dir.path()))
        .expect("compile from temp dir");
    let parsed = parse_document(&common::document("despatch-valid.xml"), false).expect("parse");
    assert!(schema.validate(parsed.document()).is_ok());
}

#[test]
fn missing_schema_file_is_reported() {
    let err = load_schema(
        Path::new("/nonexistent/UBL-Invoice-2.1.xsd"),
        &LocalIncludeResolver::new("/nonexistent"),
    )
    .expect_err("missing file");
    assert!(matches!(err, ResolveError::SchemaNotFound { .. }));
}

#[test]
fn broken_schema_is_invalid() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("UBL-Invoice-2.1.xsd");
    std::fs::write(
        &path,
        r#"<xsd:schema xmlns:xsd="http://www.w3.org/2001/XMLSchema"><xsd:element name="Invoice" type="NoSuchType"/></xsd:schema>"#,
    )
    .expect("write schema");

    let err = load_schema(&path, &LocalIncludeResolver::new(dir.path())).expect_err("invalid");
    assert!(
        matches!(err, ResolveError::InvalidSchema { ref path, .. } if path.ends_with("UBL-Invoice-2.1.xsd")),
        "{err:?}"
    );
}

#[test]
fn missing_version_directory_is_unsupported() {
    let err = resolver()
        .locate(&SchemaDescriptor::new("3.0", "Invoice"))
        .expect_err("no 3.0 tree");
    assert!(matches!(err, ResolveError::UnsupportedVersion { ref version, .. } if version == "3.0"));
}
