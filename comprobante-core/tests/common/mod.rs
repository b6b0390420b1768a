use comprobante_core::config::{Config, EnvironmentType, Language};
use std::path::PathBuf;

pub fn fixtures_dir() -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("tests/fixtures")
}

pub fn schemas_root() -> PathBuf {
    fixtures_dir().join("schemas")
}

#[allow(dead_code)]
pub fn document(name: &str) -> String {
    let path = fixtures_dir().join("documents").join(name);
    std::fs::read_to_string(&path)
        .unwrap_or_else(|e| panic!("read fixture {}: {e}", path.display()))
}

#[allow(dead_code)]
pub fn config(language: Language) -> Config {
    Config::new(EnvironmentType::Beta, schemas_root()).with_language(language)
}
