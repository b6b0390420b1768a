use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use comprobante_core::api::{Credentials, Destination, SunatClient};
use comprobante_core::config::{Config, EnvironmentType, Language};
use comprobante_core::validation::{known::KnownElements, Validator};

#[derive(Parser)]
#[command(name = "comprobante")]
#[command(about = "Validate Peruvian UBL e-invoicing documents and send them to SUNAT")]
struct Cli {
    /// Root of the schema tree (<root>/<version>/maindoc, <root>/<version>/common).
    #[arg(long, global = true)]
    schemas: Option<PathBuf>,
    /// Message language: es or en.
    #[arg(long, global = true)]
    lang: Option<Language>,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Validate a document against the XSD selected by its root element and version.
    Validate {
        #[arg(long)]
        document: PathBuf,
        /// Declared document type. Informational only.
        #[arg(long = "type")]
        document_type: Option<String>,
        /// Repair malformed XML on a best-effort basis.
        #[arg(long)]
        recover: bool,
        /// Print the report as JSON.
        #[arg(long)]
        json: bool,
        /// Write the corrected document here when one is produced.
        #[arg(long)]
        corrected: Option<PathBuf>,
        /// JSON table of known elements replacing the built-in one.
        #[arg(long)]
        known_elements: Option<PathBuf>,
    },
    /// Submit a document (zip package or XML) through sendBill.
    Send {
        #[arg(long)]
        document: PathBuf,
        #[arg(long)]
        ruc: String,
        /// SOL user. Defaults to the beta test user.
        #[arg(long, requires = "password")]
        user: Option<String>,
        #[arg(long, requires = "user")]
        password: Option<String>,
        /// Name reported to the service. Defaults to the document's file name.
        #[arg(long)]
        file_name: Option<String>,
        #[arg(long, default_value = "sunat")]
        destination: Destination,
        #[arg(long)]
        env: Option<EnvironmentType>,
        /// Write the decoded CDR here.
        #[arg(long)]
        cdr: Option<PathBuf>,
    },
}

fn main() -> Result<ExitCode> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let mut config = Config::from_env().context("invalid COMPROBANTE_* environment")?;
    if let Some(root) = cli.schemas {
        config = config.with_schemas_root(root);
    }
    if let Some(language) = cli.lang {
        config = config.with_language(language);
    }

    match cli.command {
        Commands::Validate {
            document,
            document_type,
            recover,
            json,
            corrected,
            known_elements,
        } => validate(
            config,
            &document,
            document_type.as_deref(),
            recover,
            json,
            corrected.as_deref(),
            known_elements.as_deref(),
        ),
        Commands::Send {
            document,
            ruc,
            user,
            password,
            file_name,
            destination,
            env,
            cdr,
        } => {
            if let Some(env) = env {
                config = config.with_env(env);
            }
            let credentials = match (user, password) {
                (Some(user), Some(password)) => Credentials::new(ruc, user, password),
                _ => Credentials::beta(ruc),
            };
            send(config, &document, file_name, destination, &credentials, cdr.as_deref())
        }
    }
}

fn validate(
    config: Config,
    document: &Path,
    document_type: Option<&str>,
    recover: bool,
    json: bool,
    corrected: Option<&Path>,
    known_elements: Option<&Path>,
) -> Result<ExitCode> {
    let xml = std::fs::read_to_string(document)
        .with_context(|| format!("failed to read {}", document.display()))?;
    let validator = match known_elements {
        Some(path) => {
            let table = KnownElements::from_json_file(path)?;
            Validator::with_known_elements(&config, Arc::new(table))
        }
        None => Validator::new(&config),
    };

    let outcome = validator.validate(&xml, document_type, recover);
    if json {
        println!("{}", serde_json::to_string_pretty(&outcome.report())?);
    } else {
        println!("{}", outcome.message());
    }

    if let (Some(path), Some(text)) = (corrected, outcome.corrected_document()) {
        std::fs::write(path, text)
            .with_context(|| format!("failed to write {}", path.display()))?;
        tracing::info!(path = %path.display(), "wrote corrected document");
    }

    Ok(exit_code(outcome.is_valid()))
}

fn send(
    config: Config,
    document: &Path,
    file_name: Option<String>,
    destination: Destination,
    credentials: &Credentials,
    cdr: Option<&Path>,
) -> Result<ExitCode> {
    let content = std::fs::read(document)
        .with_context(|| format!("failed to read {}", document.display()))?;
    let file_name = match file_name {
        Some(name) => name,
        None => document
            .file_name()
            .and_then(|name| name.to_str())
            .map(str::to_string)
            .context("document path has no file name, pass --file-name")?,
    };

    let client = SunatClient::new(config)?;
    let runtime = tokio::runtime::Runtime::new().context("failed to start tokio runtime")?;
    let outcome = runtime.block_on(client.submit(destination, &file_name, &content, credentials));

    if let (Some(path), Some(receipt)) = (cdr, outcome.receipt()) {
        std::fs::write(path, receipt.bytes())
            .with_context(|| format!("failed to write {}", path.display()))?;
    }

    let report = serde_json::json!({
        "success": outcome.success(),
        "message": outcome.message(),
        "cdr": outcome.receipt().and_then(|receipt| receipt.to_xml_pretty()),
        "cdrIsArchive": outcome.receipt().map(|receipt| receipt.is_archive()),
    });
    println!("{}", serde_json::to_string_pretty(&report)?);

    Ok(exit_code(outcome.success()))
}

fn exit_code(ok: bool) -> ExitCode {
    if ok {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    }
}
