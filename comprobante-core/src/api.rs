//! SUNAT / OSE `billService` client and response types.
use base64ct::{Base64, Encoding};
use libxml::{
    parser::Parser,
    tree::{Document, SaveOptions},
    xpath,
};
use quick_xml::se::{SeError, Serializer as QuickXmlSerializer};
use reqwest::{Client, StatusCode};
use serde::Serialize;
use std::{fmt, str::FromStr};
use thiserror::Error;

use crate::config::{Config, Language};

const SOAP_ENV_NS: &str = "http://schemas.xmlsoap.org/soap/envelope/";
const SERVICE_NS: &str = "http://service.sunat.gob.pe";
const WSSE_NS: &str =
    "http://docs.oasis-open.org/wss/2004/01/oasis-200401-wss-wssecurity-secext-1.0.xsd";
const BETA_SOL_USER: &str = "MODDATOS";

/// Errors returned by the submission client.
#[derive(Error, Debug)]
pub enum SunatError {
    #[error("HTTP client error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("SOAP fault: {0}")]
    Fault(SoapFault),
    #[error("Invalid response from billService: {0}")]
    InvalidResponse(String),
    #[error("Client state error: {0}")]
    ClientState(String),
    #[error("failed to build SOAP envelope: {0}")]
    Envelope(#[from] SeError),
}

/// `faultcode` / `faultstring` pair returned by the service.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct SoapFault {
    code: Option<String>,
    message: Option<String>,
}

impl SoapFault {
    pub fn code(&self) -> Option<&str> {
        self.code.as_deref()
    }

    pub fn message(&self) -> Option<&str> {
        self.message.as_deref()
    }
}

impl fmt::Display for SoapFault {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (&self.code, &self.message) {
            (Some(code), Some(message)) => write!(f, "{code}: {message}"),
            (Some(code), None) => write!(f, "{code}"),
            (None, Some(message)) => write!(f, "{message}"),
            (None, None) => write!(f, "unspecified fault"),
        }
    }
}

/// Where a document is submitted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Destination {
    #[default]
    Sunat,
    /// An authorised third-party operator, see [`Config::ose_endpoint`].
    Ose,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DestinationParseError {
    #[error("invalid destination: {input}")]
    Invalid { input: String },
}

impl FromStr for Destination {
    type Err = DestinationParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "sunat" => Ok(Self::Sunat),
            "ose" => Ok(Self::Ose),
            _ => Err(DestinationParseError::Invalid {
                input: s.to_string(),
            }),
        }
    }
}

impl Destination {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Sunat => "sunat",
            Self::Ose => "ose",
        }
    }
}

/// SOL credentials sent in the WS-Security `UsernameToken`.
///
/// # Examples
/// ```rust
/// use comprobante_core::api::Credentials;
///
/// let creds = Credentials::beta("20123456789");
/// assert_eq!(creds.username(), "20123456789MODDATOS");
/// assert_eq!(creds.password(), "MODDATOS");
/// ```
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    ruc: String,
    user: String,
    password: String,
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("ruc", &self.ruc)
            .field("user", &self.user)
            .field("password", &"***")
            .finish()
    }
}

impl Credentials {
    pub fn new(
        ruc: impl Into<String>,
        user: impl Into<String>,
        password: impl Into<String>,
    ) -> Self {
        Self {
            ruc: ruc.into(),
            user: user.into(),
            password: password.into(),
        }
    }

    /// Public test credentials accepted by the beta environment.
    pub fn beta(ruc: impl Into<String>) -> Self {
        Self::new(ruc, BETA_SOL_USER, BETA_SOL_USER)
    }

    pub fn ruc(&self) -> &str {
        &self.ruc
    }

    pub fn user(&self) -> &str {
        &self.user
    }

    /// The RUC immediately followed by the SOL user.
    pub fn username(&self) -> String {
        format!("{}{}", self.ruc, self.user)
    }

    pub fn password(&self) -> &str {
        &self.password
    }
}

/// Decoded `applicationResponse` (the CDR).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Receipt {
    bytes: Vec<u8>,
}

impl Receipt {
    pub fn new(bytes: Vec<u8>) -> Self {
        Self { bytes }
    }

    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.bytes
    }

    /// SUNAT answers with a zip package; some operators return the bare XML.
    pub fn is_archive(&self) -> bool {
        self.bytes.starts_with(b"PK\x03\x04")
    }

    /// Indented XML, when the payload is a plain XML document.
    pub fn to_xml_pretty(&self) -> Option<String> {
        if self.is_archive() {
            return None;
        }
        let text = std::str::from_utf8(&self.bytes).ok()?;
        let document = Parser::default().parse_string(text).ok()?;
        document.get_root_element()?;
        Some(document.to_string_with_options(SaveOptions {
            format: true,
            ..SaveOptions::default()
        }))
    }
}

/// A submission folded into a single value, success or not.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubmissionOutcome {
    success: bool,
    message: String,
    receipt: Option<Receipt>,
}

impl SubmissionOutcome {
    pub fn success(&self) -> bool {
        self.success
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn receipt(&self) -> Option<&Receipt> {
        self.receipt.as_ref()
    }
}

#[derive(Serialize)]
#[serde(rename = "soapenv:Envelope")]
struct SendBillEnvelope<'a> {
    #[serde(rename = "@xmlns:soapenv")]
    soapenv: &'static str,
    #[serde(rename = "@xmlns:ser")]
    ser: &'static str,
    #[serde(rename = "@xmlns:wsse")]
    wsse: &'static str,
    #[serde(rename = "soapenv:Header")]
    header: Header<'a>,
    #[serde(rename = "soapenv:Body")]
    body: Body<'a>,
}

#[derive(Serialize)]
struct Header<'a> {
    #[serde(rename = "wsse:Security")]
    security: Security<'a>,
}

#[derive(Serialize)]
struct Security<'a> {
    #[serde(rename = "wsse:UsernameToken")]
    token: UsernameToken<'a>,
}

#[derive(Serialize)]
struct UsernameToken<'a> {
    #[serde(rename = "wsse:Username")]
    username: String,
    #[serde(rename = "wsse:Password")]
    password: &'a str,
}

#[derive(Serialize)]
struct Body<'a> {
    #[serde(rename = "ser:sendBill")]
    send_bill: SendBill<'a>,
}

#[derive(Serialize)]
struct SendBill<'a> {
    #[serde(rename = "fileName")]
    file_name: &'a str,
    #[serde(rename = "contentFile")]
    content_file: String,
}

/// Build the SOAP 1.1 `sendBill` request body.
///
/// # Errors
/// Returns [`SunatError::Envelope`] if serialization fails.
pub fn build_send_bill_envelope(
    file_name: &str,
    content: &[u8],
    credentials: &Credentials,
) -> Result<String, SunatError> {
    let envelope = SendBillEnvelope {
        soapenv: SOAP_ENV_NS,
        ser: SERVICE_NS,
        wsse: WSSE_NS,
        header: Header {
            security: Security {
                token: UsernameToken {
                    username: credentials.username(),
                    password: credentials.password(),
                },
            },
        },
        body: Body {
            send_bill: SendBill {
                file_name,
                content_file: Base64::encode_string(content),
            },
        },
    };

    let mut buffer = String::with_capacity(1024 + content.len() * 4 / 3);
    buffer.push_str(r#"<?xml version="1.0" encoding="UTF-8"?>"#);
    buffer.push('\n');
    envelope.serialize(QuickXmlSerializer::new(&mut buffer))?;
    Ok(buffer)
}

/// `billService` client.
///
/// # Examples
/// ```rust,no_run
/// use comprobante_core::api::{Credentials, Destination, SunatClient};
/// use comprobante_core::config::Config;
///
/// # async fn run() -> Result<(), comprobante_core::api::SunatError> {
/// let client = SunatClient::new(Config::default())?;
/// let zip = std::fs::read("20123456789-01-F001-1.zip").unwrap_or_default();
/// let receipt = client
///     .send_bill(
///         Destination::Sunat,
///         "20123456789-01-F001-1.zip",
///         &zip,
///         &Credentials::beta("20123456789"),
///     )
///     .await?;
/// # let _ = receipt;
/// # Ok(())
/// # }
/// ```
#[derive(Debug)]
pub struct SunatClient {
    config: Config,
    client: Client,
    base_url: String,
}

// Public API
impl SunatClient {
    /// Create a client for the environment in `config`.
    ///
    /// `COMPROBANTE_SUNAT_BASE_URL`, when set, replaces the SUNAT endpoint.
    ///
    /// # Errors
    /// Returns [`SunatError::Http`] if the HTTP client cannot be built.
    pub fn new(config: Config) -> Result<Self, SunatError> {
        let client = Client::builder().build().map_err(SunatError::Http)?;
        let base_url = std::env::var("COMPROBANTE_SUNAT_BASE_URL")
            .ok()
            .filter(|value| !value.trim().is_empty())
            .unwrap_or_else(|| config.env().endpoint_url().to_string());

        Ok(Self {
            config,
            client,
            base_url,
        })
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Submit `content` (a zip package or the raw XML) under `file_name`.
    ///
    /// Returns the decoded CDR, or `None` when the service accepted the
    /// document without one.
    ///
    /// # Errors
    /// Returns [`SunatError::Fault`] when the service answers with a SOAP
    /// fault, [`SunatError::ClientState`] for an empty file name or a missing
    /// OSE endpoint, and [`SunatError::InvalidResponse`] for anything else it
    /// cannot interpret.
    pub async fn send_bill(
        &self,
        destination: Destination,
        file_name: &str,
        content: &[u8],
        credentials: &Credentials,
    ) -> Result<Option<Receipt>, SunatError> {
        if file_name.trim().is_empty() {
            return Err(SunatError::ClientState("file name is required".into()));
        }
        let url = self.build_endpoint(destination)?;
        let envelope = build_send_bill_envelope(file_name, content, credentials)?;
        tracing::debug!(%url, file_name, destination = destination.as_str(), "sending sendBill request");

        let response = self
            .client
            .post(url)
            .header("Content-Type", "text/xml; charset=utf-8")
            .header("SOAPAction", "urn:sendBill")
            .body(envelope)
            .send()
            .await?;
        let status = response.status();
        let body = response.text().await.unwrap_or_default();

        let result = read_send_bill_response(status, &body);
        match &result {
            Ok(receipt) => tracing::info!(%status, cdr = receipt.is_some(), "document accepted"),
            Err(SunatError::Fault(fault)) => tracing::warn!(%fault, "billService returned a fault"),
            Err(error) => tracing::warn!(%error, "sendBill failed"),
        }
        result
    }

    /// Like [`SunatClient::send_bill`], folded into a [`SubmissionOutcome`].
    pub async fn submit(
        &self,
        destination: Destination,
        file_name: &str,
        content: &[u8],
        credentials: &Credentials,
    ) -> SubmissionOutcome {
        let es = self.config.language() == Language::Es;
        match self
            .send_bill(destination, file_name, content, credentials)
            .await
        {
            Ok(receipt) => {
                let message = match (es, receipt.is_some()) {
                    (true, true) => "Documento enviado correctamente.",
                    (true, false) => "Documento enviado correctamente (sin CDR).",
                    (false, true) => "Document sent successfully.",
                    (false, false) => "Document sent successfully (no CDR).",
                };
                SubmissionOutcome {
                    success: true,
                    message: message.to_string(),
                    receipt,
                }
            }
            Err(error) => SubmissionOutcome {
                success: false,
                message: if es {
                    format!("Error al enviar el comprobante: {error}")
                } else {
                    format!("Failed to send the document: {error}")
                },
                receipt: None,
            },
        }
    }
}

// Private API
impl SunatClient {
    fn build_endpoint(&self, destination: Destination) -> Result<String, SunatError> {
        match destination {
            Destination::Sunat => Ok(self.base_url.clone()),
            Destination::Ose => self
                .config
                .ose_endpoint()
                .map(str::to_string)
                .ok_or_else(|| SunatError::ClientState("no OSE endpoint configured".into())),
        }
    }
}

fn read_send_bill_response(status: StatusCode, body: &str) -> Result<Option<Receipt>, SunatError> {
    let invalid = || SunatError::InvalidResponse(format!("status {status}: {body}"));
    let document = match Parser::default().parse_string(body) {
        Ok(document) if document.get_root_element().is_some() => document,
        _ => return Err(invalid()),
    };
    let ctx = xpath::Context::new(&document).map_err(|_| invalid())?;

    if !nodes(&ctx, "//*[local-name()='Fault']").is_empty() {
        return Err(SunatError::Fault(SoapFault {
            code: text(&ctx, "//*[local-name()='Fault']/*[local-name()='faultcode']"),
            message: text(&ctx, "//*[local-name()='Fault']/*[local-name()='faultstring']"),
        }));
    }

    if let Some(encoded) = text(&ctx, "//*[local-name()='applicationResponse']") {
        let compact: String = encoded.split_whitespace().collect();
        let bytes = Base64::decode_vec(&compact).map_err(|e| {
            SunatError::InvalidResponse(format!("applicationResponse is not base64: {e}"))
        })?;
        return Ok(Some(Receipt::new(bytes)));
    }

    if status.is_success() && is_soap_envelope(&document) {
        return Ok(None);
    }
    Err(invalid())
}

fn is_soap_envelope(document: &Document) -> bool {
    document
        .get_root_element()
        .map(|root| root.get_name() == "Envelope")
        .unwrap_or(false)
}

fn nodes(ctx: &xpath::Context, expr: &str) -> Vec<libxml::tree::Node> {
    ctx.evaluate(expr)
        .map(|object| object.get_nodes_as_vec())
        .unwrap_or_default()
}

fn text(ctx: &xpath::Context, expr: &str) -> Option<String> {
    let value = nodes(ctx, expr).first()?.get_content().trim().to_string();
    (!value.is_empty()).then_some(value)
}
