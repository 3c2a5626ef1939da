// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! SWORD deposit protocol.
//!
//! EPrints exposes its catalog through a small REST convention built on Atom
//! feeds. Every catalog __entry__ (an "eprint") groups one or more
//! __documents__, and every document groups one or more __files__:
//!
//! | Operation                | Method   | Path                                                   |
//! |--------------------------|----------|--------------------------------------------------------|
//! | Create entry             | POST     | `/id/contents`                                         |
//! | List entry contents      | GET      | `/id/eprint/{epid}/contents`                           |
//! | List document files      | GET      | `/id/document/{docid}/contents`                        |
//! | Fetch canonical metadata | GET      | `/cgi/export/eprint/{epid}/XMLCit/epub-eprint-{epid}.xml` |
//! | Upload file              | POST/PUT | `/id/eprint/{epid}/contents`, `/id/document/{docid}/contents`, `/id/file/{fileid}` |
//! | Delete file              | DELETE   | `/id/file/{fileid}`                                    |
//!
//! The [`SwordClient`] speaks this protocol over any [`Transport`]. It only
//! performs requests and reports what happened. Deciding what to do with the
//! answers is up to the [`reconcile`](crate::reconcile) engine.
//!
//! # See Also
//!
//! 1. [EPrints SWORD 2.0](https://wiki.eprints.org/w/SWORD_2.0)

pub mod feed;
pub mod transport;

use crate::sword::{feed::Feed, transport::HttpTransport};

use serde::Deserialize;
use std::{
    fmt::{Display, Formatter, Result as FmtResult},
    fs::read,
    path::{Path, PathBuf},
};
use tracing::{debug, instrument};

/// Content type of deposit metadata documents.
pub const DEPOSIT_CONTENT_TYPE: &str = "application/vnd.eprints.data+xml";

/// Content type used for every uploaded file.
pub const UPLOAD_CONTENT_TYPE: &str = "text/html";

/// HTTP method of a protocol request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Method {
    Get,
    Post,
    Put,
    Delete,
}

impl Display for Method {
    fn fmt(&self, fmt: &mut Formatter<'_>) -> FmtResult {
        match self {
            Self::Get => fmt.write_str("GET"),
            Self::Post => fmt.write_str("POST"),
            Self::Put => fmt.write_str("PUT"),
            Self::Delete => fmt.write_str("DELETE"),
        }
    }
}

/// Protocol request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Request {
    pub method: Method,
    pub url: String,
    pub headers: Vec<(String, String)>,
    pub body: Option<Vec<u8>>,
}

impl Request {
    /// Construct new request without headers or body.
    pub fn new(method: Method, url: impl Into<String>) -> Self {
        Self {
            method,
            url: url.into(),
            headers: vec![("Accept-Charset".into(), "UTF-8".into())],
            body: None,
        }
    }

    /// Add header to request.
    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    /// Set request body.
    pub fn body(mut self, body: impl Into<Vec<u8>>) -> Self {
        self.body = Some(body.into());
        self
    }

    /// Lookup header value by case-insensitive name.
    pub fn header_value(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }
}

/// Protocol response.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct Response {
    pub status: u16,
    pub location: Option<String>,
    pub body: String,
}

impl Response {
    /// Construct new response with status and body.
    pub fn new(status: u16, body: impl Into<String>) -> Self {
        Self {
            status,
            location: None,
            body: body.into(),
        }
    }

    /// Set `Location` header of response.
    pub fn with_location(mut self, location: impl Into<String>) -> Self {
        self.location = Some(location.into());
        self
    }

    /// Server accepted request.
    ///
    /// Only 200 and 201 count, just like the server documents.
    pub fn is_success(&self) -> bool {
        matches!(self.status, 200 | 201)
    }
}

/// Layer of indirection for sending protocol requests.
pub trait Transport {
    /// Send request and wait for the full response.
    ///
    /// # Errors
    ///
    /// - Return [`TransportError`] if no response could be obtained. Non-success
    ///   status codes are not errors at this level.
    fn send(&self, request: Request) -> Result<Response, transport::TransportError>;
}

/// Endpoint layout of a repository server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoints {
    base_url: String,
}

impl Endpoints {
    /// Construct new endpoint layout rooted at base URL.
    pub fn new(base_url: impl Into<String>) -> Self {
        let base_url = base_url.into().trim_end_matches('/').to_string();
        Self { base_url }
    }

    pub fn create_entry(&self) -> String {
        format!("{}/id/contents", self.base_url)
    }

    pub fn entry_contents(&self, epid: u64) -> String {
        format!("{}/id/eprint/{epid}/contents", self.base_url)
    }

    pub fn document_contents(&self, docid: u64) -> String {
        format!("{}/id/document/{docid}/contents", self.base_url)
    }

    pub fn file(&self, fileid: u64) -> String {
        format!("{}/id/file/{fileid}", self.base_url)
    }

    pub fn metadata_export(&self, epid: u64) -> String {
        format!(
            "{}/cgi/export/eprint/{epid}/XMLCit/epub-eprint-{epid}.xml",
            self.base_url
        )
    }
}

/// Client of the deposit protocol.
#[derive(Debug)]
pub struct SwordClient<T = HttpTransport>
where
    T: Transport,
{
    pub(crate) endpoints: Endpoints,
    pub(crate) transport: T,
}

impl<T> SwordClient<T>
where
    T: Transport,
{
    /// Construct new client.
    pub fn new(endpoints: Endpoints, transport: T) -> Self {
        Self {
            endpoints,
            transport,
        }
    }

    /// Endpoint layout of the server being talked to.
    pub fn endpoints(&self) -> &Endpoints {
        &self.endpoints
    }

    /// Create new catalog entry from deposit metadata.
    ///
    /// Returns the raw `Location` of the new entry.
    ///
    /// # Errors
    ///
    /// - Return [`SwordError::Transport`] if request cannot be sent.
    /// - Return [`SwordError::Status`] if server rejects the deposit.
    /// - Return [`SwordError::MissingLocation`] if server does not say where
    ///   the new entry lives.
    #[instrument(skip(self, metadata), level = "debug")]
    pub fn create_entry(&self, metadata: impl Into<Vec<u8>>) -> Result<String> {
        let request = Request::new(Method::Post, self.endpoints.create_entry())
            .header("Content-Type", DEPOSIT_CONTENT_TYPE)
            .body(metadata);
        let response = self.send_checked(request)?;

        response.location.ok_or(SwordError::MissingLocation)
    }

    /// List documents of an entry.
    ///
    /// # Errors
    ///
    /// - Return [`SwordError::Transport`] if request cannot be sent.
    /// - Return [`SwordError::Status`] if listing is refused.
    /// - Return [`SwordError::Feed`] if listing cannot be parsed.
    #[instrument(skip(self), level = "debug")]
    pub fn list_entry_contents(&self, epid: u64) -> Result<Feed> {
        self.fetch_feed(self.endpoints.entry_contents(epid))
    }

    /// List files of a document.
    ///
    /// # Errors
    ///
    /// - Return [`SwordError::Transport`] if request cannot be sent.
    /// - Return [`SwordError::Status`] if listing is refused.
    /// - Return [`SwordError::Feed`] if listing cannot be parsed.
    #[instrument(skip(self), level = "debug")]
    pub fn list_document_files(&self, docid: u64) -> Result<Feed> {
        self.fetch_feed(self.endpoints.document_contents(docid))
    }

    /// Fetch canonical metadata export of an entry.
    ///
    /// # Errors
    ///
    /// - Return [`SwordError::Transport`] if request cannot be sent.
    /// - Return [`SwordError::Status`] if export is refused.
    /// - Return [`SwordError::Feed`] if export cannot be parsed.
    #[instrument(skip(self), level = "debug")]
    pub fn fetch_metadata(&self, epid: u64) -> Result<EntrySummary> {
        let request = Request::new(Method::Get, self.endpoints.metadata_export(epid))
            .header("Accept", "application/xml");
        let response = self.send_checked(request)?;
        debug!("{}", response.body);

        Ok(EntrySummary::parse(&response.body)?)
    }

    /// Upload local file to target URL.
    ///
    /// The file is sent as raw body, named through `Content-Disposition`.
    ///
    /// # Errors
    ///
    /// - Return [`SwordError::ReadFile`] if local file cannot be read.
    /// - Return [`SwordError::Transport`] if request cannot be sent.
    /// - Return [`SwordError::Status`] if server rejects the upload.
    #[instrument(skip(self, path), level = "debug")]
    pub fn send_file(&self, path: &Path, url: &str, method: Method) -> Result<()> {
        let filename = path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_default();
        let body = read(path).map_err(|err| SwordError::ReadFile {
            source: err,
            path: path.to_path_buf(),
        })?;

        let request = Request::new(method, url)
            .header("Content-Type", UPLOAD_CONTENT_TYPE)
            .header(
                "Content-Disposition",
                format!("attachment; filename={filename}"),
            )
            .body(body);
        self.send_checked(request)?;

        Ok(())
    }

    /// Delete remote file.
    ///
    /// # Errors
    ///
    /// - Return [`SwordError::Transport`] if request cannot be sent.
    /// - Return [`SwordError::Status`] if server refuses deletion.
    #[instrument(skip(self), level = "debug")]
    pub fn delete_file(&self, fileid: u64) -> Result<()> {
        let request = Request::new(Method::Delete, self.endpoints.file(fileid));
        self.send_checked(request)?;

        Ok(())
    }

    fn fetch_feed(&self, url: String) -> Result<Feed> {
        let request = Request::new(Method::Get, url).header("Accept", "application/atom+xml");
        let response = self.send_checked(request)?;
        debug!("{}", response.body);

        Ok(Feed::parse(&response.body)?)
    }

    fn send_checked(&self, request: Request) -> Result<Response> {
        let method = request.method;
        let url = request.url.clone();
        let response = self.transport.send(request)?;
        debug!("{method} {url} -> {}", response.status);

        if !response.is_success() {
            return Err(SwordError::Status {
                method,
                url,
                status: response.status,
            });
        }

        Ok(response)
    }
}

/// Key facts of an entry from its canonical metadata export.
#[derive(Debug, Default, Clone, PartialEq, Eq, Deserialize)]
pub struct EntrySummary {
    #[serde(default)]
    pub eprint: EprintRecord,
}

impl EntrySummary {
    /// Parse canonical metadata export.
    ///
    /// # Errors
    ///
    /// - Return [`quick_xml::DeError`] if XML is malformed.
    pub fn parse(xml: &str) -> std::result::Result<Self, quick_xml::DeError> {
        quick_xml::de::from_str(xml)
    }

    /// Title of entry, if the export carries one.
    pub fn title(&self) -> Option<&str> {
        self.eprint.title.as_deref().map(str::trim)
    }
}

/// The single eprint record of a metadata export.
#[derive(Debug, Default, Clone, PartialEq, Eq, Deserialize)]
pub struct EprintRecord {
    #[serde(default)]
    pub eprintid: Option<u64>,

    #[serde(default)]
    pub title: Option<String>,
}

/// All possible error types for protocol interaction.
#[derive(Debug, thiserror::Error)]
pub enum SwordError {
    /// Request could not be delivered.
    #[error(transparent)]
    Transport(#[from] transport::TransportError),

    /// Server answered with a non-success status.
    #[error("{method} {url} failed with status {status}")]
    Status {
        method: Method,
        url: String,
        status: u16,
    },

    /// Entry creation response lacks a `Location` header.
    #[error("server did not report location of created entry")]
    MissingLocation,

    /// Response body is not the expected XML.
    #[error(transparent)]
    Feed(#[from] quick_xml::DeError),

    /// Local file to upload cannot be read.
    #[error("failed to read {:?} for upload", path.display())]
    ReadFile {
        #[source]
        source: std::io::Error,
        path: PathBuf,
    },
}

/// Friendly result alias :3
pub type Result<T, E = SwordError> = std::result::Result<T, E>;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sword::transport::TransportError;
    use indoc::indoc;
    use pretty_assertions::assert_eq;
    use std::cell::RefCell;

    struct Canned {
        response: Response,
        seen: RefCell<Vec<Request>>,
    }

    impl Transport for Canned {
        fn send(&self, request: Request) -> Result<Response, TransportError> {
            self.seen.borrow_mut().push(request);
            Ok(self.response.clone())
        }
    }

    fn client(response: Response) -> SwordClient<Canned> {
        SwordClient::new(
            Endpoints::new("https://repo.example.org/"),
            Canned {
                response,
                seen: RefCell::new(Vec::new()),
            },
        )
    }

    #[test]
    fn endpoint_layout() {
        let endpoints = Endpoints::new("https://repo.example.org/");
        assert_eq!(endpoints.create_entry(), "https://repo.example.org/id/contents");
        assert_eq!(
            endpoints.entry_contents(7),
            "https://repo.example.org/id/eprint/7/contents"
        );
        assert_eq!(
            endpoints.document_contents(42),
            "https://repo.example.org/id/document/42/contents"
        );
        assert_eq!(endpoints.file(100), "https://repo.example.org/id/file/100");
        assert_eq!(
            endpoints.metadata_export(7),
            "https://repo.example.org/cgi/export/eprint/7/XMLCit/epub-eprint-7.xml"
        );
    }

    #[test]
    fn create_entry_sends_deposit_content_type() -> anyhow::Result<()> {
        let client = client(
            Response::new(201, "").with_location("https://repo.example.org/id/eprint/4711"),
        );

        let location = client.create_entry("<eprints/>")?;
        assert_eq!(location, "https://repo.example.org/id/eprint/4711");

        let seen = client.transport.seen.borrow();
        assert_eq!(seen[0].method, Method::Post);
        assert_eq!(seen[0].url, "https://repo.example.org/id/contents");
        assert_eq!(seen[0].header_value("content-type"), Some(DEPOSIT_CONTENT_TYPE));
        assert_eq!(seen[0].body.as_deref(), Some("<eprints/>".as_bytes()));

        Ok(())
    }

    #[test]
    fn create_entry_without_location() {
        let client = client(Response::new(201, ""));
        assert!(matches!(
            client.create_entry("<eprints/>"),
            Err(SwordError::MissingLocation)
        ));
    }

    #[test]
    fn refused_listing_is_status_error() {
        let client = client(Response::new(403, "forbidden"));
        assert!(matches!(
            client.list_entry_contents(7),
            Err(SwordError::Status { status: 403, .. })
        ));
    }

    #[test]
    fn parse_metadata_export() -> anyhow::Result<()> {
        let xml = indoc! {r#"
            <?xml version="1.0" encoding="utf-8"?>
            <eprints xmlns="http://eprints.org/ep2/data/2.0">
              <eprint id="https://repo.example.org/id/eprint/7">
                <eprintid>7</eprintid>
                <eprint_status>archive</eprint_status>
                <title>Color learning</title>
              </eprint>
            </eprints>
        "#};
        let client = client(Response::new(200, xml));

        let summary = client.fetch_metadata(7)?;
        assert_eq!(summary.title(), Some("Color learning"));
        assert_eq!(summary.eprint.eprintid, Some(7));

        let seen = client.transport.seen.borrow();
        assert_eq!(seen[0].header_value("Accept"), Some("application/xml"));

        Ok(())
    }
}
