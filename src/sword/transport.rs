// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! HTTP transport.
//!
//! Sends protocol requests through a blocking [`reqwest`] client. Requests
//! are authenticated with basic auth when credentials are known, and sent
//! anonymously otherwise.

use crate::{
    auth::Credentials,
    sword::{Method, Request, Response, Transport},
};

use reqwest::{blocking::Client, header::LOCATION};
use tracing::{debug, instrument};

/// Transport over HTTP(S).
#[derive(Debug)]
pub struct HttpTransport {
    client: Client,
    credentials: Option<Credentials>,
}

impl HttpTransport {
    /// Construct new HTTP transport.
    ///
    /// Certificate verification can be turned off for test servers that use
    /// self-signed certificates.
    ///
    /// # Errors
    ///
    /// - Return [`TransportError::Client`] if HTTP client cannot be
    ///   initialized.
    pub fn new(verify_tls: bool, credentials: Option<Credentials>) -> Result<Self> {
        let client = Client::builder()
            .danger_accept_invalid_certs(!verify_tls)
            .build()
            .map_err(TransportError::Client)?;

        Ok(Self {
            client,
            credentials,
        })
    }
}

impl Transport for HttpTransport {
    #[instrument(skip(self, request), fields(method = %request.method, url = %request.url), level = "debug")]
    fn send(&self, request: Request) -> Result<Response> {
        let method = match request.method {
            Method::Get => reqwest::Method::GET,
            Method::Post => reqwest::Method::POST,
            Method::Put => reqwest::Method::PUT,
            Method::Delete => reqwest::Method::DELETE,
        };

        let mut builder = self
            .client
            .request(method, &request.url)
            .header("Connection", "close");
        for (name, value) in &request.headers {
            builder = builder.header(name.as_str(), value.as_str());
        }

        if let Some(credentials) = &self.credentials {
            builder = builder.basic_auth(&credentials.login, credentials.password.as_ref());
        }

        if let Some(body) = request.body {
            builder = builder.body(body);
        }

        let response = builder.send().map_err(|err| TransportError::Send {
            source: err,
            url: request.url.clone(),
        })?;

        let status = response.status().as_u16();
        let location = response
            .headers()
            .get(LOCATION)
            .and_then(|value| value.to_str().ok())
            .map(ToString::to_string);
        debug!("status {status}, location {location:?}");

        let body = response.text().map_err(|err| TransportError::Send {
            source: err,
            url: request.url,
        })?;

        Ok(Response {
            status,
            location,
            body,
        })
    }
}

/// Transport error types.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    /// HTTP client cannot be constructed.
    #[error("failed to initialize HTTP client")]
    Client(#[source] reqwest::Error),

    /// Request could not be sent, or its response could not be read.
    #[error("request to {url} failed")]
    Send {
        #[source]
        source: reqwest::Error,
        url: String,
    },
}

/// Friendly result alias :3
type Result<T, E = TransportError> = std::result::Result<T, E>;
