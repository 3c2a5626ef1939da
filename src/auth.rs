// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Credential lookup.
//!
//! Credentials for the repository server come from three places, in order:
//! the command line, the user's netrc file, or nowhere at all. Without
//! credentials requests go out anonymously, which the server may or may not
//! accept.
//!
//! # Netrc Layout
//!
//! ```text
//! machine epub.example.org login alice password hunter2
//! default login anonymous password guest
//! ```
//!
//! Tokens may be spread over any number of lines. Macro definitions are not
//! supported and are skipped up to the next blank line.

use crate::path::netrc_path;

use std::{fs::read_to_string, path::Path};
use tracing::{debug, warn};

/// Login used to authenticate against the server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Credentials {
    pub login: String,
    pub password: Option<String>,
}

impl Credentials {
    /// Construct new credentials.
    pub fn new(login: impl Into<String>, password: Option<String>) -> Self {
        Self {
            login: login.into(),
            password,
        }
    }
}

/// Parsed netrc file.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct Netrc {
    machines: Vec<(String, Credentials)>,
    default: Option<Credentials>,
}

impl Netrc {
    /// Load netrc file from target path.
    ///
    /// Returns `None` if file cannot be read.
    pub fn load(path: impl AsRef<Path>) -> Option<Self> {
        match read_to_string(path.as_ref()) {
            Ok(content) => Some(Self::parse(&content)),
            Err(error) => {
                warn!("cannot read netrc {:?}: {error}", path.as_ref().display());
                None
            }
        }
    }

    /// Parse netrc content.
    ///
    /// Malformed sections are skipped rather than rejected.
    pub fn parse(content: &str) -> Self {
        let mut netrc = Self::default();
        let mut current: Option<(Option<String>, Credentials)> = None;
        let mut lines = content.lines();
        let mut tokens: Vec<String> = Vec::new();

        // INVARIANT: Macro bodies run up to the next blank line, so tokenize
        // line by line to be able to skip them.
        while let Some(line) = lines.next() {
            let mut words = line.split_whitespace().map(str::to_owned);
            while let Some(word) = words.next() {
                if word == "macdef" {
                    for body in lines.by_ref() {
                        if body.trim().is_empty() {
                            break;
                        }
                    }
                    break;
                }
                tokens.push(word);
            }
        }

        let mut tokens = tokens.into_iter();
        while let Some(token) = tokens.next() {
            match token.as_str() {
                "machine" => {
                    netrc.push(current.take());
                    let host = tokens.next();
                    current = Some((host, Credentials::new("", None)));
                }
                "default" => {
                    netrc.push(current.take());
                    current = Some((None, Credentials::new("", None)));
                }
                "login" => {
                    if let (Some((_, creds)), Some(login)) = (current.as_mut(), tokens.next()) {
                        creds.login = login;
                    }
                }
                "password" => {
                    if let (Some((_, creds)), Some(password)) = (current.as_mut(), tokens.next()) {
                        creds.password = Some(password);
                    }
                }
                "account" => {
                    let _ = tokens.next();
                }
                _ => continue,
            }
        }
        netrc.push(current.take());

        netrc
    }

    /// Lookup credentials for host, falling back to default entry.
    pub fn lookup(&self, host: &str) -> Option<&Credentials> {
        self.machines
            .iter()
            .find(|(machine, _)| machine == host)
            .map(|(_, creds)| creds)
            .or(self.default.as_ref())
    }

    fn push(&mut self, section: Option<(Option<String>, Credentials)>) {
        match section {
            Some((_, creds)) if creds.login.is_empty() => {}
            Some((Some(host), creds)) => self.machines.push((host, creds)),
            Some((None, creds)) => self.default = Some(creds),
            None => {}
        }
    }
}

/// Resolve credentials for host.
///
/// An explicit user wins over the netrc file, but borrows the netrc password
/// when the netrc login for that host matches. Returns `None` when nothing is
/// known, in which case requests go out anonymously.
pub fn resolve_credentials(user: Option<&str>, host: &str) -> Option<Credentials> {
    let netrc = netrc_path()
        .ok()
        .flatten()
        .and_then(Netrc::load)
        .unwrap_or_default();

    resolve_with(&netrc, user, host)
}

pub(crate) fn resolve_with(netrc: &Netrc, user: Option<&str>, host: &str) -> Option<Credentials> {
    let found = netrc.lookup(host);
    match (user, found) {
        (Some(user), Some(creds)) if creds.login == user => Some(creds.clone()),
        (Some(user), _) => Some(Credentials::new(user, None)),
        (None, Some(creds)) => {
            debug!("user for {host}: {}", creds.login);
            Some(creds.clone())
        }
        (None, None) => {
            warn!("no credentials for {host}, sending anonymous requests");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use indoc::indoc;
    use pretty_assertions::assert_eq;

    const NETRC: &str = indoc! {r#"
        machine epub.example.org
            login alice
            password hunter2

        macdef init
        cd /pub
        bin

        machine other.example.org login bob account x password secret
        default login anonymous password guest
    "#};

    #[test]
    fn parse_netrc_machines() {
        let netrc = Netrc::parse(NETRC);

        assert_eq!(
            netrc.lookup("epub.example.org"),
            Some(&Credentials::new("alice", Some("hunter2".into())))
        );
        assert_eq!(
            netrc.lookup("other.example.org"),
            Some(&Credentials::new("bob", Some("secret".into())))
        );
        assert_eq!(
            netrc.lookup("unknown.example.org"),
            Some(&Credentials::new("anonymous", Some("guest".into())))
        );
    }

    #[test]
    fn explicit_user_borrows_matching_password() {
        let netrc = Netrc::parse(NETRC);

        let result = resolve_with(&netrc, Some("alice"), "epub.example.org");
        assert_eq!(result, Some(Credentials::new("alice", Some("hunter2".into()))));

        let result = resolve_with(&netrc, Some("carol"), "epub.example.org");
        assert_eq!(result, Some(Credentials::new("carol", None)));
    }

    #[test]
    fn no_credentials_means_anonymous() {
        let netrc = Netrc::parse("machine epub.example.org login alice password hunter2");
        assert_eq!(resolve_with(&netrc, None, "other.example.org"), None);
    }
}
