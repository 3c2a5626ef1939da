// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Operator interaction.
//!
//! A few decisions are left to the human running the tool: confirming that an
//! existing entry really should be updated, naming the upload directory when
//! none was given, and typing a password that the netrc file does not know.

use indicatif::ProgressBar;
use inquire::{Confirm, Password, Text};
use std::path::PathBuf;
use tracing::{info, instrument, warn};

/// Layer of indirection for operator decisions.
pub trait Operator {
    /// Ask whether an existing entry should be updated.
    fn confirm_update(&mut self, epid: u64, title: Option<&str>) -> bool;
}

/// Operator that agrees to everything, for non-interactive runs.
#[derive(Debug, Default, Clone, Copy)]
pub struct Unattended;

impl Operator for Unattended {
    fn confirm_update(&mut self, epid: u64, _title: Option<&str>) -> bool {
        info!("update entry {epid} without confirmation");
        true
    }
}

/// Operator asked through the terminal.
///
/// Questions are asked with the progress bar suspended.
#[derive(Debug, Clone)]
pub struct InquireOperator {
    pub(crate) bar: ProgressBar,
}

impl InquireOperator {
    /// Construct new terminal operator.
    pub fn new(bar: ProgressBar) -> Self {
        Self { bar }
    }
}

impl Operator for InquireOperator {
    #[instrument(skip(self, title), level = "debug")]
    fn confirm_update(&mut self, epid: u64, title: Option<&str>) -> bool {
        let message = match title {
            Some(title) => format!("update entry {epid} ({title})?"),
            None => format!("update entry {epid}?"),
        };

        self.bar.suspend(|| {
            Confirm::new(&message)
                .with_default(true)
                .prompt()
                .unwrap_or_else(|error| {
                    warn!("no confirmation: {error}");
                    false
                })
        })
    }
}

/// Ask for upload directory.
///
/// # Errors
///
/// - Return [`inquire::InquireError`] if prompt cannot be shown or is
///   cancelled.
pub fn ask_upload_dir() -> Result<PathBuf, inquire::InquireError> {
    Text::new("File/Directory:").prompt().map(PathBuf::from)
}

/// Ask for password of user.
///
/// # Errors
///
/// - Return [`inquire::InquireError`] if prompt cannot be shown or is
///   cancelled.
pub fn ask_password(user: &str) -> Result<String, inquire::InquireError> {
    Password::new(&format!("password for {user}:"))
        .without_confirmation()
        .prompt()
}
