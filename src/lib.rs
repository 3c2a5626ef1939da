// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Deposit experiment reports into an EPrints repository.
//!
//! An __upload directory__ holds one experiment: an HTML report named after
//! the experiment, a YAML __descriptor__ carrying its catalog metadata, and
//! any number of ancillary HTML or XML files. Epsword turns the descriptor
//! into a catalog entry over the SWORD protocol, uploads the report and its
//! ancillaries into that entry, and remembers the entry's id in the
//! descriptor so later runs update instead of duplicating.
//!
//! # General Layout
//!
//! - [`descriptor`]: locate, parse, and update experiment descriptors.
//! - [`deposit`]: render deposit metadata documents.
//! - [`sword`]: speak the deposit protocol over a [`sword::Transport`].
//! - [`reconcile`]: decide what needs uploading and do it.
//! - [`auth`]: resolve credentials from the command line or netrc.
//! - [`config`]: user settings.
//! - [`prompt`]: ask the operator.
//!
//! # See Also
//!
//! 1. [EPrints SWORD 2.0](https://wiki.eprints.org/w/SWORD_2.0)

pub mod auth;
pub mod config;
pub mod deposit;
pub mod descriptor;
pub mod path;
pub mod prompt;
pub mod reconcile;
pub mod sword;
