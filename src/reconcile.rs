// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Remote state reconciliation.
//!
//! The engine compares what an upload directory holds with what the server
//! already knows about the experiment, and pushes whatever is missing or out
//! of date. One run walks the following states:
//!
//! ```text
//! START -> [finished?] -yes-> DONE(skip)
//!       -> [has epid?] -yes-> UPDATE
//!                      -no--> CREATE -> record epid -> UPDATE
//! UPDATE -> discover remote files -> STALE -> DONE(skip)
//!                                 -> ERROR -> DONE(fail)
//!                                 -> ids   -> plan -> upload -> DONE(success)
//! ```
//!
//! Nothing is retried. A failed upload is logged and the run moves on to the
//! next file, since running again is safe: the recorded entry id and the
//! delete-before-upload probe keep repeat runs from piling up duplicates.
//!
//! # Remote Layout
//!
//! An entry holds documents, and a document holds files. The __main file__
//! of an experiment is the remote file whose title, minus extension, equals
//! the experiment's name.

pub mod plan;
pub mod stale;

use crate::{
    config::StalenessSettings,
    deposit::{DepositFile, DepositTemplate, MetadataIncomplete},
    descriptor::{Descriptor, DescriptorError, ExperimentDescriptor},
    prompt::Operator,
    reconcile::{
        plan::{PlanError, Target, UploadPlan, UploadStep},
        stale::parse_remote_timestamp,
    },
    sword::{feed::trailing_id, transport::HttpTransport, SwordClient, SwordError, Transport},
};

use indicatif::ProgressBar;
use jiff::Timestamp;
use std::path::{Path, PathBuf};
use tracing::{debug, error, info, instrument, warn};

/// Answer of remote file discovery.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Discovery {
    /// Ids of remote files matching the experiment, possibly none.
    Files(Vec<u64>),

    /// Remote state is at least as new as local state, nothing to do.
    Stale,

    /// Remote state cannot be determined.
    Error,
}

/// Catalog entry a run works on.
#[derive(Debug)]
pub struct Resolution {
    pub epid: u64,
    pub created: bool,
    pub(crate) deposit: DepositFile,
}

/// Options of a single run.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct RunOptions {
    /// Entry id given on the command line.
    pub epid: Option<u64>,

    /// Skip staleness check.
    pub force: bool,
}

/// How a run ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    /// Descriptor marks experiment as finished.
    Finished,

    /// Operator declined updating an existing entry.
    Declined,

    /// Remote files are already up to date.
    UpToDate { epid: u64 },

    /// Index file is missing, nothing was uploaded.
    IndexMissing { epid: u64, index: PathBuf },

    /// Uploads were attempted.
    Uploaded { epid: u64, report: UploadReport },
}

/// Result of executing an upload plan.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct UploadReport {
    pub uploaded: Vec<PathBuf>,
    pub failed: Vec<PathBuf>,
    pub skipped: Vec<PathBuf>,
}

impl UploadReport {
    pub fn is_complete(&self) -> bool {
        self.failed.is_empty() && self.skipped.is_empty()
    }
}

/// Reconciliation engine.
#[derive(Debug)]
pub struct Engine<T = HttpTransport>
where
    T: Transport,
{
    pub(crate) client: SwordClient<T>,
    pub(crate) template: DepositTemplate,
    pub(crate) staleness: StalenessSettings,
    pub(crate) work_dir: PathBuf,
}

impl<T> Engine<T>
where
    T: Transport,
{
    /// Construct new engine.
    ///
    /// The deposit document is written to the current working directory.
    pub fn new(
        client: SwordClient<T>,
        template: DepositTemplate,
        staleness: StalenessSettings,
    ) -> Self {
        Self {
            client,
            template,
            staleness,
            work_dir: PathBuf::from("."),
        }
    }

    /// Write deposit document to given directory instead.
    pub fn with_work_dir(mut self, work_dir: impl Into<PathBuf>) -> Self {
        self.work_dir = work_dir.into();
        self
    }

    /// Protocol client used by the engine.
    pub fn client(&self) -> &SwordClient<T> {
        &self.client
    }

    /// Run full reconciliation for an upload directory.
    ///
    /// # Errors
    ///
    /// - Return [`ReconcileError::MetadataIncomplete`] if descriptor lacks
    ///   required metadata.
    /// - Return [`ReconcileError::CreateFailed`] if a new entry cannot be
    ///   created.
    /// - Return [`ReconcileError::Descriptor`] if entry id cannot be recorded.
    /// - Return [`ReconcileError::RemoteStateUnknown`] if remote files cannot
    ///   be listed.
    #[instrument(skip_all, level = "debug")]
    pub fn run(
        &self,
        upload_dir: &Path,
        descriptor: &mut Descriptor,
        options: &RunOptions,
        operator: &mut dyn Operator,
        bar: &ProgressBar,
    ) -> Result<Outcome> {
        if descriptor.document().is_finished() {
            info!("experiment is finished, nothing to deposit");
            return Ok(Outcome::Finished);
        }

        let resolution = self.resolve_entry(descriptor.document(), options.epid)?;
        let epid = resolution.epid;
        if resolution.created {
            info!("entry {epid} was created");
        } else {
            let title = self.entry_title(epid);
            if !operator.confirm_update(epid, title.as_deref()) {
                info!("update of entry {epid} declined");
                return Ok(Outcome::Declined);
            }
            info!("entry {epid} will be updated");
        }

        if descriptor.document().epid.is_none() {
            descriptor.record_epid(epid)?;
        }

        let local = if options.force {
            debug!("forced update, skip staleness check");
            None
        } else {
            descriptor.changed_at()
        };

        let name = descriptor.document().experiment.name.clone();
        let main_files = match self.discover_remote_file_ids(epid, &name, local) {
            Discovery::Files(ids) => ids,
            Discovery::Stale => {
                info!("files already up to date");
                return Ok(Outcome::UpToDate { epid });
            }
            Discovery::Error => return Err(ReconcileError::RemoteStateUnknown { epid }),
        };
        for fileid in &main_files {
            info!("found remote main file {fileid}");
        }

        let main_file = main_files.first().copied();
        let plan = match self.plan_upload(upload_dir, &name, epid, main_file, None) {
            Ok(plan) => plan,
            Err(PlanError::IndexMissing(index)) => {
                warn!("index file {:?} does not exist", index.display());
                return Ok(Outcome::IndexMissing { epid, index });
            }
        };

        let report = self.execute(&plan, epid, bar);
        drop(resolution);

        Ok(Outcome::Uploaded { epid, report })
    }

    /// Determine catalog entry to work on.
    ///
    /// Uses the descriptor's entry id, or the explicit one, if either is
    /// known. Otherwise creates a new entry from the descriptor's metadata.
    /// Metadata is validated before anything is sent.
    ///
    /// # Errors
    ///
    /// - Return [`ReconcileError::MetadataIncomplete`] if descriptor lacks
    ///   required metadata.
    /// - Return [`ReconcileError::DepositFile`] if deposit document cannot be
    ///   written.
    /// - Return [`ReconcileError::CreateFailed`] if server refuses the new
    ///   entry.
    /// - Return [`ReconcileError::NoEntryId`] if server does not report a
    ///   usable entry id.
    #[instrument(skip(self, descriptor), level = "debug")]
    pub fn resolve_entry(
        &self,
        descriptor: &ExperimentDescriptor,
        explicit: Option<u64>,
    ) -> Result<Resolution> {
        let xml = self.template.render(descriptor)?;
        let deposit =
            DepositFile::create(&self.work_dir, &xml).map_err(ReconcileError::DepositFile)?;

        if let Some(epid) = descriptor.epid.or(explicit) {
            debug!("reuse entry {epid}");
            return Ok(Resolution {
                epid,
                created: false,
                deposit,
            });
        }

        let location = self
            .client
            .create_entry(xml)
            .map_err(ReconcileError::CreateFailed)?;
        debug!("created entry at {location}");
        let epid = trailing_id(&location).ok_or(ReconcileError::NoEntryId(location))?;

        Ok(Resolution {
            epid,
            created: true,
            deposit,
        })
    }

    /// Find remote files that hold the experiment's main report.
    ///
    /// Walks every HTML document of the entry. If a local timestamp is given
    /// and a document's last modification is at least as recent under the
    /// configured comparison policy, discovery stops with
    /// [`Discovery::Stale`]. Titles are compared with their extension
    /// stripped on both sides.
    #[instrument(skip(self), level = "debug")]
    pub fn discover_remote_file_ids(
        &self,
        epid: u64,
        name: &str,
        local: Option<Timestamp>,
    ) -> Discovery {
        let entry = match self.client.list_entry_contents(epid) {
            Ok(feed) => feed,
            Err(error) => {
                error!("cannot list contents of entry {epid}: {error}");
                return Discovery::Error;
            }
        };

        let wanted = strip_extension(name);
        let mut fileids = Vec::new();
        for docid in entry.document_ids() {
            let document = match self.client.list_document_files(docid) {
                Ok(feed) => feed,
                Err(error) => {
                    error!("cannot list files of document {docid}: {error}");
                    return Discovery::Error;
                }
            };

            let remote = document.last_modified().and_then(|raw| {
                parse_remote_timestamp(raw, self.staleness.remote_offset_hours)
            });
            if let (Some(remote), Some(local)) = (remote, local) {
                if self.staleness.policy.is_stale(remote, local) {
                    return Discovery::Stale;
                }
            }

            fileids.extend(
                document
                    .files()
                    .into_iter()
                    .filter(|(_, title)| strip_extension(title) == wanted)
                    .map(|(fileid, _)| fileid),
            );
        }

        Discovery::Files(fileids)
    }

    /// List documents of an entry.
    ///
    /// Returns `None` if the listing fails.
    #[instrument(skip(self), level = "debug")]
    pub fn discover_document_ids(&self, epid: u64) -> Option<Vec<u64>> {
        match self.client.list_entry_contents(epid) {
            Ok(feed) => Some(feed.document_ids()),
            Err(error) => {
                error!("cannot list contents of entry {epid}: {error}");
                None
            }
        }
    }

    /// Find remote file of entry with exactly the given name.
    ///
    /// Listing failures count as not found.
    #[instrument(skip(self), level = "debug")]
    pub fn find_existing_file(&self, epid: u64, filename: &str) -> Option<u64> {
        let entry = self.client.list_entry_contents(epid).ok()?;
        entry.document_ids().into_iter().find_map(|docid| {
            let document = self
                .client
                .list_document_files(docid)
                .inspect_err(|error| warn!("cannot list files of document {docid}: {error}"))
                .ok()?;
            document
                .files()
                .into_iter()
                .find(|(_, title)| *title == filename)
                .map(|(fileid, _)| fileid)
        })
    }

    /// Plan uploads of an upload directory.
    ///
    /// # Errors
    ///
    /// - Return [`PlanError::IndexMissing`] if index file does not exist.
    pub fn plan_upload(
        &self,
        upload_dir: &Path,
        name: &str,
        epid: u64,
        main_file: Option<u64>,
        document: Option<u64>,
    ) -> Result<UploadPlan, PlanError> {
        UploadPlan::build(upload_dir, name, epid, main_file, document)
    }

    /// Execute upload plan one step at a time.
    ///
    /// Failed steps are recorded and skipped. Steps bound for the index
    /// document are skipped altogether if that document cannot be found
    /// after the index upload. Followers named like the index file are
    /// posted without deleting anything first.
    #[instrument(skip(self, plan, bar), level = "debug")]
    pub fn execute(&self, plan: &UploadPlan, epid: u64, bar: &ProgressBar) -> UploadReport {
        let mut report = UploadReport::default();
        bar.set_length(plan.steps().len() as u64);

        let index = plan.index();
        self.upload(index, None, &mut report, bar);

        let needs_index_document = plan
            .followers()
            .iter()
            .any(|step| step.target == Target::IndexDocument);
        let index_document = if needs_index_document {
            let docid = self
                .discover_document_ids(epid)
                .and_then(|docids| docids.first().copied());
            match docid {
                Some(docid) => info!("files follow index into document {docid}"),
                None => warn!("no document could be found for entry {epid}"),
            }
            docid
        } else {
            None
        };

        // INVARIANT: Never delete by the index file's name, the only remote
        // match may be the main report just uploaded.
        let index_name = index.filename();
        for step in plan.followers() {
            if step.replace_existing && step.filename() != index_name {
                self.remove_existing(epid, step);
            } else if step.replace_existing {
                debug!("keep remote {index_name}, {:?} shares its name", step.path.display());
            }
            self.upload(step, index_document, &mut report, bar);
        }

        bar.finish_and_clear();
        report
    }

    fn upload(
        &self,
        step: &UploadStep,
        index_document: Option<u64>,
        report: &mut UploadReport,
        bar: &ProgressBar,
    ) {
        bar.set_message(step.filename());
        let Some(url) = step.target.url(self.client.endpoints(), index_document) else {
            warn!("skip {:?}, its target is unknown", step.path.display());
            report.skipped.push(step.path.clone());
            bar.inc(1);
            return;
        };

        info!("upload {:?} to {url}", step.path.display());
        match self.client.send_file(&step.path, &url, step.target.method()) {
            Ok(()) => report.uploaded.push(step.path.clone()),
            Err(error) => {
                error!("upload of {:?} failed: {error}", step.path.display());
                report.failed.push(step.path.clone());
            }
        }
        bar.inc(1);
    }

    fn remove_existing(&self, epid: u64, step: &UploadStep) {
        let filename = step.filename();
        if let Some(fileid) = self.find_existing_file(epid, &filename) {
            info!("delete remote {filename} (file {fileid}) before upload");
            if let Err(error) = self.client.delete_file(fileid) {
                warn!("cannot delete file {fileid}: {error}");
            }
        }
    }

    fn entry_title(&self, epid: u64) -> Option<String> {
        match self.client.fetch_metadata(epid) {
            Ok(summary) => summary.title().map(ToString::to_string),
            Err(error) => {
                debug!("no metadata for entry {epid}: {error}");
                None
            }
        }
    }
}

/// Strip last extension of a filename.
///
/// A leading dot does not start an extension.
pub fn strip_extension(filename: &str) -> &str {
    match filename.rfind('.') {
        Some(idx) if idx > 0 => &filename[..idx],
        _ => filename,
    }
}

/// Reconciliation error types.
#[derive(Debug, thiserror::Error)]
pub enum ReconcileError {
    /// Descriptor lacks required metadata.
    #[error(transparent)]
    MetadataIncomplete(#[from] MetadataIncomplete),

    /// Deposit document cannot be written.
    #[error("failed to write deposit document")]
    DepositFile(#[source] std::io::Error),

    /// Server refused to create entry.
    #[error("failed to create entry")]
    CreateFailed(#[source] SwordError),

    /// Server response lacks an entry id.
    #[error("no entry id in {0:?}")]
    NoEntryId(String),

    /// Descriptor cannot be updated.
    #[error(transparent)]
    Descriptor(#[from] DescriptorError),

    /// Remote files of entry cannot be determined.
    #[error("cannot determine remote state of entry {epid}")]
    RemoteStateUnknown { epid: u64 },
}

/// Friendly result alias :3
pub type Result<T, E = ReconcileError> = std::result::Result<T, E>;
