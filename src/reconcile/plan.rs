// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Upload planning.
//!
//! Decide which local files get pushed, in what order, and where to. The
//! __index__ file, i.e., the experiment's HTML report, always goes first
//! because the document it lands in is where every other file follows it.
//! All remaining HTML, XML, and YAML files below the upload directory are
//! then posted into that same document.

use crate::{
    deposit::DEPOSIT_FILE_NAME,
    path::{files_under, has_extension},
    sword::{Endpoints, Method},
};

use std::{
    fmt::{Display, Formatter, Result as FmtResult},
    path::{Path, PathBuf},
};
use tracing::{debug, instrument};

/// Extensions of files that get uploaded.
pub const UPLOAD_EXTENSIONS: [&str; 3] = ["html", "xml", "yml"];

/// Where an upload step sends its file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Target {
    /// Replace an existing remote file.
    File(u64),

    /// Create a new document under an entry.
    EntryContents(u64),

    /// Add a file to a known document.
    DocumentContents(u64),

    /// Add a file to whatever document the index file ended up in.
    IndexDocument,
}

impl Target {
    /// HTTP method used for this target.
    pub fn method(&self) -> Method {
        match self {
            Self::File(_) => Method::Put,
            _ => Method::Post,
        }
    }

    /// URL of target.
    ///
    /// Returns `None` for [`Target::IndexDocument`] while the index document
    /// is still unknown.
    pub fn url(&self, endpoints: &Endpoints, index_document: Option<u64>) -> Option<String> {
        match self {
            Self::File(fileid) => Some(endpoints.file(*fileid)),
            Self::EntryContents(epid) => Some(endpoints.entry_contents(*epid)),
            Self::DocumentContents(docid) => Some(endpoints.document_contents(*docid)),
            Self::IndexDocument => index_document.map(|docid| endpoints.document_contents(docid)),
        }
    }
}

impl Display for Target {
    fn fmt(&self, fmt: &mut Formatter<'_>) -> FmtResult {
        match self {
            Self::File(fileid) => write!(fmt, "file {fileid}"),
            Self::EntryContents(epid) => write!(fmt, "entry {epid}"),
            Self::DocumentContents(docid) => write!(fmt, "document {docid}"),
            Self::IndexDocument => fmt.write_str("index document"),
        }
    }
}

/// Single upload of a local file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadStep {
    pub path: PathBuf,
    pub target: Target,

    /// Delete a remote file of the same name before uploading.
    pub replace_existing: bool,
}

impl UploadStep {
    /// Name the file is uploaded under.
    pub fn filename(&self) -> String {
        self.path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_default()
    }
}

/// Ordered uploads of one run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadPlan {
    steps: Vec<UploadStep>,
}

impl UploadPlan {
    /// Plan uploads of an upload directory.
    ///
    /// The index file `{name}.html` at the top of the directory is replaced
    /// in place if its remote file is known, otherwise it is posted to the
    /// entry as a new document. Every other uploadable file follows into the
    /// given document, or into the index document if none is given. The
    /// deposit document itself is never uploaded.
    ///
    /// # Errors
    ///
    /// - Return [`PlanError::IndexMissing`] if index file does not exist.
    #[instrument(skip(dir), level = "debug")]
    pub fn build(
        dir: &Path,
        name: &str,
        epid: u64,
        main_file: Option<u64>,
        document: Option<u64>,
    ) -> Result<Self> {
        let index = dir.join(format!("{name}.html"));
        if !index.is_file() {
            return Err(PlanError::IndexMissing(index));
        }

        let mut steps = vec![UploadStep {
            path: index.clone(),
            target: match main_file {
                Some(fileid) => Target::File(fileid),
                None => Target::EntryContents(epid),
            },
            replace_existing: false,
        }];

        let follow_target = match document {
            Some(docid) => Target::DocumentContents(docid),
            None => Target::IndexDocument,
        };

        for path in files_under(dir) {
            let is_deposit = path
                .file_name()
                .is_some_and(|file| file == DEPOSIT_FILE_NAME);
            if path == index || is_deposit || !has_extension(&path, &UPLOAD_EXTENSIONS) {
                continue;
            }

            debug!("plan upload of {:?} to {follow_target}", path.display());
            steps.push(UploadStep {
                path,
                target: follow_target,
                replace_existing: true,
            });
        }

        Ok(Self { steps })
    }

    /// Index file step.
    pub fn index(&self) -> &UploadStep {
        // INVARIANT: Plan is never constructed without its index step.
        &self.steps[0]
    }

    /// Steps following the index step.
    pub fn followers(&self) -> &[UploadStep] {
        &self.steps[1..]
    }

    /// All steps in execution order.
    pub fn steps(&self) -> &[UploadStep] {
        &self.steps
    }
}

/// Upload planning error types.
#[derive(Debug, thiserror::Error)]
pub enum PlanError {
    /// Experiment report is not where it should be.
    #[error("index file {:?} does not exist", .0.display())]
    IndexMissing(PathBuf),
}

/// Friendly result alias :3
type Result<T, E = PlanError> = std::result::Result<T, E>;

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use sealed_test::prelude::*;
    use std::{
        collections::BTreeSet,
        fs::{create_dir_all, write},
    };

    fn upload_dir() -> anyhow::Result<PathBuf> {
        create_dir_all("upload/plots")?;
        write("upload/exp1.html", "<html/>")?;
        write("upload/exp1.yml", "experiment: {}")?;
        write("upload/notes.xml", "<notes/>")?;
        write("upload/plots/fig.html", "<html/>")?;
        write("upload/raw.csv", "a,b")?;
        write(format!("upload/{DEPOSIT_FILE_NAME}"), "<eprints/>")?;

        Ok(PathBuf::from("upload"))
    }

    #[sealed_test]
    fn index_first_then_followers() -> anyhow::Result<()> {
        let dir = upload_dir()?;
        let plan = UploadPlan::build(&dir, "exp1", 7, None, None)?;

        assert_eq!(plan.steps().len(), 4);
        assert_eq!(
            plan.index(),
            &UploadStep {
                path: dir.join("exp1.html"),
                target: Target::EntryContents(7),
                replace_existing: false,
            }
        );

        let result = plan
            .followers()
            .iter()
            .map(|step| (step.path.clone(), step.target, step.replace_existing))
            .collect::<BTreeSet<_>>();
        let expect = BTreeSet::from([
            (dir.join("exp1.yml"), Target::IndexDocument, true),
            (dir.join("notes.xml"), Target::IndexDocument, true),
            (dir.join("plots/fig.html"), Target::IndexDocument, true),
        ]);
        assert_eq!(result, expect);

        Ok(())
    }

    #[sealed_test]
    fn known_main_file_is_replaced() -> anyhow::Result<()> {
        let dir = upload_dir()?;
        let plan = UploadPlan::build(&dir, "exp1", 7, Some(100), Some(42))?;

        assert_eq!(plan.index().target, Target::File(100));
        assert_eq!(plan.index().target.method(), Method::Put);
        assert!(plan
            .followers()
            .iter()
            .all(|step| step.target == Target::DocumentContents(42)
                && step.target.method() == Method::Post));

        Ok(())
    }

    #[sealed_test]
    fn missing_index_is_reported() -> anyhow::Result<()> {
        let dir = upload_dir()?;
        let result = UploadPlan::build(&dir, "exp2", 7, None, None);
        assert!(matches!(result, Err(PlanError::IndexMissing(path)) if path == dir.join("exp2.html")));

        Ok(())
    }

    #[test]
    fn target_urls() {
        let endpoints = Endpoints::new("https://repo.example.org");
        assert_eq!(
            Target::File(100).url(&endpoints, None).as_deref(),
            Some("https://repo.example.org/id/file/100")
        );
        assert_eq!(
            Target::EntryContents(7).url(&endpoints, None).as_deref(),
            Some("https://repo.example.org/id/eprint/7/contents")
        );
        assert_eq!(Target::IndexDocument.url(&endpoints, None), None);
        assert_eq!(
            Target::IndexDocument.url(&endpoints, Some(42)).as_deref(),
            Some("https://repo.example.org/id/document/42/contents")
        );
    }
}
