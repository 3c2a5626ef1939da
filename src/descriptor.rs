// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Experiment descriptor.
//!
//! Every upload directory carries exactly one YAML __descriptor__ that
//! describes the experiment whose artifacts live in that directory. The
//! descriptor doubles as the tool's only persistent state: once a catalog
//! entry has been created for the experiment, its identifier is appended to
//! the descriptor as `epid`, so the next run updates that entry instead of
//! creating another one.
//!
//! # General Layout
//!
//! ```yaml
//! experiment:
//!   title: Color learning
//!   name: colorlearning
//!   description: Learning colors from examples.
//! author:
//!   firstName: Ada
//!   lastName: Lovelace
//!   id: 0000-0002-1825-0097
//! meta-data:
//!   - oa.type:
//!       name: gold
//!   - institution:
//!       id: 01eezs655
//!   - data.type:
//!       name: dataset
//!       status: ongoing
//!   - subject:
//!       id: psychology
//!   - department:
//!       id: fak_psy
//!   - licenses:
//!       name: CC-BY 4.0
//!   - funding:
//!       acknowledged.funders: no_funders
//!       received.funding: false
//! epid: 4711
//! ```
//!
//! The `name` of the experiment is also the base name of its HTML report.
//! The descriptor's modification time stands in for the moment the
//! experiment last changed.

use crate::{
    path::{files_under, has_extension},
    reconcile::stale::modified_at,
};

use jiff::Timestamp;
use serde::{Deserialize, Deserializer};
use serde_yaml::{Mapping, Value};
use std::{
    collections::BTreeMap,
    fs::{read_to_string, OpenOptions},
    io::Write,
    path::{Path, PathBuf},
};
use tracing::{debug, info, instrument};

/// Metadata keys that must be present to deposit an experiment.
pub const REQUIRED_METADATA: [&str; 5] =
    ["oa.type", "institution", "data.type", "subject", "department"];

/// Experiment descriptor as found on disk.
#[derive(Debug, Clone, PartialEq)]
pub struct Descriptor {
    path: PathBuf,
    document: ExperimentDescriptor,
    changed_at: Option<Timestamp>,
}

impl Descriptor {
    /// Locate and load the descriptor of an upload directory.
    ///
    /// # Errors
    ///
    /// - Return [`DescriptorError::NotFound`] if directory has no descriptor.
    /// - Return [`DescriptorError::Ambiguous`] if directory has more than one.
    /// - Return [`DescriptorError::Read`] if descriptor cannot be read.
    /// - Return [`DescriptorError::Parse`] if descriptor is malformed.
    #[instrument(skip(dir), level = "debug")]
    pub fn find(dir: impl AsRef<Path>) -> Result<Self> {
        let dir = dir.as_ref();
        let mut candidates = files_under(dir)
            .into_iter()
            .filter(|path| has_extension(path, &["yml"]))
            .collect::<Vec<_>>();

        match candidates.len() {
            0 => Err(DescriptorError::NotFound(dir.to_path_buf())),
            1 => Self::load(candidates.remove(0)),
            _ => Err(DescriptorError::Ambiguous(candidates)),
        }
    }

    /// Load descriptor from target path.
    ///
    /// # Errors
    ///
    /// - Return [`DescriptorError::Read`] if descriptor cannot be read.
    /// - Return [`DescriptorError::Parse`] if descriptor is malformed.
    pub fn load(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        debug!("load descriptor {:?}", path.display());
        let document = read_document(&path)?;
        let changed_at = modified_at(&path);

        Ok(Self {
            path,
            document,
            changed_at,
        })
    }

    /// Path of descriptor file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Parsed descriptor content.
    pub fn document(&self) -> &ExperimentDescriptor {
        &self.document
    }

    /// Moment descriptor file last changed.
    pub fn changed_at(&self) -> Option<Timestamp> {
        self.changed_at
    }

    /// Record catalog entry identifier in descriptor.
    ///
    /// The identifier is appended as plain text, leaving the rest of the file
    /// untouched. Does nothing if descriptor already records an identifier.
    ///
    /// # Errors
    ///
    /// - Return [`DescriptorError::Read`] if descriptor cannot be re-read.
    /// - Return [`DescriptorError::Parse`] if descriptor became malformed.
    /// - Return [`DescriptorError::Write`] if identifier cannot be appended.
    #[instrument(skip(self), level = "debug")]
    pub fn record_epid(&mut self, epid: u64) -> Result<()> {
        // INVARIANT: Only append if the file on disk lacks an epid, someone
        // may have edited it since we loaded it.
        let current = read_document(&self.path)?;
        if let Some(existing) = current.epid {
            debug!("descriptor already records epid {existing}");
            self.document = current;
            return Ok(());
        }

        let mut file = OpenOptions::new()
            .append(true)
            .open(&self.path)
            .map_err(|err| DescriptorError::Write {
                source: err,
                path: self.path.clone(),
            })?;
        writeln!(file, "\nepid: {epid}").map_err(|err| DescriptorError::Write {
            source: err,
            path: self.path.clone(),
        })?;
        info!("recorded epid {epid} in {:?}", self.path.display());

        self.document = current;
        self.document.epid = Some(epid);

        Ok(())
    }
}

fn read_document(path: &Path) -> Result<ExperimentDescriptor> {
    let content = read_to_string(path).map_err(|err| DescriptorError::Read {
        source: err,
        path: path.to_path_buf(),
    })?;

    content.parse()
}

/// Layout of a descriptor file.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ExperimentDescriptor {
    /// What the experiment is.
    pub experiment: Experiment,

    /// Who ran it.
    pub author: Author,

    /// Keyed catalog metadata.
    #[serde(rename = "meta-data", default)]
    pub metadata: Vec<Mapping>,

    /// Catalog entry the experiment was deposited as.
    #[serde(default)]
    pub epid: Option<u64>,

    /// Marks an experiment whose deposit is complete for good.
    ///
    /// Only presence of the key matters, a bare `finished:` counts too.
    #[serde(default, deserialize_with = "present")]
    pub finished: Option<Value>,
}

fn present<'de, D>(deserializer: D) -> Result<Option<Value>, D::Error>
where
    D: Deserializer<'de>,
{
    Value::deserialize(deserializer).map(Some)
}

impl std::str::FromStr for ExperimentDescriptor {
    type Err = DescriptorError;

    fn from_str(data: &str) -> Result<Self, Self::Err> {
        serde_yaml::from_str(data).map_err(DescriptorError::Parse)
    }
}

impl ExperimentDescriptor {
    /// Experiment no longer accepts deposits.
    pub fn is_finished(&self) -> bool {
        self.finished.is_some()
    }

    /// Typed view of keyed catalog metadata.
    pub fn catalog(&self) -> CatalogMetadata {
        CatalogMetadata::from_entries(&self.metadata)
    }
}

/// Experiment section of descriptor.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Experiment {
    pub title: String,

    /// Base name of the experiment's HTML report.
    pub name: String,

    #[serde(default)]
    pub description: String,
}

/// Author section of descriptor.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Author {
    pub first_name: String,
    pub last_name: String,

    /// ORCID of author.
    #[serde(default)]
    pub id: Option<String>,
}

/// Data type of experiment.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct DataType {
    pub name: String,
    pub status: Option<String>,
}

/// Funding section of catalog metadata.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct Funding {
    /// Raw `acknowledged.funders` value rendered as text.
    pub acknowledged_funders: String,

    /// Whether `received.funding` is literally true.
    pub received_funding: bool,
}

/// Typed view of the `meta-data` list.
///
/// Each list item is a single-key mapping. Unknown keys are ignored, and a
/// later item with the same key replaces an earlier one.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct CatalogMetadata {
    pub oa_type: Option<String>,
    pub institution: Option<String>,
    pub data_type: Option<DataType>,
    pub subject: Option<String>,
    pub department: Option<String>,
    pub license: Option<String>,
    pub funding: Option<Funding>,
    pub ispublished: Option<String>,
    pub refereed: Option<String>,
}

impl CatalogMetadata {
    /// Collect typed metadata from raw `meta-data` items.
    pub fn from_entries(entries: &[Mapping]) -> Self {
        let mut catalog = Self::default();
        let items = entries
            .iter()
            .flat_map(|entry| entry.iter())
            .filter_map(|(key, value)| Some((key.as_str()?, value)))
            .collect::<BTreeMap<_, _>>();

        for (key, value) in items {
            match key {
                "oa.type" => catalog.oa_type = field(value, "name"),
                "institution" => catalog.institution = field(value, "id"),
                "data.type" => {
                    catalog.data_type = field(value, "name").map(|name| DataType {
                        name,
                        status: field(value, "status"),
                    })
                }
                "subject" => catalog.subject = field(value, "id"),
                "department" => catalog.department = field(value, "id"),
                "licenses" => catalog.license = field(value, "name"),
                "funding" => {
                    catalog.funding = Some(Funding {
                        acknowledged_funders: field(value, "acknowledged.funders")
                            .unwrap_or_default(),
                        received_funding: value
                            .get("received.funding")
                            .and_then(Value::as_bool)
                            .unwrap_or(false),
                    })
                }
                "ispublished" => catalog.ispublished = scalar_or_field(value, "name"),
                "refereed" => catalog.refereed = scalar_or_field(value, "name"),
                _ => continue,
            }
        }

        catalog
    }

    /// Names of required keys that are absent.
    pub fn missing_required(&self) -> Vec<&'static str> {
        let present = [
            self.oa_type.is_some(),
            self.institution.is_some(),
            self.data_type.is_some(),
            self.subject.is_some(),
            self.department.is_some(),
        ];

        REQUIRED_METADATA
            .into_iter()
            .zip(present)
            .filter_map(|(key, present)| (!present).then_some(key))
            .collect()
    }
}

fn field(value: &Value, key: &str) -> Option<String> {
    value.get(key).and_then(render_scalar)
}

fn scalar_or_field(value: &Value, key: &str) -> Option<String> {
    render_scalar(value).or_else(|| field(value, key))
}

fn render_scalar(value: &Value) -> Option<String> {
    match value {
        Value::String(text) => Some(text.clone()),
        Value::Bool(flag) => Some(flag.to_string()),
        Value::Number(number) => Some(number.to_string()),
        _ => None,
    }
}

/// Descriptor error types.
#[derive(Debug, thiserror::Error)]
pub enum DescriptorError {
    /// Upload directory has no descriptor.
    #[error("no descriptor (*.yml) found in {:?}", .0.display())]
    NotFound(PathBuf),

    /// Upload directory has more than one descriptor.
    #[error("expected exactly one descriptor, found {0:?}")]
    Ambiguous(Vec<PathBuf>),

    /// Descriptor cannot be read.
    #[error("failed to read descriptor at {:?}", path.display())]
    Read {
        #[source]
        source: std::io::Error,
        path: PathBuf,
    },

    /// Descriptor cannot be written.
    #[error("failed to write descriptor at {:?}", path.display())]
    Write {
        #[source]
        source: std::io::Error,
        path: PathBuf,
    },

    /// Descriptor is malformed.
    #[error(transparent)]
    Parse(#[from] serde_yaml::Error),
}

/// Friendly result alias :3
type Result<T, E = DescriptorError> = std::result::Result<T, E>;

#[cfg(test)]
mod tests {
    use super::*;
    use indoc::indoc;
    use pretty_assertions::assert_eq;
    use sealed_test::prelude::*;
    use simple_test_case::test_case;
    use std::fs::{create_dir_all, write};

    const DESCRIPTOR: &str = indoc! {r#"
        experiment:
          title: Color learning
          name: colorlearning
          description: Learning colors from examples.
        author:
          firstName: Ada
          lastName: Lovelace
          id: 0000-0002-1825-0097
        meta-data:
          - oa.type:
              name: gold
          - institution:
              id: 01eezs655
          - data.type:
              name: dataset
              status: ongoing
          - subject:
              id: psychology
          - department:
              id: fak_psy
          - licenses:
              name: CC-BY 4.0
          - funding:
              acknowledged.funders: false
              received.funding: true
          - ispublished: pub
          - refereed: true
    "#};

    #[test]
    fn parse_descriptor() -> anyhow::Result<()> {
        let result: ExperimentDescriptor = DESCRIPTOR.parse()?;

        assert_eq!(result.experiment.name, "colorlearning");
        assert_eq!(result.author.first_name, "Ada");
        assert_eq!(result.author.id.as_deref(), Some("0000-0002-1825-0097"));
        assert_eq!(result.epid, None);
        assert!(!result.is_finished());

        let expect = CatalogMetadata {
            oa_type: Some("gold".into()),
            institution: Some("01eezs655".into()),
            data_type: Some(DataType {
                name: "dataset".into(),
                status: Some("ongoing".into()),
            }),
            subject: Some("psychology".into()),
            department: Some("fak_psy".into()),
            license: Some("CC-BY 4.0".into()),
            funding: Some(Funding {
                acknowledged_funders: "false".into(),
                received_funding: true,
            }),
            ispublished: Some("pub".into()),
            refereed: Some("true".into()),
        };
        assert_eq!(result.catalog(), expect);
        assert!(result.catalog().missing_required().is_empty());

        Ok(())
    }

    #[test_case("finished: true", true; "flag set")]
    #[test_case("finished:", true; "bare key")]
    #[test_case("finished: false", true; "any value")]
    #[test_case("", false; "absent")]
    #[test]
    fn finished_key_presence(extra: &str, expect: bool) {
        use pretty_assertions::assert_eq;
        let yaml = format!(
            "experiment: {{ title: Report, name: report }}\n\
             author: {{ firstName: Ada, lastName: Lovelace }}\n{extra}\n"
        );
        let result: ExperimentDescriptor = yaml.parse().unwrap();
        assert_eq!(result.is_finished(), expect);
    }

    #[test]
    fn missing_required_metadata_is_reported() -> anyhow::Result<()> {
        let result: ExperimentDescriptor = indoc! {r#"
            experiment: { title: t, name: n }
            author: { firstName: a, lastName: b }
            meta-data:
              - oa.type: { name: gold }
              - subject: { id: physics }
        "#}
        .parse()?;

        assert_eq!(
            result.catalog().missing_required(),
            vec!["institution", "data.type", "department"]
        );

        Ok(())
    }

    #[sealed_test]
    fn find_single_descriptor() -> anyhow::Result<()> {
        create_dir_all("upload/plots")?;
        write("upload/colorlearning.html", "<html/>")?;
        write("upload/plots/experiment.yml", DESCRIPTOR)?;

        let descriptor = Descriptor::find("upload")?;
        assert_eq!(descriptor.path(), Path::new("upload/plots/experiment.yml"));
        assert!(descriptor.changed_at().is_some());

        Ok(())
    }

    #[sealed_test]
    fn find_rejects_missing_or_ambiguous_descriptor() -> anyhow::Result<()> {
        create_dir_all("upload")?;
        assert!(matches!(
            Descriptor::find("upload"),
            Err(DescriptorError::NotFound(_))
        ));

        write("upload/a.yml", DESCRIPTOR)?;
        write("upload/b.yml", DESCRIPTOR)?;
        assert!(matches!(
            Descriptor::find("upload"),
            Err(DescriptorError::Ambiguous(_))
        ));

        Ok(())
    }

    #[sealed_test]
    fn record_epid_appends_once() -> anyhow::Result<()> {
        write("experiment.yml", DESCRIPTOR)?;
        let mut descriptor = Descriptor::load("experiment.yml")?;

        descriptor.record_epid(4711)?;
        descriptor.record_epid(4712)?;

        let content = read_to_string("experiment.yml")?;
        assert_eq!(content, format!("{DESCRIPTOR}\nepid: 4711\n"));
        assert_eq!(descriptor.document().epid, Some(4711));
        assert_eq!(Descriptor::load("experiment.yml")?.document().epid, Some(4711));

        Ok(())
    }
}
