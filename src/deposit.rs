// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Deposit metadata documents.
//!
//! A new catalog entry is created by posting an EPrints XML document that
//! carries the experiment's metadata. The document follows a fixed layout in
//! the `http://eprints.org/ep2/data/2.0` namespace, filled in from the
//! experiment descriptor.
//!
//! # Derived Fields
//!
//! Some fields are not copied verbatim from the descriptor:
//!
//! - `type` becomes `dataset_in_progress` for an ongoing dataset.
//! - `acknowledged_funders` collapses to `no`, `no_funders`, or `yes`.
//! - `nofunding` is `FALSE` only if funding was literally received.
//! - `created_here` is `yes` only for the home institution.
//!
//! Optional fields like `ispublished` and `refereed` are left out entirely
//! when the descriptor does not mention them.

use crate::{
    config::DEFAULT_HOME_INSTITUTION,
    descriptor::{CatalogMetadata, ExperimentDescriptor},
};

use jiff::{civil::Date, Zoned};
use quick_xml::escape::escape;
use std::{
    fs::{remove_file, write},
    path::{Path, PathBuf},
};
use tracing::{debug, warn};

/// Namespace of EPrints data documents.
pub const EPRINTS_NAMESPACE: &str = "http://eprints.org/ep2/data/2.0";

/// Name of deposit document written to the working directory.
pub const DEPOSIT_FILE_NAME: &str = "ep_metadata.xml";

/// Renders deposit documents.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DepositTemplate {
    /// Depositing user, recorded as creator id.
    pub username: Option<String>,

    /// Institution id that counts as "created here".
    pub home_institution: String,

    /// Publication date.
    pub date: Date,
}

impl Default for DepositTemplate {
    fn default() -> Self {
        Self {
            username: None,
            home_institution: DEFAULT_HOME_INSTITUTION.into(),
            date: Zoned::now().date(),
        }
    }
}

impl DepositTemplate {
    /// Render deposit document for experiment.
    ///
    /// # Errors
    ///
    /// - Return [`MetadataIncomplete`] if any required metadata key is
    ///   missing from the descriptor.
    pub fn render(&self, descriptor: &ExperimentDescriptor) -> Result<String, MetadataIncomplete> {
        let catalog = descriptor.catalog();
        let missing = catalog.missing_required();
        if !missing.is_empty() {
            return Err(MetadataIncomplete { missing });
        }

        let fields = DerivedFields::new(&catalog, &self.home_institution);
        let experiment = &descriptor.experiment;
        let author = &descriptor.author;

        let mut xml = String::new();
        let mut line = |depth: usize, text: String| {
            xml.push_str(&format!("{:indent$}{text}\n", "", indent = depth * 2));
        };

        line(0, "<?xml version='1.0' encoding='utf-8'?>".into());
        line(0, format!("<eprints xmlns='{EPRINTS_NAMESPACE}'>"));
        line(1, "<eprint>".into());
        line(2, element("eprint_status", "archive"));
        line(2, element("title", &experiment.title));
        line(2, element("abstract", &experiment.description));
        line(2, element("note", catalog.license.as_deref().unwrap_or_default()));
        line(2, "<creators>".into());
        line(3, "<item>".into());
        line(4, "<name>".into());
        line(5, element("given", &author.first_name));
        line(5, element("family", &author.last_name));
        line(4, "</name>".into());
        if let Some(orcid) = &author.id {
            line(4, element("orcid", orcid));
        }
        if let Some(username) = &self.username {
            line(4, element("id", username));
        }
        line(3, "</item>".into());
        line(2, "</creators>".into());
        line(2, element("type", &fields.kind));
        line(2, element("oa_type", &fields.oa_type));
        line(2, element("created_here", fields.created_here));
        line(2, format!("<subjects>{}</subjects>", element("item", &fields.subject)));
        line(
            2,
            format!("<institutions>{}</institutions>", element("item", &fields.department)),
        );
        line(2, element("date", &self.date.to_string()));
        line(2, element("date_type", "published"));
        if let Some(ispublished) = &catalog.ispublished {
            line(2, element("ispublished", ispublished));
        }
        if let Some(refereed) = &catalog.refereed {
            line(2, element("refereed", refereed));
        }
        line(2, element("nofunding", fields.no_funding));
        line(2, element("acknowledged_funders", fields.acknowledged_funders));
        line(1, "</eprint>".into());
        line(0, "</eprints>".into());

        debug!("rendered deposit document:\n{xml}");

        Ok(xml)
    }
}

fn element(name: &str, text: &str) -> String {
    format!("<{name}>{}</{name}>", escape(text))
}

/// Metadata fields after derivation rules were applied.
#[derive(Debug, Clone, PartialEq, Eq)]
struct DerivedFields {
    kind: String,
    oa_type: String,
    created_here: &'static str,
    subject: String,
    department: String,
    no_funding: &'static str,
    acknowledged_funders: &'static str,
}

impl DerivedFields {
    // INVARIANT: Caller made sure required metadata is present.
    fn new(catalog: &CatalogMetadata, home_institution: &str) -> Self {
        let data_type = catalog.data_type.clone().unwrap_or_default();
        let kind = if data_type.name == "dataset" && data_type.status.as_deref() == Some("ongoing")
        {
            "dataset_in_progress".to_string()
        } else {
            data_type.name
        };

        let created_here = if catalog.institution.as_deref() == Some(home_institution) {
            "yes"
        } else {
            "no"
        };

        let (no_funding, acknowledged_funders) = match &catalog.funding {
            Some(funding) => (
                if funding.received_funding { "FALSE" } else { "TRUE" },
                acknowledged_funders(&funding.acknowledged_funders),
            ),
            None => ("TRUE", "no_funders"),
        };

        Self {
            kind,
            oa_type: catalog.oa_type.clone().unwrap_or_default(),
            created_here,
            subject: catalog.subject.clone().unwrap_or_default(),
            department: catalog.department.clone().unwrap_or_default(),
            no_funding,
            acknowledged_funders,
        }
    }
}

fn acknowledged_funders(raw: &str) -> &'static str {
    match raw {
        "no" | "False" | "false" => "no",
        "no_funders" => "no_funders",
        _ => "yes",
    }
}

/// Deposit document written to disk for the duration of a run.
///
/// The file is removed again when the guard is dropped, on every exit path.
#[derive(Debug)]
pub struct DepositFile {
    path: PathBuf,
}

impl DepositFile {
    /// Write deposit document into target directory.
    ///
    /// # Errors
    ///
    /// - Return [`std::io::Error`] if document cannot be written.
    pub fn create(dir: impl AsRef<Path>, xml: &str) -> std::io::Result<Self> {
        let path = dir.as_ref().join(DEPOSIT_FILE_NAME);
        write(&path, xml)?;
        debug!("wrote deposit document to {:?}", path.display());

        Ok(Self { path })
    }

    /// Path of deposit document.
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for DepositFile {
    fn drop(&mut self) {
        if let Err(error) = remove_file(&self.path) {
            warn!("cannot remove {:?}: {error}", self.path.display());
        }
    }
}

/// Required metadata keys are absent from descriptor.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
#[error("missing required metadata fields: {}", .missing.join(", "))]
pub struct MetadataIncomplete {
    pub missing: Vec<&'static str>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use indoc::{formatdoc, indoc};
    use jiff::civil::date;
    use pretty_assertions::assert_eq;
    use sealed_test::prelude::*;
    use simple_test_case::test_case;

    fn template() -> DepositTemplate {
        DepositTemplate {
            username: Some("abc12345".into()),
            home_institution: DEFAULT_HOME_INSTITUTION.into(),
            date: date(2024, 5, 1),
        }
    }

    fn descriptor(data_type: &str, extra: &str) -> ExperimentDescriptor {
        formatdoc!(
            r#"
                experiment:
                  title: Colors & Shapes
                  name: colorlearning
                  description: Learning <colors>.
                author:
                  firstName: Ada
                  lastName: Lovelace
                  id: 0000-0002-1825-0097
                meta-data:
                  - oa.type: {{ name: gold }}
                  - institution: {{ id: 01eezs655 }}
                  - data.type: {data_type}
                  - subject: {{ id: psychology }}
                  - department: {{ id: fak_psy }}
                  - licenses: {{ name: CC-BY 4.0 }}
                {extra}
            "#,
            data_type = data_type,
            extra = extra,
        )
        .parse()
        .unwrap()
    }

    #[test]
    fn render_full_document() -> anyhow::Result<()> {
        let descriptor = descriptor(
            "{ name: dataset, status: ongoing }",
            "  - funding: { acknowledged.funders: yes please, received.funding: true }\n  - refereed: true",
        );

        let result = template().render(&descriptor)?;
        let expect = indoc! {r#"
            <?xml version='1.0' encoding='utf-8'?>
            <eprints xmlns='http://eprints.org/ep2/data/2.0'>
              <eprint>
                <eprint_status>archive</eprint_status>
                <title>Colors &amp; Shapes</title>
                <abstract>Learning &lt;colors&gt;.</abstract>
                <note>CC-BY 4.0</note>
                <creators>
                  <item>
                    <name>
                      <given>Ada</given>
                      <family>Lovelace</family>
                    </name>
                    <orcid>0000-0002-1825-0097</orcid>
                    <id>abc12345</id>
                  </item>
                </creators>
                <type>dataset_in_progress</type>
                <oa_type>gold</oa_type>
                <created_here>yes</created_here>
                <subjects><item>psychology</item></subjects>
                <institutions><item>fak_psy</item></institutions>
                <date>2024-05-01</date>
                <date_type>published</date_type>
                <refereed>true</refereed>
                <nofunding>FALSE</nofunding>
                <acknowledged_funders>yes</acknowledged_funders>
              </eprint>
            </eprints>
        "#};
        assert_eq!(result, expect);

        Ok(())
    }

    #[test_case("{ name: dataset, status: ongoing }", "dataset_in_progress"; "ongoing dataset")]
    #[test_case("{ name: dataset, status: finished }", "dataset"; "finished dataset")]
    #[test_case("{ name: dataset }", "dataset"; "dataset without status")]
    #[test_case("{ name: article, status: ongoing }", "article"; "ongoing article")]
    #[test]
    fn derive_type(data_type: &str, expect: &str) -> anyhow::Result<()> {
        use pretty_assertions::assert_eq;
        let result = template().render(&descriptor(data_type, ""))?;

        assert_eq!(result.matches("<title>").count(), 1);
        assert_eq!(result.matches("<creators>\n      <item>").count(), 1);
        assert!(result.contains(&format!("<type>{expect}</type>")));

        Ok(())
    }

    #[test_case("no", "no"; "literal no")]
    #[test_case("False", "no"; "python false")]
    #[test_case("false", "no"; "yaml false")]
    #[test_case("no_funders", "no_funders"; "no funders")]
    #[test_case("DFG", "yes"; "named funder")]
    #[test]
    fn collapse_acknowledged_funders(raw: &str, expect: &str) {
        use pretty_assertions::assert_eq;
        assert_eq!(acknowledged_funders(raw), expect);
    }

    #[test]
    fn funding_defaults_and_optional_fields() -> anyhow::Result<()> {
        let result = template().render(&descriptor("{ name: article }", ""))?;

        assert!(result.contains("<nofunding>TRUE</nofunding>"));
        assert!(result.contains("<acknowledged_funders>no_funders</acknowledged_funders>"));
        assert!(!result.contains("ispublished"));
        assert!(!result.contains("refereed"));

        Ok(())
    }

    #[test]
    fn foreign_institution_is_not_created_here() -> anyhow::Result<()> {
        let mut template = template();
        template.home_institution = "04xyz0000".into();
        template.username = None;

        let result = template.render(&descriptor("{ name: article }", ""))?;
        assert!(result.contains("<created_here>no</created_here>"));
        assert!(!result.contains("<id>"));

        Ok(())
    }

    #[test_case("oa.type"; "no oa type")]
    #[test_case("institution"; "no institution")]
    #[test_case("data.type"; "no data type")]
    #[test_case("subject"; "no subject")]
    #[test_case("department"; "no department")]
    #[test]
    fn missing_required_key_fails(key: &str) {
        use pretty_assertions::assert_eq;
        let mut descriptor = descriptor("{ name: article }", "");
        descriptor
            .metadata
            .retain(|entry| !entry.contains_key(key));

        let result = template().render(&descriptor);
        assert_eq!(result, Err(MetadataIncomplete { missing: vec![key_static(key)] }));
    }

    fn key_static(key: &str) -> &'static str {
        crate::descriptor::REQUIRED_METADATA
            .into_iter()
            .find(|required| *required == key)
            .unwrap()
    }

    #[sealed_test]
    fn deposit_file_removed_on_drop() -> anyhow::Result<()> {
        let file = DepositFile::create(".", "<eprints/>")?;
        let path = file.path().to_path_buf();
        assert!(path.is_file());

        drop(file);
        assert!(!path.exists());

        Ok(())
    }
}
