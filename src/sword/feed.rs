// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Atom feed model.
//!
//! The server answers content listings with Atom feeds. An entry listing
//! enumerates the documents of an entry, and a document listing enumerates
//! the files of that document:
//!
//! ```xml
//! <feed xmlns="http://www.w3.org/2005/Atom">
//!   <updated>2024-05-01T10:00:00Z</updated>
//!   <entry>
//!     <id>https://repo.example.org/id/document/42</id>
//!     <title>report.html</title>
//!     <content type="text/html" src="https://repo.example.org/id/document/42/contents"/>
//!   </entry>
//! </feed>
//! ```
//!
//! Only the handful of elements epsword cares about are modeled, everything
//! else is skipped.

use serde::Deserialize;

/// Atom feed returned by a contents listing.
#[derive(Debug, Default, Clone, PartialEq, Eq, Deserialize)]
pub struct Feed {
    /// Last time anything in the feed changed.
    #[serde(default)]
    pub updated: Option<String>,

    /// Listed records.
    #[serde(rename = "entry", default)]
    pub entries: Vec<Entry>,
}

impl Feed {
    /// Parse feed from raw XML.
    ///
    /// # Errors
    ///
    /// - Return [`quick_xml::DeError`] if XML is malformed.
    pub fn parse(xml: &str) -> Result<Self, quick_xml::DeError> {
        quick_xml::de::from_str(xml)
    }

    /// Most recent modification time reported by the feed.
    ///
    /// Falls back to the newest entry timestamp when the feed itself carries
    /// none. Timestamps are compared as strings, which holds for RFC 3339
    /// values in a single zone.
    pub fn last_modified(&self) -> Option<&str> {
        self.updated.as_deref().or_else(|| {
            self.entries
                .iter()
                .filter_map(|entry| entry.updated.as_deref())
                .max()
        })
    }

    /// Identifiers of listed documents.
    pub fn document_ids(&self) -> Vec<u64> {
        self.entries.iter().filter_map(Entry::document_id).collect()
    }

    /// Listed files as `(file id, title)` pairs.
    pub fn files(&self) -> Vec<(u64, &str)> {
        self.entries
            .iter()
            .filter_map(|entry| Some((entry.file_id()?, entry.title())))
            .collect()
    }
}

/// Single record of a feed.
#[derive(Debug, Default, Clone, PartialEq, Eq, Deserialize)]
pub struct Entry {
    /// Record URI.
    #[serde(default)]
    pub id: String,

    /// Human readable title, the original filename for files.
    #[serde(default)]
    pub title: Option<Text>,

    /// Last modification time of the record.
    #[serde(default)]
    pub updated: Option<String>,

    /// Pointer to the record's content.
    #[serde(default)]
    pub content: Option<Content>,
}

impl Entry {
    /// Title of record, empty if it has none.
    pub fn title(&self) -> &str {
        self.title
            .as_ref()
            .map(|title| title.value.trim())
            .unwrap_or_default()
    }

    /// Document identifier, if record is a listed HTML document.
    pub fn document_id(&self) -> Option<u64> {
        let content = self.content.as_ref()?;
        let is_html = content.kind.as_deref() == Some("text/html");
        let is_document = content
            .src
            .as_deref()
            .is_some_and(|src| src.contains("/document/"));

        if is_html && is_document {
            trailing_id(&self.id)
        } else {
            None
        }
    }

    /// File identifier, if record is a listed file.
    pub fn file_id(&self) -> Option<u64> {
        if self.id.contains("/file/") {
            trailing_id(&self.id)
        } else {
            None
        }
    }
}

/// Element text that may carry attributes.
#[derive(Debug, Default, Clone, PartialEq, Eq, Deserialize)]
pub struct Text {
    #[serde(rename = "$text", default)]
    pub value: String,
}

/// Content pointer of an entry.
#[derive(Debug, Default, Clone, PartialEq, Eq, Deserialize)]
pub struct Content {
    #[serde(rename = "@type", default)]
    pub kind: Option<String>,

    #[serde(rename = "@src", default)]
    pub src: Option<String>,
}

/// Extract trailing run of digits from a URI or header value.
///
/// Every identifier the server hands out, be it in a `Location` header or an
/// Atom record id, ends in its numeric id, e.g., `.../id/eprint/4711`.
/// Trailing slashes are ignored.
pub fn trailing_id(value: &str) -> Option<u64> {
    let value = value.trim().trim_end_matches('/');
    let start = value
        .char_indices()
        .rev()
        .take_while(|(_, ch)| ch.is_ascii_digit())
        .last()
        .map(|(idx, _)| idx)?;

    value[start..].parse().ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use indoc::indoc;
    use pretty_assertions::assert_eq;
    use simple_test_case::test_case;

    #[test_case("https://repo.example.org/id/eprint/4711", Some(4711); "location header")]
    #[test_case("https://repo.example.org/id/file/12/", Some(12); "trailing slash")]
    #[test_case("https://repo.example.org/id/document/9/contents", None; "no trailing digits")]
    #[test_case("", None; "empty")]
    #[test]
    fn trailing_id_extraction(value: &str, expect: Option<u64>) {
        use pretty_assertions::assert_eq;
        assert_eq!(trailing_id(value), expect);
    }

    #[test]
    fn parse_entry_listing() -> anyhow::Result<()> {
        let xml = indoc! {r#"
            <?xml version="1.0" encoding="utf-8"?>
            <feed xmlns="http://www.w3.org/2005/Atom" xmlns:sword="http://purl.org/net/sword/">
              <title>Contents of eprint 7</title>
              <id>https://repo.example.org/id/eprint/7/contents</id>
              <updated>2024-05-01T10:00:00Z</updated>
              <entry>
                <id>https://repo.example.org/id/document/42</id>
                <title type="text">report.html</title>
                <link rel="edit" href="https://repo.example.org/id/document/42"/>
                <content type="text/html" src="https://repo.example.org/id/document/42/contents"/>
                <link rel="edit-media" href="https://repo.example.org/id/document/42/contents"/>
              </entry>
              <entry>
                <id>https://repo.example.org/id/document/43</id>
                <title>raw.zip</title>
                <content type="application/zip" src="https://repo.example.org/id/document/43/contents"/>
              </entry>
            </feed>
        "#};

        let feed = Feed::parse(xml)?;
        assert_eq!(feed.last_modified(), Some("2024-05-01T10:00:00Z"));
        assert_eq!(feed.entries.len(), 2);
        assert_eq!(feed.entries[0].title(), "report.html");
        assert_eq!(feed.document_ids(), vec![42]);

        Ok(())
    }

    #[test]
    fn parse_document_listing() -> anyhow::Result<()> {
        let xml = indoc! {r#"
            <feed xmlns="http://www.w3.org/2005/Atom">
              <entry>
                <id>https://repo.example.org/id/file/100</id>
                <title>exp1.html</title>
                <updated>2024-05-01T09:00:00Z</updated>
              </entry>
              <entry>
                <id>https://repo.example.org/id/file/101</id>
                <title>notes.xml</title>
                <updated>2024-05-02T09:00:00Z</updated>
              </entry>
            </feed>
        "#};

        let feed = Feed::parse(xml)?;
        assert_eq!(feed.last_modified(), Some("2024-05-02T09:00:00Z"));
        assert_eq!(feed.files(), vec![(100, "exp1.html"), (101, "notes.xml")]);
        assert!(feed.document_ids().is_empty());

        Ok(())
    }

    #[test]
    fn parse_empty_feed() -> anyhow::Result<()> {
        let feed = Feed::parse(r#"<feed xmlns="http://www.w3.org/2005/Atom"></feed>"#)?;
        assert_eq!(feed, Feed::default());
        assert_eq!(feed.last_modified(), None);

        Ok(())
    }
}
