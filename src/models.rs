use crate::constants::*;
use serde::Deserialize;
use std::path::Path;
use std::sync::Arc;

/// Kind of node a flattened row was produced from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeKind {
    Tag,
    Attribute,
}

impl NodeKind {
    /// Single-letter code written to the `type` output column.
    pub fn code(&self) -> &'static str {
        match self {
            Self::Tag => KIND_TAG,
            Self::Attribute => KIND_ATTRIBUTE,
        }
    }
}

/// One tag or attribute of a document, flattened into a relational row.
///
/// `id` is dense and ordered within a document. Every row whose id lies in
/// `first_sub_id..id` belongs to the subtree of this row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FlattenedRow {
    /// Local name of the node whose inclusion switched this subtree on
    pub include_parent: Option<String>,
    /// Number of include transitions seen so far in the document
    pub include_count: u32,
    /// `/`-delimited local names from the root down to this node
    pub full_path: String,
    pub uri: String,
    pub local_name: String,
    pub qualified_name: String,
    pub kind: NodeKind,
    /// Raw text of the tag or the attribute value
    pub value: String,
    pub id: u64,
    pub first_sub_id: u64,
}

impl FlattenedRow {
    /// Returns true if `self` lies inside the subtree rooted at `ancestor`.
    pub fn is_descendant_of(&self, ancestor: &FlattenedRow) -> bool {
        ancestor.first_sub_id <= self.id && self.id < ancestor.id
    }
}

/// Metadata of one entry of a ZIP container.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArchiveEntry {
    pub name: String,
    /// Modification time as `YYYY-MM-DD HH:MM:SS`
    pub modified: Option<String>,
    pub size: u64,
    pub compressed_size: u64,
    pub is_dir: bool,
    /// ZIP compression method number (0 stored, 8 deflated)
    pub method: u16,
    pub crc32: u32,
    pub comment: Option<String>,
}

/// A flattened row together with the document it came from.
#[derive(Debug, Clone)]
pub struct OutputRow {
    pub document: String,
    pub entry: Option<Arc<ArchiveEntry>>,
    pub row: FlattenedRow,
}

/// Payload of one content chunk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChunkContent {
    Bytes(Vec<u8>),
    Text(String),
}

impl ChunkContent {
    pub fn len(&self) -> usize {
        match self {
            Self::Bytes(b) => b.len(),
            Self::Text(t) => t.chars().count(),
        }
    }

    pub fn is_empty(&self) -> bool {
        match self {
            Self::Bytes(b) => b.is_empty(),
            Self::Text(t) => t.is_empty(),
        }
    }
}

/// One numbered piece of a larger stream, ready to be written as a row.
#[derive(Debug, Clone)]
pub struct ContentChunk {
    pub document: String,
    pub entry: Option<Arc<ArchiveEntry>>,
    pub chunk: u32,
    pub content: ChunkContent,
}

/// How an input file is wrapped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InputFormat {
    /// Decide from the file extension
    #[default]
    Auto,
    Plain,
    Zip,
    Gzip,
}

impl InputFormat {
    /// Resolves `Auto` against a file name; other variants are returned as-is.
    pub fn resolve(self, path: &Path) -> Self {
        if self != Self::Auto {
            return self;
        }
        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_lowercase())
            .unwrap_or_default();

        if ZIP_EXTENSIONS.contains(&ext.as_str()) {
            Self::Zip
        } else if GZIP_EXTENSIONS.contains(&ext.as_str()) {
            Self::Gzip
        } else {
            Self::Plain
        }
    }
}

impl From<&str> for InputFormat {
    fn from(value: &str) -> Self {
        match value.trim().to_lowercase().as_str() {
            "plain" | "xml" => Self::Plain,
            "zip" => Self::Zip,
            "gzip" | "gz" => Self::Gzip,
            // Unknown names fall back to detection by extension
            _ => Self::Auto,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::Path;

    fn row(id: u64, first_sub_id: u64) -> FlattenedRow {
        FlattenedRow {
            include_parent: None,
            include_count: 0,
            full_path: "/root/".to_string(),
            uri: String::new(),
            local_name: "root".to_string(),
            qualified_name: "root".to_string(),
            kind: NodeKind::Tag,
            value: String::new(),
            id,
            first_sub_id,
        }
    }

    #[test]
    fn test_node_kind_codes() {
        assert_eq!(NodeKind::Tag.code(), "T");
        assert_eq!(NodeKind::Attribute.code(), "A");
    }

    #[test]
    fn test_descendant_range() {
        let parent = row(7, 4);
        assert!(row(4, 4).is_descendant_of(&parent));
        assert!(row(6, 6).is_descendant_of(&parent));
        assert!(!row(7, 4).is_descendant_of(&parent));
        assert!(!row(3, 1).is_descendant_of(&parent));
    }

    #[test]
    fn test_leaf_has_no_descendants() {
        let leaf = row(2, 2);
        assert!(!row(2, 2).is_descendant_of(&leaf));
        assert!(!row(1, 1).is_descendant_of(&leaf));
    }

    #[test]
    fn test_input_format_from_str() {
        assert_eq!(InputFormat::from("zip"), InputFormat::Zip);
        assert_eq!(InputFormat::from(" GZ "), InputFormat::Gzip);
        assert_eq!(InputFormat::from("plain"), InputFormat::Plain);
        assert_eq!(InputFormat::from("whatever"), InputFormat::Auto);
    }

    #[test]
    fn test_input_format_resolve_by_extension() {
        assert_eq!(
            InputFormat::Auto.resolve(Path::new("feed.ZIP")),
            InputFormat::Zip
        );
        assert_eq!(
            InputFormat::Auto.resolve(Path::new("feed.xml.gz")),
            InputFormat::Gzip
        );
        assert_eq!(
            InputFormat::Auto.resolve(Path::new("feed.xml")),
            InputFormat::Plain
        );
        assert_eq!(
            InputFormat::Plain.resolve(Path::new("feed.zip")),
            InputFormat::Plain
        );
    }

    #[test]
    fn test_chunk_content_len_counts_chars_for_text() {
        assert_eq!(ChunkContent::Text("äöü".to_string()).len(), 3);
        assert_eq!(ChunkContent::Bytes(vec![1, 2]).len(), 2);
        assert!(ChunkContent::Bytes(vec![]).is_empty());
    }
}
