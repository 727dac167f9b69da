//! Migration descriptor loading with builder pattern and fallback chains.
//!
//! Provides [`DescriptorSet`] for an ordered collection of migration
//! descriptors and [`DescriptorBuilder`] for loading one from several
//! sources with automatic fallback.
//!
//! # Loading patterns
//!
//! ```no_run
//! use schema_adapter_db::DescriptorSet;
//!
//! // Load from a directory of JSON or YAML descriptor files
//! let set = DescriptorSet::from_dir("config/migrations/").unwrap();
//! assert!(set.latest("Table1").is_some());
//!
//! // Load from a single JSON array of descriptors
//! let set = DescriptorSet::from_bundle("migrations.json").unwrap();
//!
//! // Use the builder for a fallback chain
//! let set = DescriptorSet::builder()
//!     .from_dir("config/migrations/")
//!     .from_bundle("migrations.json")
//!     .build()
//!     .unwrap();
//! ```
//!
//! Descriptors are validated on load and kept sorted by target table, then
//! by ascending [`Version`](schema_adapter_core::Version), which is the order
//! they must be applied in.

use std::collections::HashSet;
use std::io::BufReader;
use std::path::{Path, PathBuf};

use schema_adapter_core::{MigrationDescriptor, validate_descriptor};
use tracing::debug;

use crate::error::{DatabaseError, Result};

/// Describes where a [`DescriptorSet`] was loaded from.
#[derive(Debug, Clone)]
pub enum DescriptorSource {
    /// Loaded from a directory of individual descriptor files.
    Directory(PathBuf),
    /// Loaded from a single JSON array of descriptors.
    Bundle(PathBuf),
    /// Assembled in code.
    Inline,
    /// Loaded via a fallback chain of multiple sources.
    Multiple(Vec<DescriptorSource>),
}

/// Ordered, validated collection of migration descriptors.
///
/// # Examples
///
/// ```
/// use schema_adapter_core::{ColumnDescriptor, MigrationDescriptor, SemanticType};
/// use schema_adapter_db::DescriptorSet;
///
/// let set = DescriptorSet::from_descriptors(vec![
///     MigrationDescriptor::new("Table1", "1.1")
///         .add_column(ColumnDescriptor::new("code", SemanticType::Text)),
///     MigrationDescriptor::new("Table1", "1.0")
///         .add_column(ColumnDescriptor::counter("id")),
/// ])
/// .unwrap();
///
/// let versions: Vec<&str> = set.iter().map(|d| d.version.as_str()).collect();
/// assert_eq!(versions, ["1.0", "1.1"]);
/// assert_eq!(set.latest("Table1").unwrap().version.as_str(), "1.1");
/// ```
#[derive(Debug)]
pub struct DescriptorSet {
    descriptors: Vec<MigrationDescriptor>,
    source: DescriptorSource,
}

impl DescriptorSet {
    /// Returns a new [`DescriptorBuilder`] for configuring a fallback chain.
    pub fn builder() -> DescriptorBuilder {
        DescriptorBuilder::new()
    }

    /// Builds a set from descriptors assembled in code.
    ///
    /// # Errors
    ///
    /// Returns [`DatabaseError::InvalidDescriptor`] if any descriptor fails
    /// validation or two descriptors share a table and version.
    pub fn from_descriptors(descriptors: Vec<MigrationDescriptor>) -> Result<Self> {
        Self::assemble(descriptors, DescriptorSource::Inline)
    }

    /// Loads descriptors from a directory of `*.json`, `*.yml` and `*.yaml`
    /// files, one descriptor per file. Other files are ignored.
    ///
    /// # Errors
    ///
    /// Returns [`DatabaseError::IoError`] if the directory cannot be read,
    /// [`DatabaseError::JsonError`] or [`DatabaseError::YamlError`] if a file
    /// does not parse, or [`DatabaseError::InvalidDescriptor`] if validation
    /// fails.
    pub fn from_dir(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let mut descriptors = Vec::new();

        for entry in std::fs::read_dir(path)? {
            let file_path = entry?.path();
            let extension = file_path.extension().and_then(|e| e.to_str());
            let descriptor: MigrationDescriptor = match extension {
                Some("json") => {
                    let reader = BufReader::new(std::fs::File::open(&file_path)?);
                    serde_json::from_reader(reader)?
                }
                Some("yml") | Some("yaml") => {
                    let reader = BufReader::new(std::fs::File::open(&file_path)?);
                    serde_yaml::from_reader(reader)?
                }
                _ => continue,
            };
            debug!(file = %file_path.display(), table = %descriptor.applies_to, "loaded descriptor");
            descriptors.push(descriptor);
        }

        Self::assemble(descriptors, DescriptorSource::Directory(path.to_path_buf()))
    }

    /// Loads descriptors from a single JSON file holding an array.
    ///
    /// # Errors
    ///
    /// Returns [`DatabaseError::IoError`] if the file cannot be read,
    /// [`DatabaseError::JsonError`] if parsing fails, or
    /// [`DatabaseError::InvalidDescriptor`] if validation fails.
    pub fn from_bundle(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let reader = BufReader::new(std::fs::File::open(path)?);
        let descriptors: Vec<MigrationDescriptor> = serde_json::from_reader(reader)?;
        Self::assemble(descriptors, DescriptorSource::Bundle(path.to_path_buf()))
    }

    fn assemble(mut descriptors: Vec<MigrationDescriptor>, source: DescriptorSource) -> Result<Self> {
        let mut seen = HashSet::new();
        for descriptor in &descriptors {
            let name = format!("{}@{}", descriptor.applies_to, descriptor.version);
            let errors = validate_descriptor(descriptor);
            if !errors.is_empty() {
                let reason = errors
                    .iter()
                    .map(|e| e.to_string())
                    .collect::<Vec<_>>()
                    .join("; ");
                return Err(DatabaseError::InvalidDescriptor { name, reason });
            }
            if !seen.insert(name.clone()) {
                return Err(DatabaseError::InvalidDescriptor {
                    name,
                    reason: "declared more than once".to_string(),
                });
            }
        }

        descriptors.sort_by(|a, b| {
            a.applies_to
                .cmp(&b.applies_to)
                .then_with(|| a.version.cmp(&b.version))
        });

        Ok(Self { descriptors, source })
    }

    /// Returns the highest-version descriptor targeting `table`.
    pub fn latest(&self, table: &str) -> Option<&MigrationDescriptor> {
        self.for_table(table).last()
    }

    /// Returns every descriptor targeting `table`, oldest first.
    ///
    /// The iterator borrows only the set, not `table`.
    pub fn for_table<'a>(
        &'a self,
        table: &str,
    ) -> impl Iterator<Item = &'a MigrationDescriptor> + use<'a> {
        let table = table.to_owned();
        self.descriptors.iter().filter(move |d| d.applies_to == table)
    }

    /// Returns the distinct target tables in application order.
    pub fn tables(&self) -> Vec<&str> {
        let mut tables: Vec<&str> = self.descriptors.iter().map(|d| d.applies_to.as_str()).collect();
        tables.dedup();
        tables
    }

    /// Iterates over all descriptors in application order.
    pub fn iter(&self) -> impl Iterator<Item = &MigrationDescriptor> {
        self.descriptors.iter()
    }

    pub fn len(&self) -> usize {
        self.descriptors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.descriptors.is_empty()
    }

    /// Returns a reference to the source metadata.
    pub fn source(&self) -> &DescriptorSource {
        &self.source
    }

    /// Consumes the set, returning descriptors in application order.
    pub fn into_vec(self) -> Vec<MigrationDescriptor> {
        self.descriptors
    }
}

impl<'a> IntoIterator for &'a DescriptorSet {
    type Item = &'a MigrationDescriptor;
    type IntoIter = std::slice::Iter<'a, MigrationDescriptor>;

    fn into_iter(self) -> Self::IntoIter {
        self.descriptors.iter()
    }
}

/// Builder for constructing a [`DescriptorSet`] with a fallback chain.
///
/// Sources are tried in the order they are added. The first successful load
/// wins; if all fail, [`DatabaseError::NoSourcesAvailable`] is returned.
///
/// # Example
///
/// ```no_run
/// use schema_adapter_db::DescriptorSet;
///
/// let set = DescriptorSet::builder()
///     .from_dir("/etc/app/migrations/")
///     .from_bundle("/usr/share/app/migrations.json")
///     .build()
///     .unwrap();
/// ```
pub struct DescriptorBuilder {
    sources: Vec<DescriptorSource>,
}

impl DescriptorBuilder {
    /// Creates a new builder with no sources.
    pub fn new() -> Self {
        Self {
            sources: Vec::new(),
        }
    }

    /// Adds a directory of descriptor files as a source.
    pub fn from_dir(mut self, path: impl Into<PathBuf>) -> Self {
        self.sources.push(DescriptorSource::Directory(path.into()));
        self
    }

    /// Adds a JSON bundle file as a source.
    pub fn from_bundle(mut self, path: impl Into<PathBuf>) -> Self {
        self.sources.push(DescriptorSource::Bundle(path.into()));
        self
    }

    /// Adds a path as a directory or bundle source depending on what it is.
    pub fn from_path(self, path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        if path.is_dir() {
            self.from_dir(path)
        } else {
            self.from_bundle(path)
        }
    }

    /// Attempts to load descriptors from configured sources in order.
    ///
    /// Returns the first successfully loaded set. A source that loads but
    /// fails validation is skipped like one that cannot be read.
    pub fn build(self) -> Result<DescriptorSet> {
        if self.sources.is_empty() {
            return Err(DatabaseError::NoSourcesAvailable);
        }

        let all_sources = self.sources.clone();

        for source in &self.sources {
            let result = match source {
                DescriptorSource::Directory(path) => DescriptorSet::from_dir(path),
                DescriptorSource::Bundle(path) => DescriptorSet::from_bundle(path),
                DescriptorSource::Inline | DescriptorSource::Multiple(_) => continue,
            };

            match result {
                Ok(mut set) => {
                    set.source = DescriptorSource::Multiple(all_sources);
                    return Ok(set);
                }
                Err(err) => debug!(?source, %err, "descriptor source unavailable"),
            }
        }

        Err(DatabaseError::NoSourcesAvailable)
    }
}

impl Default for DescriptorBuilder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use schema_adapter_core::{ColumnDescriptor, IndexDescriptor, SemanticType};
    use std::io::Write;

    fn table1(version: &str) -> MigrationDescriptor {
        MigrationDescriptor::new("Table1", version)
            .add_column(ColumnDescriptor::counter("id"))
            .add_column(ColumnDescriptor::new("name", SemanticType::Text).not_null())
    }

    fn write_json(dir: &Path, file: &str, descriptor: &MigrationDescriptor) {
        let mut f = std::fs::File::create(dir.join(file)).unwrap();
        serde_json::to_writer_pretty(&mut f, descriptor).unwrap();
        f.flush().unwrap();
    }

    #[test]
    fn test_from_dir_mixed_formats() {
        let dir = tempfile::tempdir().unwrap();
        write_json(dir.path(), "table1-1.0.json", &table1("1.0"));
        std::fs::write(
            dir.path().join("table2.yml"),
            "appliesTo: Table2\nversion: \"2.0\"\nadd:\n  - name: id\n    type: Counter\n",
        )
        .unwrap();
        std::fs::write(dir.path().join("README.md"), "ignored").unwrap();

        let set = DescriptorSet::from_dir(dir.path()).unwrap();
        assert_eq!(set.len(), 2);
        assert_eq!(set.tables(), vec!["Table1", "Table2"]);
        assert!(matches!(set.source(), DescriptorSource::Directory(_)));
    }

    #[test]
    fn test_versions_sorted_numerically() {
        let set = DescriptorSet::from_descriptors(vec![
            table1("1.10"),
            table1("1.2"),
            table1("1.0"),
        ])
        .unwrap();
        let versions: Vec<&str> = set.iter().map(|d| d.version.as_str()).collect();
        assert_eq!(versions, vec!["1.0", "1.2", "1.10"]);
        assert_eq!(set.latest("Table1").unwrap().version.as_str(), "1.10");
    }

    #[test]
    fn test_lookups_outlive_table_name() {
        let set = DescriptorSet::from_descriptors(vec![table1("1.0"), table1("1.1")]).unwrap();
        let latest = set.latest(&String::from("Table1"));
        let history: Vec<&MigrationDescriptor> = {
            let name = format!("Table{}", 1);
            set.for_table(&name).collect()
        };
        assert_eq!(latest.unwrap().version.as_str(), "1.1");
        assert_eq!(history.len(), 2);
    }

    #[test]
    fn test_from_bundle() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bundle.json");
        let bundle = vec![table1("1.0"), table1("1.1")];
        std::fs::write(&path, serde_json::to_string(&bundle).unwrap()).unwrap();

        let set = DescriptorSet::from_bundle(&path).unwrap();
        assert_eq!(set.len(), 2);
        assert_eq!(set.for_table("Table1").count(), 2);
        assert_eq!(set.for_table("Other").count(), 0);
    }

    #[test]
    fn test_invalid_descriptor_rejected() {
        let bad = table1("1.0").with_index(IndexDescriptor::new("IX_BAD", ["missing"]));
        let err = DescriptorSet::from_descriptors(vec![bad]).unwrap_err();
        assert!(matches!(err, DatabaseError::InvalidDescriptor { ref name, .. } if name == "Table1@1.0"));
    }

    #[test]
    fn test_duplicate_version_rejected() {
        let err = DescriptorSet::from_descriptors(vec![table1("1.0"), table1("1.0")]).unwrap_err();
        assert!(matches!(err, DatabaseError::InvalidDescriptor { .. }));
    }

    #[test]
    fn test_builder_fallback_first_fails() {
        let dir = tempfile::tempdir().unwrap();
        let bundle_path = dir.path().join("bundle.json");
        std::fs::write(&bundle_path, serde_json::to_string(&vec![table1("1.0")]).unwrap()).unwrap();

        let set = DescriptorSet::builder()
            .from_dir("/nonexistent/dir/")
            .from_bundle(&bundle_path)
            .build()
            .unwrap();
        assert_eq!(set.len(), 1);
        assert!(matches!(set.source(), DescriptorSource::Multiple(s) if s.len() == 2));
    }

    #[test]
    fn test_builder_from_path_detects_directory() {
        let dir = tempfile::tempdir().unwrap();
        write_json(dir.path(), "t.json", &table1("1.0"));
        let set = DescriptorSet::builder().from_path(dir.path()).build().unwrap();
        assert_eq!(set.len(), 1);
    }

    #[test]
    fn test_builder_all_fail() {
        let result = DescriptorSet::builder()
            .from_dir("/nonexistent/dir1/")
            .from_bundle("/nonexistent/bundle1.json")
            .build();
        assert!(matches!(result, Err(DatabaseError::NoSourcesAvailable)));
    }

    #[test]
    fn test_builder_empty() {
        assert!(matches!(
            DescriptorBuilder::default().build(),
            Err(DatabaseError::NoSourcesAvailable)
        ));
    }
}
