//! Declarative per-source field maps and the registry that serves them.
//!
//! One document per source lives in a mappings directory; the file stem is
//! the source id (`eastmoney_realtime.yaml`). Documents are parsed once,
//! validated against [`NamingRules`], and shared read-only as
//! `Arc<MappingTable>`.

use std::{
    collections::{BTreeMap, BTreeSet, HashMap},
    fmt, fs, iter,
    path::{Path, PathBuf},
    sync::{Arc, OnceLock, PoisonError, RwLock},
};

use log::{debug, info};
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::{
    document::{self, DocumentFormat},
    error::ConfigError,
    field_type::FieldType,
    naming::{NamingHint, NamingRules, Violation},
    units::Unit,
};

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FieldMapping {
    pub source_name: String,
    pub canonical_name: String,
    pub field_type: FieldType,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source_unit: Option<Unit>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub aliases: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

impl FieldMapping {
    pub fn new(
        source_name: impl Into<String>,
        canonical_name: impl Into<String>,
        field_type: FieldType,
    ) -> Self {
        Self {
            source_name: source_name.into(),
            canonical_name: canonical_name.into(),
            field_type,
            source_unit: None,
            aliases: Vec::new(),
            description: None,
        }
    }

    pub fn with_unit(mut self, unit: Unit) -> Self {
        self.source_unit = Some(unit);
        self
    }

    pub fn with_aliases<I, S>(mut self, aliases: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.aliases.extend(aliases.into_iter().map(Into::into));
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn raw_names(&self) -> impl Iterator<Item = &str> + '_ {
        iter::once(self.source_name.as_str()).chain(self.aliases.iter().map(String::as_str))
    }

    pub fn matches(&self, column: &str) -> bool {
        self.raw_names().any(|name| name == column)
    }

    pub fn conversion_unit(&self) -> Option<Unit> {
        self.source_unit.filter(|unit| !unit.is_base())
    }
}

impl fmt::Display for FieldMapping {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} -> {} ({})",
            self.source_name, self.canonical_name, self.field_type
        )?;
        if let Some(unit) = self.source_unit {
            write!(f, " [{}]", unit.label())?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MappingTable {
    pub source: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dataset: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_updated: Option<String>,
    pub fields: Vec<FieldMapping>,
}

impl MappingTable {
    pub fn new(source: impl Into<String>, fields: Vec<FieldMapping>) -> Self {
        Self {
            source: source.into(),
            dataset: None,
            version: None,
            last_updated: None,
            fields,
        }
    }

    pub fn with_dataset(mut self, dataset: impl Into<String>) -> Self {
        self.dataset = Some(dataset.into());
        self
    }

    pub fn canonical_names(&self) -> Vec<&str> {
        self.fields
            .iter()
            .map(|entry| entry.canonical_name.as_str())
            .collect()
    }

    pub fn entry(&self, canonical_name: &str) -> Option<&FieldMapping> {
        self.fields
            .iter()
            .find(|entry| entry.canonical_name == canonical_name)
    }

    pub fn entry_for_raw(&self, column: &str) -> Option<&FieldMapping> {
        self.fields.iter().find(|entry| entry.matches(column))
    }

    pub fn parse_file(path: &Path) -> Result<Self, ConfigError> {
        let stem = path
            .file_stem()
            .and_then(|stem| stem.to_str())
            .ok_or_else(|| ConfigError::Malformed {
                path: path.to_path_buf(),
                message: "file name is not valid UTF-8".to_string(),
            })?;
        let raw: MappingDocument = document::load_from_path(path)?;
        raw.into_table(stem, path)
    }

    pub fn from_str_as(
        format: DocumentFormat,
        source_id: &str,
        input: &str,
    ) -> Result<Self, ConfigError> {
        let origin = PathBuf::from(format!("<{source_id}>"));
        let raw: MappingDocument =
            format
                .parse(input)
                .map_err(|message| ConfigError::Malformed {
                    path: origin.clone(),
                    message,
                })?;
        raw.into_table(source_id, &origin)
    }

    pub fn load(path: &Path, rules: &NamingRules) -> Result<Self, ConfigError> {
        let table = Self::parse_file(path)?;
        table.validate(rules)?;
        info!(
            "Loaded mapping '{}' ({} field(s)) from {path:?}",
            table.source,
            table.fields.len()
        );
        Ok(table)
    }

    pub fn validate(&self, rules: &NamingRules) -> Result<(), ConfigError> {
        let violations = rules.check_table(self);
        if violations.is_empty() {
            Ok(())
        } else {
            Err(ConfigError::Naming {
                source_id: self.source.clone(),
                violations,
            })
        }
    }

    pub fn save(&self, path: &Path) -> Result<(), ConfigError> {
        document::save_to_path(path, self)
    }
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum VersionToken {
    Text(String),
    Integer(i64),
    Float(f64),
}

impl VersionToken {
    fn into_string(self) -> String {
        match self {
            VersionToken::Text(text) => text,
            VersionToken::Integer(value) => value.to_string(),
            VersionToken::Float(value) => format!("{value:?}"),
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct MappingDocument {
    #[serde(default)]
    source: Option<String>,
    #[serde(default, alias = "module")]
    dataset: Option<String>,
    #[serde(default)]
    version: Option<VersionToken>,
    #[serde(default)]
    last_updated: Option<String>,
    #[serde(alias = "mappings")]
    fields: Vec<FieldDocument>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct FieldDocument {
    #[serde(alias = "source_field")]
    source_name: String,
    #[serde(alias = "standard_field")]
    canonical_name: String,
    field_type: String,
    #[serde(default)]
    source_unit: Option<String>,
    #[serde(default)]
    target_unit: Option<String>,
    #[serde(default)]
    aliases: Vec<String>,
    #[serde(default)]
    description: Option<String>,
}

impl MappingDocument {
    fn into_table(self, source_id: &str, path: &Path) -> Result<MappingTable, ConfigError> {
        let malformed = |message: String| ConfigError::Malformed {
            path: path.to_path_buf(),
            message,
        };
        if let Some(declared) = self.source.as_deref()
            && declared != source_id
        {
            return Err(malformed(format!(
                "document declares source '{declared}' but is registered as '{source_id}'"
            )));
        }
        let mut fields = Vec::with_capacity(self.fields.len());
        for raw in self.fields {
            let field_type: FieldType = raw.field_type.parse()?;
            let source_unit = match raw.source_unit.as_deref().map(str::trim) {
                None | Some("") => None,
                Some(token) => Some(token.parse::<Unit>()?),
            };
            if let Some(token) = raw.target_unit.as_deref().map(str::trim)
                && !token.is_empty()
            {
                let target: Unit = token.parse()?;
                if !target.is_base() {
                    return Err(malformed(format!(
                        "'{}' targets unit '{target}'; values are always emitted in the base unit",
                        raw.canonical_name
                    )));
                }
            }
            fields.push(FieldMapping {
                source_name: raw.source_name,
                canonical_name: raw.canonical_name,
                field_type,
                source_unit,
                aliases: raw.aliases,
                description: raw.description.filter(|text| !text.trim().is_empty()),
            });
        }
        Ok(MappingTable {
            source: source_id.to_string(),
            dataset: self.dataset,
            version: self.version.map(VersionToken::into_string),
            last_updated: self.last_updated,
            fields,
        })
    }
}

fn source_id_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"^[A-Za-z0-9_-]+$").expect("source id pattern compiles"))
}

#[derive(Debug)]
pub struct MappingRegistry {
    root: Option<PathBuf>,
    rules: NamingRules,
    tables: RwLock<HashMap<String, Arc<MappingTable>>>,
}

impl MappingRegistry {
    pub fn from_dir(root: impl Into<PathBuf>) -> Self {
        Self {
            root: Some(root.into()),
            rules: NamingRules::default(),
            tables: RwLock::new(HashMap::new()),
        }
    }

    pub fn from_tables(tables: Vec<MappingTable>) -> Result<Self, ConfigError> {
        let rules = NamingRules::default();
        let violations = rules.check_mapping(&tables);
        if let Some(first) = violations.first() {
            return Err(ConfigError::Naming {
                source_id: first.subject().to_string(),
                violations,
            });
        }
        let tables = tables
            .into_iter()
            .map(|table| (table.source.clone(), Arc::new(table)))
            .collect();
        Ok(Self {
            root: None,
            rules,
            tables: RwLock::new(tables),
        })
    }

    pub fn with_rules(mut self, rules: NamingRules) -> Self {
        self.rules = rules;
        self
    }

    pub fn root(&self) -> Option<&Path> {
        self.root.as_deref()
    }

    pub fn rules(&self) -> &NamingRules {
        &self.rules
    }

    pub fn is_loaded(&self, source_id: &str) -> bool {
        self.tables
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .contains_key(source_id)
    }

    /// Returns the table for `source_id`, loading it on first use.
    ///
    /// Concurrent first loads may each parse the document, but only one
    /// table is published and every caller receives that same `Arc`.
    /// Whether a source is accepted does not depend on which peers were
    /// resolved before it.
    pub fn resolve(&self, source_id: &str) -> Result<Arc<MappingTable>, ConfigError> {
        if !source_id_pattern().is_match(source_id) {
            return Err(ConfigError::UnknownSource(source_id.to_string()));
        }
        if let Some(table) = self
            .tables
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(source_id)
        {
            return Ok(Arc::clone(table));
        }

        let path = self
            .document_path(source_id)
            .ok_or_else(|| ConfigError::UnknownSource(source_id.to_string()))?;
        debug!("Loading mapping for '{source_id}' from {path:?}");
        let table = MappingTable::load(&path, &self.rules)?;
        self.check_peers(&table)?;

        let mut tables = self.tables.write().unwrap_or_else(PoisonError::into_inner);
        let published = tables
            .entry(source_id.to_string())
            .or_insert_with(|| Arc::new(table));
        Ok(Arc::clone(published))
    }

    pub fn load_all(&self) -> Result<Vec<Arc<MappingTable>>, ConfigError> {
        self.sources()?
            .iter()
            .map(|source_id| self.resolve(source_id))
            .collect()
    }

    pub fn sources(&self) -> Result<Vec<String>, ConfigError> {
        let mut ids: BTreeSet<String> = self
            .tables
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .keys()
            .cloned()
            .collect();
        if let Some(root) = &self.root {
            for path in document_files(root)? {
                if let Some(stem) = path.file_stem().and_then(|stem| stem.to_str()) {
                    ids.insert(stem.to_string());
                }
            }
        }
        Ok(ids.into_iter().collect())
    }

    fn document_path(&self, source_id: &str) -> Option<PathBuf> {
        let root = self.root.as_ref()?;
        document::candidates(root, source_id)
            .into_iter()
            .find(|candidate| candidate.is_file())
    }

    /// Checks `table` against every other source of its dataset, whether
    /// loaded or only present under the root. Tables are ordered by source
    /// id, so a conflicting pair is always attributed to the later id.
    fn check_peers(&self, table: &MappingTable) -> Result<(), ConfigError> {
        let Some(dataset) = table.dataset.as_deref() else {
            return Ok(());
        };
        let is_peer = |peer: &MappingTable| {
            peer.dataset.as_deref() == Some(dataset) && peer.source != table.source
        };
        let mut peers: BTreeMap<String, Arc<MappingTable>> = self
            .tables
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .filter(|peer| is_peer(peer))
            .map(|peer| (peer.source.clone(), Arc::clone(peer)))
            .collect();
        if let Some(root) = &self.root {
            for path in document_files(root)? {
                match MappingTable::parse_file(&path) {
                    Ok(peer)
                        if is_peer(&peer)
                            && !peers.contains_key(&peer.source)
                            && peer.validate(&self.rules).is_ok() =>
                    {
                        peers.insert(peer.source.clone(), Arc::new(peer));
                    }
                    Ok(_) => {}
                    Err(err) => debug!("Skipping peer document {path:?}: {err}"),
                }
            }
        }
        if peers.is_empty() {
            return Ok(());
        }

        let mut set: Vec<&MappingTable> = peers
            .values()
            .map(Arc::as_ref)
            .chain(iter::once(table))
            .collect();
        set.sort_by(|a, b| a.source.cmp(&b.source));
        let violations: Vec<Violation> = self
            .rules
            .check_mapping(set)
            .into_iter()
            .filter(|violation| violation.subject() == table.source)
            .collect();
        if violations.is_empty() {
            Ok(())
        } else {
            Err(ConfigError::Naming {
                source_id: table.source.clone(),
                violations,
            })
        }
    }
}

pub fn document_files(root: &Path) -> Result<Vec<PathBuf>, ConfigError> {
    let entries = fs::read_dir(root).map_err(|source| ConfigError::Io {
        path: root.to_path_buf(),
        source,
    })?;
    let mut files = Vec::new();
    for entry in entries {
        let entry = entry.map_err(|source| ConfigError::Io {
            path: root.to_path_buf(),
            source,
        })?;
        let path = entry.path();
        if path.is_file() && DocumentFormat::from_path(&path).is_some() {
            files.push(path);
        }
    }
    files.sort();
    Ok(files)
}

#[derive(Debug, Default, Serialize)]
pub struct LintReport {
    pub sources: Vec<String>,
    pub load_errors: Vec<LoadFailure>,
    pub violations: Vec<Violation>,
    pub hints: Vec<NamingHint>,
}

#[derive(Debug, Serialize)]
pub struct LoadFailure {
    pub path: PathBuf,
    pub message: String,
}

impl LintReport {
    pub fn is_clean(&self) -> bool {
        self.load_errors.is_empty() && self.violations.is_empty()
    }
}

pub fn lint_directory(root: &Path, rules: &NamingRules) -> Result<LintReport, ConfigError> {
    let mut report = LintReport::default();
    let mut tables = Vec::new();
    for path in document_files(root)? {
        match MappingTable::parse_file(&path) {
            Ok(table) => {
                report.sources.push(table.source.clone());
                tables.push(table);
            }
            Err(err) => report.load_errors.push(LoadFailure {
                path,
                message: err.to_string(),
            }),
        }
    }
    report.violations = rules.check_mapping(&tables);
    report.hints = tables.iter().flat_map(|table| rules.hints(table)).collect();
    Ok(report)
}
