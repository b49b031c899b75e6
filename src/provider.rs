use std::{
    collections::{BTreeMap, HashMap},
    fmt,
    path::{Path, PathBuf},
    sync::Arc,
    time::Duration,
};

use anyhow::{Result, bail};
use encoding_rs::{Encoding, UTF_8};
use log::{debug, info};

use crate::{
    cache::{CacheStats, TtlCache, cached},
    error::ConfigError,
    io_utils::{self, InputFormat},
    report::ValidationReport,
    standardize::FieldStandardizer,
    table::{RawTable, StandardizedTable},
};

const SYMBOL_PLACEHOLDER: &str = "{symbol}";

#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct FetchRequest {
    pub symbol: Option<String>,
    pub params: BTreeMap<String, String>,
}

impl FetchRequest {
    pub fn for_symbol(symbol: impl Into<String>) -> Self {
        Self {
            symbol: Some(symbol.into()),
            params: BTreeMap::new(),
        }
    }

    pub fn with_param(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.params.insert(key.into(), value.into());
        self
    }
}

impl fmt::Display for FetchRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.symbol.as_deref().unwrap_or("*"))?;
        for (key, value) in &self.params {
            write!(f, " {key}={value}")?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DataFilter {
    pub columns: Vec<String>,
    pub sort_by: Option<String>,
    pub ascending: bool,
    pub top_n: Option<usize>,
}

impl DataFilter {
    pub fn is_empty(&self) -> bool {
        self.columns.is_empty() && self.sort_by.is_none() && self.top_n.is_none()
    }

    /// Sorts (descending unless `ascending`), keeps the first `top_n` rows,
    /// then selects `columns`. Unknown sort or selection columns are ignored.
    pub fn apply(&self, mut table: StandardizedTable) -> StandardizedTable {
        if let Some(column) = &self.sort_by
            && !table.sort_by(column, self.ascending)
        {
            debug!("Sort column '{column}' not present; leaving row order unchanged");
        }
        if let Some(limit) = self.top_n {
            table.truncate(limit);
        }
        if !self.columns.is_empty() {
            table.select_columns(&self.columns);
        }
        table
    }
}

pub trait Provider: Send + Sync {
    fn source_name(&self) -> &str;

    fn dataset(&self) -> Option<&str> {
        None
    }

    fn fetch_data(&self, request: &FetchRequest) -> Result<RawTable>;

    fn apply_filter(&self, table: StandardizedTable, filter: &DataFilter) -> StandardizedTable {
        filter.apply(table)
    }
}

#[derive(Debug, Clone)]
pub struct FileProvider {
    source: String,
    dataset: Option<String>,
    template: String,
    encoding: &'static Encoding,
    format: Option<InputFormat>,
    delimiter: Option<u8>,
}

impl FileProvider {
    pub fn new(source: impl Into<String>, template: impl Into<String>) -> Self {
        Self {
            source: source.into(),
            dataset: None,
            template: template.into(),
            encoding: UTF_8,
            format: None,
            delimiter: None,
        }
    }

    pub fn with_dataset(mut self, dataset: impl Into<String>) -> Self {
        self.dataset = Some(dataset.into());
        self
    }

    pub fn with_encoding(mut self, encoding: &'static Encoding) -> Self {
        self.encoding = encoding;
        self
    }

    pub fn with_format(mut self, format: InputFormat) -> Self {
        self.format = Some(format);
        self
    }

    pub fn with_delimiter(mut self, delimiter: u8) -> Self {
        self.delimiter = Some(delimiter);
        self
    }

    pub fn path_for(&self, request: &FetchRequest) -> Result<PathBuf> {
        if !self.template.contains(SYMBOL_PLACEHOLDER) {
            return Ok(PathBuf::from(&self.template));
        }
        let Some(symbol) = request.symbol.as_deref() else {
            bail!(
                "Provider '{}' needs a symbol to resolve {}",
                self.source,
                self.template
            );
        };
        if symbol.is_empty() || symbol.contains(['/', '\\']) || symbol.contains("..") {
            bail!("Symbol '{symbol}' cannot be used in a file path");
        }
        Ok(PathBuf::from(self.template.replace(SYMBOL_PLACEHOLDER, symbol)))
    }
}

impl Provider for FileProvider {
    fn source_name(&self) -> &str {
        &self.source
    }

    fn dataset(&self) -> Option<&str> {
        self.dataset.as_deref()
    }

    fn fetch_data(&self, request: &FetchRequest) -> Result<RawTable> {
        let path = self.path_for(request)?;
        debug!("[{}] Reading raw table from {path:?}", self.source);
        io_utils::read_raw_table(&path, self.encoding, self.format, self.delimiter)
    }
}

#[derive(Debug, Clone)]
pub struct StaticProvider {
    source: String,
    table: RawTable,
}

impl StaticProvider {
    pub fn new(source: impl Into<String>, table: RawTable) -> Self {
        Self {
            source: source.into(),
            table,
        }
    }
}

impl Provider for StaticProvider {
    fn source_name(&self) -> &str {
        &self.source
    }

    fn fetch_data(&self, _request: &FetchRequest) -> Result<RawTable> {
        Ok(self.table.clone())
    }
}

#[derive(Default, Clone)]
pub struct ProviderRegistry {
    providers: HashMap<String, Arc<dyn Provider>>,
}

impl ProviderRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, provider: Arc<dyn Provider>) -> Option<Arc<dyn Provider>> {
        self.providers
            .insert(provider.source_name().to_string(), provider)
    }

    pub fn get(&self, source: &str) -> Result<Arc<dyn Provider>, ConfigError> {
        self.providers
            .get(source)
            .cloned()
            .ok_or_else(|| ConfigError::UnknownSource(source.to_string()))
    }

    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.providers.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    pub fn interchangeable(&self, dataset: &str) -> Vec<&str> {
        let mut names: Vec<&str> = self
            .providers
            .values()
            .filter(|provider| provider.dataset() == Some(dataset))
            .map(|provider| provider.source_name())
            .collect();
        names.sort_unstable();
        names
    }
}

impl fmt::Debug for ProviderRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProviderRegistry")
            .field("providers", &self.names())
            .finish()
    }
}

type FetchKey = (String, FetchRequest);
type FetchOutput = (StandardizedTable, ValidationReport);

#[derive(Debug)]
pub struct StandardizedFetch {
    providers: ProviderRegistry,
    standardizer: FieldStandardizer,
    cache: Option<TtlCache<FetchKey, FetchOutput>>,
}

impl StandardizedFetch {
    pub fn new(providers: ProviderRegistry, standardizer: FieldStandardizer) -> Self {
        Self {
            providers,
            standardizer,
            cache: None,
        }
    }

    pub fn with_cache(mut self, ttl: Duration) -> Self {
        self.cache = Some(TtlCache::new(ttl));
        self
    }

    pub fn providers(&self) -> &ProviderRegistry {
        &self.providers
    }

    pub fn cache_stats(&self) -> Option<CacheStats> {
        self.cache.as_ref().map(TtlCache::stats)
    }

    pub fn fetch(
        &self,
        source: &str,
        request: &FetchRequest,
        filter: &DataFilter,
    ) -> Result<FetchOutput> {
        let provider = self.providers.get(source)?;
        let (table, report) = match &self.cache {
            Some(cache) => {
                let wrapped = cached(
                    cache,
                    |request: &FetchRequest| (source.to_string(), request.clone()),
                    |request: &FetchRequest| self.fetch_uncached(provider.as_ref(), request),
                );
                wrapped(request)?
            }
            None => self.fetch_uncached(provider.as_ref(), request)?,
        };
        Ok((provider.apply_filter(table, filter), report))
    }

    fn fetch_uncached(&self, provider: &dyn Provider, request: &FetchRequest) -> Result<FetchOutput> {
        let source = provider.source_name();
        info!("[{source}] Fetching {request}");
        let raw = provider.fetch_data(request)?;
        Ok(self.standardizer.standardize(&raw, source)?)
    }
}

pub fn file_provider_for(source: &str, path: &Path, encoding: &'static Encoding) -> FileProvider {
    FileProvider::new(source, path.to_string_lossy().into_owned())
        .with_encoding(encoding)
        .with_format(InputFormat::from_path(path))
}
