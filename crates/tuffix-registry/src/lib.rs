use std::path::{Path, PathBuf};
use std::sync::Arc;

use tuffix_core::{parse_catalog_toml, Keyword, KeywordDefinition, KeywordOrigin, TuffixError};

mod catalog;

pub use catalog::CustomKeywordCatalog;

const BUILTIN_CATALOG: &str = include_str!("../catalog/builtin.toml");

/// Every keyword known to one invocation.
///
/// Built-in keywords keep their declaration order. Custom keywords loaded
/// through [`KeywordRegistry::resolve`] are memoised, so a name resolves to
/// the same object for the lifetime of the registry.
#[derive(Debug, Clone, Default)]
pub struct KeywordRegistry {
    builtin: Vec<Arc<dyn Keyword>>,
    custom: Option<CustomKeywordCatalog>,
    loaded: Vec<Arc<dyn Keyword>>,
}

impl KeywordRegistry {
    pub fn builtin() -> Result<Self, TuffixError> {
        let definitions = parse_catalog_toml(BUILTIN_CATALOG).map_err(|err| {
            TuffixError::definition(&PathBuf::from("builtin.toml"), format!("{err:#}"))
        })?;
        let keywords = definitions
            .into_iter()
            .map(|definition| {
                Arc::new(definition.into_keyword(KeywordOrigin::BuiltIn)) as Arc<dyn Keyword>
            })
            .collect();
        Ok(Self::from_keywords(keywords))
    }

    pub fn from_keywords(keywords: Vec<Arc<dyn Keyword>>) -> Self {
        Self {
            builtin: keywords,
            custom: None,
            loaded: Vec::new(),
        }
    }

    pub fn with_custom_catalog(mut self, catalog: CustomKeywordCatalog) -> Self {
        self.custom = Some(catalog);
        self
    }

    pub fn custom_catalog(&self) -> Option<&CustomKeywordCatalog> {
        self.custom.as_ref()
    }

    /// The built-in catalog in declaration order.
    pub fn all(&self) -> &[Arc<dyn Keyword>] {
        &self.builtin
    }

    /// Look up `name` among built-in and already loaded custom keywords.
    pub fn obtain(&self, name: &str) -> Option<Arc<dyn Keyword>> {
        self.builtin
            .iter()
            .chain(self.loaded.iter())
            .find(|keyword| keyword.name() == name)
            .cloned()
    }

    /// Like [`obtain`](Self::obtain), falling back to the custom catalog.
    ///
    /// `Ok(None)` means the name is unknown everywhere; a malformed stored
    /// definition is an error.
    pub fn resolve(&mut self, name: &str) -> Result<Option<Arc<dyn Keyword>>, TuffixError> {
        if let Some(keyword) = self.obtain(name) {
            return Ok(Some(keyword));
        }

        let Some(catalog) = &self.custom else {
            return Ok(None);
        };
        let Some(keyword) = catalog.load(name)? else {
            return Ok(None);
        };

        let keyword: Arc<dyn Keyword> = Arc::new(keyword);
        self.loaded.push(Arc::clone(&keyword));
        Ok(Some(keyword))
    }

    /// Load and validate the custom definition at `source` without storing it.
    pub fn prepare_custom(&self, source: &Path) -> Result<CustomImport, TuffixError> {
        if self.custom.is_none() {
            return Err(no_custom_catalog());
        }

        let definition = KeywordDefinition::load(source)?;
        if self
            .builtin
            .iter()
            .any(|existing| existing.name() == definition.name)
        {
            return Err(TuffixError::definition(
                source,
                format!("'{}' collides with a built-in keyword", definition.name),
            ));
        }

        Ok(CustomImport {
            source: source.to_path_buf(),
            definition,
        })
    }

    /// Store a prepared definition in the catalog and make it resolvable.
    pub fn commit_custom(&mut self, import: CustomImport) -> Result<Arc<dyn Keyword>, TuffixError> {
        let Some(catalog) = &self.custom else {
            return Err(no_custom_catalog());
        };

        let keyword: Arc<dyn Keyword> =
            Arc::new(catalog.store(&import.source, import.definition)?);
        self.loaded.retain(|existing| existing.name() != keyword.name());
        self.loaded.push(Arc::clone(&keyword));
        Ok(keyword)
    }

    /// [`prepare_custom`](Self::prepare_custom) then [`commit_custom`](Self::commit_custom).
    pub fn import_custom(&mut self, source: &Path) -> Result<Arc<dyn Keyword>, TuffixError> {
        let import = self.prepare_custom(source)?;
        self.commit_custom(import)
    }
}

/// A validated custom definition that has not been written to the catalog.
#[derive(Debug, Clone)]
pub struct CustomImport {
    source: PathBuf,
    definition: KeywordDefinition,
}

impl CustomImport {
    pub fn name(&self) -> &str {
        &self.definition.name
    }

    pub fn source(&self) -> &Path {
        &self.source
    }
}

fn no_custom_catalog() -> TuffixError {
    TuffixError::Config("no custom keyword catalog is configured".to_string())
}
