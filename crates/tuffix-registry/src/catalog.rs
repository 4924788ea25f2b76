use std::fs;
use std::path::{Path, PathBuf};

use tracing::debug;
use tuffix_core::{
    validate_keyword_name, DefinitionFormat, KeywordDefinition, KeywordOrigin, PackageKeyword,
    TuffixError,
};

/// Directory of user-supplied keyword definitions, one `<name>.toml|json` per keyword.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CustomKeywordCatalog {
    root: PathBuf,
}

impl CustomKeywordCatalog {
    pub fn open(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn definition_path(&self, name: &str, format: DefinitionFormat) -> PathBuf {
        self.root.join(format!("{name}.{}", format.extension()))
    }

    /// Path of the stored definition for `name`, if the catalog holds one.
    pub fn find(&self, name: &str) -> Option<PathBuf> {
        if validate_keyword_name(name).is_err() {
            return None;
        }
        DefinitionFormat::ALL
            .into_iter()
            .map(|format| self.definition_path(name, format))
            .find(|path| path.is_file())
    }

    /// Build the keyword stored under `name`; `Ok(None)` when there is none.
    pub fn load(&self, name: &str) -> Result<Option<PackageKeyword>, TuffixError> {
        let Some(path) = self.find(name) else {
            return Ok(None);
        };

        let definition = KeywordDefinition::load(&path)?;
        if definition.name != name {
            return Err(TuffixError::definition(
                &path,
                format!(
                    "declares keyword '{}' but is stored as '{name}'",
                    definition.name
                ),
            ));
        }
        debug!(keyword = name, path = %path.display(), "loaded custom keyword");
        Ok(Some(definition.into_keyword(KeywordOrigin::Custom { path })))
    }

    /// Copy `source`, already parsed as `definition`, into the catalog under its declared name.
    pub fn store(
        &self,
        source: &Path,
        definition: KeywordDefinition,
    ) -> Result<PackageKeyword, TuffixError> {
        let format = DefinitionFormat::from_path(source).ok_or_else(|| {
            TuffixError::definition(source, "expected a .toml or .json keyword definition")
        })?;

        fs::create_dir_all(&self.root).map_err(|err| {
            TuffixError::definition(
                source,
                format!(
                    "failed creating custom keyword catalog {}: {err}",
                    self.root.display()
                ),
            )
        })?;

        // A stale copy in the other format would shadow or confuse later lookups.
        for other in DefinitionFormat::ALL
            .into_iter()
            .filter(|candidate| *candidate != format)
        {
            let stale = self.definition_path(&definition.name, other);
            if stale.is_file() {
                fs::remove_file(&stale).map_err(|err| {
                    TuffixError::definition(
                        &stale,
                        format!("failed removing previous definition: {err}"),
                    )
                })?;
            }
        }

        let destination = self.definition_path(&definition.name, format);
        if source != destination {
            fs::copy(source, &destination).map_err(|err| {
                TuffixError::definition(
                    source,
                    format!("failed storing definition at {}: {err}", destination.display()),
                )
            })?;
        }
        debug!(
            keyword = %definition.name,
            path = %destination.display(),
            "stored custom keyword definition"
        );

        Ok(definition.into_keyword(KeywordOrigin::Custom { path: destination }))
    }

    /// Names of every stored definition, sorted.
    pub fn names(&self) -> Result<Vec<String>, TuffixError> {
        if !self.root.exists() {
            return Ok(Vec::new());
        }

        let entries = fs::read_dir(&self.root).map_err(|err| {
            TuffixError::definition(&self.root, format!("failed reading catalog: {err}"))
        })?;

        let mut names = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|err| {
                TuffixError::definition(&self.root, format!("failed reading catalog: {err}"))
            })?;
            let path = entry.path();
            if !path.is_file() || DefinitionFormat::from_path(&path).is_none() {
                continue;
            }
            let Some(stem) = path.file_stem().and_then(|value| value.to_str()) else {
                continue;
            };
            if validate_keyword_name(stem).is_ok() {
                names.push(stem.to_string());
            }
        }

        names.sort();
        names.dedup();
        Ok(names)
    }
}
