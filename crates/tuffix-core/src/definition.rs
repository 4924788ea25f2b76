use std::collections::BTreeSet;
use std::fs;
use std::path::Path;

use anyhow::{anyhow, Context};
use serde::{Deserialize, Serialize};

use crate::keyword::{validate_keyword_name, KeywordOrigin, PackageKeyword};
use crate::TuffixError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DefinitionFormat {
    Toml,
    Json,
}

impl DefinitionFormat {
    pub const ALL: [DefinitionFormat; 2] = [DefinitionFormat::Toml, DefinitionFormat::Json];

    pub fn extension(self) -> &'static str {
        match self {
            Self::Toml => "toml",
            Self::Json => "json",
        }
    }

    pub fn from_path(path: &Path) -> Option<Self> {
        let extension = path.extension()?.to_str()?;
        Self::ALL
            .into_iter()
            .find(|format| extension.eq_ignore_ascii_case(format.extension()))
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct PackageSet {
    #[serde(default)]
    pub packages: Vec<String>,
}

/// Declarative form of a keyword, shared by the built-in catalog and custom files.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct KeywordDefinition {
    pub name: String,
    pub description: String,
    pub install: PackageSet,
    #[serde(default)]
    pub remove: Option<PackageSet>,
}

#[derive(Debug, Deserialize)]
struct CatalogDocument {
    #[serde(default)]
    keyword: Vec<KeywordDefinition>,
}

impl KeywordDefinition {
    pub fn from_toml_str(input: &str) -> anyhow::Result<Self> {
        let definition: Self =
            toml::from_str(input).context("failed to parse keyword definition")?;
        definition.validate()?;
        Ok(definition)
    }

    pub fn from_json_str(input: &str) -> anyhow::Result<Self> {
        let definition: Self =
            serde_json::from_str(input).context("failed to parse keyword definition")?;
        definition.validate()?;
        Ok(definition)
    }

    pub fn parse(format: DefinitionFormat, input: &str) -> anyhow::Result<Self> {
        match format {
            DefinitionFormat::Toml => Self::from_toml_str(input),
            DefinitionFormat::Json => Self::from_json_str(input),
        }
    }

    /// Read and validate a definition file; the format follows its extension.
    pub fn load(path: &Path) -> Result<Self, TuffixError> {
        let format = DefinitionFormat::from_path(path).ok_or_else(|| {
            TuffixError::definition(path, "expected a .toml or .json keyword definition")
        })?;
        let raw = fs::read_to_string(path)
            .map_err(|err| TuffixError::definition(path, format!("failed to read: {err}")))?;
        Self::parse(format, &raw).map_err(|err| TuffixError::definition(path, format!("{err:#}")))
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        validate_keyword_name(&self.name).map_err(|reason| anyhow!(reason))?;
        if self.description.trim().is_empty() {
            return Err(anyhow!(
                "keyword '{}' must have a non-empty description",
                self.name
            ));
        }
        if self.install.packages.is_empty() {
            return Err(anyhow!(
                "keyword '{}' must install at least one package",
                self.name
            ));
        }
        validate_package_list(&self.name, "install", &self.install.packages)?;
        if let Some(remove) = &self.remove {
            validate_package_list(&self.name, "remove", &remove.packages)?;
        }
        Ok(())
    }

    pub fn install_packages(&self) -> BTreeSet<String> {
        self.install.packages.iter().cloned().collect()
    }

    /// Packages removed by the keyword; mirrors the install set unless declared.
    pub fn remove_packages(&self) -> BTreeSet<String> {
        match &self.remove {
            Some(remove) => remove.packages.iter().cloned().collect(),
            None => self.install_packages(),
        }
    }

    pub fn into_keyword(self, origin: KeywordOrigin) -> PackageKeyword {
        let install_packages = self.install_packages();
        let remove_packages = self.remove_packages();
        PackageKeyword::new(
            self.name,
            self.description,
            install_packages,
            remove_packages,
            origin,
        )
    }
}

/// Parse a `[[keyword]]` catalog document, validating every entry.
pub fn parse_catalog_toml(input: &str) -> anyhow::Result<Vec<KeywordDefinition>> {
    let document: CatalogDocument =
        toml::from_str(input).context("failed to parse keyword catalog")?;

    let mut seen = BTreeSet::new();
    for definition in &document.keyword {
        definition.validate()?;
        if !seen.insert(definition.name.as_str()) {
            return Err(anyhow!(
                "keyword '{}' is declared more than once",
                definition.name
            ));
        }
    }
    Ok(document.keyword)
}

fn validate_package_list(keyword: &str, section: &str, packages: &[String]) -> anyhow::Result<()> {
    let mut seen = BTreeSet::new();
    for package in packages {
        if !is_package_name(package) {
            return Err(anyhow!(
                "keyword '{keyword}' {section} package '{package}' is not a valid package name"
            ));
        }
        if !seen.insert(package.as_str()) {
            return Err(anyhow!(
                "keyword '{keyword}' lists {section} package '{package}' twice"
            ));
        }
    }
    Ok(())
}

fn is_package_name(value: &str) -> bool {
    let bytes = value.as_bytes();
    if bytes.is_empty() {
        return false;
    }

    let starts_valid = bytes[0].is_ascii_lowercase() || bytes[0].is_ascii_digit();
    starts_valid
        && bytes[1..]
            .iter()
            .all(|b| b.is_ascii_lowercase() || b.is_ascii_digit() || b"+-.:".contains(b))
}
