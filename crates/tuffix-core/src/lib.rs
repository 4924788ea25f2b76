mod config;
mod definition;
mod error;
mod keyword;
mod packages;

pub use config::{BuildConfig, DEFAULT_CONFIG_PATH, DEFAULT_STATE_DIR, STATE_DIR_ENV};
pub use definition::{parse_catalog_toml, DefinitionFormat, KeywordDefinition, PackageSet};
pub use error::TuffixError;
pub use keyword::{
    validate_keyword_name, Keyword, KeywordAction, KeywordOrigin, PackageKeyword, ALL_KEYWORDS,
    KEYWORD_MAX_LENGTH,
};
pub use packages::{PackageIntent, PackageManager};
