///
/// Engine configuration.
///
/// Every field has a default, so an empty file is a valid configuration.
/// Connection and statement options override these values per connection
/// or statement.
///
/// ```toml
/// encoding = "utf8"
/// wide_column_threshold = 1024
/// catalog_identifier_width = "from_driver"   # or "off", or a number
/// columns_threshold = 8192
/// silent = false
/// null = "$null$"
/// log = "odbx=debug"
/// ```
///

use std::fmt;
use std::path::Path;
use std::str::FromStr;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::error::{OdbxError, Result};
use crate::null::{DEFAULT_NULL, NullPolicy};
use crate::types::{COLUMNS_THRESHOLD, DEFAULT_WIDE_COLUMN_THRESHOLD, Encoding};

/// Width forced on character columns of a table listing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(try_from = "WidthRepr", into = "WidthRepr")]
pub enum CatalogWidth {
    #[default]
    Off,
    /// The driver's maximum qualifier name length.
    FromDriver,
    Fixed(usize),
}

#[derive(Serialize, Deserialize)]
#[serde(untagged)]
enum WidthRepr {
    Width(usize),
    Name(String),
}

impl TryFrom<WidthRepr> for CatalogWidth {
    type Error = String;

    fn try_from(repr: WidthRepr) -> std::result::Result<Self, String> {
        match repr {
            WidthRepr::Width(0) => Ok(CatalogWidth::Off),
            WidthRepr::Width(n) => Ok(CatalogWidth::Fixed(n)),
            WidthRepr::Name(name) => match name.as_str() {
                "off" => Ok(CatalogWidth::Off),
                "from_driver" => Ok(CatalogWidth::FromDriver),
                _ => Err(format!("expected off, from_driver or a width, found {name:?}")),
            },
        }
    }
}

impl From<CatalogWidth> for WidthRepr {
    fn from(width: CatalogWidth) -> Self {
        match width {
            CatalogWidth::Off => WidthRepr::Name("off".to_string()),
            CatalogWidth::FromDriver => WidthRepr::Name("from_driver".to_string()),
            CatalogWidth::Fixed(n) => WidthRepr::Width(n),
        }
    }
}

impl fmt::Display for CatalogWidth {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CatalogWidth::Off => f.write_str("off"),
            CatalogWidth::FromDriver => f.write_str("from_driver"),
            CatalogWidth::Fixed(n) => write!(f, "{n}"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct EngineConfig {
    pub encoding: Encoding,
    pub wide_column_threshold: usize,
    pub catalog_identifier_width: CatalogWidth,
    /// Wide column threshold of column listings.
    pub columns_threshold: usize,
    /// Suppress driver notices.
    pub silent: bool,
    /// Atom standing for SQL NULL.
    pub null: String,
    /// Log filter directive, e.g. `info` or `odbx=debug`.
    pub log: Option<String>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            encoding: Encoding::default(),
            wide_column_threshold: DEFAULT_WIDE_COLUMN_THRESHOLD,
            catalog_identifier_width: CatalogWidth::default(),
            columns_threshold: COLUMNS_THRESHOLD,
            silent: false,
            null: DEFAULT_NULL.to_string(),
            log: None,
        }
    }
}

impl EngineConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        content.parse()
    }

    pub fn null_policy(&self) -> NullPolicy {
        NullPolicy::Atom(Arc::from(self.null.as_str()))
    }

    fn validate(self) -> Result<Self> {
        if self.wide_column_threshold == 0 {
            return Err(OdbxError::Config("wide_column_threshold must be positive".to_string()));
        }
        if self.columns_threshold == 0 {
            return Err(OdbxError::Config("columns_threshold must be positive".to_string()));
        }
        if self.null.is_empty() {
            return Err(OdbxError::Config("null must not be empty".to_string()));
        }
        Ok(self)
    }
}

impl FromStr for EngineConfig {
    type Err = OdbxError;

    fn from_str(s: &str) -> Result<Self> {
        let config: EngineConfig = toml::from_str(s)?;
        config.validate()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_empty_config_is_default() {
        let config: EngineConfig = "".parse().unwrap();
        assert_eq!(config, EngineConfig::default());
        assert_eq!(config.wide_column_threshold, 1024);
        assert_eq!(config.columns_threshold, 8192);
        assert_eq!(config.null_policy(), NullPolicy::default());
    }

    #[test]
    fn test_catalog_width_forms() {
        let config: EngineConfig = "catalog_identifier_width = \"from_driver\"".parse().unwrap();
        assert_eq!(config.catalog_identifier_width, CatalogWidth::FromDriver);
        let config: EngineConfig = "catalog_identifier_width = 64".parse().unwrap();
        assert_eq!(config.catalog_identifier_width, CatalogWidth::Fixed(64));
        let config: EngineConfig = "catalog_identifier_width = \"off\"".parse().unwrap();
        assert_eq!(config.catalog_identifier_width, CatalogWidth::Off);
        assert!("catalog_identifier_width = \"wide\"".parse::<EngineConfig>().is_err());
    }

    #[test]
    fn test_invalid_values_are_rejected() {
        assert!(matches!(
            "wide_column_threshold = 0".parse::<EngineConfig>(),
            Err(OdbxError::Config(_))
        ));
        assert!(matches!("encoding = \"ebcdic\"".parse::<EngineConfig>(), Err(OdbxError::Toml(_))));
        assert!(matches!("colour = true".parse::<EngineConfig>(), Err(OdbxError::Toml(_))));
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "encoding = \"iso_latin_1\"\nsilent = true\nnull = \"null\"\nlog = \"debug\"").unwrap();
        let config = EngineConfig::load(file.path()).unwrap();
        assert_eq!(config.encoding, Encoding::IsoLatin1);
        assert!(config.silent);
        assert_eq!(config.null_policy(), NullPolicy::Atom(Arc::from("null")));
        assert_eq!(config.log.as_deref(), Some("debug"));

        let missing = EngineConfig::load(Path::new("/nonexistent/odbx.toml"));
        assert!(matches!(missing, Err(OdbxError::Io(_))));
    }

    #[test]
    fn test_round_trip_through_toml() {
        let config = EngineConfig {
            catalog_identifier_width: CatalogWidth::Fixed(30),
            ..EngineConfig::default()
        };
        let text = toml::to_string(&config).unwrap();
        assert_eq!(text.parse::<EngineConfig>().unwrap(), config);
    }
}
