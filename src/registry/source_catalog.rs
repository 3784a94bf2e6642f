use crate::core::{Source, SourceCategory};
use reqwest::Url;
use std::collections::HashMap;
use std::path::Path;
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard};
use thiserror::Error;

/// Base URL of the FRINK knowledge-graph hosting.
pub const FRINK_BASE: &str = "https://frink.apps.renci.org";

/// FRINK graphs served with both a SPARQL and a TPF endpoint.
const FRINK_GRAPHS: &[(&str, &str, SourceCategory)] = &[
    ("SPOKE", "spoke", SourceCategory::Registry),
    ("Soil Organic Carbon KG", "sockg", SourceCategory::Registry),
    ("Rural Resilience KG", "ruralkg", SourceCategory::Registry),
    ("SCALES", "scales", SourceCategory::Registry),
    ("Urban Flooding Open KN", "ufokn", SourceCategory::Registry),
    ("Dream KG", "dreamkg", SourceCategory::Registry),
    ("BioBricks AOP-Wiki", "biobricks-aopwiki", SourceCategory::Registry),
    ("Ubergraph", "ubergraph", SourceCategory::Other),
    ("Wikidata", "wikidata", SourceCategory::Other),
];

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CatalogError {
    #[error("Source not found: {0}")]
    SourceNotFound(String),
    #[error("Source already exists: {0}")]
    SourceAlreadyExists(String),
    #[error("Invalid source {shortname}: {reason}")]
    InvalidSource { shortname: String, reason: String },
    #[error("Cannot load source catalog: {0}")]
    Load(String),
}

/// Registry of the sources a user can pick from, keyed by shortname.
///
/// Listing preserves registration order.
#[derive(Debug, Clone, Default)]
pub struct SourceCatalog {
    sources: Arc<RwLock<Vec<Source>>>,
    index: Arc<RwLock<HashMap<String, usize>>>,
}

impl SourceCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// The FRINK graphs plus the federated FRINK endpoint.
    pub fn with_defaults() -> Self {
        let catalog = Self::new();
        let defaults = FRINK_GRAPHS
            .iter()
            .map(|(name, slug, category)| {
                Source::compound(
                    name,
                    slug,
                    &format!("{FRINK_BASE}/{slug}/sparql"),
                    &format!("{FRINK_BASE}/ldf/{slug}"),
                )
                .with_category(*category)
            })
            .chain(std::iter::once(
                Source::sparql(
                    "FRINK Federated SPARQL",
                    "federation",
                    &format!("{FRINK_BASE}/federation/sparql"),
                )
                .with_category(SourceCategory::Federation),
            ));
        for source in defaults {
            let shortname = source.shortname.clone();
            if let Err(e) = catalog.register(source) {
                tracing::warn!(%shortname, error = %e, "Skipping built-in source");
            }
        }
        catalog
    }

    /// Loads a JSON array of sources.
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self, CatalogError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .map_err(|e| CatalogError::Load(format!("{}: {}", path.display(), e)))?;
        let sources: Vec<Source> = serde_json::from_str(&content)
            .map_err(|e| CatalogError::Load(format!("{}: {}", path.display(), e)))?;

        let catalog = Self::new();
        for source in sources {
            catalog.register(source)?;
        }
        Ok(catalog)
    }

    /// Registers a source. Shortnames must be unique and every endpoint an
    /// absolute http(s) URL.
    pub fn register(&self, source: Source) -> Result<(), CatalogError> {
        validate(&source)?;

        let mut index = self.index.write().unwrap_or_else(PoisonError::into_inner);
        if index.contains_key(&source.shortname) {
            return Err(CatalogError::SourceAlreadyExists(source.shortname));
        }
        let mut sources = self.sources.write().unwrap_or_else(PoisonError::into_inner);
        index.insert(source.shortname.clone(), sources.len());
        sources.push(source);
        Ok(())
    }

    pub fn get(&self, shortname: &str) -> Option<Source> {
        let index = self.index.read().unwrap_or_else(PoisonError::into_inner);
        let position = *index.get(shortname)?;
        self.read_sources().get(position).cloned()
    }

    pub fn list_all(&self) -> Vec<Source> {
        self.read_sources().clone()
    }

    pub fn list_by_category(&self, category: SourceCategory) -> Vec<Source> {
        self.read_sources()
            .iter()
            .filter(|source| source.category == category)
            .cloned()
            .collect()
    }

    /// Looks up several sources by shortname, keeping the requested order.
    pub fn resolve<S: AsRef<str>>(
        &self,
        shortnames: &[S],
    ) -> Result<Vec<Source>, CatalogError> {
        shortnames
            .iter()
            .map(|shortname| {
                let shortname = shortname.as_ref();
                self.get(shortname)
                    .ok_or_else(|| CatalogError::SourceNotFound(shortname.to_string()))
            })
            .collect()
    }

    pub fn len(&self) -> usize {
        self.read_sources().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn read_sources(&self) -> RwLockReadGuard<'_, Vec<Source>> {
        self.sources.read().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Builds a user-supplied SPARQL source, named and keyed by `name`.
pub fn custom_source(name: &str, url: &str) -> Result<Source, CatalogError> {
    let name = name.trim();
    let source = Source::sparql(name, name, url.trim()).with_category(SourceCategory::Custom);
    validate(&source)?;
    Ok(source)
}

/// Checks that a source has a shortname and only absolute http(s) endpoints.
pub fn validate(source: &Source) -> Result<(), CatalogError> {
    let invalid = |reason: String| CatalogError::InvalidSource {
        shortname: source.shortname.clone(),
        reason,
    };

    if source.shortname.trim().is_empty() {
        return Err(invalid("shortname is required".to_string()));
    }
    for endpoint in source.endpoints() {
        let url = Url::parse(endpoint).map_err(|e| invalid(format!("{endpoint}: {e}")))?;
        if !matches!(url.scheme(), "http" | "https") {
            let scheme = url.scheme();
            return Err(invalid(format!("{endpoint}: unsupported scheme {scheme}")));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_contain_federation_and_compound_sources() {
        let catalog = SourceCatalog::with_defaults();
        assert_eq!(catalog.len(), FRINK_GRAPHS.len() + 1);
        let federation = catalog.get("federation").unwrap();
        assert_eq!(federation.category, SourceCategory::Federation);
        assert!(!federation.is_compound());

        let spoke = catalog.get("spoke").unwrap();
        assert_eq!(
            spoke.endpoints(),
            vec![
                "https://frink.apps.renci.org/spoke/sparql",
                "https://frink.apps.renci.org/ldf/spoke",
            ]
        );
        let federated = catalog.list_by_category(SourceCategory::Federation);
        assert_eq!(federated.len(), 1);
    }

    #[test]
    fn test_register_rejects_duplicates_and_bad_urls() {
        let catalog = SourceCatalog::new();
        catalog
            .register(Source::sparql("A", "a", "https://example.org/sparql"))
            .unwrap();

        let duplicate = Source::sparql("A again", "a", "https://example.org/other");
        let err = catalog.register(duplicate).unwrap_err();
        assert_eq!(err, CatalogError::SourceAlreadyExists("a".into()));

        let unparsable = Source::sparql("B", "b", "not a url");
        let err = catalog.register(unparsable).unwrap_err();
        assert!(matches!(err, CatalogError::InvalidSource { .. }));
        assert_eq!(catalog.len(), 1);
    }

    #[test]
    fn test_resolve_keeps_order_and_reports_unknown() {
        let catalog = SourceCatalog::with_defaults();
        let sources = catalog.resolve(&["sockg", "spoke"]).unwrap();
        assert_eq!(sources[0].shortname, "sockg");
        assert_eq!(sources[1].shortname, "spoke");

        let err = catalog.resolve(&["spoke", "nope"]).unwrap_err();
        assert_eq!(err, CatalogError::SourceNotFound("nope".into()));
    }

    #[test]
    fn test_custom_source() {
        let source = custom_source(" My endpoint ", "http://localhost:7878/query").unwrap();
        assert_eq!(source.shortname, "My endpoint");
        assert_eq!(source.category, SourceCategory::Custom);
        assert!(custom_source("ftp", "ftp://example.org/data").is_err());
        assert!(custom_source("", "http://localhost/sparql").is_err());
    }
}
