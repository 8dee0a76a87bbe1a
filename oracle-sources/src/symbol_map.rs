use oracle_common::config::SymbolMappings;

/// Translates a canonical symbol into source-specific strings (spec §4.1).
/// Pure data; no failures.
#[derive(Debug, Clone, Default)]
pub struct SymbolMap {
    mappings: SymbolMappings,
}

impl SymbolMap {
    #[must_use]
    pub fn new(mappings: SymbolMappings) -> Self {
        Self { mappings }
    }

    /// Returns the source-specific string. If the canonical is unknown or
    /// the source is absent from its mapping, falls back to the canonical
    /// string unchanged.
    #[must_use]
    pub fn get_source_symbol(&self, canonical: &str, source: &str) -> String {
        self.mappings
            .get(canonical)
            .and_then(|by_source| by_source.get(source))
            .filter(|s| !s.is_empty())
            .cloned()
            .unwrap_or_else(|| canonical.to_string())
    }

    /// `true` unless the mapping explicitly contains the source with an
    /// empty value (meaning "source does not list this pair"). Unmapped
    /// symbols or sources are always supported.
    #[must_use]
    pub fn is_symbol_supported_by_source(&self, canonical: &str, source: &str) -> bool {
        match self.mappings.get(canonical).and_then(|m| m.get(source)) {
            Some(mapped) => !mapped.is_empty(),
            None => true,
        }
    }

    /// Subset of `symbols` for which `is_symbol_supported_by_source` holds.
    #[must_use]
    pub fn get_symbols_for_data_source<'a>(
        &self,
        symbols: &'a [String],
        source: &str,
    ) -> Vec<&'a str> {
        symbols
            .iter()
            .filter(|s| self.is_symbol_supported_by_source(s, source))
            .map(String::as_str)
            .collect()
    }
}
