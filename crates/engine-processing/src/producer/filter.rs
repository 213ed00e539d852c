/// Event schemas the loader ignores.
#[derive(Debug, Clone, Default)]
pub struct SchemaFilter {
    exact: Vec<String>,
    prefixes: Vec<String>,
}

impl SchemaFilter {
    /// Entries ending in `*` match by prefix, others match exactly.
    pub fn new<I, S>(entries: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut filter = Self::default();
        for entry in entries {
            let entry = entry.as_ref();
            match entry.strip_suffix('*') {
                Some(prefix) => filter.prefixes.push(prefix.to_string()),
                None => filter.exact.push(entry.to_string()),
            }
        }
        filter
    }

    pub fn is_empty(&self) -> bool {
        self.exact.is_empty() && self.prefixes.is_empty()
    }

    pub fn matches(&self, schema: &str) -> bool {
        self.exact.iter().any(|e| e == schema)
            || self.prefixes.iter().any(|p| schema.starts_with(p.as_str()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exact_and_prefix_entries() {
        let filter = SchemaFilter::new([
            "iglu:com.acme/page_view/jsonschema/1-0-0",
            "iglu:com.acme/internal/*",
        ]);

        assert!(filter.matches("iglu:com.acme/page_view/jsonschema/1-0-0"));
        assert!(!filter.matches("iglu:com.acme/page_view/jsonschema/1-0-1"));
        assert!(filter.matches("iglu:com.acme/internal/jsonschema/2-0-0"));
        assert!(!filter.matches("iglu:com.acme/intern"));
    }

    #[test]
    fn test_lone_star_matches_everything() {
        let filter = SchemaFilter::new(["*"]);
        assert!(filter.matches("anything"));
        assert!(!SchemaFilter::new(Vec::<String>::new()).matches("anything"));
    }
}
