//! Read-only view of the INI configuration.

/// Typed lookups. Missing or unparsable values fall back to `default`.
pub trait ConfigPort {
    fn get_string(&self, section: &str, key: &str) -> Option<String>;
    fn get_int(&self, section: &str, key: &str, default: i64) -> i64;
    fn get_double(&self, section: &str, key: &str, default: f64) -> f64;

    /// Count-like value; negatives clamp to zero.
    fn get_count(&self, section: &str, key: &str, default: usize) -> usize {
        self.get_int(section, key, default as i64).max(0) as usize
    }

    /// Trimmed, lower-cased selector such as a backend name.
    fn get_choice(&self, section: &str, key: &str, default: &str) -> String {
        self.get_string(section, key)
            .map(|v| v.trim().to_lowercase())
            .filter(|v| !v.is_empty())
            .unwrap_or_else(|| default.to_string())
    }
}
