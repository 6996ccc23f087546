//! Instrument universe parsed from configuration.

use std::collections::HashSet;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Universe {
    pub codes: Vec<String>,
}

impl Universe {
    pub fn parse(input: &str) -> Result<Self, UniverseError> {
        Ok(Self {
            codes: parse_codes(input)?,
        })
    }

    pub fn count(&self) -> usize {
        self.codes.len()
    }
}

#[derive(Debug, Clone, thiserror::Error)]
pub enum UniverseError {
    #[error("empty token in code list")]
    EmptyToken,

    #[error("duplicate code: {0}")]
    DuplicateCode(String),
}

/// Split a comma-separated list into upper-cased codes. Suffixes such as
/// `.NS` are kept as part of the code.
pub fn parse_codes(input: &str) -> Result<Vec<String>, UniverseError> {
    let mut codes = Vec::new();
    let mut seen = HashSet::new();

    for token in input.split(',') {
        let trimmed = token.trim();
        if trimmed.is_empty() {
            return Err(UniverseError::EmptyToken);
        }
        let code = trimmed.to_uppercase();
        if !seen.insert(code.clone()) {
            return Err(UniverseError::DuplicateCode(code));
        }
        codes.push(code);
    }

    Ok(codes)
}
