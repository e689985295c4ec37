use std::fmt;

use crate::error::QError;

/// A validated dataset key: non-empty, `[A-Za-z0-9_-]+` (§3).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DatasetKey(String);

impl DatasetKey {
    pub fn parse(raw: &str) -> Result<Self, QError> {
        if raw.is_empty() || !raw.chars().all(is_key_char) {
            return Err(QError::BadRequest(format!(
                "invalid dataset key '{raw}', must match [A-Za-z0-9_-]+"
            )));
        }
        Ok(DatasetKey(raw.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

fn is_key_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_' || c == '-'
}

impl fmt::Display for DatasetKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl AsRef<str> for DatasetKey {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn rejects_empty_and_bad_chars() {
        assert!(DatasetKey::parse("").is_err());
        assert!(DatasetKey::parse("has space").is_err());
        assert!(DatasetKey::parse("has/slash").is_err());
    }

    #[test]
    fn accepts_alnum_dash_underscore() {
        assert!(DatasetKey::parse("abc-123_XYZ").is_ok());
    }
}
