use validator::ValidationError;

const MAX_SLUG_LEN: usize = 64;

/// Organization slug. Lowercase ASCII letters, digits and inner hyphens.
///
/// Slugs are path segments of the materialized hierarchy path, so they must
/// never contain `/`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Slug(String);

impl Slug {
    pub fn new(slug: impl Into<String>) -> Result<Self, ValidationError> {
        let slug = slug.into().trim().to_string();

        if slug.is_empty() || slug.len() > MAX_SLUG_LEN {
            let mut error = ValidationError::new("slug_length");
            error.message = Some("Slug must be between 1 and 64 characters".into());
            return Err(error);
        }

        let valid_chars = slug
            .chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-');
        if !valid_chars || slug.starts_with('-') || slug.ends_with('-') {
            let mut error = ValidationError::new("slug_format");
            error.message =
                Some("Slug may only contain lowercase letters, digits and inner hyphens".into());
            return Err(error);
        }

        Ok(Self(slug))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for Slug {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_typical_slugs() {
        assert_eq!(Slug::new("cupe-79").unwrap().as_str(), "cupe-79");
        assert_eq!(Slug::new("  clc ").unwrap().as_str(), "clc");
    }

    #[test]
    fn rejects_path_separator_and_uppercase() {
        assert!(Slug::new("cupe/79").is_err());
        assert!(Slug::new("CUPE").is_err());
    }

    #[test]
    fn rejects_edge_hyphens_and_empty() {
        assert!(Slug::new("-cupe").is_err());
        assert!(Slug::new("cupe-").is_err());
        assert!(Slug::new("").is_err());
        assert!(Slug::new("a".repeat(65)).is_err());
    }
}
