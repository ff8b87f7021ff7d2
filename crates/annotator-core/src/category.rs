use std::fmt;

use crate::CoreError;

/// Label written when no configured category could be assigned.
pub const UNCATEGORIZED: &str = "Uncategorized";

/// A label assigned to one paper.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Category {
    Named(String),
    Uncategorized,
}

impl Category {
    pub fn as_str(&self) -> &str {
        match self {
            Category::Named(name) => name,
            Category::Uncategorized => UNCATEGORIZED,
        }
    }

    pub fn is_uncategorized(&self) -> bool {
        matches!(self, Category::Uncategorized)
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The closed set of labels a classifier may return.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CategorySet {
    names: Vec<String>,
}

impl CategorySet {
    /// Build a set, rejecting empty sets, blank or duplicate names and the
    /// sentinel label.
    pub fn new(names: Vec<String>) -> Result<Self, CoreError> {
        if names.is_empty() {
            return Err(CoreError::Config("category list is empty".into()));
        }
        for (i, name) in names.iter().enumerate() {
            if name.trim().is_empty() {
                return Err(CoreError::Config("category names must not be blank".into()));
            }
            if name == UNCATEGORIZED {
                return Err(CoreError::Config(format!(
                    "\"{}\" is reserved and cannot be a category",
                    UNCATEGORIZED
                )));
            }
            if names[..i].contains(name) {
                return Err(CoreError::Config(format!("duplicate category \"{}\"", name)));
            }
        }
        Ok(Self { names })
    }

    pub fn names(&self) -> &[String] {
        &self.names
    }

    /// Names joined with ", " as they appear in the prompt.
    pub fn joined(&self) -> String {
        self.names.join(", ")
    }

    /// Map a model reply onto the set.
    ///
    /// Surrounding whitespace is ignored; anything else must match a name
    /// exactly, including case and punctuation.
    pub fn resolve(&self, reply: &str) -> Category {
        let reply = reply.trim();
        self.names
            .iter()
            .find(|name| name.as_str() == reply)
            .map(|name| Category::Named(name.clone()))
            .unwrap_or(Category::Uncategorized)
    }

    pub fn contains(&self, category: &Category) -> bool {
        match category {
            Category::Named(name) => self.names.contains(name),
            Category::Uncategorized => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn default_set() -> CategorySet {
        CategorySet::new(
            crate::DEFAULT_CATEGORIES
                .iter()
                .map(|c| c.to_string())
                .collect(),
        )
        .unwrap()
    }

    #[test]
    fn resolves_exact_match() {
        let set = default_set();
        assert_eq!(
            set.resolve("Deep Learning"),
            Category::Named("Deep Learning".into())
        );
    }

    #[test]
    fn resolve_ignores_surrounding_whitespace() {
        let set = default_set();
        assert_eq!(set.resolve("  NLP\n"), Category::Named("NLP".into()));
    }

    #[test]
    fn resolve_is_strict_about_case_and_punctuation() {
        let set = default_set();
        assert_eq!(set.resolve("deep learning"), Category::Uncategorized);
        assert_eq!(set.resolve("Deep Learning."), Category::Uncategorized);
        assert_eq!(set.resolve("Category: NLP"), Category::Uncategorized);
        assert_eq!(set.resolve(""), Category::Uncategorized);
    }

    #[test]
    fn rejects_empty_set() {
        assert!(CategorySet::new(vec![]).is_err());
    }

    #[test]
    fn rejects_duplicates_and_sentinel() {
        assert!(CategorySet::new(vec!["NLP".into(), "NLP".into()]).is_err());
        assert!(CategorySet::new(vec!["NLP".into(), UNCATEGORIZED.into()]).is_err());
        assert!(CategorySet::new(vec!["  ".into()]).is_err());
    }

    #[test]
    fn joined_preserves_order() {
        let set = CategorySet::new(vec!["B".into(), "A".into()]).unwrap();
        assert_eq!(set.joined(), "B, A");
    }

    #[test]
    fn display_uses_label() {
        assert_eq!(Category::Uncategorized.to_string(), "Uncategorized");
        assert_eq!(Category::Named("NLP".into()).to_string(), "NLP");
        assert!(!default_set().contains(&Category::Uncategorized));
    }
}
