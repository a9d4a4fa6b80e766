//! Content moderation strategies.

use murmur_types::ModerationPolicy;

/// Decides whether message text is blocked.
///
/// Implementations must be pure: the same text always gets the same verdict.
pub trait ModerationFilter: Send + Sync + 'static {
    /// Returns `true` when the text must be withheld.
    fn evaluate(&self, text: &str) -> bool;
}

/// Case-insensitive substring match against a denylist.
#[derive(Debug, Clone)]
pub struct KeywordFilter {
    terms: Vec<String>,
}

impl KeywordFilter {
    /// Builds a filter from a list of terms. Blank terms are ignored.
    pub fn new<I, S>(terms: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let terms = terms
            .into_iter()
            .map(|t| t.as_ref().trim().to_lowercase())
            .filter(|t| !t.is_empty())
            .collect();
        Self { terms }
    }

    pub fn from_policy(policy: &ModerationPolicy) -> Self {
        Self::new(&policy.denylist)
    }

    pub fn terms(&self) -> &[String] {
        &self.terms
    }
}

impl Default for KeywordFilter {
    fn default() -> Self {
        Self::from_policy(&ModerationPolicy::default())
    }
}

impl ModerationFilter for KeywordFilter {
    fn evaluate(&self, text: &str) -> bool {
        let text = text.to_lowercase();
        self.terms.iter().any(|term| text.contains(term.as_str()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn blocks_denylisted_terms_in_any_case() {
        let filter = KeywordFilter::default();
        assert!(filter.evaluate("I hate this"));
        assert!(filter.evaluate("I HATE THIS"));
        assert!(filter.evaluate("what an Attack"));
        assert!(filter.evaluate("hateful"));
    }

    #[test]
    fn passes_clean_text() {
        let filter = KeywordFilter::default();
        assert!(!filter.evaluate("I love this"));
        assert!(!filter.evaluate(""));
    }

    #[test]
    fn custom_denylist_replaces_default() {
        let filter = KeywordFilter::new(["Spoiler", "  ", ""]);
        assert_eq!(filter.terms(), ["spoiler"]);
        assert!(filter.evaluate("no SPOILERS please"));
        assert!(!filter.evaluate("I hate this"));
    }

    #[test]
    fn empty_denylist_blocks_nothing() {
        let filter = KeywordFilter::new(Vec::<String>::new());
        assert!(!filter.evaluate("I hate this"));
    }
}
