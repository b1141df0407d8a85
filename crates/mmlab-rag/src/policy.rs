//! Whether a question needs document retrieval at all

use mmlab_core::RetrievalConfig;

/// Decides if a query should go through retrieval
pub trait RetrievalPolicy: Send + Sync {
    fn should_retrieve(&self, query: &str) -> bool;
}

/// Retrieve for every query
#[derive(Debug, Clone, Copy, Default)]
pub struct AlwaysRetrieve;

impl RetrievalPolicy for AlwaysRetrieve {
    fn should_retrieve(&self, _query: &str) -> bool {
        true
    }
}

/// Skip retrieval when the query contains one of a set of phrases.
///
/// Questions about an image the user already supplied ("explain this image")
/// are answered from that image, not from stored documents.
#[derive(Debug, Clone, Default)]
pub struct KeywordPolicy {
    skip_phrases: Vec<String>,
}

impl KeywordPolicy {
    pub fn new<I, S>(skip_phrases: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self {
            skip_phrases: skip_phrases
                .into_iter()
                .map(|p| normalize(p.as_ref()))
                .filter(|p| !p.is_empty())
                .collect(),
        }
    }

    pub fn from_config(config: &RetrievalConfig) -> Self {
        Self::new(&config.skip_phrases)
    }
}

impl RetrievalPolicy for KeywordPolicy {
    fn should_retrieve(&self, query: &str) -> bool {
        let query = normalize(query);
        !self.skip_phrases.iter().any(|p| query.contains(p.as_str()))
    }
}

fn normalize(text: &str) -> String {
    text.split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_keyword_policy() {
        let policy = KeywordPolicy::new(["Explain this image"]);

        assert!(!policy.should_retrieve("Please explain   this IMAGE for me"));
        assert!(policy.should_retrieve("What is the training cost of the model?"));
    }

    #[test]
    fn test_empty_phrases_ignored() {
        let policy = KeywordPolicy::new(["", "  "]);
        assert!(policy.should_retrieve("anything"));
    }

    #[test]
    fn test_from_config_defaults() {
        let policy = KeywordPolicy::from_config(&RetrievalConfig::default());
        assert!(!policy.should_retrieve("explain this image"));
        assert!(AlwaysRetrieve.should_retrieve("explain this image"));
    }
}
