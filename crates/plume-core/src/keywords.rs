//! Keyword filter.
//!
//! Matching is a case-insensitive substring test using plain Unicode
//! lowercasing. There is no accent or compatibility folding: "pesquisa" does
//! not match "PESQUÍSA", and "ﬁ" ligatures stay distinct from "fi". This is a
//! known limitation.

use crate::error::{Error, Result};

/// Return every keyword whose lowercase form occurs in the lowercased text,
/// in keyword order. An empty result means no match.
pub fn match_keywords<S: AsRef<str>>(text: &str, keywords: &[S]) -> Vec<String> {
    let haystack = text.to_lowercase();
    keywords
        .iter()
        .map(AsRef::as_ref)
        .filter(|kw| haystack.contains(&kw.to_lowercase()))
        .map(str::to_string)
        .collect()
}

/// A non-empty list of matched keywords.
///
/// Only [`KeywordFilter::find`] builds one, so a persisted match can never
/// carry an empty keyword list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeywordMatch(Vec<String>);

impl KeywordMatch {
    pub fn keywords(&self) -> &[String] {
        &self.0
    }

    pub fn into_inner(self) -> Vec<String> {
        self.0
    }
}

/// Configured keyword set with precomputed lowercase forms.
#[derive(Debug, Clone)]
pub struct KeywordFilter {
    keywords: Vec<String>,
    lowered: Vec<String>,
}

impl KeywordFilter {
    /// Build a filter, preserving keyword order.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if the set is empty or any keyword is blank
    /// (a blank keyword would match every post).
    pub fn new<I, S>(keywords: I) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let keywords: Vec<String> = keywords.into_iter().map(Into::into).collect();

        if keywords.is_empty() {
            return Err(Error::Config("at least one keyword is required".to_string()));
        }
        if let Some(pos) = keywords.iter().position(|k| k.trim().is_empty()) {
            return Err(Error::Config(format!("keyword #{} is blank", pos + 1)));
        }

        let lowered = keywords.iter().map(|k| k.to_lowercase()).collect();
        Ok(Self { keywords, lowered })
    }

    /// Keywords in configured order.
    pub fn keywords(&self) -> &[String] {
        &self.keywords
    }

    pub fn len(&self) -> usize {
        self.keywords.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keywords.is_empty()
    }

    /// Keywords found in `text`, or `None` when nothing matched.
    pub fn find(&self, text: &str) -> Option<KeywordMatch> {
        let haystack = text.to_lowercase();
        let found: Vec<String> = self
            .keywords
            .iter()
            .zip(&self.lowered)
            .filter(|(_, lowered)| haystack.contains(lowered.as_str()))
            .map(|(original, _)| original.clone())
            .collect();

        (!found.is_empty()).then_some(KeywordMatch(found))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_case_insensitive_substring() {
        assert_eq!(
            match_keywords("Há muito BRASIL aqui", &["brasil"]),
            vec!["brasil".to_string()]
        );
    }

    #[test]
    fn test_preserves_keyword_order_and_spelling() {
        let found = match_keywords(
            "hello world, pesquisa do brasil",
            &["Brasil", "Pesquisa", "Hello World"],
        );
        assert_eq!(found, vec!["Brasil", "Pesquisa", "Hello World"]);
    }

    #[test]
    fn test_no_match_is_empty() {
        assert!(match_keywords("nada relevante", &["Pesquisa"]).is_empty());
    }

    #[test]
    fn test_substring_inside_word() {
        assert_eq!(match_keywords("brasileiros", &["Brasil"]), vec!["Brasil"]);
    }

    #[test]
    fn test_no_accent_folding() {
        assert!(match_keywords("PESQUÍSA", &["pesquisa"]).is_empty());
        assert_eq!(match_keywords("PESQUÍSA", &["pesquísa"]), vec!["pesquísa"]);
    }

    #[test]
    fn test_filter_find() {
        let filter = KeywordFilter::new(["Pesquisa", "clima"]).unwrap();
        let found = filter.find("Pesquisa sobre CLIMA").unwrap();
        assert_eq!(found.keywords(), &["Pesquisa".to_string(), "clima".to_string()]);
        assert!(filter.find("nada relevante").is_none());
    }

    #[test]
    fn test_filter_agrees_with_free_function() {
        let keywords = ["Brasil", "Hello World"];
        let filter = KeywordFilter::new(keywords).unwrap();
        for text in ["hello WORLD", "brasil", "nothing", "BRASIL hello world"] {
            let expected = match_keywords(text, &keywords);
            let got = filter
                .find(text)
                .map(KeywordMatch::into_inner)
                .unwrap_or_default();
            assert_eq!(got, expected, "text: {text}");
        }
    }

    #[test]
    fn test_rejects_empty_set() {
        let err = KeywordFilter::new(Vec::<String>::new()).unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }

    #[test]
    fn test_rejects_blank_keyword() {
        let err = KeywordFilter::new(["ok", "  "]).unwrap_err();
        assert!(err.to_string().contains("#2"));
    }
}
