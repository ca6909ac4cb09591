//! Phrase-chunking query strategy with synonym expansion.
//!
//! The original heuristic part-of-speech tags the text and chunks
//! maximal noun-phrase sequences, then widens each phrase with
//! thesaurus synonyms. Both steps are pluggable seams here — the
//! linguistic quality of taggers and thesauri is not this crate's
//! concern. The default chunker groups contiguous non-stopword tokens;
//! the default synonym source is a configured map.

use std::collections::HashMap;

use crate::query::{QueryBuilder, TermSyntax, strip_text, stopword_set};

/// Splits stripped text into the phrases worth searching for.
pub trait PhraseChunker: Send + Sync {
    fn phrases(&self, stripped: &str) -> Vec<String>;
}

/// Looks up alternative surface forms for one phrase.
pub trait SynonymSource: Send + Sync {
    fn synonyms(&self, phrase: &str) -> Vec<String>;
}

/// Default chunker: maximal runs of consecutive non-stopword tokens.
///
/// A stand-in for noun-phrase chunking that needs no language model;
/// stopwords act as phrase boundaries.
pub struct KeywordChunker {
    stopwords: std::collections::HashSet<String>,
}

impl KeywordChunker {
    pub fn new(extended_stopwords: &[String]) -> Self {
        Self { stopwords: stopword_set(extended_stopwords) }
    }
}

impl PhraseChunker for KeywordChunker {
    fn phrases(&self, stripped: &str) -> Vec<String> {
        let mut phrases = Vec::new();
        let mut current: Vec<&str> = Vec::new();

        for token in stripped.split_whitespace() {
            if crate::query::is_stopword(&self.stopwords, token) {
                if !current.is_empty() {
                    phrases.push(current.join(" "));
                    current.clear();
                }
            } else {
                current.push(token);
            }
        }
        if !current.is_empty() {
            phrases.push(current.join(" "));
        }

        phrases
    }
}

/// Synonym source backed by a configured map, keyed case-insensitively.
#[derive(Default)]
pub struct SynonymMap {
    map: HashMap<String, Vec<String>>,
}

impl SynonymMap {
    pub fn new(entries: HashMap<String, Vec<String>>) -> Self {
        let map = entries
            .into_iter()
            .map(|(phrase, synonyms)| (phrase.to_lowercase(), synonyms))
            .collect();
        Self { map }
    }
}

impl SynonymSource for SynonymMap {
    fn synonyms(&self, phrase: &str) -> Vec<String> {
        self.map.get(&phrase.to_lowercase()).cloned().unwrap_or_default()
    }
}

/// Phrase/synonym expansion strategy.
///
/// Each phrase becomes a disjunction of (phrase OR each synonym)
/// predicates; phrases without synonyms get a bare predicate. All
/// clauses are OR'd together.
pub struct PhraseQuery {
    syntax: TermSyntax,
    chunker: Box<dyn PhraseChunker>,
    synonyms: Box<dyn SynonymSource>,
}

impl PhraseQuery {
    pub fn new(syntax: TermSyntax, chunker: Box<dyn PhraseChunker>, synonyms: Box<dyn SynonymSource>) -> Self {
        Self { syntax, chunker, synonyms }
    }

    /// Default configuration: keyword chunking plus a synonym map.
    pub fn with_defaults(
        syntax: TermSyntax, extended_stopwords: &[String], synonyms: HashMap<String, Vec<String>>,
    ) -> Self {
        Self::new(syntax, Box::new(KeywordChunker::new(extended_stopwords)), Box::new(SynonymMap::new(synonyms)))
    }

    fn clause(&self, phrase: &str) -> String {
        let synonyms = self.synonyms.synonyms(phrase);

        if synonyms.is_empty() {
            return self.syntax.render(phrase);
        }

        let alternatives: Vec<String> = std::iter::once(phrase.to_string())
            .chain(synonyms)
            .map(|form| self.syntax.render(&form))
            .collect();

        format!("({})", alternatives.join(" OR "))
    }
}

impl QueryBuilder for PhraseQuery {
    fn build(&self, text: &str) -> String {
        let stripped = strip_text(text);
        let phrases = self.chunker.phrases(&stripped);

        if phrases.is_empty() {
            // No phrases survived chunking; the unfiltered text still
            // executes.
            return self.syntax.render(&stripped);
        }

        phrases
            .iter()
            .map(|phrase| self.clause(phrase))
            .collect::<Vec<_>>()
            .join(" OR ")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn synonyms(entries: &[(&str, &[&str])]) -> HashMap<String, Vec<String>> {
        entries
            .iter()
            .map(|(phrase, syns)| ((*phrase).to_string(), syns.iter().map(|s| (*s).to_string()).collect()))
            .collect()
    }

    #[test]
    fn test_chunker_splits_on_stopwords() {
        let chunker = KeywordChunker::new(&[]);
        assert_eq!(
            chunker.phrases("quarterly report for engineering leadership"),
            vec!["quarterly report".to_string(), "engineering leadership".to_string()]
        );
    }

    #[test]
    fn test_chunker_all_stopwords_yields_nothing() {
        let chunker = KeywordChunker::new(&[]);
        assert!(chunker.phrases("the of and").is_empty());
    }

    #[test]
    fn test_phrase_without_synonyms_gets_bare_clause() {
        let builder = PhraseQuery::with_defaults(TermSyntax::cql(), &[], HashMap::new());
        assert_eq!(builder.build("quarterly report"), "text ~ \"quarterly report\"");
    }

    #[test]
    fn test_phrase_with_synonyms_expands_to_disjunction() {
        let builder = PhraseQuery::with_defaults(
            TermSyntax::cql(),
            &[],
            synonyms(&[("quarterly report", &["q3 summary"])]),
        );
        assert_eq!(
            builder.build("quarterly report"),
            "(text ~ \"quarterly report\" OR text ~ \"q3 summary\")"
        );
    }

    #[test]
    fn test_multiple_phrases_joined_with_or() {
        let builder = PhraseQuery::with_defaults(
            TermSyntax::cql(),
            &[],
            synonyms(&[("roadmap", &["plan"])]),
        );
        assert_eq!(
            builder.build("roadmap for engineering"),
            "(text ~ \"roadmap\" OR text ~ \"plan\") OR text ~ \"engineering\""
        );
    }

    #[test]
    fn test_empty_phrase_set_falls_back_to_stripped_text() {
        let builder = PhraseQuery::with_defaults(TermSyntax::cql(), &[], HashMap::new());
        assert_eq!(builder.build("the of and"), "text ~ \"the of and\"");
    }

    #[test]
    fn test_build_is_deterministic() {
        let builder = PhraseQuery::with_defaults(
            TermSyntax::cql(),
            &[],
            synonyms(&[("roadmap", &["plan", "timeline"])]),
        );
        assert_eq!(builder.build("roadmap review"), builder.build("roadmap review"));
    }
}
