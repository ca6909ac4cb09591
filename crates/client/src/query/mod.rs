//! Query construction strategies.
//!
//! A query builder turns free text into a provider query string.
//! Construction is pure: no side effects, deterministic for a given
//! text and strategy, and never an empty string (an empty or
//! filtered-to-nothing input falls back to the unfiltered stripped
//! text so the upstream call still executes).
//!
//! Strategies:
//! - [`VerbatimQuery`]: the stripped text as one contains predicate.
//! - [`StopwordQuery`]: stopword-filtered per-token predicates joined
//!   with AND, with a one-shot OR fallback the connector uses when the
//!   conjunctive form finds nothing.
//! - [`PhraseQuery`]: keyword phrases expanded through a synonym
//!   source, all clauses OR'd.

pub mod phrases;
pub mod stopwords;

use std::collections::HashSet;
use std::sync::LazyLock;

use regex::Regex;

pub use phrases::{KeywordChunker, PhraseChunker, PhraseQuery, SynonymMap, SynonymSource};
pub use stopwords::{BASE_STOPWORDS, is_stopword, stopword_set};

static NON_WORD: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\W+").unwrap());

/// Collapse any run of non-alphanumeric characters to a single space.
pub fn strip_text(text: &str) -> String {
    NON_WORD.replace_all(text, " ").trim().to_string()
}

/// How a single term renders into the provider query language.
#[derive(Debug, Clone)]
pub enum TermSyntax {
    /// Contains predicate, CQL-style: `field ~ "term"`.
    Contains { field: String },
    /// The bare term itself, for providers that take free text.
    Plain,
}

impl TermSyntax {
    /// CQL full-text contains predicate.
    pub fn cql() -> Self {
        TermSyntax::Contains { field: "text".to_string() }
    }

    fn render(&self, term: &str) -> String {
        match self {
            TermSyntax::Contains { field } => format!("{field} ~ \"{term}\""),
            // An empty free-text query is not executable; the
            // match-all form is.
            TermSyntax::Plain if term.is_empty() => "*".to_string(),
            TermSyntax::Plain => term.to_string(),
        }
    }
}

/// Boolean operator joining per-token predicates.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BooleanOp {
    And,
    Or,
}

impl BooleanOp {
    fn joiner(self) -> &'static str {
        match self {
            BooleanOp::And => " AND ",
            BooleanOp::Or => " OR ",
        }
    }
}

/// Free text to provider query string.
pub trait QueryBuilder: Send + Sync {
    /// Build the primary query. Pure and deterministic.
    fn build(&self, text: &str) -> String;

    /// A broader retry query, or `None` when no useful fallback
    /// exists. The connector issues it at most once, when the primary
    /// query returns zero hits.
    fn fallback(&self, _text: &str) -> Option<String> {
        None
    }
}

/// The stripped text wrapped as a single predicate.
#[derive(Debug, Clone)]
pub struct VerbatimQuery {
    syntax: TermSyntax,
}

impl VerbatimQuery {
    pub fn new(syntax: TermSyntax) -> Self {
        Self { syntax }
    }
}

impl QueryBuilder for VerbatimQuery {
    fn build(&self, text: &str) -> String {
        self.syntax.render(&strip_text(text))
    }
}

/// Stopword-filtered per-token predicates joined with a boolean
/// operator.
pub struct StopwordQuery {
    syntax: TermSyntax,
    op: BooleanOp,
    stopwords: HashSet<String>,
}

impl StopwordQuery {
    /// Conjunctive form over the base stopword list plus `extended`.
    pub fn new(syntax: TermSyntax, op: BooleanOp, extended: &[String]) -> Self {
        Self { syntax, op, stopwords: stopword_set(extended) }
    }

    fn tokens<'t>(&self, stripped: &'t str) -> Vec<&'t str> {
        stripped
            .split_whitespace()
            .filter(|token| !is_stopword(&self.stopwords, token))
            .collect()
    }

    fn join(&self, tokens: &[&str], op: BooleanOp) -> String {
        tokens
            .iter()
            .map(|token| self.syntax.render(token))
            .collect::<Vec<_>>()
            .join(op.joiner())
    }
}

impl QueryBuilder for StopwordQuery {
    fn build(&self, text: &str) -> String {
        let stripped = strip_text(text);
        let tokens = self.tokens(&stripped);

        if tokens.is_empty() {
            // Everything was filtered; the unfiltered text still executes.
            return self.syntax.render(&stripped);
        }

        self.join(&tokens, self.op)
    }

    fn fallback(&self, text: &str) -> Option<String> {
        if self.op != BooleanOp::And {
            return None;
        }

        let stripped = strip_text(text);
        let tokens = self.tokens(&stripped);

        // With fewer than two tokens the disjunctive form is the same
        // query; retrying it would be wasted work.
        if tokens.len() < 2 {
            return None;
        }

        Some(self.join(&tokens, BooleanOp::Or))
    }
}
