//! Client code for dredge.
//!
//! This crate provides the search connector pipeline: auth strategies,
//! query builders, bounded-concurrency content fetching, and the
//! upstream providers that tie them together.

pub mod auth;
pub mod connector;
pub mod fetch;
pub mod query;

pub use auth::{AuthEndpoints, AuthStrategy, BasicServiceAuth, ClientCredentialAuth, Credentials, DelegatedTokenAuth};

pub use connector::{
    ConfluenceProvider, Document, ExtractFile, FetchedContent, GraphProvider, Provider, SearchConnector, SearchHit,
    UnstructuredClient,
};

pub use fetch::ContentFetcher;

pub use query::{BooleanOp, PhraseQuery, QueryBuilder, StopwordQuery, TermSyntax, VerbatimQuery};
