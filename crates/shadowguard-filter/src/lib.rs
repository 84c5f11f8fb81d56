//! shadowguard-filter: rule text in, block/allow/redirect decisions out.
//!
//! The engine understands a defined subset of the common filter-list
//! language (domain anchors, URL anchors, raw regexes, `$option` tails,
//! `@@` exceptions, hosts-file lines) plus cosmetic rules, which are parsed
//! and surfaced but consumed by nothing in the core.
//!
//! Compilation is forgiving: a malformed rule is logged and skipped, the
//! rest of the list still compiles. Decisions are strict: allow beats block
//! unless the block is `$important`, and redirects apply only when nothing
//! allowed the request.
//!
//! Domain-anchor rules with no URL part compile into the shared
//! `shadowguard-index` snapshot, which is also what the packet fast path
//! consults; everything else becomes anchored regex matchers prefiltered by
//! a required literal substring.

pub mod compile;
pub mod engine;
pub mod error;
pub mod parse;
pub mod rule;

pub use compile::{CompileStats, CompiledRules, RuleCompiler};
pub use engine::{blocked_bytes_estimate, FilterDecision, RequestContext};
pub use error::FilterError;
pub use rule::{CosmeticRule, Party, ResourceType, RuleAction, RuleOptions};

/// Result type for filter operations.
pub type Result<T> = std::result::Result<T, FilterError>;
