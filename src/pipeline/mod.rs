//! Pipeline stages for ingesting one document.
//!
//! ## Data Flow
//!
//! ```text
//! input ──▶ source ──▶ normalize ──▶ persist
//! (check)  (convert)  (index/wrap)  (mapping record)
//! ```
//!
//! 1. [`input`]     — the path must be an existing regular file
//! 2. conversion is done by a [`crate::source::DocumentSource`]
//! 3. [`normalize`] — walk the document's elements into indexed tables and
//!    text blocks, skipping elements that fail
//! 4. [`persist`]   — re-parse each table with [`table`] and write the
//!    mapping record
//!
//! [`postprocess`] holds the text cleanup shared by the normalizer
//! (corrections), the persister (numeric cells) and the vision source
//! (Markdown cleanup).

pub mod input;
pub mod normalize;
pub mod persist;
pub mod postprocess;
pub mod table;
