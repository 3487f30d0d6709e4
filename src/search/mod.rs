pub mod elastic;

pub use elastic::{AuditDocument, SearchIndexWriter};
