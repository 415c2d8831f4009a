//! pixrate Core - Shared domain types
//!
//! This crate provides the domain types shared between the server
//! (pixrated) and the wire protocol: session identity, rating
//! submissions and per-image aggregates.
//!
//! All code follows the panic-free policy: no `.unwrap()`, `.expect()`,
//! `panic!()`, `unreachable!()`, `todo!()`, or direct indexing `[i]`.

pub mod error;
pub mod rating;
pub mod session;

// Re-exports for convenience
pub use error::{DomainError, DomainResult};
pub use rating::{RatingAggregate, RatingEntry, RatingSubmission, ANONYMOUS_USER};
pub use session::{SessionId, SESSION_ID_LEN};
