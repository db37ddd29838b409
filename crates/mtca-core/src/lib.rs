//! # mtca-core
//!
//! Core library for mtca - a Merkle Tree Certificate authority.
//!
//! The CA accepts *assertions* binding a subject public key to a set of
//! claims, accumulates them into fixed-duration *batches*, and issues
//! certificates whose proof is a Merkle inclusion path into a periodically
//! signed *validity window* rather than a per-certificate signature.
//!
//! ## Modules
//!
//! - [`codec`]: canonical length-prefixed binary encoding
//! - [`crypto`]: hashing, signature schemes, signing key storage
//! - [`assertion`]: claims, subjects, assertions and their abridged forms
//! - [`params`]: CA parameters
//! - [`tree`]: the Merkle tree over a batch
//! - [`window`]: signed validity windows
//! - [`cert`]: certificates and proof verification
//! - [`ca`]: on-disk CA state, the queue, and the issuance pipeline
//!
//! ## Example
//!
//! ```rust,no_run
//! use mtca_core::ca::{Ca, NewOpts, QueuedAssertion};
//!
//! # fn example(assertion: mtca_core::assertion::Assertion) -> Result<(), Box<dyn std::error::Error>> {
//! let ca = Ca::new("./my-ca", NewOpts {
//!     issuer_id: "acme".to_string(),
//!     http_server: "mtc.example.org".to_string(),
//!     batch_duration: None,
//!     lifetime: None,
//!     storage_duration: None,
//!     start_time: None,
//! })?;
//! ca.queue(QueuedAssertion::new(assertion.clone(), None))?;
//! ca.issue()?;
//! let cert = ca.certificate_for(&assertion)?;
//! # let _ = cert;
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod assertion;
pub mod ca;
pub mod cert;
pub mod codec;
pub mod crypto;
pub mod params;
pub mod tree;
pub mod window;

pub use assertion::{AbridgedAssertion, Assertion, Claims, Subject};
pub use ca::{Ca, NewOpts, QueuedAssertion};
pub use cert::Certificate;
pub use params::CAParams;
pub use tree::Tree;
pub use window::{SignedValidityWindow, ValidityWindow};
