//! # smp-registry: SMP Metadata Registry
//!
//! The registry owns every record an SMP publishes and enforces the
//! consistency rules between them:
//!
//! ```text
//! ServiceGroup (participant)
//!  ├── ServiceInformation (document type)     ─┐ mutually exclusive
//!  │    └── Process (process id)               │ per document type
//!  │         └── Endpoint (transport profile)  │
//!  ├── Redirect (document type)               ─┘
//!  └── BusinessCard
//! ```
//!
//! ## Architecture
//!
//! All state lives in [`RegistryContext`], which is built once and handed to
//! whichever boundary needs it (REST handlers, CLI commands, tests). There is
//! no global manager lookup. Each aggregate has a thin registry view obtained
//! from the context (`ctx.service_groups()`, `ctx.service_information()`, ...)
//! that validates input and writes through to a [`store::Store`].
//!
//! Out-of-band effects go through traits in [`hooks`]: SML participant
//! registration, Directory publication, and SMP registration at the SML. The
//! registry decides *when* they run and how failures are handled:
//!
//! | Operation | Remote failure |
//! |-----------|----------------|
//! | service group create | rolled back, nothing stored |
//! | service group delete | local delete proceeds, warning returned |
//! | business card push | local change kept, warning returned |
//! | participant migration | nothing stored, error returned |
//!
//! Every mutation and every remote outcome is appended to the hash-chained
//! [`audit::AuditTrail`].

pub mod audit;
pub mod business_card;
pub mod context;
pub mod error;
pub mod exchange;
pub mod hooks;
pub mod migration;
pub mod outcome;
pub mod redirect;
pub mod service_group;
pub mod service_info;
pub mod settings;
pub mod sml_info;
pub mod sml_registration;
pub mod store;
pub mod transport_profile;

pub use context::{RegistryContext, RegistryContextBuilder};
pub use error::{RegistryError, StoreError};
pub use outcome::{Change, Outcome};
