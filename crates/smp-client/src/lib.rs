//! # smp-client: Outbound Clients of the SMP
//!
//! Typed clients for everything the SMP talks to:
//! - **SML ManageServiceMetadata**: registration of this SMP ([`sml`])
//! - **SML ManageParticipantIdentifier**: registration of participants
//!   ([`participant`])
//! - **Directory indexer**: business card publication ([`directory`])
//! - **DNS**: verification of what the SML published ([`dns`])
//!
//! The SML services speak SOAP 1.1 over mutual TLS. The SML to talk to is
//! chosen per call from an [`SmlInfo`] record, so switching between SML and
//! SMK needs no new client.

pub mod config;
pub mod directory;
pub mod dns;
pub mod error;
pub mod participant;
pub mod sml;
pub(crate) mod soap;

pub use config::{ClientIdentity, ConfigError, DirectoryClientConfig, SmlClientConfig};
pub use directory::DirectoryClient;
pub use dns::{DnsChecker, DnsStatus, ParticipantDnsReport, Resolver, TokioResolver};
pub use error::{DirectoryError, SmlError};
pub use smp_core::{validate_smp_addresses, SmpAddresses};

use smp_registry::sml_info::SmlInfo;

/// Client for the SML management services.
#[derive(Debug, Clone)]
pub struct SmlClient {
    http: reqwest::Client,
    smp_id: String,
}

impl SmlClient {
    /// Create a client from configuration.
    pub fn new(config: &SmlClientConfig) -> Result<Self, SmlError> {
        Ok(Self {
            http: config.http_client()?,
            smp_id: config.smp_id.clone(),
        })
    }

    /// ID this SMP is registered under.
    pub fn smp_id(&self) -> &str {
        &self.smp_id
    }

    /// ManageServiceMetadata service of `sml`.
    pub fn service_metadata(&self, sml: &SmlInfo) -> sml::ManageServiceMetadataClient<'_> {
        sml::ManageServiceMetadataClient::new(&self.http, sml.manage_service_metadata_url())
    }

    /// ManageParticipantIdentifier service of `sml`.
    pub fn participants(&self, sml: &SmlInfo) -> participant::ManageParticipantClient<'_> {
        participant::ManageParticipantClient::new(
            &self.http,
            sml.manage_participant_identifier_url(),
        )
    }
}
