//! # DNS Registration Checks
//!
//! The SML publishes every registered SMP and participant in DNS:
//!
//! - an SMP as `<smpID>.publisher.<dnsZone>`
//! - a participant as `B-<md5 hex of the lowercased value>.<scheme>.<dnsZone>`
//!
//! [`DnsChecker`] resolves these names to tell which registrations are
//! visible. Resolution goes through the [`Resolver`] trait so tests never
//! touch the network.

use std::net::{IpAddr, Ipv4Addr};
use std::sync::Arc;

use async_trait::async_trait;
use md5::{Digest, Md5};
use serde::{Deserialize, Serialize};
use smp_core::ParticipantId;
use smp_registry::sml_info::SmlInfo;

/// Host resolved first to tell "not registered" apart from "offline".
pub const DEFAULT_PROBE_HOST: &str = "www.google.com";

/// Resolves host names to IPv4 addresses.
#[async_trait]
pub trait Resolver: Send + Sync {
    /// IPv4 addresses of `host`. An unknown host is an error.
    async fn lookup_ipv4(&self, host: &str) -> std::io::Result<Vec<Ipv4Addr>>;
}

/// Resolver using the system resolver via `tokio::net::lookup_host`.
#[derive(Debug, Default, Clone, Copy)]
pub struct TokioResolver;

#[async_trait]
impl Resolver for TokioResolver {
    async fn lookup_ipv4(&self, host: &str) -> std::io::Result<Vec<Ipv4Addr>> {
        let mut addresses: Vec<Ipv4Addr> = tokio::net::lookup_host(format!("{host}:80"))
            .await?
            .filter_map(|addr| match addr.ip() {
                IpAddr::V4(v4) => Some(v4),
                IpAddr::V6(_) => None,
            })
            .collect();
        addresses.sort();
        addresses.dedup();
        Ok(addresses)
    }
}

/// DNS state of one SMP or participant.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DnsStatus {
    /// SMP ID or participant URI.
    pub name: String,
    /// Host name that was resolved.
    pub host: String,
    /// Whether the name resolved to at least one address.
    pub registered: bool,
    /// Resolved IPv4 addresses.
    pub addresses: Vec<Ipv4Addr>,
}

/// Result of checking all participants.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ParticipantDnsReport {
    /// The probe host did not resolve; "unregistered" results may be wrong.
    pub offline: bool,
    /// One entry per participant, in input order.
    pub participants: Vec<DnsStatus>,
}

/// Host name under which the SML publishes `participant`.
pub fn participant_host(participant: &ParticipantId, sml: &SmlInfo) -> String {
    let digest = Md5::digest(participant.value().to_lowercase().as_bytes());
    format!(
        "B-{}.{}.{}",
        hex::encode(digest),
        participant.scheme(),
        sml.dns_zone
    )
}

/// Host name under which the SML publishes the SMP `smp_id`.
pub fn smp_host(smp_id: &str, sml: &SmlInfo) -> String {
    format!("{smp_id}.{}", sml.publisher_dns_zone())
}

/// Checks SMP and participant registrations in DNS.
#[derive(Clone)]
pub struct DnsChecker {
    resolver: Arc<dyn Resolver>,
    probe_host: String,
}

impl std::fmt::Debug for DnsChecker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DnsChecker")
            .field("probe_host", &self.probe_host)
            .finish_non_exhaustive()
    }
}

impl Default for DnsChecker {
    fn default() -> Self {
        Self::new(Arc::new(TokioResolver))
    }
}

impl DnsChecker {
    /// Checker over `resolver` with the default probe host.
    pub fn new(resolver: Arc<dyn Resolver>) -> Self {
        Self {
            resolver,
            probe_host: DEFAULT_PROBE_HOST.to_string(),
        }
    }

    /// Use `host` as the connectivity probe.
    pub fn with_probe_host(mut self, host: impl Into<String>) -> Self {
        self.probe_host = host.into();
        self
    }

    async fn status(&self, name: String, host: String) -> DnsStatus {
        let addresses = match self.resolver.lookup_ipv4(&host).await {
            Ok(addresses) => addresses,
            Err(e) => {
                tracing::debug!(host = %host, error = %e, "DNS lookup failed");
                Vec::new()
            }
        };
        DnsStatus {
            name,
            host,
            registered: !addresses.is_empty(),
            addresses,
        }
    }

    /// Whether this SMP is published by `sml`.
    pub async fn check_smp(&self, smp_id: &str, sml: &SmlInfo) -> DnsStatus {
        self.status(smp_id.to_string(), smp_host(smp_id, sml)).await
    }

    /// Resolve every participant.
    ///
    /// The probe host is resolved first; if that fails the report is marked
    /// offline but all participants are still checked.
    pub async fn check_participants(
        &self,
        participants: &[ParticipantId],
        sml: &SmlInfo,
    ) -> ParticipantDnsReport {
        let offline = !self.status(String::new(), self.probe_host.clone()).await.registered;
        if offline {
            tracing::warn!(probe = %self.probe_host, "DNS probe failed, results may be incomplete");
        }
        let mut results = Vec::with_capacity(participants.len());
        for participant in participants {
            results.push(
                self.status(participant.uri_encoded(), participant_host(participant, sml))
                    .await,
            );
        }
        tracing::info!(
            checked = results.len(),
            registered = results.iter().filter(|s| s.registered).count(),
            offline,
            "participant DNS check finished"
        );
        ParticipantDnsReport {
            offline,
            participants: results,
        }
    }
}
