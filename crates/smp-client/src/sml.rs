//! # ManageServiceMetadata
//!
//! Registration of this SMP at the SML. Every operation posts one SOAP
//! request to `{managementServiceUrl}/manageservicemetadata`:
//!
//! | Operation | Body element | SOAPAction suffix |
//! |-----------|--------------|-------------------|
//! | create | `CreateServiceMetadataPublisherService` | `:createIn` |
//! | read   | `ReadServiceMetadataPublisherService` | `:readIn` |
//! | update | `UpdateServiceMetadataPublisherService` | `:updateIn` |
//! | delete | `DeleteServiceMetadataPublisherService` | `:deleteIn` |

use serde::{Deserialize, Serialize};
use smp_core::SmpAddresses;

use crate::error::SmlError;
use crate::soap::{self, element, text_element, XmlWriter};

const ACTION_PREFIX: &str = "http://busdox.org/serviceMetadata/ManageServiceMetadataService/1.0/";

/// An SMP entry as stored by the SML.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServiceMetadataPublisher {
    /// SMP ID.
    pub smp_id: String,
    /// Physical (IPv4) address.
    pub physical_address: String,
    /// Logical address URL.
    pub logical_address: String,
}

/// Client for the ManageServiceMetadata service of one SML.
#[derive(Debug, Clone)]
pub struct ManageServiceMetadataClient<'a> {
    http: &'a reqwest::Client,
    url: String,
}

impl<'a> ManageServiceMetadataClient<'a> {
    pub(crate) fn new(http: &'a reqwest::Client, url: String) -> Self {
        Self { http, url }
    }

    /// URL requests are posted to.
    pub fn url(&self) -> &str {
        &self.url
    }

    /// Register the SMP.
    pub async fn create(&self, smp_id: &str, addresses: &SmpAddresses) -> Result<(), SmlError> {
        let body = soap::envelope(|w| {
            write_publisher(w, "lrs:CreateServiceMetadataPublisherService", smp_id, addresses)
        })?;
        self.send("createIn", body).await.map(drop)
    }

    /// Read the SMP entry.
    pub async fn read(&self, smp_id: &str) -> Result<ServiceMetadataPublisher, SmlError> {
        let body = soap::envelope(|w| {
            element(w, "lrs:ReadServiceMetadataPublisherService", |w| {
                text_element(w, "lrs:ServiceMetadataPublisherID", smp_id)
            })
        })?;
        let response = self.send("readIn", body).await?;
        let doc = roxmltree::Document::parse(&response).map_err(|e| {
            SmlError::UnexpectedResponse {
                status: 200,
                message: e.to_string(),
            }
        })?;
        let field = |name: &str| {
            soap::locator_text(&doc, name).ok_or_else(|| SmlError::UnexpectedResponse {
                status: 200,
                message: format!("element {name} is missing"),
            })
        };
        Ok(ServiceMetadataPublisher {
            smp_id: field("ServiceMetadataPublisherID")?,
            physical_address: field("PhysicalAddress")?,
            logical_address: field("LogicalAddress")?,
        })
    }

    /// Change the addresses of the SMP.
    pub async fn update(&self, smp_id: &str, addresses: &SmpAddresses) -> Result<(), SmlError> {
        let body = soap::envelope(|w| {
            write_publisher(w, "lrs:UpdateServiceMetadataPublisherService", smp_id, addresses)
        })?;
        self.send("updateIn", body).await.map(drop)
    }

    /// Remove the SMP and all its participants.
    pub async fn delete(&self, smp_id: &str) -> Result<(), SmlError> {
        let body = soap::envelope(|w| {
            element(w, "lrs:DeleteServiceMetadataPublisherService", |w| {
                text_element(w, "lrs:ServiceMetadataPublisherID", smp_id)
            })
        })?;
        self.send("deleteIn", body).await.map(drop)
    }

    async fn send(&self, operation: &str, body: String) -> Result<String, SmlError> {
        let action = format!("{ACTION_PREFIX}:{operation}");
        soap::call(self.http, &self.url, &action, body).await
    }
}

fn write_publisher(
    w: &mut XmlWriter,
    name: &str,
    smp_id: &str,
    addresses: &SmpAddresses,
) -> Result<(), SmlError> {
    element(w, name, |w| {
        text_element(w, "lrs:ServiceMetadataPublisherID", smp_id)?;
        element(w, "lrs:PublisherEndpoint", |w| {
            text_element(w, "lrs:LogicalAddress", &addresses.logical)?;
            text_element(w, "lrs:PhysicalAddress", &addresses.physical.to_string())
        })
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn publisher_body_carries_both_addresses() {
        let addresses = smp_core::validate_smp_addresses("10.0.0.1", "http://smp.example.org").unwrap();
        let xml = soap::envelope(|w| {
            write_publisher(w, "lrs:CreateServiceMetadataPublisherService", "SMP-1", &addresses)
        })
        .unwrap();
        let doc = roxmltree::Document::parse(&xml).unwrap();
        assert_eq!(soap::locator_text(&doc, "ServiceMetadataPublisherID").as_deref(), Some("SMP-1"));
        assert_eq!(soap::locator_text(&doc, "PhysicalAddress").as_deref(), Some("10.0.0.1"));
        assert_eq!(
            soap::locator_text(&doc, "LogicalAddress").as_deref(),
            Some("http://smp.example.org")
        );
    }
}
