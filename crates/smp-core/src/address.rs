//! # SMP Address Validation
//!
//! An SMP registers two addresses with the SML: the physical address (an
//! IPv4 literal used for the DNS A record) and the logical address (the URL
//! clients will query). PEPPOL constrains the logical address to plain HTTP
//! on the default port with no sub-path, so both are checked locally before
//! any remote call is made.

use std::net::Ipv4Addr;

use crate::error::FieldErrors;
use crate::uri::validate_url;

/// Field name of the physical address.
pub const FIELD_PHYSICAL_ADDRESS: &str = "physicalAddress";

/// Field name of the logical address.
pub const FIELD_LOGICAL_ADDRESS: &str = "logicalAddress";

/// Validated pair of SMP addresses.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SmpAddresses {
    /// IPv4 physical address.
    pub physical: Ipv4Addr,
    /// Logical address URL as entered (trimmed).
    pub logical: String,
}

/// Parse a dotted-quad IPv4 literal byte by byte.
///
/// Exactly four decimal components in `0..=255` are accepted; shorthand
/// forms such as `127.1` are not.
pub fn parse_ipv4(text: &str) -> Option<Ipv4Addr> {
    let mut octets = [0u8; 4];
    let mut count = 0;
    for part in text.trim().split('.') {
        if count == 4 || part.is_empty() || part.len() > 3 {
            return None;
        }
        if !part.chars().all(|c| c.is_ascii_digit()) {
            return None;
        }
        octets[count] = part.parse::<u8>().ok()?;
        count += 1;
    }
    (count == 4).then(|| Ipv4Addr::from(octets))
}

/// Validate both SMP addresses, reporting every problem per field.
pub fn validate_smp_addresses(physical: &str, logical: &str) -> Result<SmpAddresses, FieldErrors> {
    let mut errors = FieldErrors::new();

    let physical_addr = parse_ipv4(physical);
    if physical_addr.is_none() {
        errors.add(
            FIELD_PHYSICAL_ADDRESS,
            "The provided physical address is not a valid IPv4 address!",
        );
    }

    let logical = logical.trim();
    if logical.is_empty() {
        errors.add(FIELD_LOGICAL_ADDRESS, "The logical address must be provided!");
    } else {
        match validate_url(logical) {
            Err(_) => errors.add(
                FIELD_LOGICAL_ADDRESS,
                "The provided logical address seems not to be a URL!",
            ),
            Ok(url) => {
                if url.scheme() != "http" {
                    errors.add(
                        FIELD_LOGICAL_ADDRESS,
                        "The logical address must use the 'http' protocol and may not use the 'https' protocol. 'https' is only allowed when the SMP is in a production environment with a certificate from a trusted CA.",
                    );
                }
                if url.port().is_some_and(|p| p != 80) {
                    errors.add(
                        FIELD_LOGICAL_ADDRESS,
                        "The logical address must use the default http port 80!",
                    );
                }
                if !matches!(url.path(), "" | "/") {
                    errors.add(
                        FIELD_LOGICAL_ADDRESS,
                        "The logical address may not contain a path, because according to the SMP specifications it must run in the root (/) path!",
                    );
                }
            }
        }
    }

    errors.into_result()?;
    match physical_addr {
        Some(physical) => Ok(SmpAddresses {
            physical,
            logical: logical.to_string(),
        }),
        None => Err(FieldErrors::single(
            FIELD_PHYSICAL_ADDRESS,
            "The provided physical address is not a valid IPv4 address!",
        )),
    }
}
