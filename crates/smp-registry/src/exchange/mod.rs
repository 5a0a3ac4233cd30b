//! # Exchange: XML import and export
//!
//! Service groups with their service information and redirects, plus
//! business cards, are exchanged as one versioned XML document:
//!
//! ```text
//! <smp-data version="1.0">
//!   <servicegroup participant="…" ownerid="…">
//!     <extension>…</extension>
//!     <serviceinfo doctypeidentifier="…">
//!       <process processidentifier="…">
//!         <endpoint transportprofile="…" endpointref="…" reqblsig="false" …>
//!           <certificate>…</certificate>
//!           <svcdescription>…</svcdescription>
//!         </endpoint>
//!       </process>
//!     </serviceinfo>
//!     <redirect doctypeidentifier="…" targethref="…" suid="…"/>
//!   </servicegroup>
//!   <businesscard servicegroupid="…">
//!     <entity name="…" country="…">…</entity>
//!   </businesscard>
//! </smp-data>
//! ```
//!
//! Extensions are carried as escaped text. Business cards are only written
//! and read while the Directory integration is enabled.

mod export;
mod import;

use thiserror::Error;

use crate::context::RegistryContext;

pub use import::{ImportAction, ImportLevel, ImportOptions, ImportSummary};

/// The only supported document version.
pub const VERSION_1_0: &str = "1.0";

pub(crate) const ELEMENT_ROOT: &str = "smp-data";
pub(crate) const ELEMENT_SERVICEGROUP: &str = "servicegroup";
pub(crate) const ELEMENT_SERVICEINFO: &str = "serviceinfo";
pub(crate) const ELEMENT_PROCESS: &str = "process";
pub(crate) const ELEMENT_ENDPOINT: &str = "endpoint";
pub(crate) const ELEMENT_REDIRECT: &str = "redirect";
pub(crate) const ELEMENT_EXTENSION: &str = "extension";
pub(crate) const ELEMENT_CERTIFICATE: &str = "certificate";
pub(crate) const ELEMENT_SERVICE_DESCRIPTION: &str = "svcdescription";
pub(crate) const ELEMENT_BUSINESSCARD: &str = "businesscard";
pub(crate) const ELEMENT_ENTITY: &str = "entity";
pub(crate) const ELEMENT_GEOINFO: &str = "geoinfo";
pub(crate) const ELEMENT_IDENTIFIER: &str = "identifier";
pub(crate) const ELEMENT_WEBSITE: &str = "website";
pub(crate) const ELEMENT_CONTACT: &str = "contact";
pub(crate) const ELEMENT_ADDITIONAL: &str = "additional";

pub(crate) const ATTR_VERSION: &str = "version";
pub(crate) const ATTR_PARTICIPANT: &str = "participant";
pub(crate) const ATTR_OWNER_ID: &str = "ownerid";
pub(crate) const ATTR_DOCTYPE: &str = "doctypeidentifier";
pub(crate) const ATTR_PROCESS: &str = "processidentifier";
pub(crate) const ATTR_TRANSPORT_PROFILE: &str = "transportprofile";
pub(crate) const ATTR_ENDPOINT_REFERENCE: &str = "endpointref";
pub(crate) const ATTR_REQUIRE_SIGNATURE: &str = "reqblsig";
pub(crate) const ATTR_MIN_AUTH_LEVEL: &str = "minauthlevel";
pub(crate) const ATTR_ACTIVATION: &str = "activation";
pub(crate) const ATTR_EXPIRATION: &str = "expiration";
pub(crate) const ATTR_TECH_CONTACT: &str = "techcontacturl";
pub(crate) const ATTR_TECH_INFO: &str = "techinfourl";
pub(crate) const ATTR_TARGET_HREF: &str = "targethref";
pub(crate) const ATTR_SUID: &str = "suid";
pub(crate) const ATTR_SERVICEGROUP_ID: &str = "servicegroupid";
pub(crate) const ATTR_ID: &str = "id";
pub(crate) const ATTR_NAME: &str = "name";
pub(crate) const ATTR_COUNTRY: &str = "country";
pub(crate) const ATTR_REGISTRATION_DATE: &str = "regdate";
pub(crate) const ATTR_SCHEME: &str = "scheme";
pub(crate) const ATTR_VALUE: &str = "value";
pub(crate) const ATTR_TYPE: &str = "type";
pub(crate) const ATTR_PHONE: &str = "phone";
pub(crate) const ATTR_EMAIL: &str = "email";

/// Errors that prevent an export, or an import from starting.
///
/// Problems with individual items of an import file are not errors of this
/// type; they are reported as [`ImportAction`]s.
#[derive(Error, Debug)]
pub enum ExchangeError {
    /// Writing the XML document failed.
    #[error("XML write error: {0}")]
    Xml(#[from] quick_xml::Error),

    /// I/O failure while writing the document.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The import document is not well-formed XML.
    #[error("XML parse error: {0}")]
    Parse(#[from] roxmltree::Error),

    /// The written document is not valid UTF-8.
    #[error("UTF-8 error: {0}")]
    Utf8(#[from] std::string::FromUtf8Error),

    /// The document declares a version other than 1.0.
    #[error("unsupported exchange version \"{0}\"")]
    UnsupportedVersion(String),

    /// The document is XML but not an exchange document.
    #[error("invalid exchange document: {0}")]
    Format(String),
}

/// Import and export over a [`RegistryContext`].
pub struct Exchange<'a> {
    pub(crate) ctx: &'a RegistryContext,
}
