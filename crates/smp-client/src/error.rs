//! Error types of the outbound clients.

use thiserror::Error;

use crate::config::ConfigError;

/// Failure of an SML call.
#[derive(Error, Debug)]
pub enum SmlError {
    /// The SML rejected the request as malformed.
    #[error("SML rejected the request: {0}")]
    BadRequest(String),

    /// The SML failed internally.
    #[error("SML internal error: {0}")]
    InternalError(String),

    /// The client certificate is not authorised for this operation.
    #[error("not authorised at the SML: {0}")]
    Unauthorized(String),

    /// The SMP or participant is unknown to the SML.
    #[error("not found at the SML: {0}")]
    NotFound(String),

    /// A SOAP fault without a known detail element.
    #[error("SOAP fault {code}: {message}")]
    Fault {
        /// `faultcode` of the fault.
        code: String,
        /// `faultstring` of the fault.
        message: String,
    },

    /// Transport failure.
    #[error("HTTP error calling {endpoint}: {source}")]
    Http {
        /// SOAP action or URL that was called.
        endpoint: String,
        /// Underlying error.
        source: reqwest::Error,
    },

    /// The response is neither a result nor a fault.
    #[error("unexpected SML response (HTTP {status}): {message}")]
    UnexpectedResponse {
        /// HTTP status.
        status: u16,
        /// What was wrong.
        message: String,
    },

    /// Writing the request envelope failed.
    #[error("failed to build SOAP request: {0}")]
    Request(String),

    /// Invalid client configuration.
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),
}

impl SmlError {
    /// Technical class of the error as recorded in the audit trail.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::BadRequest(_) => "BadRequestFault",
            Self::InternalError(_) => "InternalErrorFault",
            Self::Unauthorized(_) => "UnauthorizedFault",
            Self::NotFound(_) => "NotFoundFault",
            Self::Fault { .. } => "SoapFault",
            Self::Http { .. } => "Http",
            Self::UnexpectedResponse { .. } => "UnexpectedResponse",
            Self::Request(_) => "Request",
            Self::Config(_) => "Config",
        }
    }
}

impl From<quick_xml::Error> for SmlError {
    fn from(e: quick_xml::Error) -> Self {
        Self::Request(e.to_string())
    }
}

impl From<std::io::Error> for SmlError {
    fn from(e: std::io::Error) -> Self {
        Self::Request(e.to_string())
    }
}

/// Failure of a Directory call.
#[derive(Error, Debug)]
pub enum DirectoryError {
    /// Transport failure.
    #[error("HTTP error calling {endpoint}: {source}")]
    Http {
        /// Method and path that was called.
        endpoint: String,
        /// Underlying error.
        source: reqwest::Error,
    },

    /// The Directory returned a non-2xx status.
    #[error("Directory returned {status}: {body}")]
    Api {
        /// HTTP status.
        status: u16,
        /// Response body.
        body: String,
    },

    /// Invalid client configuration.
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),
}

impl DirectoryError {
    /// Technical class of the error as recorded in the audit trail.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Http { .. } => "Http",
            Self::Api { .. } => "DirectoryApi",
            Self::Config(_) => "Config",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fault_kinds_are_stable() {
        assert_eq!(SmlError::BadRequest("x".into()).kind(), "BadRequestFault");
        assert_eq!(SmlError::Unauthorized("x".into()).kind(), "UnauthorizedFault");
        assert_eq!(
            SmlError::Fault {
                code: "soap:Server".into(),
                message: "boom".into()
            }
            .to_string(),
            "SOAP fault soap:Server: boom"
        );
        assert_eq!(
            DirectoryError::Api {
                status: 403,
                body: "denied".into()
            }
            .kind(),
            "DirectoryApi"
        );
    }
}
