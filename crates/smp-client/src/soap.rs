//! SOAP 1.1 plumbing shared by the SML clients: envelope writing, the HTTP
//! round trip and fault classification.

use quick_xml::events::{BytesDecl, BytesEnd, BytesStart, BytesText, Event};
use quick_xml::Writer;
use reqwest::header::CONTENT_TYPE;

use crate::error::SmlError;

/// SOAP 1.1 envelope namespace.
pub const SOAP_ENVELOPE_NS: &str = "http://schemas.xmlsoap.org/soap/envelope/";

/// BusDox locator namespace of the SML request and response elements.
pub const LOCATOR_NS: &str = "http://busdox.org/serviceMetadata/locator/1.0/";

/// BusDox identifier namespace.
pub const IDENTIFIERS_NS: &str = "http://busdox.org/transport/identifiers/1.0/";

pub(crate) type XmlWriter = Writer<Vec<u8>>;

/// Write `<name>text</name>`.
pub(crate) fn text_element(w: &mut XmlWriter, name: &str, text: &str) -> Result<(), SmlError> {
    w.write_event(Event::Start(BytesStart::new(name)))?;
    w.write_event(Event::Text(BytesText::new(text)))?;
    w.write_event(Event::End(BytesEnd::new(name)))?;
    Ok(())
}

/// Write `<name>` around whatever `inner` writes.
pub(crate) fn element(
    w: &mut XmlWriter,
    name: &str,
    inner: impl FnOnce(&mut XmlWriter) -> Result<(), SmlError>,
) -> Result<(), SmlError> {
    w.write_event(Event::Start(BytesStart::new(name)))?;
    inner(w)?;
    w.write_event(Event::End(BytesEnd::new(name)))?;
    Ok(())
}

/// Write a complete envelope whose body is produced by `body`.
///
/// The prefixes `lrs` (locator) and `ids` (identifiers) are declared on the
/// envelope.
pub(crate) fn envelope(
    body: impl FnOnce(&mut XmlWriter) -> Result<(), SmlError>,
) -> Result<String, SmlError> {
    let mut w = Writer::new(Vec::new());
    w.write_event(Event::Decl(BytesDecl::new("1.0", Some("UTF-8"), None)))?;
    let mut start = BytesStart::new("soap:Envelope");
    start.push_attribute(("xmlns:soap", SOAP_ENVELOPE_NS));
    start.push_attribute(("xmlns:lrs", LOCATOR_NS));
    start.push_attribute(("xmlns:ids", IDENTIFIERS_NS));
    w.write_event(Event::Start(start))?;
    w.write_event(Event::Start(BytesStart::new("soap:Body")))?;
    body(&mut w)?;
    w.write_event(Event::End(BytesEnd::new("soap:Body")))?;
    w.write_event(Event::End(BytesEnd::new("soap:Envelope")))?;
    String::from_utf8(w.into_inner()).map_err(|e| SmlError::Request(e.to_string()))
}

/// Post `envelope` with the given `SOAPAction` and return the response body.
///
/// A SOAP fault is turned into the matching [`SmlError`] regardless of the
/// HTTP status.
pub(crate) async fn call(
    http: &reqwest::Client,
    url: &str,
    action: &str,
    envelope: String,
) -> Result<String, SmlError> {
    let http_err = |source| SmlError::Http {
        endpoint: action.to_string(),
        source,
    };
    tracing::debug!(url, action, "calling SML");
    let resp = http
        .post(url)
        .header(CONTENT_TYPE, "text/xml; charset=utf-8")
        .header("SOAPAction", format!("\"{action}\""))
        .body(envelope)
        .send()
        .await
        .map_err(http_err)?;
    let status = resp.status();
    let body = resp.text().await.map_err(http_err)?;

    if let Some(fault) = parse_fault(&body) {
        return Err(fault);
    }
    if !status.is_success() {
        return Err(SmlError::UnexpectedResponse {
            status: status.as_u16(),
            message: truncate(&body, 500),
        });
    }
    Ok(body)
}

/// Classify a SOAP fault contained in `body`, if there is one.
pub(crate) fn parse_fault(body: &str) -> Option<SmlError> {
    let doc = roxmltree::Document::parse(body).ok()?;
    let fault = doc
        .descendants()
        .find(|n| n.has_tag_name((SOAP_ENVELOPE_NS, "Fault")))?;
    let child_text = |name: &str| {
        fault
            .children()
            .find(|n| n.is_element() && n.tag_name().name() == name)
            .and_then(|n| n.text())
            .map(|t| t.trim().to_string())
            .unwrap_or_default()
    };
    let code = child_text("faultcode");
    let fault_string = child_text("faultstring");

    let detail = fault
        .children()
        .find(|n| n.is_element() && n.tag_name().name() == "detail")
        .and_then(|d| d.children().find(|n| n.is_element()));
    let Some(detail) = detail else {
        return Some(SmlError::Fault {
            code,
            message: fault_string,
        });
    };
    let message = detail
        .descendants()
        .find(|n| n.is_element() && n.tag_name().name() == "FaultMessage")
        .and_then(|n| n.text())
        .map(|t| t.trim().to_string())
        .filter(|t| !t.is_empty())
        .unwrap_or(fault_string);

    Some(match detail.tag_name().name() {
        "BadRequestFault" => SmlError::BadRequest(message),
        "InternalErrorFault" => SmlError::InternalError(message),
        "UnauthorizedFault" => SmlError::Unauthorized(message),
        "NotFoundFault" => SmlError::NotFound(message),
        _ => SmlError::Fault { code, message },
    })
}

/// Text of the first locator-namespace element named `name` in `body`.
pub(crate) fn locator_text(doc: &roxmltree::Document<'_>, name: &str) -> Option<String> {
    doc.descendants()
        .find(|n| n.has_tag_name((LOCATOR_NS, name)))
        .and_then(|n| n.text())
        .map(|t| t.trim().to_string())
}

fn truncate(text: &str, max: usize) -> String {
    match text.char_indices().nth(max) {
        Some((idx, _)) => format!("{}...", &text[..idx]),
        None => text.to_string(),
    }
}
