use quick_xml::events::{BytesDecl, BytesEnd, BytesStart, BytesText, Event};
use quick_xml::Writer;
use smp_core::{Extension, ParticipantId};

use super::*;
use crate::business_card::{BusinessCard, BusinessCardEntity, REGISTRATION_DATE_FORMAT};
use crate::migration::MigrationState;
use crate::redirect::Redirect;
use crate::service_group::ServiceGroup;
use crate::service_info::{Endpoint, Process, ServiceInformation};

type XmlWriter = Writer<Vec<u8>>;

impl Exchange<'_> {
    /// Export every service group.
    pub fn export_all(&self) -> Result<String, ExchangeError> {
        self.export_groups(self.ctx.service_groups().get_all())
    }

    /// Export the service groups owned by `owner`.
    pub fn export_of_owner(&self, owner: &str) -> Result<String, ExchangeError> {
        self.export_groups(self.ctx.service_groups().get_all_of_owner(owner))
    }

    /// Export the given service groups. Unknown participants are skipped.
    pub fn export_selected(&self, participants: &[ParticipantId]) -> Result<String, ExchangeError> {
        let registry = self.ctx.service_groups();
        let mut groups: Vec<ServiceGroup> =
            participants.iter().filter_map(|p| registry.get(p)).collect();
        groups.sort_by(|a, b| a.participant_id.cmp(&b.participant_id));
        groups.dedup_by(|a, b| a.participant_id == b.participant_id);
        self.export_groups(groups)
    }

    /// Export the service groups with an outbound migration in progress,
    /// for handing them over to the SMP taking them over.
    pub fn export_outbound_migrations_in_progress(&self) -> Result<String, ExchangeError> {
        let participants: Vec<ParticipantId> = self
            .ctx
            .participant_migrations()
            .all_outbound(Some(MigrationState::InProgress))
            .into_iter()
            .map(|m| m.participant_id)
            .collect();
        self.export_selected(&participants)
    }

    fn export_groups(&self, groups: Vec<ServiceGroup>) -> Result<String, ExchangeError> {
        let include_cards = self.ctx.settings().get().directory_integration_enabled;
        let mut w = Writer::new_with_indent(Vec::new(), b' ', 2);
        w.write_event(Event::Decl(BytesDecl::new("1.0", Some("UTF-8"), None)))?;
        let mut root = BytesStart::new(ELEMENT_ROOT);
        root.push_attribute((ATTR_VERSION, VERSION_1_0));
        w.write_event(Event::Start(root))?;

        let service_info = self.ctx.service_information();
        let redirects = self.ctx.redirects();
        for group in &groups {
            let mut infos = service_info.get_all_of_service_group(&group.participant_id);
            infos.sort_by(|a, b| a.document_type_id.cmp(&b.document_type_id));
            let mut group_redirects = redirects.get_all_of_service_group(&group.participant_id);
            group_redirects.sort_by(|a, b| a.document_type_id.cmp(&b.document_type_id));
            write_service_group(&mut w, group, &infos, &group_redirects)?;
        }

        let mut cards = 0;
        if include_cards {
            let registry = self.ctx.business_cards();
            for group in &groups {
                if let Some(card) = registry.get(&group.participant_id) {
                    write_business_card(&mut w, &card)?;
                    cards += 1;
                }
            }
        }

        w.write_event(Event::End(BytesEnd::new(ELEMENT_ROOT)))?;
        tracing::info!(
            service_groups = groups.len(),
            business_cards = cards,
            "exported service groups"
        );
        Ok(String::from_utf8(w.into_inner())?)
    }
}

fn write_text_element(w: &mut XmlWriter, name: &str, text: &str) -> Result<(), ExchangeError> {
    w.write_event(Event::Start(BytesStart::new(name)))?;
    w.write_event(Event::Text(BytesText::new(text)))?;
    w.write_event(Event::End(BytesEnd::new(name)))?;
    Ok(())
}

fn write_extension(w: &mut XmlWriter, extension: Option<&Extension>) -> Result<(), ExchangeError> {
    match extension {
        Some(ext) => write_text_element(w, ELEMENT_EXTENSION, ext.as_str()),
        None => Ok(()),
    }
}

fn write_service_group(
    w: &mut XmlWriter,
    group: &ServiceGroup,
    infos: &[ServiceInformation],
    redirects: &[Redirect],
) -> Result<(), ExchangeError> {
    let mut start = BytesStart::new(ELEMENT_SERVICEGROUP);
    start.push_attribute((ATTR_PARTICIPANT, group.participant_id.uri_encoded().as_str()));
    start.push_attribute((ATTR_OWNER_ID, group.owner_id.as_str()));
    w.write_event(Event::Start(start))?;
    write_extension(w, group.extension.as_ref())?;

    for info in infos {
        let mut start = BytesStart::new(ELEMENT_SERVICEINFO);
        start.push_attribute((ATTR_DOCTYPE, info.document_type_id.uri_encoded().as_str()));
        w.write_event(Event::Start(start))?;
        write_extension(w, info.extension.as_ref())?;
        for process in &info.processes {
            write_process(w, process)?;
        }
        w.write_event(Event::End(BytesEnd::new(ELEMENT_SERVICEINFO)))?;
    }

    for redirect in redirects {
        let mut start = BytesStart::new(ELEMENT_REDIRECT);
        start.push_attribute((ATTR_DOCTYPE, redirect.document_type_id.uri_encoded().as_str()));
        start.push_attribute((ATTR_TARGET_HREF, redirect.target_href.as_str()));
        start.push_attribute((ATTR_SUID, redirect.subject_unique_identifier.as_str()));
        if redirect.certificate.is_none() && redirect.extension.is_none() {
            w.write_event(Event::Empty(start))?;
            continue;
        }
        w.write_event(Event::Start(start))?;
        if let Some(cert) = &redirect.certificate {
            write_text_element(w, ELEMENT_CERTIFICATE, cert.as_base64())?;
        }
        write_extension(w, redirect.extension.as_ref())?;
        w.write_event(Event::End(BytesEnd::new(ELEMENT_REDIRECT)))?;
    }

    w.write_event(Event::End(BytesEnd::new(ELEMENT_SERVICEGROUP)))?;
    Ok(())
}

fn write_process(w: &mut XmlWriter, process: &Process) -> Result<(), ExchangeError> {
    let mut start = BytesStart::new(ELEMENT_PROCESS);
    start.push_attribute((ATTR_PROCESS, process.process_id.uri_encoded().as_str()));
    w.write_event(Event::Start(start))?;
    write_extension(w, process.extension.as_ref())?;
    for endpoint in &process.endpoints {
        write_endpoint(w, endpoint)?;
    }
    w.write_event(Event::End(BytesEnd::new(ELEMENT_PROCESS)))?;
    Ok(())
}

fn write_endpoint(w: &mut XmlWriter, endpoint: &Endpoint) -> Result<(), ExchangeError> {
    let mut start = BytesStart::new(ELEMENT_ENDPOINT);
    start.push_attribute((ATTR_TRANSPORT_PROFILE, endpoint.transport_profile.as_str()));
    if let Some(reference) = &endpoint.endpoint_reference {
        start.push_attribute((ATTR_ENDPOINT_REFERENCE, reference.as_str()));
    }
    let signature = if endpoint.require_business_level_signature {
        "true"
    } else {
        "false"
    };
    start.push_attribute((ATTR_REQUIRE_SIGNATURE, signature));
    if let Some(level) = &endpoint.minimum_authentication_level {
        start.push_attribute((ATTR_MIN_AUTH_LEVEL, level.as_str()));
    }
    if let Some(activation) = endpoint.activation_date {
        start.push_attribute((ATTR_ACTIVATION, activation.to_rfc3339().as_str()));
    }
    if let Some(expiration) = endpoint.expiration_date {
        start.push_attribute((ATTR_EXPIRATION, expiration.to_rfc3339().as_str()));
    }
    start.push_attribute((ATTR_TECH_CONTACT, endpoint.technical_contact_url.as_str()));
    if let Some(info) = &endpoint.technical_information_url {
        start.push_attribute((ATTR_TECH_INFO, info.as_str()));
    }
    w.write_event(Event::Start(start))?;
    write_text_element(w, ELEMENT_CERTIFICATE, endpoint.certificate.as_base64())?;
    write_text_element(w, ELEMENT_SERVICE_DESCRIPTION, &endpoint.service_description)?;
    write_extension(w, endpoint.extension.as_ref())?;
    w.write_event(Event::End(BytesEnd::new(ELEMENT_ENDPOINT)))?;
    Ok(())
}

fn write_business_card(w: &mut XmlWriter, card: &BusinessCard) -> Result<(), ExchangeError> {
    let mut start = BytesStart::new(ELEMENT_BUSINESSCARD);
    start.push_attribute((ATTR_SERVICEGROUP_ID, card.service_group_id.uri_encoded().as_str()));
    w.write_event(Event::Start(start))?;
    for entity in &card.entities {
        write_entity(w, entity)?;
    }
    w.write_event(Event::End(BytesEnd::new(ELEMENT_BUSINESSCARD)))?;
    Ok(())
}

fn write_entity(w: &mut XmlWriter, entity: &BusinessCardEntity) -> Result<(), ExchangeError> {
    let mut start = BytesStart::new(ELEMENT_ENTITY);
    start.push_attribute((ATTR_ID, entity.id.as_str()));
    start.push_attribute((ATTR_NAME, entity.name.as_str()));
    start.push_attribute((ATTR_COUNTRY, entity.country_code.as_str()));
    if let Some(date) = entity.registration_date {
        start.push_attribute((
            ATTR_REGISTRATION_DATE,
            date.format(REGISTRATION_DATE_FORMAT).to_string().as_str(),
        ));
    }
    w.write_event(Event::Start(start))?;

    if let Some(geo) = &entity.geo_info {
        write_text_element(w, ELEMENT_GEOINFO, geo)?;
    }
    for identifier in &entity.identifiers {
        let mut elem = BytesStart::new(ELEMENT_IDENTIFIER);
        elem.push_attribute((ATTR_SCHEME, identifier.scheme.as_str()));
        elem.push_attribute((ATTR_VALUE, identifier.value.as_str()));
        w.write_event(Event::Empty(elem))?;
    }
    for uri in &entity.website_uris {
        write_text_element(w, ELEMENT_WEBSITE, uri)?;
    }
    for contact in &entity.contacts {
        let mut elem = BytesStart::new(ELEMENT_CONTACT);
        elem.push_attribute((ATTR_TYPE, contact.contact_type.as_str()));
        elem.push_attribute((ATTR_NAME, contact.name.as_str()));
        elem.push_attribute((ATTR_PHONE, contact.phone.as_str()));
        elem.push_attribute((ATTR_EMAIL, contact.email.as_str()));
        w.write_event(Event::Empty(elem))?;
    }
    if let Some(info) = &entity.additional_info {
        write_text_element(w, ELEMENT_ADDITIONAL, info)?;
    }

    w.write_event(Event::End(BytesEnd::new(ELEMENT_ENTITY)))?;
    Ok(())
}
