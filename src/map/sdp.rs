// Copyright 2026 Daniel Pelikan
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Extraction of remote message access services from cached SDP records.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::error::{MapError, Result};

use super::constants::{attributes, MESSAGE_ACCESS_SERVER_UUID, RFCOMM_PROTOCOL_UUID};

/// Bluetooth base UUID, used to widen 16-bit short forms.
const BASE_UUID: u128 = 0x00000000_0000_1000_8000_00805F9B34FB;

/// A decoded SDP data element.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum SdpDataElement {
    Nil,
    Uint(u32),
    Int(i32),
    Bool(bool),
    Uuid16(u16),
    Uuid(Uuid),
    Text(String),
    Url(String),
    Sequence(Vec<SdpDataElement>),
    Alternative(Vec<SdpDataElement>),
}

impl SdpDataElement {
    fn as_uuid(&self) -> Option<Uuid> {
        match self {
            Self::Uuid16(short) => Some(Uuid::from_u128(BASE_UUID | ((*short as u128) << 96))),
            Self::Uuid(uuid) => Some(*uuid),
            _ => None,
        }
    }

    fn as_uint(&self) -> Option<u32> {
        match self {
            Self::Uint(value) => Some(*value),
            _ => None,
        }
    }

    fn as_sequence(&self) -> Option<&[SdpDataElement]> {
        match self {
            Self::Sequence(items) | Self::Alternative(items) => Some(items),
            _ => None,
        }
    }
}

/// One cached service record: attribute id to value.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SdpRecord {
    pub attributes: BTreeMap<u16, SdpDataElement>,
}

impl SdpRecord {
    pub fn with_attribute(mut self, id: u16, value: SdpDataElement) -> Self {
        self.attributes.insert(id, value);
        self
    }

    fn has_service_class(&self, class: Uuid) -> bool {
        self.attributes
            .get(&attributes::SERVICE_CLASS_ID_LIST)
            .and_then(SdpDataElement::as_sequence)
            .map(|classes| classes.iter().any(|c| c.as_uuid() == Some(class)))
            .unwrap_or(false)
    }
}

/// A message access server advertised by a remote device.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceDetails {
    pub port: u32,
    pub instance_id: u32,
    pub supported_message_types: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub service_name: Option<String>,
}

/// Find every message access server among `records`.
pub fn parse_remote_services(records: &[SdpRecord]) -> Result<Vec<ServiceDetails>> {
    if records.is_empty() {
        return Err(MapError::ServiceDataNotAvailable);
    }

    let mut services = Vec::new();
    for record in records
        .iter()
        .filter(|r| r.has_service_class(MESSAGE_ACCESS_SERVER_UUID))
    {
        services.push(parse_record(record)?);
    }

    debug!("Found {} message access services", services.len());
    Ok(services)
}

fn parse_record(record: &SdpRecord) -> Result<ServiceDetails> {
    let port = record
        .attributes
        .get(&attributes::PROTOCOL_DESCRIPTOR_LIST)
        .and_then(rfcomm_channel)
        .ok_or_else(|| {
            warn!("Message access record without an RFCOMM channel");
            MapError::InvalidServiceData
        })?;

    let instance_id = record
        .attributes
        .get(&attributes::MAS_INSTANCE_ID)
        .and_then(SdpDataElement::as_uint)
        .ok_or(MapError::InvalidServiceData)?;

    let supported_message_types = record
        .attributes
        .get(&attributes::SUPPORTED_MESSAGE_TYPES)
        .and_then(SdpDataElement::as_uint)
        .ok_or(MapError::InvalidServiceData)?;

    let service_name = match record.attributes.get(&attributes::SERVICE_NAME) {
        Some(SdpDataElement::Text(name)) => Some(name.clone()),
        Some(_) => return Err(MapError::InvalidServiceData),
        None => None,
    };

    Ok(ServiceDetails {
        port,
        instance_id,
        supported_message_types,
        service_name,
    })
}

fn rfcomm_channel(descriptors: &SdpDataElement) -> Option<u32> {
    descriptors.as_sequence()?.iter().find_map(|protocol| {
        let parts = protocol.as_sequence()?;
        if parts.first()?.as_uuid()? == RFCOMM_PROTOCOL_UUID {
            parts.get(1)?.as_uint()
        } else {
            None
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn mas_record(port: u32, instance: u32) -> SdpRecord {
        SdpRecord::default()
            .with_attribute(
                attributes::SERVICE_CLASS_ID_LIST,
                SdpDataElement::Sequence(vec![SdpDataElement::Uuid16(0x1132)]),
            )
            .with_attribute(
                attributes::PROTOCOL_DESCRIPTOR_LIST,
                SdpDataElement::Sequence(vec![
                    SdpDataElement::Sequence(vec![SdpDataElement::Uuid16(0x0100)]),
                    SdpDataElement::Sequence(vec![
                        SdpDataElement::Uuid16(0x0003),
                        SdpDataElement::Uint(port),
                    ]),
                    SdpDataElement::Sequence(vec![SdpDataElement::Uuid16(0x0008)]),
                ]),
            )
            .with_attribute(attributes::MAS_INSTANCE_ID, SdpDataElement::Uint(instance))
            .with_attribute(attributes::SUPPORTED_MESSAGE_TYPES, SdpDataElement::Uint(0x6))
    }

    #[test]
    fn test_short_uuid_widening() {
        assert_eq!(
            SdpDataElement::Uuid16(0x1132).as_uuid(),
            Some(MESSAGE_ACCESS_SERVER_UUID)
        );
    }

    #[test]
    fn test_parse_filters_by_service_class() {
        let other = SdpRecord::default().with_attribute(
            attributes::SERVICE_CLASS_ID_LIST,
            SdpDataElement::Sequence(vec![SdpDataElement::Uuid16(0x1105)]),
        );
        let named = mas_record(4, 1).with_attribute(
            attributes::SERVICE_NAME,
            SdpDataElement::Text("SMS/MMS".into()),
        );

        let services = parse_remote_services(&[mas_record(2, 0), other, named]).unwrap();
        assert_eq!(services.len(), 2);
        assert_eq!(services[0].port, 2);
        assert_eq!(services[0].service_name, None);
        assert_eq!(services[1].instance_id, 1);
        assert_eq!(services[1].supported_message_types, 0x6);
        assert_eq!(services[1].service_name.as_deref(), Some("SMS/MMS"));
    }

    #[test]
    fn test_empty_cache() {
        assert!(matches!(
            parse_remote_services(&[]),
            Err(MapError::ServiceDataNotAvailable)
        ));
    }

    #[test]
    fn test_inconsistent_record() {
        let mut broken = mas_record(2, 0);
        broken.attributes.remove(&attributes::PROTOCOL_DESCRIPTOR_LIST);
        assert!(matches!(
            parse_remote_services(&[broken]),
            Err(MapError::InvalidServiceData)
        ));
    }

    #[test]
    fn test_record_json() {
        let json = serde_json::to_string(&mas_record(3, 2)).unwrap();
        let back: SdpRecord = serde_json::from_str(&json).unwrap();
        assert_eq!(parse_record(&back).unwrap().port, 3);
    }
}
