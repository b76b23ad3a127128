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

//! Message Access Profile service identifiers and protocol constants.

use uuid::Uuid;

/// Message Access Server service class.
pub const MESSAGE_ACCESS_SERVER_UUID: Uuid =
    Uuid::from_u128(0x00001132_0000_1000_8000_00805F9B34FB);

/// Message Notification Server service class.
pub const MESSAGE_NOTIFICATION_SERVER_UUID: Uuid =
    Uuid::from_u128(0x00001133_0000_1000_8000_00805F9B34FB);

/// Message Access Profile descriptor.
pub const MESSAGE_ACCESS_PROFILE_UUID: Uuid =
    Uuid::from_u128(0x00001134_0000_1000_8000_00805F9B34FB);

/// RFCOMM protocol identifier inside a protocol descriptor list.
pub const RFCOMM_PROTOCOL_UUID: Uuid = Uuid::from_u128(0x00000003_0000_1000_8000_00805F9B34FB);

/// SDP attribute identifiers used by the service discovery parser.
pub mod attributes {
    pub const SERVICE_CLASS_ID_LIST: u16 = 0x0001;
    pub const PROTOCOL_DESCRIPTOR_LIST: u16 = 0x0004;
    pub const SERVICE_NAME: u16 = 0x0100;
    pub const MAS_INSTANCE_ID: u16 = 0x0315;
    pub const SUPPORTED_MESSAGE_TYPES: u16 = 0x0316;
}

/// Incoming connection requirements for a registered server.
pub mod server_flags {
    pub const REQUIRE_AUTHORIZATION: u32 = 0x0000_0001;
    pub const REQUIRE_AUTHENTICATION: u32 = 0x0000_0002;
    pub const REQUIRE_ENCRYPTION: u32 = 0x0000_0004;
}

/// Outgoing connection requirements.
pub mod connect_flags {
    pub const REQUIRE_AUTHENTICATION: u32 = 0x0000_0001;
    pub const REQUIRE_ENCRYPTION: u32 = 0x0000_0002;
}

/// Message types a server advertises in its service record.
pub mod message_types {
    pub const EMAIL: u32 = 0x0000_0001;
    pub const SMS_GSM: u32 = 0x0000_0002;
    pub const SMS_CDMA: u32 = 0x0000_0004;
    pub const MMS: u32 = 0x0000_0008;

    pub const ALL: u32 = EMAIL | SMS_GSM | SMS_CDMA | MMS;
}

/// Parameter limits enforced before any transport call.
pub mod limits {
    pub const PORT_NUMBER_MINIMUM: u32 = 1;
    pub const PORT_NUMBER_MAXIMUM: u32 = 30;

    pub const INSTANCE_ID_MINIMUM: u32 = 0;
    pub const INSTANCE_ID_MAXIMUM: u32 = 255;

    /// Message handles are at most 16 hexadecimal characters.
    pub const MESSAGE_HANDLE_LENGTH: usize = 16;

    pub const MAXIMUM_FOLDER_NAME_LENGTH: usize = 255;

    pub fn is_valid_port(port: u32) -> bool {
        (PORT_NUMBER_MINIMUM..=PORT_NUMBER_MAXIMUM).contains(&port)
    }

    pub fn is_valid_instance(instance_id: u32) -> bool {
        (INSTANCE_ID_MINIMUM..=INSTANCE_ID_MAXIMUM).contains(&instance_id)
    }

    pub fn is_valid_message_handle(handle: &str) -> bool {
        !handle.is_empty() && handle.len() <= MESSAGE_HANDLE_LENGTH
    }
}
