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

//! Shared protocol vocabulary: roles, folder options, listing filters.

use chrono::NaiveDateTime;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;

/// Identifies the owner of a channel.
///
/// `ClientId::LOCAL` stands for callers inside this process; every other
/// value is the address of a remote IPC client.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ClientId(pub u32);

impl ClientId {
    pub const LOCAL: ClientId = ClientId(0);

    pub fn is_local(&self) -> bool {
        *self == Self::LOCAL
    }
}

impl fmt::Display for ClientId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_local() {
            write!(f, "local")
        } else {
            write!(f, "client-{}", self.0)
        }
    }
}

/// Role of a tracked connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionType {
    MessageAccessServer,
    MessageAccessClient,
    NotificationServer,
    NotificationClient,
}

impl ConnectionType {
    pub fn is_server(&self) -> bool {
        matches!(self, Self::MessageAccessServer | Self::NotificationServer)
    }

    pub fn is_notification(&self) -> bool {
        matches!(self, Self::NotificationServer | Self::NotificationClient)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::MessageAccessServer => "message-access server",
            Self::MessageAccessClient => "message-access client",
            Self::NotificationServer => "notification server",
            Self::NotificationClient => "notification client",
        }
    }
}

/// Outcome of an outgoing connection attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
#[repr(u32)]
pub enum ConnectionStatus {
    Success = 0,
    FailureTimeout = 1,
    FailureRefused = 2,
    FailureSecurity = 3,
    FailureDevicePowerOff = 4,
    FailureUnknown = 5,
}

impl ConnectionStatus {
    pub fn is_success(&self) -> bool {
        *self == Self::Success
    }
}

/// Navigation performed by a set-folder request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SetFolderOption {
    Root,
    Down,
    Up,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StatusIndicator {
    ReadStatus,
    DeletedStatus,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CharSet {
    Native,
    Utf8,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FractionalType {
    Unfragmented,
    First,
    Next,
    Last,
}

/// Filters and options attached to a message listing request.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MessageListingInfo {
    /// Bitmask of the optional fields below that are present.
    pub option_mask: u32,
    pub subject_length: u8,
    pub parameter_mask: u32,
    pub filter_message_type: u8,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub filter_period_begin: Option<MseTime>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub filter_period_end: Option<MseTime>,
    pub filter_read_status: u8,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub filter_recipient: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub filter_originator: Option<String>,
    pub filter_priority: u8,
}

/// A MAP timestamp: local time with an optional UTC offset.
///
/// Text form is `YYYYMMDDTHHMMSS` followed by `+HHMM`/`-HHMM` when the
/// offset is known.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MseTime {
    pub local: NaiveDateTime,
    pub utc_offset_minutes: Option<i16>,
}

const MSE_TIME_FORMAT: &str = "%Y%m%dT%H%M%S";

impl MseTime {
    pub fn new(local: NaiveDateTime) -> Self {
        Self {
            local,
            utc_offset_minutes: None,
        }
    }

    pub fn with_offset(mut self, minutes: i16) -> Self {
        self.utc_offset_minutes = Some(minutes);
        self
    }

    pub fn parse(text: &str) -> Option<Self> {
        let text = text.trim();
        let (stamp, offset) = if text.len() > 15 {
            text.split_at(15)
        } else {
            (text, "")
        };
        let local = NaiveDateTime::parse_from_str(stamp, MSE_TIME_FORMAT).ok()?;
        let utc_offset_minutes = if offset.is_empty() {
            None
        } else {
            let (sign, digits) = offset.split_at(1);
            if digits.len() != 4 || !digits.bytes().all(|b| b.is_ascii_digit()) {
                return None;
            }
            let hours: i16 = digits[..2].parse().ok()?;
            let minutes: i16 = digits[2..].parse().ok()?;
            let total = hours * 60 + minutes;
            match sign {
                "+" => Some(total),
                "-" => Some(-total),
                _ => return None,
            }
        };
        Some(Self {
            local,
            utc_offset_minutes,
        })
    }
}

impl fmt::Display for MseTime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.local.format(MSE_TIME_FORMAT))?;
        if let Some(offset) = self.utc_offset_minutes {
            let sign = if offset < 0 { '-' } else { '+' };
            let abs = offset.unsigned_abs();
            write!(f, "{}{:02}{:02}", sign, abs / 60, abs % 60)?;
        }
        Ok(())
    }
}

impl Serialize for MseTime {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for MseTime {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        MseTime::parse(&s).ok_or_else(|| serde::de::Error::custom(format!("invalid MSE time: {}", s)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn sample() -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2026, 3, 14)
            .unwrap()
            .and_hms_opt(9, 26, 53)
            .unwrap()
    }

    #[test]
    fn test_mse_time_format() {
        assert_eq!(MseTime::new(sample()).to_string(), "20260314T092653");
        assert_eq!(
            MseTime::new(sample()).with_offset(-330).to_string(),
            "20260314T092653-0530"
        );
    }

    #[test]
    fn test_mse_time_parse() {
        let parsed = MseTime::parse("20260314T092653+0100").unwrap();
        assert_eq!(parsed.local, sample());
        assert_eq!(parsed.utc_offset_minutes, Some(60));

        assert_eq!(MseTime::parse("20260314T092653").unwrap().utc_offset_minutes, None);
        assert!(MseTime::parse("20260314T0926").is_none());
        assert!(MseTime::parse("20260314T092653*0100").is_none());
    }

    #[test]
    fn test_connection_type_roles() {
        assert!(ConnectionType::MessageAccessServer.is_server());
        assert!(ConnectionType::NotificationServer.is_server());
        assert!(!ConnectionType::MessageAccessClient.is_server());
        assert!(ConnectionType::NotificationClient.is_notification());
        assert!(!ConnectionType::MessageAccessClient.is_notification());
    }

    #[test]
    fn test_listing_info_defaults_from_empty_json() {
        let info: MessageListingInfo = serde_json::from_str("{}").unwrap();
        assert_eq!(info, MessageListingInfo::default());
    }
}
