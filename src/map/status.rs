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

//! Translation between manager response statuses and OBEX response codes.

use serde::{Deserialize, Serialize};

use crate::error::{MapError, Result};

/// OBEX response codes understood by the transport, without the final bit.
pub mod obex {
    pub const CONTINUE: u8 = 0x10;
    pub const OK: u8 = 0x20;
    pub const BAD_REQUEST: u8 = 0x40;
    pub const UNAUTHORIZED: u8 = 0x41;
    pub const FORBIDDEN: u8 = 0x43;
    pub const NOT_FOUND: u8 = 0x44;
    pub const NOT_ACCEPTABLE: u8 = 0x46;
    pub const PRECONDITION_FAILED: u8 = 0x4C;
    pub const SERVER_ERROR: u8 = 0x50;
    pub const NOT_IMPLEMENTED: u8 = 0x51;
    pub const SERVICE_UNAVAILABLE: u8 = 0x53;

    /// Set on every response that ends a request/response exchange.
    pub const FINAL_BIT: u8 = 0x80;

    /// Reported by the transport when it could not submit a packet at all.
    pub const UNABLE_TO_SUBMIT: u8 = 0xFF;
}

/// Outcome carried in response events and MSE response submissions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResponseStatus {
    Success,
    NotFound,
    ServiceUnavailable,
    BadRequest,
    NotImplemented,
    Unauthorized,
    PreconditionFailed,
    NotAcceptable,
    Forbidden,
    ServerError,
    OperationAborted,
    ResourcesAborted,
    DevicePoweredOff,
    UnableToSubmitRequest,
    Unknown,
}

impl ResponseStatus {
    /// Statuses that are only ever synthesized by the manager.
    pub fn is_internal(&self) -> bool {
        matches!(
            self,
            Self::OperationAborted
                | Self::ResourcesAborted
                | Self::DevicePoweredOff
                | Self::UnableToSubmitRequest
                | Self::Unknown
        )
    }

    pub fn is_success(&self) -> bool {
        *self == Self::Success
    }

    /// Map a caller-supplied status to the OBEX code sent to the peer.
    ///
    /// Internal statuses have no wire representation and are rejected.
    pub fn to_obex(self) -> Result<u8> {
        let code = match self {
            Self::Success => obex::OK,
            Self::NotFound => obex::NOT_FOUND,
            Self::ServiceUnavailable => obex::SERVICE_UNAVAILABLE,
            Self::BadRequest => obex::BAD_REQUEST,
            Self::NotImplemented => obex::NOT_IMPLEMENTED,
            Self::Unauthorized => obex::UNAUTHORIZED,
            Self::PreconditionFailed => obex::PRECONDITION_FAILED,
            Self::NotAcceptable => obex::NOT_ACCEPTABLE,
            Self::Forbidden => obex::FORBIDDEN,
            Self::ServerError => obex::SERVER_ERROR,
            _ => return Err(MapError::InvalidParameter("internal response status")),
        };
        Ok(code)
    }

    /// Map a code received from the transport. CONTINUE counts as success;
    /// anything unrecognised is `Unknown`.
    pub fn from_obex(code: u8) -> Self {
        if code == obex::UNABLE_TO_SUBMIT {
            return Self::UnableToSubmitRequest;
        }
        match code & !obex::FINAL_BIT {
            obex::CONTINUE | obex::OK => Self::Success,
            obex::NOT_FOUND => Self::NotFound,
            obex::SERVICE_UNAVAILABLE => Self::ServiceUnavailable,
            obex::BAD_REQUEST => Self::BadRequest,
            obex::NOT_IMPLEMENTED => Self::NotImplemented,
            obex::UNAUTHORIZED => Self::Unauthorized,
            obex::PRECONDITION_FAILED => Self::PreconditionFailed,
            obex::NOT_ACCEPTABLE => Self::NotAcceptable,
            obex::FORBIDDEN => Self::Forbidden,
            obex::SERVER_ERROR => Self::ServerError,
            _ => Self::Unknown,
        }
    }
}

/// True when the code is a CONTINUE, with or without the final bit.
pub fn is_continue(code: u8) -> bool {
    code != obex::UNABLE_TO_SUBMIT && code & !obex::FINAL_BIT == obex::CONTINUE
}
