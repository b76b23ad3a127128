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

//! Folder names travel to and from the transport as UTF-16 code units.

use crate::error::{MapError, Result};

use super::constants::limits::MAXIMUM_FOLDER_NAME_LENGTH;

/// Encode a folder name for the transport, with a terminating NUL.
pub fn encode_name(name: &str) -> Result<Vec<u16>> {
    if name.chars().count() > MAXIMUM_FOLDER_NAME_LENGTH {
        return Err(MapError::InvalidParameter("folder name too long"));
    }
    let mut units: Vec<u16> = name.encode_utf16().collect();
    units.push(0);
    Ok(units)
}

/// Decode a name received from the transport, stopping at the first NUL.
///
/// Returns `None` for unpaired surrogates.
pub fn decode_name(units: &[u16]) -> Option<String> {
    let end = units.iter().position(|&u| u == 0).unwrap_or(units.len());
    String::from_utf16(&units[..end]).ok()
}
