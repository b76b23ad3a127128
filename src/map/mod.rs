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

//! Message Access Profile building blocks.

pub mod channel;
pub mod constants;
pub mod path;
pub mod registry;
pub mod sdp;
pub mod status;
pub mod transfer;
pub mod types;
pub mod unicode;

pub use channel::{ChannelSnapshot, ConnectionState, Operation, TrackingId};
pub use sdp::{parse_remote_services, SdpDataElement, SdpRecord, ServiceDetails};
pub use status::ResponseStatus;
pub use types::{
    CharSet, ClientId, ConnectionStatus, ConnectionType, FractionalType, MessageListingInfo,
    MseTime, SetFolderOption, StatusIndicator,
};
