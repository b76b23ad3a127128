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

//! Bluetooth Message Access Profile session manager.
//!
//! Tracks message access servers, client connections and notification
//! channels on top of a lower transport and link manager, and routes each
//! request, response and event to the owner of the connection.

pub mod address;
pub mod bridge;
pub mod config;
pub mod error;
pub mod events;
pub mod ipc;
pub mod manager;
pub mod map;
pub mod transport;

pub use address::BdAddr;
pub use error::{DeviceError, MapError, Result, TransportError};
pub use events::{EventCallback, EventKind, MapEvent};
pub use manager::MapManager;
pub use transport::{DeviceEvent, DeviceManager, IpcSender, MapTransport, TransportEvent};
