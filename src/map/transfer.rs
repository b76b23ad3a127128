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

//! Outgoing payload fragmentation.
//!
//! The transport accepts as much of a payload as fits in one packet and
//! reports how many bytes it took. Whatever is left stays in an
//! [`OutgoingTransfer`] owned by the channel until the next continuation.

use tracing::{debug, warn};

/// Buffered payload awaiting continuation round-trips.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutgoingTransfer {
    data: Vec<u8>,
    sent: usize,
    is_final: bool,
}

impl OutgoingTransfer {
    pub fn new(data: Vec<u8>, is_final: bool) -> Self {
        Self {
            data,
            sent: 0,
            is_final,
        }
    }

    pub fn total_len(&self) -> usize {
        self.data.len()
    }

    pub fn sent(&self) -> usize {
        self.sent
    }

    /// The caller's Final flag for the logical message.
    pub fn is_final(&self) -> bool {
        self.is_final
    }

    /// Unsent bytes.
    pub fn remaining(&self) -> &[u8] {
        &self.data[self.sent..]
    }

    /// Record that the transport accepted `n` more bytes.
    pub fn advance(&mut self, n: usize) {
        let remaining = self.data.len() - self.sent;
        if n > remaining {
            warn!(
                "Transport reported {} bytes sent with only {} remaining",
                n, remaining
            );
        }
        self.sent += n.min(remaining);
        debug!("Transfer progress: {}/{} bytes", self.sent, self.data.len());
    }

    pub fn is_complete(&self) -> bool {
        self.sent >= self.data.len()
    }
}

/// Account for a submission of `payload` that the transport accepted
/// `accepted` bytes of. Returns the transfer to keep buffered, if any.
pub fn remainder_after(payload: Vec<u8>, accepted: usize, is_final: bool) -> Option<OutgoingTransfer> {
    let mut transfer = OutgoingTransfer::new(payload, is_final);
    transfer.advance(accepted);
    if transfer.is_complete() {
        None
    } else {
        Some(transfer)
    }
}
