//! Segmented payload assembler: rebuilds payloads from first + consecutive frames,
//! one reassembly slot per remote sender.
//!
//! The pool size `N` selects the dialect. `N = 1` is the simple endpoint that tracks a
//! single inbound transfer (a new first frame from anyone supersedes it); `N > 1`
//! keys slots by sender so several peers can stream at once.
use super::{next_sequence, TpFrame, TpPdu, MAX_TP_PAYLOAD};
use crate::error::ProtocolViolation;
use crate::protocol::transport::TP_REASSEMBLY_TIMEOUT_US;

//==================================================================================Enums and Structs
#[derive(Debug, PartialEq, Eq)]
pub enum AssemblyResult {
    /// Frame does not take part in reassembly (flow control).
    Ignored,
    /// First frame accepted; the sender now expects a flow-control continue.
    FirstAccepted { sender: u8 },
    /// Consecutive frame integrated but more bytes are still outstanding.
    FragmentConsumed,
    /// The payload is complete and handed over.
    MessageComplete(CompletedPayload),
}

/// Reassembled payload, copied out of the slot that produced it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompletedPayload {
    /// Peer that sent the payload.
    pub sender: u8,
    /// Reassembled bytes.
    pub payload: [u8; MAX_TP_PAYLOAD],
    /// Number of valid bytes.
    pub len: usize,
}

impl CompletedPayload {
    fn from_slice(sender: u8, data: &[u8]) -> Self {
        let mut payload = [0u8; MAX_TP_PAYLOAD];
        let len = data.len().min(MAX_TP_PAYLOAD);
        payload[..len].copy_from_slice(&data[..len]);
        Self {
            sender,
            payload,
            len,
        }
    }

    /// Valid payload bytes.
    pub fn as_slice(&self) -> &[u8] {
        &self.payload[..self.len]
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
enum SlotState {
    Idle,
    Receiving,
}

/// Per-peer reassembly state.
#[derive(Debug, Clone)]
struct ReassemblyState {
    state: SlotState,
    sender_id: u8,
    accumulated_data: [u8; MAX_TP_PAYLOAD],
    received: usize,
    outstanding_byte_count: usize,
    next_sequence: u8,
    last_activity_us: u64,
}

impl ReassemblyState {
    const fn new() -> Self {
        Self {
            state: SlotState::Idle,
            sender_id: 0,
            accumulated_data: [0; MAX_TP_PAYLOAD],
            received: 0,
            outstanding_byte_count: 0,
            next_sequence: 1,
            last_activity_us: 0,
        }
    }

    fn is_receiving(&self) -> bool {
        self.state == SlotState::Receiving
    }

    /// Back to idle; no partial payload survives.
    fn reset(&mut self) {
        self.state = SlotState::Idle;
        self.received = 0;
        self.outstanding_byte_count = 0;
        self.next_sequence = 1;
        // The buffer is overwritten by the next transfer.
    }

    fn append(&mut self, chunk: &[u8]) {
        let count = chunk.len().min(self.outstanding_byte_count);
        self.accumulated_data[self.received..self.received + count]
            .copy_from_slice(&chunk[..count]);
        self.received += count;
        self.outstanding_byte_count -= count;
    }
}

/// Main assembler: owns a fixed pool of reusable reassembly slots.
#[derive(Debug, Clone)]
pub struct TpAssembler<const N: usize = 1> {
    slots: [ReassemblyState; N],
}

impl<const N: usize> Default for TpAssembler<N> {
    fn default() -> Self {
        Self::new()
    }
}

impl<const N: usize> TpAssembler<N> {
    /// Instantiate the assembler with an idle slot pool.
    pub const fn new() -> Self {
        Self {
            slots: [const { ReassemblyState::new() }; N],
        }
    }

    /// True while a transfer from `sender` is being reassembled.
    pub fn is_receiving(&self, sender: u8) -> bool {
        self.slots
            .iter()
            .any(|slot| slot.is_receiving() && slot.sender_id == sender)
    }

    /// Number of transfers currently in progress.
    pub fn active_transfers(&self) -> usize {
        self.slots.iter().filter(|slot| slot.is_receiving()).count()
    }

    /// Drop every transfer idle for longer than [`TP_REASSEMBLY_TIMEOUT_US`].
    pub fn evict_stale(&mut self, now_us: u64) {
        for slot in self.slots.iter_mut().filter(|slot| slot.is_receiving()) {
            if now_us.saturating_sub(slot.last_activity_us) > TP_REASSEMBLY_TIMEOUT_US {
                #[cfg(feature = "defmt")]
                defmt::warn!(
                    "Evicting stale transfer from {:x} ({} bytes outstanding)",
                    slot.sender_id,
                    slot.outstanding_byte_count
                );
                slot.reset();
            }
        }
    }

    //==================================================================================Process Functions
    /// Process one segmentation frame.
    ///
    /// * `pdu` – parsed frame, already filtered on recipient
    /// * `timestamp_us` – adapter timestamp of the frame, drives stale-slot eviction
    ///
    /// A consecutive frame with the wrong sequence or sender resets the affected slot
    /// and reports a [`ProtocolViolation`].
    pub fn process(
        &mut self,
        pdu: &TpPdu<'_>,
        timestamp_us: u64,
    ) -> Result<AssemblyResult, ProtocolViolation> {
        self.evict_stale(timestamp_us);
        let sender = pdu.sender;

        match pdu.frame {
            TpFrame::Single { data } => {
                // A single frame supersedes anything the sender had in flight.
                if let Some(slot) = self.slot_of(sender) {
                    slot.reset();
                }
                Ok(AssemblyResult::MessageComplete(
                    CompletedPayload::from_slice(sender, data),
                ))
            }
            TpFrame::First { total_len, data } => {
                if total_len == 0 || total_len > MAX_TP_PAYLOAD {
                    return Err(ProtocolViolation::LengthOutOfRange { length: total_len });
                }
                let slot = self.claim_slot(sender);
                slot.state = SlotState::Receiving;
                slot.sender_id = sender;
                slot.received = 0;
                slot.outstanding_byte_count = total_len;
                slot.next_sequence = 1;
                slot.last_activity_us = timestamp_us;
                slot.append(data);

                #[cfg(feature = "defmt")]
                defmt::debug!(
                    "Reassembly started for {:x}: {} bytes, {} outstanding",
                    sender,
                    total_len,
                    slot.outstanding_byte_count
                );

                if slot.outstanding_byte_count == 0 {
                    let done = CompletedPayload::from_slice(
                        sender,
                        &slot.accumulated_data[..slot.received],
                    );
                    slot.reset();
                    return Ok(AssemblyResult::MessageComplete(done));
                }
                Ok(AssemblyResult::FirstAccepted { sender })
            }
            TpFrame::Consecutive { sequence, data } => {
                let slot = match self.receiving_slot_of(sender) {
                    Some(index) => &mut self.slots[index],
                    None => return Err(self.stray_consecutive(sender)),
                };

                if sequence != slot.next_sequence {
                    let expected = slot.next_sequence;
                    slot.reset();
                    #[cfg(feature = "defmt")]
                    defmt::warn!(
                        "Sequence error from {:x}: expected {}, got {}",
                        sender,
                        expected,
                        sequence
                    );
                    return Err(ProtocolViolation::UnexpectedSequence {
                        sender,
                        expected,
                        actual: sequence,
                    });
                }

                slot.append(data);
                slot.next_sequence = next_sequence(slot.next_sequence);
                slot.last_activity_us = timestamp_us;

                if slot.outstanding_byte_count == 0 {
                    let done = CompletedPayload::from_slice(
                        sender,
                        &slot.accumulated_data[..slot.received],
                    );
                    slot.reset();
                    #[cfg(feature = "defmt")]
                    defmt::debug!("Reassembly complete for {:x}: {} bytes", sender, done.len);
                    return Ok(AssemblyResult::MessageComplete(done));
                }
                Ok(AssemblyResult::FragmentConsumed)
            }
            TpFrame::FlowControl { .. } => Ok(AssemblyResult::Ignored),
        }
    }

    //==================================================================================Slot selection
    fn slot_of(&mut self, sender: u8) -> Option<&mut ReassemblyState> {
        self.slots
            .iter_mut()
            .find(|slot| slot.is_receiving() && slot.sender_id == sender)
    }

    fn receiving_slot_of(&self, sender: u8) -> Option<usize> {
        self.slots
            .iter()
            .position(|slot| slot.is_receiving() && slot.sender_id == sender)
    }

    /// Slot for a new transfer: the sender's own, then an idle one, then the least
    /// recently active one.
    fn claim_slot(&mut self, sender: u8) -> &mut ReassemblyState {
        let index = self
            .receiving_slot_of(sender)
            .or_else(|| self.slots.iter().position(|slot| !slot.is_receiving()))
            .unwrap_or_else(|| {
                self.slots
                    .iter()
                    .enumerate()
                    .min_by_key(|(_, slot)| slot.last_activity_us)
                    .map(|(index, _)| index)
                    .unwrap_or(0)
            });

        #[cfg(feature = "defmt")]
        if self.slots[index].is_receiving() {
            defmt::warn!(
                "Transfer from {:x} superseded by {:x}",
                self.slots[index].sender_id,
                sender
            );
        }

        &mut self.slots[index]
    }

    /// Consecutive frame from a sender with no open slot.
    fn stray_consecutive(&mut self, sender: u8) -> ProtocolViolation {
        // The single-slot endpoint only knows one peer: a stray sender breaks its transfer.
        if N == 1 && self.slots[0].is_receiving() {
            let expected = self.slots[0].sender_id;
            self.slots[0].reset();
            return ProtocolViolation::UnexpectedSender {
                expected,
                actual: sender,
            };
        }
        ProtocolViolation::NoTransferInProgress { sender }
    }
}
