//! Channel table: per-socket state shared by every channel.
//!
//! Slots are indexed by the socket id the modem assigns. A slot is claimed
//! when a connection is opened on that id and holds the connected flag, the
//! count of bytes the modem still has for us, and the receive buffer.
//!
//! Each claim gets a fresh generation number. A [`Binding`] remembers the
//! generation it was issued with, so a channel whose slot was closed by the
//! peer and then reused for a new connection sees its binding go stale
//! instead of reading someone else's data.

use std::sync::{Arc, Mutex, PoisonError};

use crate::buffer::RxBuffer;
use crate::error::{Error, Result};
use crate::protocol::{Notification, NotificationKind};

/// Number of channel slots (socket ids 0 to 4).
pub const MAX_CHANNELS: usize = 5;

/// A channel's claim on one slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Binding {
    pub handle: u8,
    pub generation: u64,
}

/// Bindings of channels dropped without closing, waiting for the engine.
///
/// Shared outside the engine lock so `Drop` can hand a binding over
/// without awaiting.
#[derive(Debug, Clone, Default)]
pub(crate) struct DropQueue(Arc<Mutex<Vec<Binding>>>);

impl DropQueue {
    pub fn push(&self, binding: Binding) {
        self.0
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(binding);
    }

    pub fn take(&self) -> Vec<Binding> {
        std::mem::take(&mut *self.0.lock().unwrap_or_else(PoisonError::into_inner))
    }
}

/// State of one open socket.
#[derive(Debug)]
pub(crate) struct Slot {
    pub generation: u64,
    pub connected: bool,
    /// Bytes the modem reports as waiting but not yet pulled into `rx`.
    pub pending: usize,
    /// A data-ready URC arrived; the pending count needs a refresh.
    pub data_ready: bool,
    /// The owning channel was dropped; the socket still needs closing.
    pub abandoned: bool,
    pub rx: RxBuffer,
}

#[derive(Debug)]
pub(crate) struct SocketTable {
    slots: [Option<Slot>; MAX_CHANNELS],
    next_generation: u64,
    rx_capacity: usize,
}

impl SocketTable {
    pub fn new(rx_capacity: usize) -> Self {
        Self {
            slots: Default::default(),
            next_generation: 1,
            rx_capacity,
        }
    }

    /// Returns true if a new connection can be opened.
    ///
    /// Slots whose occupant is no longer connected count as free.
    pub fn has_free_slot(&self) -> bool {
        self.slots
            .iter()
            .any(|slot| slot.as_ref().is_none_or(|s| !s.connected))
    }

    /// Claims the slot for a socket id the modem just assigned.
    pub fn claim(&mut self, handle: u8) -> Result<Binding> {
        let index = usize::from(handle);
        let entry = self
            .slots
            .get_mut(index)
            .ok_or(Error::InvalidHandle(handle))?;

        if let Some(previous) = entry {
            if previous.connected {
                return Err(Error::protocol(format!(
                    "modem reassigned socket {handle} while it is still connected"
                )));
            }
            tracing::debug!("reclaiming closed slot {}", handle);
        }

        let generation = self.next_generation;
        self.next_generation += 1;
        *entry = Some(Slot {
            generation,
            connected: false,
            pending: 0,
            data_ready: false,
            abandoned: false,
            rx: RxBuffer::new(self.rx_capacity),
        });
        Ok(Binding { handle, generation })
    }

    /// Vacates the slot if `binding` still owns it.
    pub fn release(&mut self, binding: Binding) {
        if self.get(binding).is_some() {
            self.slots[usize::from(binding.handle)] = None;
        }
    }

    /// Gives up a slot whose channel went away without closing it.
    ///
    /// A connected socket is kept until [`take_abandoned`](Self::take_abandoned)
    /// hands it out for closing; anything else is vacated at once.
    pub fn abandon(&mut self, binding: Binding) {
        match self.get_mut(binding) {
            Some(slot) if slot.connected => {
                slot.abandoned = true;
                slot.data_ready = false;
            }
            Some(_) => self.release(binding),
            None => {}
        }
    }

    /// Takes the next abandoned slot, to be closed by the caller.
    pub fn take_abandoned(&mut self) -> Option<Binding> {
        self.slots.iter_mut().enumerate().find_map(|(i, slot)| {
            let slot = slot.as_mut()?;
            if slot.abandoned {
                slot.abandoned = false;
                Some(Binding {
                    handle: u8::try_from(i).ok()?,
                    generation: slot.generation,
                })
            } else {
                None
            }
        })
    }

    /// Returns the slot owned by `binding`, if the binding is still current.
    pub fn get(&self, binding: Binding) -> Option<&Slot> {
        self.by_handle(binding.handle)
            .filter(|s| s.generation == binding.generation)
    }

    /// Mutable variant of [`get`](Self::get).
    pub fn get_mut(&mut self, binding: Binding) -> Option<&mut Slot> {
        self.by_handle_mut(binding.handle)
            .filter(|s| s.generation == binding.generation)
    }

    /// Returns whichever slot currently occupies a socket id.
    pub fn by_handle(&self, handle: u8) -> Option<&Slot> {
        self.slots.get(usize::from(handle))?.as_ref()
    }

    /// Mutable variant of [`by_handle`](Self::by_handle).
    pub fn by_handle_mut(&mut self, handle: u8) -> Option<&mut Slot> {
        self.slots.get_mut(usize::from(handle))?.as_mut()
    }

    /// Applies an unsolicited socket event.
    ///
    /// Events for unoccupied or out-of-range socket ids are ignored.
    pub fn apply(&mut self, notification: Notification) {
        let Notification { kind, handle } = notification;
        let Some(slot) = self.by_handle_mut(handle) else {
            tracing::debug!("{:?} for unoccupied socket {} ignored", kind, handle);
            return;
        };

        match kind {
            NotificationKind::DataReady if slot.abandoned => {
                tracing::debug!("data ready on abandoned socket {} ignored", handle);
            }
            NotificationKind::DataReady => {
                tracing::debug!("data ready on socket {}", handle);
                slot.data_ready = true;
            }
            NotificationKind::ChannelClosed => {
                tracing::debug!("socket {} closed by remote", handle);
                slot.connected = false;
                slot.pending = 0;
                slot.data_ready = false;
                if slot.abandoned {
                    self.slots[usize::from(handle)] = None;
                }
            }
        }
    }

    /// Takes the next socket id with an unrefreshed data-ready flag.
    pub fn take_data_ready(&mut self) -> Option<u8> {
        self.slots.iter_mut().enumerate().find_map(|(i, slot)| {
            let slot = slot.as_mut()?;
            if slot.data_ready {
                slot.data_ready = false;
                u8::try_from(i).ok()
            } else {
                None
            }
        })
    }
}
