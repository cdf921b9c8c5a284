use log::{trace, warn};
use std::fmt;
use std::sync::{Arc, Mutex};

/// Capacity of every frame buffer, the largest frame the controller will hand us.
pub const FRAME_SIZE: usize = 600;

type Storage = Box<[u8; FRAME_SIZE]>;

struct Slot {
    /// Parked storage. `None` while a `FrameBuf` holds it.
    storage: Option<Storage>,
    generation: u32,
}

struct PoolState {
    slots: Vec<Slot>,
    free: usize,
    min_free: usize,
}

/// Fixed set of frame buffers, all allocated when the pool is created.
///
/// `acquire` moves a slot's storage into a `FrameBuf`; dropping the `FrameBuf` moves it back.
/// Each slot carries a generation that is bumped on every return, so a handle can only ever
/// give back the slot it was issued.
pub struct BufferPool {
    state: Mutex<PoolState>,
}

impl BufferPool {
    pub fn new(count: usize) -> Arc<BufferPool> {
        let slots = (0..count)
            .map(|_| Slot {
                storage: Some(Box::new([0u8; FRAME_SIZE])),
                generation: 0,
            })
            .collect();
        Arc::new(BufferPool {
            state: Mutex::new(PoolState {
                slots,
                free: count,
                min_free: count,
            }),
        })
    }

    /// Takes the first free buffer, or returns `None` right away if there is none.
    pub fn acquire(self: &Arc<Self>) -> Option<FrameBuf> {
        let mut guard = self.state.lock().unwrap();
        let state = &mut *guard;
        let (index, slot) = state
            .slots
            .iter_mut()
            .enumerate()
            .find(|(_, slot)| slot.storage.is_some())?;
        let storage = slot.storage.take()?;
        let generation = slot.generation;
        state.free -= 1;
        state.min_free = state.min_free.min(state.free);
        trace!("buffer {} acquired, {} free", index, state.free);

        Some(FrameBuf {
            pool: Arc::clone(self),
            index,
            generation,
            len: 0,
            storage: Some(storage),
        })
    }

    /// Hands a buffer back. Equivalent to dropping it.
    pub fn release(&self, buf: FrameBuf) {
        drop(buf)
    }

    /// Parks `storage` in slot `index` if that slot is busy under `generation`.
    /// Anything else is a stale release and leaves the pool untouched.
    fn give_back(&self, index: usize, generation: u32, storage: Storage) -> bool {
        let mut guard = self.state.lock().unwrap();
        let state = &mut *guard;
        match state.slots.get_mut(index) {
            Some(slot) if slot.storage.is_none() && slot.generation == generation => {
                slot.storage = Some(storage);
                slot.generation = slot.generation.wrapping_add(1);
                state.free += 1;
                trace!("buffer {} released, {} free", index, state.free);
                true
            }
            _ => {
                warn!(
                    "ignoring stale release of buffer {} (generation {})",
                    index, generation
                );
                false
            }
        }
    }

    pub fn capacity(&self) -> usize {
        self.state.lock().unwrap().slots.len()
    }

    pub fn free_count(&self) -> usize {
        self.state.lock().unwrap().free
    }

    pub fn busy_count(&self) -> usize {
        let state = self.state.lock().unwrap();
        state.slots.len() - state.free
    }

    /// Lowest number of free buffers seen since the pool was created.
    pub fn min_free(&self) -> usize {
        self.state.lock().unwrap().min_free
    }
}

/// Exclusive handle on one pool buffer. It cannot be cloned, so at any time a buffer belongs
/// either to the pool or to exactly one holder.
pub struct FrameBuf {
    pool: Arc<BufferPool>,
    index: usize,
    generation: u32,
    len: usize,
    storage: Option<Storage>,
}

impl FrameBuf {
    pub fn index(&self) -> usize {
        self.index
    }

    pub fn generation(&self) -> u32 {
        self.generation
    }

    /// Length of the frame currently held.
    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn capacity(&self) -> usize {
        FRAME_SIZE
    }

    /// Sets the frame length, capped at the buffer capacity.
    pub fn set_len(&mut self, len: usize) {
        self.len = len.min(FRAME_SIZE);
    }

    pub fn as_slice(&self) -> &[u8] {
        let len = self.len;
        match self.storage.as_deref() {
            Some(bytes) => &bytes[..len],
            None => &[],
        }
    }

    pub fn as_mut_slice(&mut self) -> &mut [u8] {
        let len = self.len;
        match self.storage.as_deref_mut() {
            Some(bytes) => &mut bytes[..len],
            None => &mut [],
        }
    }

    /// The whole buffer regardless of the current frame length, for receiving or building.
    pub fn capacity_mut(&mut self) -> &mut [u8] {
        match self.storage.as_deref_mut() {
            Some(bytes) => &mut bytes[..],
            None => &mut [],
        }
    }
}

impl AsRef<[u8]> for FrameBuf {
    fn as_ref(&self) -> &[u8] {
        self.as_slice()
    }
}

impl AsMut<[u8]> for FrameBuf {
    fn as_mut(&mut self) -> &mut [u8] {
        self.as_mut_slice()
    }
}

impl Drop for FrameBuf {
    fn drop(&mut self) {
        if let Some(storage) = self.storage.take() {
            self.pool.give_back(self.index, self.generation, storage);
        }
    }
}

impl fmt::Debug for FrameBuf {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("FrameBuf")
            .field("index", &self.index)
            .field("generation", &self.generation)
            .field("len", &self.len)
            .finish()
    }
}
