//! Headless backend: no GPU, exact bookkeeping.
//!
//! Every allocation is recorded in a shared ledger so callers can observe how
//! many allocations are live, how many bytes they hold, and the order in
//! which they were made and freed. Any primitive can be made to fail on
//! demand with [`HeadlessBackend::inject`].
//!
//! Transitions complete the way a real queue does: the ready signal is
//! asserted by the next poll, flush or idle wait, not by the call itself.

use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

use anyhow::{Result, bail};

use super::{SurfaceBackend, required_bytes_for};
use crate::surface::SurfaceSize;
use crate::sync::SyncSignal;

const BYTES_PER_PIXEL: u32 = 4;
const DEFAULT_MAX_DIMENSION: u32 = 8192;

/// A primitive operation that can be made to fail.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub enum Fault {
    CreateImage,
    Allocate,
    Bind,
    CreateTarget,
    CreateSignal,
    RearmSignal,
    Flush,
    Poll,
    Transition,
    WaitIdle,
}

/// Allocation ledger entry, in program order.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum LedgerEvent {
    Allocated { id: u64, bytes: u64 },
    Freed { id: u64, bytes: u64 },
}

#[derive(Debug, Default)]
struct Ledger {
    next_id: u64,
    live: HashMap<u64, u64>,
    events: Vec<LedgerEvent>,
    allocations: u64,
    flushes: u64,
    polls: u64,
    transitions: u64,
    idle_waits: u64,
    /// Ready signals of submitted transitions, asserted on completion.
    in_flight: Vec<SyncSignal>,
}

impl Ledger {
    fn allocate(&mut self, bytes: u64) -> u64 {
        self.next_id += 1;
        let id = self.next_id;
        self.live.insert(id, bytes);
        self.allocations += 1;
        self.events.push(LedgerEvent::Allocated { id, bytes });
        id
    }

    fn free(&mut self, id: u64) {
        if let Some(bytes) = self.live.remove(&id) {
            self.events.push(LedgerEvent::Freed { id, bytes });
        }
    }

    fn complete_in_flight(&mut self) {
        for ready in self.in_flight.drain(..) {
            ready.signal();
        }
    }
}

/// Image description produced by [`HeadlessBackend::create_image`].
#[derive(Debug, Clone)]
pub struct HeadlessImage {
    size: SurfaceSize,
    required_bytes: u64,
}

impl HeadlessImage {
    pub fn size(&self) -> SurfaceSize {
        self.size
    }
}

/// A ledger-tracked allocation. Dropping it frees the ledger entry.
#[derive(Debug)]
pub struct HeadlessMemory {
    id: u64,
    bytes: u64,
    ledger: Rc<RefCell<Ledger>>,
}

impl HeadlessMemory {
    pub fn id(&self) -> u64 {
        self.id
    }
}

impl Drop for HeadlessMemory {
    fn drop(&mut self) {
        self.ledger.borrow_mut().free(self.id);
    }
}

/// Render target over headless memory. Painting is a no-op.
#[derive(Debug, Clone)]
pub struct HeadlessTarget {
    pub memory_id: u64,
    pub size: SurfaceSize,
}

/// Export handle: identifies the allocation the consumer would import.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub struct HeadlessExport {
    pub memory_id: u64,
    pub size: SurfaceSize,
}

/// Backend that tracks resources without touching a GPU.
#[derive(Debug)]
pub struct HeadlessBackend {
    ledger: Rc<RefCell<Ledger>>,
    faults: RefCell<HashMap<Fault, u32>>,
    max_dimension: u32,
}

impl Default for HeadlessBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl HeadlessBackend {
    pub fn new() -> Self {
        Self {
            ledger: Rc::new(RefCell::new(Ledger::default())),
            faults: RefCell::new(HashMap::new()),
            max_dimension: DEFAULT_MAX_DIMENSION,
        }
    }

    /// Rejects images wider or taller than `max_dimension`.
    pub fn with_max_dimension(mut self, max_dimension: u32) -> Self {
        self.max_dimension = max_dimension;
        self
    }

    /// Makes the next `count` calls of `fault`'s primitive fail.
    pub fn inject(&self, fault: Fault, count: u32) {
        *self.faults.borrow_mut().entry(fault).or_insert(0) += count;
    }

    pub fn live_allocations(&self) -> usize {
        self.ledger.borrow().live.len()
    }

    pub fn live_bytes(&self) -> u64 {
        self.ledger.borrow().live.values().sum()
    }

    /// Total allocations made since creation.
    pub fn allocations_made(&self) -> u64 {
        self.ledger.borrow().allocations
    }

    pub fn events(&self) -> Vec<LedgerEvent> {
        self.ledger.borrow().events.clone()
    }

    pub fn clear_events(&self) {
        self.ledger.borrow_mut().events.clear();
    }

    pub fn flushes(&self) -> u64 {
        self.ledger.borrow().flushes
    }

    pub fn polls(&self) -> u64 {
        self.ledger.borrow().polls
    }

    /// Transitions submitted but not yet completed by a poll.
    pub fn transitions_in_flight(&self) -> usize {
        self.ledger.borrow().in_flight.len()
    }

    pub fn transitions(&self) -> u64 {
        self.ledger.borrow().transitions
    }

    pub fn idle_waits(&self) -> u64 {
        self.ledger.borrow().idle_waits
    }

    fn trip(&self, fault: Fault) -> Result<()> {
        let mut faults = self.faults.borrow_mut();
        match faults.get_mut(&fault) {
            Some(n) if *n > 0 => {
                *n -= 1;
                bail!("injected {fault:?} failure")
            }
            _ => Ok(()),
        }
    }
}

impl SurfaceBackend for HeadlessBackend {
    type Image = HeadlessImage;
    type Memory = HeadlessMemory;
    type Target = HeadlessTarget;
    type Export = HeadlessExport;

    fn name(&self) -> &str {
        "headless"
    }

    fn create_image(&self, size: SurfaceSize) -> Result<HeadlessImage> {
        self.trip(Fault::CreateImage)?;
        if size.is_empty() {
            bail!("cannot create an empty {size} image");
        }
        if size.width > self.max_dimension || size.height > self.max_dimension {
            bail!("{size} exceeds the {} px dimension limit", self.max_dimension);
        }
        Ok(HeadlessImage {
            size,
            required_bytes: required_bytes_for(size, BYTES_PER_PIXEL),
        })
    }

    fn image_size(&self, image: &HeadlessImage) -> SurfaceSize {
        image.size
    }

    fn required_bytes(&self, image: &HeadlessImage) -> u64 {
        image.required_bytes
    }

    fn allocate_memory(&self, image: &HeadlessImage) -> Result<HeadlessMemory> {
        self.trip(Fault::Allocate)?;
        let bytes = image.required_bytes;
        let id = self.ledger.borrow_mut().allocate(bytes);
        Ok(HeadlessMemory {
            id,
            bytes,
            ledger: Rc::clone(&self.ledger),
        })
    }

    fn allocation_bytes(&self, memory: &HeadlessMemory) -> u64 {
        memory.bytes
    }

    fn bind_image(&self, memory: &HeadlessMemory, image: &HeadlessImage) -> Result<()> {
        self.trip(Fault::Bind)?;
        if image.required_bytes > memory.bytes {
            bail!(
                "image needs {} bytes, allocation #{} holds {}",
                image.required_bytes,
                memory.id,
                memory.bytes
            );
        }
        Ok(())
    }

    fn create_target(&self, memory: &HeadlessMemory, image: &HeadlessImage) -> Result<HeadlessTarget> {
        self.trip(Fault::CreateTarget)?;
        Ok(HeadlessTarget {
            memory_id: memory.id,
            size: image.size,
        })
    }

    fn create_signal(&self) -> Result<SyncSignal> {
        self.trip(Fault::CreateSignal)?;
        Ok(SyncSignal::new())
    }

    fn rearm_signal(&self, signal: &SyncSignal) -> Result<()> {
        self.trip(Fault::RearmSignal)?;
        signal.reset();
        Ok(())
    }

    fn flush(&self) -> Result<()> {
        self.trip(Fault::Flush)?;
        let mut ledger = self.ledger.borrow_mut();
        ledger.flushes += 1;
        ledger.complete_in_flight();
        Ok(())
    }

    fn poll(&self) -> Result<()> {
        self.trip(Fault::Poll)?;
        let mut ledger = self.ledger.borrow_mut();
        ledger.polls += 1;
        ledger.complete_in_flight();
        Ok(())
    }

    fn transition_for_consumer(
        &self,
        _memory: &HeadlessMemory,
        _image: &HeadlessImage,
        ready: &SyncSignal,
    ) -> Result<()> {
        self.trip(Fault::Transition)?;
        let mut ledger = self.ledger.borrow_mut();
        ledger.transitions += 1;
        ledger.in_flight.push(ready.clone());
        Ok(())
    }

    fn export(&self, memory: &HeadlessMemory, image: &HeadlessImage) -> HeadlessExport {
        HeadlessExport {
            memory_id: memory.id,
            size: image.size,
        }
    }

    fn wait_idle(&self) -> Result<()> {
        self.trip(Fault::WaitIdle)?;
        let mut ledger = self.ledger.borrow_mut();
        ledger.idle_waits += 1;
        ledger.complete_in_flight();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dropping_memory_frees_ledger_entry() {
        let backend = HeadlessBackend::new();
        let image = backend.create_image(SurfaceSize::new(64, 64)).unwrap();
        let memory = backend.allocate_memory(&image).unwrap();
        assert_eq!(backend.live_allocations(), 1);
        assert_eq!(backend.live_bytes(), 256 * 64);

        let id = memory.id();
        drop(memory);
        assert_eq!(backend.live_allocations(), 0);
        assert_eq!(
            backend.events(),
            vec![
                LedgerEvent::Allocated { id, bytes: 256 * 64 },
                LedgerEvent::Freed { id, bytes: 256 * 64 },
            ]
        );
    }

    #[test]
    fn injected_fault_fires_requested_number_of_times() {
        let backend = HeadlessBackend::new();
        backend.inject(Fault::CreateImage, 2);
        let size = SurfaceSize::new(8, 8);
        assert!(backend.create_image(size).is_err());
        assert!(backend.create_image(size).is_err());
        assert!(backend.create_image(size).is_ok());
    }

    #[test]
    fn bind_rejects_undersized_memory() {
        let backend = HeadlessBackend::new();
        let small = backend.create_image(SurfaceSize::new(8, 8)).unwrap();
        let big = backend.create_image(SurfaceSize::new(8, 512)).unwrap();
        let memory = backend.allocate_memory(&small).unwrap();
        assert!(backend.bind_image(&memory, &small).is_ok());
        assert!(backend.bind_image(&memory, &big).is_err());
    }

    #[test]
    fn oversize_and_empty_images_are_rejected() {
        let backend = HeadlessBackend::new().with_max_dimension(256);
        assert!(backend.create_image(SurfaceSize::new(257, 1)).is_err());
        assert!(backend.create_image(SurfaceSize::new(0, 1)).is_err());
        assert!(backend.create_image(SurfaceSize::new(256, 256)).is_ok());
    }

    #[test]
    fn transition_completes_on_next_poll() {
        let backend = HeadlessBackend::new();
        let image = backend.create_image(SurfaceSize::new(4, 4)).unwrap();
        let memory = backend.allocate_memory(&image).unwrap();
        let ready = SyncSignal::new();
        backend.transition_for_consumer(&memory, &image, &ready).unwrap();
        assert!(!ready.is_signaled());
        assert_eq!(backend.transitions_in_flight(), 1);

        backend.poll().unwrap();
        assert!(ready.is_signaled());
        assert_eq!(backend.transitions_in_flight(), 0);
        assert_eq!(backend.transitions(), 1);
    }

    #[test]
    fn flush_and_idle_wait_also_complete_transitions() {
        let backend = HeadlessBackend::new();
        let image = backend.create_image(SurfaceSize::new(4, 4)).unwrap();
        let memory = backend.allocate_memory(&image).unwrap();

        let a = SyncSignal::new();
        backend.transition_for_consumer(&memory, &image, &a).unwrap();
        backend.flush().unwrap();
        assert!(a.is_signaled());

        let b = SyncSignal::new();
        backend.transition_for_consumer(&memory, &image, &b).unwrap();
        backend.wait_idle().unwrap();
        assert!(b.is_signaled());
    }
}
