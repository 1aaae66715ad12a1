//! The shared window itself: registers, FIFOs and bulk copies.

use std::io;
use std::path::Path;
use std::sync::atomic::{AtomicU32, Ordering};

use smr_primitives::{ByteFifo, HeapRegion, MmapRegion, Region};

use crate::layout::{LayoutError, SmrLayout};
use crate::pipe::PipeId;

enum Backing {
    Heap(HeapRegion),
    Mmap(MmapRegion),
    /// Memory owned by the platform (a device mapping, a test harness).
    External,
}

/// A validated OneDRAM window.
pub struct Smr {
    region: Region,
    layout: SmrLayout,
    #[allow(dead_code)]
    backing: Backing,
}

impl Smr {
    /// A zeroed in-process window, for simulation and tests.
    pub fn heap(layout: SmrLayout) -> Result<Self, LayoutError> {
        layout.validate()?;
        let heap = HeapRegion::new_zeroed(layout.size);
        let region = heap.region();
        Ok(Self::build(region, layout, Backing::Heap(heap)))
    }

    /// A file-backed window another process can attach to.
    pub fn create_file(path: &Path, layout: SmrLayout) -> io::Result<Self> {
        layout
            .validate()
            .map_err(|err| io::Error::new(io::ErrorKind::InvalidInput, err))?;
        let mmap = MmapRegion::create(path, layout.size)?;
        let region = mmap.region();
        Ok(Self::build(region, layout, Backing::Mmap(mmap)))
    }

    /// Attach to a window created by [`Smr::create_file`].
    pub fn attach_file(path: &Path, layout: SmrLayout) -> io::Result<Self> {
        layout
            .validate()
            .map_err(|err| io::Error::new(io::ErrorKind::InvalidInput, err))?;
        let mmap = MmapRegion::attach(path)?;
        if mmap.len() < layout.size {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                format!(
                    "window is {:#x} bytes, layout needs {:#x}",
                    mmap.len(),
                    layout.size
                ),
            ));
        }
        let region = mmap.region();
        Ok(Self::build(region, layout, Backing::Mmap(mmap)))
    }

    /// Wrap memory somebody else keeps alive.
    ///
    /// # Safety
    ///
    /// `region` must satisfy [`Region`]'s contract for its whole lifetime
    /// and be at least `layout.size` bytes long.
    pub unsafe fn from_region(region: Region, layout: SmrLayout) -> Result<Self, LayoutError> {
        layout.validate()?;
        assert!(region.len() >= layout.size, "region smaller than layout");
        Ok(Self::build(region, layout, Backing::External))
    }

    fn build(region: Region, layout: SmrLayout, backing: Backing) -> Self {
        Self {
            region,
            layout,
            backing,
        }
    }

    pub fn layout(&self) -> &SmrLayout {
        &self.layout
    }

    pub fn region(&self) -> Region {
        self.region
    }

    fn register(&self, offset: usize) -> &AtomicU32 {
        // SAFETY: validate() placed every register 4-byte aligned and in
        // bounds, and the window is shared memory the peer mutates.
        unsafe { self.region.get::<AtomicU32>(offset) }
    }

    // ── semaphore ───────────────────────────────────────────────────────

    /// True while the AP holds the hardware semaphore.
    pub fn sem_held(&self) -> bool {
        self.register(self.layout.sem_offset).load(Ordering::Acquire) & 1 == 1
    }

    /// Hand the semaphore to the modem.
    pub fn give_sem(&self) {
        trace!("semaphore -> modem");
        self.register(self.layout.sem_offset)
            .store(0, Ordering::Release);
    }

    /// Set the semaphore register directly. Only the modem side (or a
    /// simulation of it) grants ownership to the AP.
    pub fn set_sem(&self, value: u32) {
        self.register(self.layout.sem_offset)
            .store(value, Ordering::Release);
    }

    // ── mailboxes ───────────────────────────────────────────────────────

    /// Last value the modem posted.
    pub fn bp_mailbox(&self) -> u32 {
        self.register(self.layout.mbox_bp_offset)
            .load(Ordering::Acquire)
    }

    pub fn post_bp_mailbox(&self, value: u32) {
        self.register(self.layout.mbox_bp_offset)
            .store(value, Ordering::Release);
    }

    /// Last value the AP posted.
    pub fn ap_mailbox(&self) -> u32 {
        self.register(self.layout.mbox_ap_offset)
            .load(Ordering::Acquire)
    }

    pub(crate) fn post_ap_mailbox(&self, value: u32) {
        self.register(self.layout.mbox_ap_offset)
            .store(value, Ordering::Release);
    }

    // ── bulk data ───────────────────────────────────────────────────────

    /// Raw bytes of the error message area.
    pub fn error_message(&self) -> Vec<u8> {
        let mut buf = vec![0; self.layout.error_msg_len];
        self.region.read_bytes(self.layout.error_msg_offset, &mut buf);
        buf
    }

    pub fn read(&self, offset: usize, dst: &mut [u8]) {
        self.region.read_bytes(offset, dst);
    }

    pub fn write(&self, offset: usize, src: &[u8]) {
        self.region.write_bytes(offset, src);
    }

    // ── fifos ───────────────────────────────────────────────────────────

    /// The AP→BP FIFO of `pipe`.
    pub fn tx_fifo(&self, pipe: PipeId) -> ByteFifo {
        // SAFETY: validate() checked the geometry; the index words are
        // shared with the modem, which keeps them in range.
        unsafe { ByteFifo::attach(self.region, self.layout.pipes[pipe as usize].tx) }
    }

    /// The BP→AP FIFO of `pipe`.
    pub fn rx_fifo(&self, pipe: PipeId) -> ByteFifo {
        // SAFETY: as for tx_fifo.
        unsafe { ByteFifo::attach(self.region, self.layout.pipes[pipe as usize].rx) }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn registers_are_independent() {
        let smr = Smr::heap(SmrLayout::default()).unwrap();
        assert!(!smr.sem_held());
        smr.set_sem(1);
        smr.post_bp_mailbox(0x1234_1234);
        smr.post_ap_mailbox(0xcd);
        assert!(smr.sem_held());
        assert_eq!(smr.bp_mailbox(), 0x1234_1234);
        assert_eq!(smr.ap_mailbox(), 0xcd);
        smr.give_sem();
        assert!(!smr.sem_held());
    }

    #[test]
    fn tx_and_rx_fifos_are_distinct() {
        let smr = Smr::heap(SmrLayout::default()).unwrap();
        assert_eq!(smr.tx_fifo(PipeId::Fmt).write(b"abc"), 3);
        assert_eq!(smr.rx_fifo(PipeId::Fmt).count(), 0);
        assert_eq!(smr.tx_fifo(PipeId::Fmt).count(), 3);
        assert_eq!(smr.rx_fifo(PipeId::Rfs).size(), 0x4_0000);
    }

    #[test]
    fn file_backed_window_is_shared_between_attachments() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("onedram");
        let ap = Smr::create_file(&path, SmrLayout::default()).unwrap();
        let bp = Smr::attach_file(&path, SmrLayout::default()).unwrap();

        bp.post_bp_mailbox(0xabcd_abcd);
        assert_eq!(ap.bp_mailbox(), 0xabcd_abcd);
        ap.write(0x100, b"image");
        let mut buf = [0u8; 5];
        bp.read(0x100, &mut buf);
        assert_eq!(&buf, b"image");
    }

    #[test]
    fn invalid_layout_is_refused() {
        let layout = SmrLayout {
            control_size: 0,
            ..SmrLayout::default()
        };
        assert!(Smr::heap(layout).is_err());
    }
}
