//! Thin façade over intra-process (threads) or inter-process (MPI) message passing.
//!
//! Messages are *contiguous byte buffers* owned by the handle that carries
//! them until completion. All handles are **waitable** but posting is
//! non-blocking; the transfer handles in [`crate::comm`] call `.wait()` before
//! they trust that a buffer has arrived.

use std::collections::VecDeque;
use std::sync::Arc;

use bytes::Bytes;
use dashmap::DashMap;
use parking_lot::{Condvar, Mutex};

/// Message tag, offset per level and direction by the transfer handles.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub struct CommTag(pub u16);

impl CommTag {
    pub const fn new(tag: u16) -> Self {
        Self(tag)
    }

    #[inline]
    pub const fn as_u16(self) -> u16 {
        self.0
    }

    /// Tag shifted by `by`, wrapping in the 16-bit tag space.
    #[inline]
    pub const fn offset(self, by: u16) -> Self {
        Self(self.0.wrapping_add(by))
    }
}

impl Default for CommTag {
    fn default() -> Self {
        Self(0x7000)
    }
}

/// Non-blocking point-to-point communication.
pub trait Communicator: Send + Sync + 'static {
    /// Handle returned by `isend`.
    type SendHandle: Wait;
    /// Handle returned by `irecv`.
    type RecvHandle: Wait;

    fn rank(&self) -> usize;
    fn size(&self) -> usize;

    /// Posts a send of `buf` to `peer`; the handle owns the buffer.
    fn isend(&self, peer: usize, tag: u16, buf: Vec<u8>) -> Self::SendHandle;
    /// Posts a receive of at most `len` bytes from `peer`.
    fn irecv(&self, peer: usize, tag: u16, len: usize) -> Self::RecvHandle;
}

/// Anything that can be waited on.
pub trait Wait {
    /// Wait for completion and return the received data (if any).
    ///
    /// A receive that yields `None` has failed.
    fn wait(self) -> Option<Vec<u8>>;
}

/// Completes a send.
///
/// `Wait` reports no status for sends: every backend's send handle yields
/// `None`, and a send that never arrives surfaces as a failed or mismatched
/// receive on the peer.
pub fn complete_send<H: Wait>(handle: H) {
    let payload = handle.wait();
    debug_assert!(payload.is_none(), "send handle returned a payload");
}

/// Compile-time no-op comm for pure serial runs.
///
/// A single process has no neighbours; any receive posted through it fails.
#[derive(Clone, Debug, Default)]
pub struct NoComm;

impl Wait for () {
    fn wait(self) -> Option<Vec<u8>> {
        None
    }
}

impl Communicator for NoComm {
    type SendHandle = ();
    type RecvHandle = ();

    fn rank(&self) -> usize {
        0
    }
    fn size(&self) -> usize {
        1
    }
    fn isend(&self, _peer: usize, _tag: u16, _buf: Vec<u8>) {}
    fn irecv(&self, _peer: usize, _tag: u16, _len: usize) {}
}

// --- LocalComm: ranks as threads of one process ---
type Key = (usize, usize, u16); // (src, dst, tag)

#[derive(Default)]
struct Mailbox {
    queues: DashMap<Key, VecDeque<Bytes>>,
    signal: Mutex<u64>,
    arrived: Condvar,
}

impl Mailbox {
    fn pop(&self, key: &Key) -> Option<Bytes> {
        self.queues.get_mut(key).and_then(|mut q| q.pop_front())
    }
}

/// In-process communicator: one instance per simulated rank, all sharing a
/// mailbox. Messages between a (src, dst, tag) triple are delivered in order.
#[derive(Clone)]
pub struct LocalComm {
    rank: usize,
    size: usize,
    mailbox: Arc<Mailbox>,
}

impl std::fmt::Debug for LocalComm {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LocalComm")
            .field("rank", &self.rank)
            .field("size", &self.size)
            .finish()
    }
}

impl LocalComm {
    /// `size` communicators sharing one fresh mailbox, indexed by rank.
    pub fn world(size: usize) -> Vec<LocalComm> {
        let mailbox = Arc::new(Mailbox::default());
        (0..size)
            .map(|rank| LocalComm {
                rank,
                size,
                mailbox: Arc::clone(&mailbox),
            })
            .collect()
    }
}

pub struct LocalRecv {
    mailbox: Arc<Mailbox>,
    key: Key,
    len: usize,
}

impl Wait for LocalRecv {
    fn wait(self) -> Option<Vec<u8>> {
        let take = |bytes: Bytes| bytes[..bytes.len().min(self.len)].to_vec();
        loop {
            if let Some(bytes) = self.mailbox.pop(&self.key) {
                return Some(take(bytes));
            }
            let mut guard = self.mailbox.signal.lock();
            // re-check under the lock so a send between pop and wait is not missed
            if let Some(bytes) = self.mailbox.pop(&self.key) {
                return Some(take(bytes));
            }
            self.mailbox.arrived.wait(&mut guard);
        }
    }
}

impl Communicator for LocalComm {
    type SendHandle = ();
    type RecvHandle = LocalRecv;

    fn rank(&self) -> usize {
        self.rank
    }
    fn size(&self) -> usize {
        self.size
    }

    fn isend(&self, peer: usize, tag: u16, buf: Vec<u8>) -> Self::SendHandle {
        let key = (self.rank, peer, tag);
        self.mailbox
            .queues
            .entry(key)
            .or_default()
            .push_back(Bytes::from(buf));
        let mut guard = self.mailbox.signal.lock();
        *guard = guard.wrapping_add(1);
        self.mailbox.arrived.notify_all();
    }

    fn irecv(&self, peer: usize, tag: u16, len: usize) -> Self::RecvHandle {
        LocalRecv {
            mailbox: Arc::clone(&self.mailbox),
            key: (peer, self.rank, tag),
            len,
        }
    }
}

// --- MPI backend (feature = "mpi-support") ---
#[cfg(feature = "mpi-support")]
mod mpi_backend {
    use super::*;
    use mpi::request::StaticScope;
    use mpi::topology::SimpleCommunicator;
    use mpi::traits::*;

    /// World communicator. MPI must be initialised (`mpi::initialize()`)
    /// before construction and stay initialised while handles are alive.
    #[derive(Clone, Copy, Debug, Default)]
    pub struct MpiComm;

    impl MpiComm {
        pub fn new() -> Self {
            Self
        }
    }

    /// Outstanding `MPI_Isend`; owns the leaked send buffer until `wait`.
    pub struct MpiSend(Option<Box<dyn FnOnce()>>);

    impl Wait for MpiSend {
        fn wait(mut self) -> Option<Vec<u8>> {
            if let Some(finish) = self.0.take() {
                finish();
            }
            None
        }
    }

    /// Receive completed at `wait`; sends are already in flight, so the
    /// blocking receive cannot deadlock against its matching send.
    pub struct MpiRecv {
        peer: i32,
        tag: i32,
        len: usize,
    }

    impl Wait for MpiRecv {
        fn wait(self) -> Option<Vec<u8>> {
            let world = SimpleCommunicator::world();
            let (mut data, _status) = world
                .process_at_rank(self.peer)
                .receive_vec_with_tag::<u8>(self.tag);
            data.truncate(self.len);
            Some(data)
        }
    }

    impl Communicator for MpiComm {
        type SendHandle = MpiSend;
        type RecvHandle = MpiRecv;

        fn rank(&self) -> usize {
            SimpleCommunicator::world().rank() as usize
        }
        fn size(&self) -> usize {
            SimpleCommunicator::world().size() as usize
        }

        fn isend(&self, peer: usize, tag: u16, buf: Vec<u8>) -> MpiSend {
            let world = SimpleCommunicator::world();
            let raw: *mut [u8] = Box::into_raw(buf.into_boxed_slice());
            // SAFETY: `raw` stays allocated until the request completes below.
            let data: &'static [u8] = unsafe { &*raw };
            let req = world
                .process_at_rank(peer as i32)
                .immediate_send_with_tag(StaticScope, data, i32::from(tag));
            MpiSend(Some(Box::new(move || {
                req.wait();
                // SAFETY: the send completed, MPI no longer reads the buffer.
                drop(unsafe { Box::from_raw(raw) });
            })))
        }

        fn irecv(&self, peer: usize, tag: u16, len: usize) -> MpiRecv {
            MpiRecv {
                peer: peer as i32,
                tag: i32::from(tag),
                len,
            }
        }
    }
}

#[cfg(feature = "mpi-support")]
pub use mpi_backend::MpiComm;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn local_roundtrip_two_ranks() {
        let world = LocalComm::world(2);
        let (c0, c1) = (&world[0], &world[1]);

        // rank 1 posts before rank 0 sends
        let recv = c1.irecv(0, 7, 4);
        c0.isend(1, 7, vec![1, 2, 3, 4]).wait();

        let data = recv.wait().expect("Expected to receive data from rank 0");
        assert_eq!(data, vec![1, 2, 3, 4]);
    }

    #[test]
    fn local_wait_blocks_until_send() {
        let world = LocalComm::world(2);
        let c1 = world[1].clone();
        let recv = c1.irecv(0, 3, 8);
        let sender = world[0].clone();
        let t = std::thread::spawn(move || {
            std::thread::sleep(std::time::Duration::from_millis(20));
            sender.isend(1, 3, vec![9; 8]);
        });
        assert_eq!(recv.wait(), Some(vec![9; 8]));
        t.join().unwrap();
    }

    #[test]
    fn worlds_do_not_share_mailboxes() {
        let a = LocalComm::world(2);
        let b = LocalComm::world(2);
        a[0].isend(1, 1, vec![1]);
        b[0].isend(1, 1, vec![2]);
        assert_eq!(b[1].irecv(0, 1, 1).wait(), Some(vec![2]));
        assert_eq!(a[1].irecv(0, 1, 1).wait(), Some(vec![1]));
    }

    #[test]
    fn completed_send_is_delivered() {
        let world = LocalComm::world(2);
        complete_send(world[0].isend(1, 5, vec![7, 8]));
        assert_eq!(world[1].irecv(0, 5, 2).wait(), Some(vec![7, 8]));
    }

    #[test]
    fn nocomm_receive_fails() {
        let comm = NoComm;
        assert_eq!(comm.size(), 1);
        assert!(comm.irecv(0, 0, 4).wait().is_none());
    }
}
