//! Neighbour exchange for one F-C sweep.
//!
//! [`UTransfer::initiate`] posts a receive for the left ghost `ilower-1` and
//! the send of `iupper` to the right neighbour, then returns at once. While
//! the sweep runs:
//!
//! * [`UTransfer::get`] of the ghost completes the receive on demand, so the
//!   leftmost interval (visited last) is the only one that can block;
//! * if `iupper` is an F-point its send is deferred until the sweep stores
//!   that index, so the neighbour gets the freshly relaxed value.
//!
//! [`UTransfer::wait`] consumes the handle: it completes anything still
//! outstanding, drains every send and leaves the received ghost resident.
//! Buffers belong to the handle between `initiate` and `wait`.
//!
//! Frames carry the level's transfer epoch. After a failed sweep is cancelled
//! the neighbour's frame for it may still be queued; the next sweep skips it
//! instead of taking it for its own ghost.

use crate::app::App;
use crate::cache::{Residency, VectorCache};
use crate::comm::communicator::{CommTag, Communicator, Wait, complete_send};
use crate::comm::wire::{frame_len, pack_frame, unpack_frame};
use crate::grid::{Grid, TimeIndex};
use crate::relax_error::{CommError, RelaxError};

struct PendingRecv<H> {
    peer: usize,
    index: TimeIndex,
    len: usize,
    handle: H,
}

struct PendingSend<H> {
    peer: usize,
    handle: H,
}

pub struct UTransfer<'c, C: Communicator> {
    comm: &'c C,
    level: usize,
    epoch: u16,
    tag: u16,
    recv: Option<PendingRecv<C::RecvHandle>>,
    sends: Vec<PendingSend<C::SendHandle>>,
    deferred: Option<(usize, TimeIndex)>,
}

impl<'c, C: Communicator> UTransfer<'c, C> {
    /// Lane of the tag space used by F-C sweeps.
    pub const LANE: u16 = 0;

    pub fn initiate<A: App>(
        comm: &'c C,
        app: &A,
        grid: &Grid,
        cache: &mut VectorCache<A::Vector>,
        tag: CommTag,
    ) -> Result<Self, RelaxError> {
        let epoch = cache.begin_transfer()?;
        let mut xfer = UTransfer {
            comm,
            level: grid.level(),
            epoch,
            tag: tag.as_u16(),
            recv: None,
            sends: Vec::new(),
            deferred: None,
        };
        if let Err(e) = xfer.post(app, grid, cache) {
            xfer.cancel(cache);
            return Err(e);
        }
        Ok(xfer)
    }

    fn post<A: App>(
        &mut self,
        app: &A,
        grid: &Grid,
        cache: &mut VectorCache<A::Vector>,
    ) -> Result<(), RelaxError> {
        if let Some(ghost) = grid.left_ghost() {
            let peer = neighbor(grid.left_rank(), self.level, ghost)?;
            cache.drop_ghost(ghost);
            log::trace!("utransfer: level {} irecv {ghost} from rank {peer}", self.level);
            let len = frame_len(app);
            let handle = self.comm.irecv(peer, self.tag, len);
            self.recv = Some(PendingRecv {
                peer,
                index: ghost,
                len,
                handle,
            });
        }
        if grid.right_ghost().is_some() {
            let iupper = grid.iupper();
            let peer = neighbor(grid.right_rank(), self.level, iupper + 1)?;
            if grid.is_cpoint(iupper) {
                let u = cache.get_ref(iupper)?;
                self.send(app, peer, iupper, u)?;
            } else {
                self.deferred = Some((peer, iupper));
            }
        }
        Ok(())
    }

    fn send<A: App>(
        &mut self,
        app: &A,
        peer: usize,
        index: TimeIndex,
        u: &A::Vector,
    ) -> Result<(), RelaxError> {
        let frame = pack_frame(app, self.level, self.epoch, index, u)?;
        log::trace!("utransfer: level {} isend {index} to rank {peer}", self.level);
        let handle = self.comm.isend(peer, self.tag, frame);
        self.sends.push(PendingSend { peer, handle });
        Ok(())
    }

    fn complete_recv<A: App>(
        &mut self,
        app: &A,
        cache: &mut VectorCache<A::Vector>,
    ) -> Result<(), RelaxError> {
        let Some(PendingRecv {
            peer,
            index,
            len,
            mut handle,
        }) = self.recv.take()
        else {
            return Ok(());
        };
        loop {
            let frame = handle.wait().ok_or_else(|| RelaxError::CommError {
                neighbor: peer,
                source: Box::new(CommError(format!("receive of index {index} failed"))),
            })?;
            match unpack_frame(app, peer, self.level, self.epoch, index, &frame)? {
                Some(u) => return cache.set_ghost(index, u),
                // left over from an abandoned sweep
                None => handle = self.comm.irecv(peer, self.tag, len),
            }
        }
    }

    /// Copy of the vector at `index`, completing the ghost receive if this is
    /// the index it delivers.
    pub fn get<A: App>(
        &mut self,
        app: &A,
        cache: &mut VectorCache<A::Vector>,
        index: TimeIndex,
    ) -> Result<A::Vector, RelaxError> {
        if self.recv.as_ref().is_some_and(|r| r.index == index) {
            self.complete_recv(app, cache)?;
        }
        cache.get(index)
    }

    /// Stores a transient F-point value; the caller keeps `u` as its next seed.
    pub fn store_transient<A: App>(
        &mut self,
        app: &A,
        cache: &mut VectorCache<A::Vector>,
        index: TimeIndex,
        u: &A::Vector,
    ) -> Result<(), RelaxError> {
        self.flush_deferred(app, index, u)?;
        if cache.retains(index, Residency::Transient) {
            cache.set(index, u.clone(), Residency::Transient)?;
        }
        Ok(())
    }

    /// Moves a persistent value into the cache.
    pub fn store<A: App>(
        &mut self,
        app: &A,
        cache: &mut VectorCache<A::Vector>,
        index: TimeIndex,
        u: A::Vector,
    ) -> Result<(), RelaxError> {
        self.flush_deferred(app, index, &u)?;
        cache.set(index, u, Residency::Persistent)
    }

    fn flush_deferred<A: App>(
        &mut self,
        app: &A,
        index: TimeIndex,
        u: &A::Vector,
    ) -> Result<(), RelaxError> {
        match self.deferred {
            Some((peer, deferred)) if deferred == index => {
                self.deferred = None;
                self.send(app, peer, index, u)
            }
            _ => Ok(()),
        }
    }

    /// Completes every transfer of this sweep.
    pub fn wait<A: App>(
        mut self,
        app: &A,
        cache: &mut VectorCache<A::Vector>,
    ) -> Result<(), RelaxError> {
        let mut result = self.complete_recv(app, cache);
        if let Some((peer, index)) = self.deferred.take() {
            // the sweep never stored iupper; ship the resident value
            let sent = cache
                .get_ref(index)
                .and_then(|u| self.send(app, peer, index, u));
            if result.is_ok() {
                result = sent;
            }
        }
        // always drain all send handles before returning
        for PendingSend { peer, handle } in self.sends.drain(..) {
            complete_send(handle);
            log::trace!("utransfer: level {} send to rank {peer} complete", self.level);
        }
        cache.end_transfer();
        result
    }

    /// Abandons the sweep after a failure; pending receives are dropped.
    pub fn cancel(mut self, cache: &mut VectorCache<impl Clone>) {
        for PendingSend { handle, .. } in self.sends.drain(..) {
            complete_send(handle);
        }
        self.recv = None;
        cache.end_transfer();
    }
}

pub(crate) fn neighbor(
    rank: Option<usize>,
    level: usize,
    index: TimeIndex,
) -> Result<usize, RelaxError> {
    rank.ok_or_else(|| {
        RelaxError::InvalidConfig(format!(
            "level {level}: no rank recorded as owner of index {index}"
        ))
    })
}
