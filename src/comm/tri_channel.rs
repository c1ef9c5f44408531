//! Neighbour exchange for one pass of the block-triangular sweep.
//!
//! Each pass exchanges both boundary values: `ilower` goes left and `iupper`
//! goes right, while `ilower-1` and `iupper+1` come back as ghosts. The caller
//! solves interior points between [`TriTransfer::initiate`] and
//! [`TriTransfer::wait`] and the two boundary points after it.
//!
//! Frames are stamped with the level's transfer epoch, so a frame left queued
//! by a cancelled pass is skipped by the next one.

use crate::app::App;
use crate::cache::VectorCache;
use crate::comm::channel::neighbor;
use crate::comm::communicator::{CommTag, Communicator, Wait, complete_send};
use crate::comm::wire::{frame_len, pack_frame, unpack_frame};
use crate::grid::{Grid, TimeIndex};
use crate::relax_error::{CommError, RelaxError};

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Direction {
    Send,
    Recv,
}

/// One posted request, as reported by [`TriTransfer::requests`].
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct PostedRequest {
    pub direction: Direction,
    pub peer: usize,
    pub index: TimeIndex,
}

enum Handle<C: Communicator> {
    Send(C::SendHandle),
    Recv { tag: u16, handle: C::RecvHandle },
}

pub struct TriTransfer<'c, C: Communicator> {
    comm: &'c C,
    level: usize,
    epoch: u16,
    requests: Vec<PostedRequest>,
    handles: Vec<Handle<C>>,
}

impl<'c, C: Communicator> TriTransfer<'c, C> {
    /// Lane carrying values towards higher ranks.
    pub const LANE_RIGHTWARD: u16 = 1;
    /// Lane carrying values towards lower ranks.
    pub const LANE_LEFTWARD: u16 = 2;

    pub fn initiate<A: App>(
        comm: &'c C,
        app: &A,
        grid: &Grid,
        cache: &mut VectorCache<A::Vector>,
        tag: CommTag,
    ) -> Result<Self, RelaxError> {
        let epoch = cache.begin_transfer()?;
        let mut xfer = TriTransfer {
            comm,
            level: grid.level(),
            epoch,
            requests: Vec::with_capacity(4),
            handles: Vec::with_capacity(4),
        };
        if let Err(e) = xfer.post(app, grid, cache, tag) {
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
        tag: CommTag,
    ) -> Result<(), RelaxError> {
        let rightward = tag.offset(Self::LANE_RIGHTWARD).as_u16();
        let leftward = tag.offset(Self::LANE_LEFTWARD).as_u16();
        let comm = self.comm;
        let len = frame_len(app);

        // 1) post receives for both ghosts
        let left = grid.left_ghost();
        let right = grid.right_ghost();
        if let Some(ghost) = left {
            let peer = neighbor(grid.left_rank(), self.level, ghost)?;
            cache.drop_ghost(ghost);
            self.push_recv(peer, ghost, rightward, comm.irecv(peer, rightward, len));
        }
        if let Some(ghost) = right {
            let peer = neighbor(grid.right_rank(), self.level, ghost)?;
            cache.drop_ghost(ghost);
            self.push_recv(peer, ghost, leftward, comm.irecv(peer, leftward, len));
        }

        // 2) post sends of both boundary values
        if left.is_some() {
            let peer = neighbor(grid.left_rank(), self.level, grid.ilower() - 1)?;
            let frame = pack_frame(app, self.level, self.epoch, grid.ilower(), cache.get_ref(grid.ilower())?)?;
            self.push_send(peer, grid.ilower(), comm.isend(peer, leftward, frame));
        }
        if right.is_some() {
            let peer = neighbor(grid.right_rank(), self.level, grid.iupper() + 1)?;
            let frame = pack_frame(app, self.level, self.epoch, grid.iupper(), cache.get_ref(grid.iupper())?)?;
            self.push_send(peer, grid.iupper(), comm.isend(peer, rightward, frame));
        }
        Ok(())
    }

    fn push_recv(&mut self, peer: usize, index: TimeIndex, tag: u16, handle: C::RecvHandle) {
        log::trace!("tritransfer: level {} irecv {index} from rank {peer}", self.level);
        self.requests.push(PostedRequest {
            direction: Direction::Recv,
            peer,
            index,
        });
        self.handles.push(Handle::Recv { tag, handle });
    }

    fn push_send(&mut self, peer: usize, index: TimeIndex, handle: C::SendHandle) {
        log::trace!("tritransfer: level {} isend {index} to rank {peer}", self.level);
        self.requests.push(PostedRequest {
            direction: Direction::Send,
            peer,
            index,
        });
        self.handles.push(Handle::Send(handle));
    }

    /// Requests posted by `initiate`, receives first.
    pub fn requests(&self) -> &[PostedRequest] {
        &self.requests
    }

    /// Waits on every request and materialises the received ghosts.
    pub fn wait<A: App>(
        mut self,
        app: &A,
        cache: &mut VectorCache<A::Vector>,
    ) -> Result<(), RelaxError> {
        let handles = std::mem::take(&mut self.handles);
        let mut maybe_err = None;
        for (req, handle) in self.requests.iter().zip(handles) {
            match handle {
                Handle::Send(h) => complete_send(h),
                Handle::Recv { tag, handle } => {
                    let got = self
                        .complete_recv(app, req, tag, handle)
                        .and_then(|u| cache.set_ghost(req.index, u));
                    // keep draining after the first failure
                    if let Err(e) = got {
                        maybe_err.get_or_insert(e);
                    }
                }
            }
        }
        cache.end_transfer();
        match maybe_err {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    /// Receives one ghost, skipping frames left over from abandoned passes.
    fn complete_recv<A: App>(
        &self,
        app: &A,
        req: &PostedRequest,
        tag: u16,
        mut handle: C::RecvHandle,
    ) -> Result<A::Vector, RelaxError> {
        loop {
            let frame = handle.wait().ok_or_else(|| RelaxError::CommError {
                neighbor: req.peer,
                source: Box::new(CommError(format!("receive of index {} failed", req.index))),
            })?;
            match unpack_frame(app, req.peer, self.level, self.epoch, req.index, &frame)? {
                Some(u) => return Ok(u),
                None => handle = self.comm.irecv(req.peer, tag, frame_len(app)),
            }
        }
    }

    /// Abandons the pass after a failure; pending receives are dropped.
    pub fn cancel(self, cache: &mut VectorCache<impl Clone>) {
        for handle in self.handles {
            if let Handle::Send(h) = handle {
                complete_send(h);
            }
        }
        cache.end_transfer();
    }
}
