//! Fixed, versioned, little-endian frame for time-point vectors on the wire.
//!
//! Every message is one [`WireVectorHdr`] followed by the bytes the
//! application's `buf_pack` produced.
//!
//! The header's `epoch` is the sender's per-level transfer sequence number. A
//! receiver accepts only its own epoch: frames from earlier epochs are left
//! over from a transfer abandoned after a failure and are skipped, frames from
//! later epochs mean the two processes disagree on the transfer sequence.

use bytemuck::{Pod, Zeroable};
use static_assertions::const_assert_eq;
use std::mem::size_of;

use crate::app::App;
use crate::grid::TimeIndex;
use crate::relax_error::RelaxError;

/// Bump when the layout or semantics change in incompatible ways.
pub const WIRE_VERSION: u16 = 2;

#[repr(C)]
#[derive(Copy, Clone, Debug, Pod, Zeroable)]
pub struct WireVectorHdr {
    pub version_le: u16,
    pub epoch_le: u16,
    pub level_le: u32,
    pub index_le: i64,
}

const_assert_eq!(size_of::<WireVectorHdr>(), 16);

pub const HDR_LEN: usize = size_of::<WireVectorHdr>();

impl WireVectorHdr {
    pub fn new(level: usize, epoch: u16, index: TimeIndex) -> Self {
        Self {
            version_le: WIRE_VERSION.to_le(),
            epoch_le: epoch.to_le(),
            level_le: (level as u32).to_le(),
            index_le: index.to_le(),
        }
    }
    pub fn version(&self) -> u16 {
        u16::from_le(self.version_le)
    }
    pub fn epoch(&self) -> u16 {
        u16::from_le(self.epoch_le)
    }
    pub fn level(&self) -> usize {
        u32::from_le(self.level_le) as usize
    }
    pub fn index(&self) -> TimeIndex {
        i64::from_le(self.index_le)
    }
}

/// Receive length for one vector frame.
#[inline]
pub fn frame_len<A: App>(app: &A) -> usize {
    HDR_LEN + app.buf_size()
}

/// Header plus packed payload for the vector at `(level, index)`, sent by the
/// transfer numbered `epoch`.
pub fn pack_frame<A: App>(
    app: &A,
    level: usize,
    epoch: u16,
    index: TimeIndex,
    u: &A::Vector,
) -> Result<Vec<u8>, RelaxError> {
    let mut buf = vec![0u8; frame_len(app)];
    buf[..HDR_LEN].copy_from_slice(bytemuck::bytes_of(&WireVectorHdr::new(level, epoch, index)));
    let written = app
        .buf_pack(u, &mut buf[HDR_LEN..])
        .map_err(RelaxError::collaborator("buf_pack", level, index))?;
    if written > app.buf_size() {
        return Err(RelaxError::Collaborator {
            op: "buf_pack",
            level,
            index,
            source: format!("wrote {written} bytes, buf_size is {}", app.buf_size()).into(),
        });
    }
    buf.truncate(HDR_LEN + written);
    Ok(buf)
}

/// Validates the header of a frame from `neighbor` and unpacks its payload.
///
/// Returns `Ok(None)` for a frame from an epoch before `epoch`; the caller
/// drops it and receives again.
pub fn unpack_frame<A: App>(
    app: &A,
    neighbor: usize,
    level: usize,
    epoch: u16,
    index: TimeIndex,
    frame: &[u8],
) -> Result<Option<A::Vector>, RelaxError> {
    if frame.len() < HDR_LEN {
        return Err(RelaxError::MessageMismatch {
            neighbor,
            expected: format!("at least {HDR_LEN} bytes"),
            got: format!("{} bytes", frame.len()),
        });
    }
    let hdr: WireVectorHdr = bytemuck::pod_read_unaligned(&frame[..HDR_LEN]);
    let mismatch = || RelaxError::MessageMismatch {
        neighbor,
        expected: format!("v{WIRE_VERSION} level {level} epoch {epoch} index {index}"),
        got: format!(
            "v{} level {} epoch {} index {}",
            hdr.version(),
            hdr.level(),
            hdr.epoch(),
            hdr.index()
        ),
    };
    if hdr.version() != WIRE_VERSION || hdr.level() != level {
        return Err(mismatch());
    }
    // signed distance in the wrapping epoch space
    let behind = epoch.wrapping_sub(hdr.epoch()) as i16;
    if behind > 0 {
        log::debug!(
            "wire: level {level} dropping epoch {} frame from rank {neighbor}, expecting {epoch}",
            hdr.epoch()
        );
        return Ok(None);
    }
    if behind < 0 || hdr.index() != index {
        return Err(mismatch());
    }
    app.buf_unpack(&frame[HDR_LEN..])
        .map(Some)
        .map_err(RelaxError::collaborator("buf_unpack", level, index))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn header_is_little_endian() {
        let hdr = WireVectorHdr::new(3, 0x0102, -2);
        let bytes = bytemuck::bytes_of(&hdr);
        assert_eq!(&bytes[0..2], &WIRE_VERSION.to_le_bytes());
        assert_eq!(&bytes[2..4], &[0x02, 0x01]);
        assert_eq!(&bytes[4..8], &3u32.to_le_bytes());
        assert_eq!(&bytes[8..16], &(-2i64).to_le_bytes());
        assert_eq!(hdr.index(), -2);
    }
}
