//! Message channel between neighbouring processes on the time axis.

pub mod channel;
pub mod communicator;
pub mod tri_channel;
pub mod wire;

pub use channel::UTransfer;
pub use communicator::{CommTag, Communicator, LocalComm, NoComm, Wait, complete_send};
#[cfg(feature = "mpi-support")]
pub use communicator::MpiComm;
pub use tri_channel::{Direction, PostedRequest, TriTransfer};
