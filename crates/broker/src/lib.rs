//! The stream broker: binds one writer and many readers through a shared
//! append-only byte log with liveness signalling, resume-by-offset, and
//! completion/kill semantics. Everything here is generic over the
//! [`tailcast_store::Store`] seam.
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]

mod channel;
mod error;
mod reader;
mod registrar;
mod writer;

pub use channel::Channel;
pub use error::Error;
pub use reader::{ReadEvent, Reader};
pub use registrar::Registrar;
pub use writer::Writer;
