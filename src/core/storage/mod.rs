//! Storage for frames owned by an interface.

mod pool;

pub use self::pool::{
    BufferPool,
    PacketBuffer,
};
