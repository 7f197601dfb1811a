//! Leaf value types shared by every Ptolemy crate: model time, tags and runtime keys.

pub mod keys;
pub mod time;

pub use self::keys::{ActorKey, ChannelKey, PortKey};
pub use self::time::{Tag, TimeError, Timestamp};
