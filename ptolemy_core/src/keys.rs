//! Runtime keys for the various model components.
//!
//! Keys are dense indices handed out in construction order. Actor keys double as the
//! topological position of the actor inside its model.

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

macro_rules! key_type {
    ($(#[$outer:meta])* $vis:vis $name:ident) => {
        $(#[$outer])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
        #[repr(transparent)]
        $vis struct $name(usize);

        impl $name {
            /// The raw index of this key.
            #[inline]
            pub const fn index(self) -> usize {
                self.0
            }
        }

        impl From<usize> for $name {
            #[inline]
            fn from(index: usize) -> Self {
                Self(index)
            }
        }

        impl From<$name> for usize {
            #[inline]
            fn from(key: $name) -> Self {
                key.0
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, "{}({})", stringify!($name), self.0)
            }
        }
    };
}

key_type! {
    /// Runtime key for an Actor, unique within a model.
    #[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
    pub ActorKey
}

key_type! {
    /// Runtime key for a Port, unique within its owning Actor.
    #[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
    pub PortKey
}

key_type! {
    /// Runtime key for a process-network channel, unique within a director.
    #[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
    pub ChannelKey
}
