//! Payload values carried by events and channels.
//!
//! The arithmetic of tokens (`zero`, `one`, `negate`, type conversion) belongs to the actor layer;
//! the scheduler only moves tokens around and inspects their type tag.

use std::fmt::Display;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TokenType {
    Unit,
    Boolean,
    Int,
    Long,
    Double,
    String,
    Array,
}

#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[derive(Debug, Clone, PartialEq, Default)]
pub enum Token {
    /// A token without a value, used by pure events.
    #[default]
    Unit,
    Boolean(bool),
    Int(i32),
    Long(i64),
    Double(f64),
    String(String),
    Array(Vec<Token>),
}

impl Token {
    pub fn token_type(&self) -> TokenType {
        match self {
            Token::Unit => TokenType::Unit,
            Token::Boolean(_) => TokenType::Boolean,
            Token::Int(_) => TokenType::Int,
            Token::Long(_) => TokenType::Long,
            Token::Double(_) => TokenType::Double,
            Token::String(_) => TokenType::String,
            Token::Array(_) => TokenType::Array,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Token::Boolean(value) => Some(*value),
            _ => None,
        }
    }

    pub fn as_int(&self) -> Option<i32> {
        match self {
            Token::Int(value) => Some(*value),
            _ => None,
        }
    }

    /// The value as a `Long`, losslessly widening an `Int`.
    pub fn as_long(&self) -> Option<i64> {
        match self {
            Token::Int(value) => Some(i64::from(*value)),
            Token::Long(value) => Some(*value),
            _ => None,
        }
    }

    /// The value as a `Double`, losslessly widening an `Int`.
    pub fn as_double(&self) -> Option<f64> {
        match self {
            Token::Int(value) => Some(f64::from(*value)),
            Token::Double(value) => Some(*value),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Token::String(value) => Some(value),
            _ => None,
        }
    }

    pub fn as_array(&self) -> Option<&[Token]> {
        match self {
            Token::Array(values) => Some(values),
            _ => None,
        }
    }
}

impl Display for Token {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Token::Unit => write!(f, "()"),
            Token::Boolean(value) => write!(f, "{value}"),
            Token::Int(value) => write!(f, "{value}"),
            Token::Long(value) => write!(f, "{value}L"),
            Token::Double(value) => write!(f, "{value:?}"),
            Token::String(value) => write!(f, "{value:?}"),
            Token::Array(values) => {
                write!(f, "{{")?;
                for (i, value) in values.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{value}")?;
                }
                write!(f, "}}")
            }
        }
    }
}

macro_rules! impl_from {
    ($ty:ty => $variant:ident) => {
        impl From<$ty> for Token {
            fn from(value: $ty) -> Self {
                Token::$variant(value)
            }
        }
    };
}

impl_from!(bool => Boolean);
impl_from!(i32 => Int);
impl_from!(i64 => Long);
impl_from!(f64 => Double);
impl_from!(String => String);
impl_from!(Vec<Token> => Array);

impl From<&str> for Token {
    fn from(value: &str) -> Self {
        Token::String(value.to_owned())
    }
}

impl From<()> for Token {
    fn from(_: ()) -> Self {
        Token::Unit
    }
}
