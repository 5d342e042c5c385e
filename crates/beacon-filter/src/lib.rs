//! # beacon-filter
//!
//! Channel filter grammar for the Beacon dispatch engine.
//!
//! A component subscribes with a *filter string*: an optional channel name
//! followed by an optional, parenthesized argument signature. Signature
//! entries are type tags (see [`TypeTag`]) or the `*` wildcard.
//!
//! ## Grammar
//!
//! ```text
//! name              any arguments on channel `name`
//! name(t1, t2)      channel `name`, exactly two arguments typed t1, t2
//! name()            channel `name`, no arguments
//! (t1, t2)          any channel, two arguments typed t1, t2
//! ""                any channel, any arguments
//! ```
//!
//! Strings that do not fit the grammar (unbalanced or nested parentheses)
//! are taken verbatim as a bare channel name.
//!
//! ## Example
//!
//! ```rust
//! use beacon_filter::{ChannelFilter, Value};
//!
//! let filter = ChannelFilter::parse("msg(string, *)");
//! assert!(filter.matches("msg", &[Value::from("hi"), Value::from(3)]));
//! assert!(!filter.matches("msg", &[Value::from(3), Value::from(3)]));
//! ```

pub mod filter;
pub mod value;

pub use filter::{ChannelFilter, WILDCARD};
pub use value::{Callable, TypeTag, Value};
