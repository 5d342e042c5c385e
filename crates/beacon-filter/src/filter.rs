//! Channel filter parsing and matching.
//!
//! Parsing never fails: anything that does not fit `name(sig)` is a bare
//! channel name.

use std::convert::Infallible;
use std::fmt;
use std::str::FromStr;

use crate::value::Value;

/// Signature token matching an argument of any type.
pub const WILDCARD: &str = "*";

/// A parsed subscription key.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ChannelFilter {
    /// The literal filter string.
    raw: String,
    /// Required channel name. `None` matches any channel.
    channel: Option<String>,
    /// Required argument type tags. `None` places no constraint on arguments.
    signature: Option<Vec<String>>,
}

impl ChannelFilter {
    /// Parse a filter string.
    #[must_use]
    pub fn parse(raw: &str) -> Self {
        match split_signature(raw) {
            Some((name, signature)) => Self {
                raw: raw.to_string(),
                channel: (!name.is_empty()).then(|| name.to_string()),
                signature,
            },
            // Malformed signature syntax: keep the literal string as the name.
            None => Self {
                raw: raw.to_string(),
                channel: Some(raw.to_string()),
                signature: None,
            },
        }
    }

    /// Get the literal filter string.
    #[must_use]
    pub fn raw(&self) -> &str {
        &self.raw
    }

    /// Get the required channel name, if any.
    #[must_use]
    pub fn channel(&self) -> Option<&str> {
        self.channel.as_deref()
    }

    /// Get the required signature, if any.
    #[must_use]
    pub fn signature(&self) -> Option<&[String]> {
        self.signature.as_deref()
    }

    /// Check whether the filter constrains neither channel nor arguments.
    #[must_use]
    pub fn is_unconstrained(&self) -> bool {
        self.channel.is_none() && self.signature.is_none()
    }

    /// Test a published channel and argument list against this filter.
    #[must_use]
    pub fn matches(&self, channel: &str, args: &[Value]) -> bool {
        if let Some(name) = &self.channel {
            if name != channel {
                return false;
            }
        }

        match &self.signature {
            Some(signature) => {
                signature.len() == args.len()
                    && signature
                        .iter()
                        .zip(args)
                        .all(|(token, arg)| token == WILDCARD || token == arg.type_tag().as_str())
            }
            None => true,
        }
    }
}

impl fmt::Display for ChannelFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.raw)
    }
}

impl FromStr for ChannelFilter {
    type Err = Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self::parse(s))
    }
}

/// Split `name(t1, t2)` into its trimmed name and signature.
///
/// Returns `None` when the string does not fit the grammar.
fn split_signature(raw: &str) -> Option<(&str, Option<Vec<String>>)> {
    let trimmed = raw.trim();

    let Some(open) = trimmed.find('(') else {
        if trimmed.contains(')') {
            return None;
        }
        return Some((trimmed, None));
    };

    let body = trimmed[open + 1..].strip_suffix(')')?;
    if body.contains(['(', ')']) {
        return None;
    }

    let name = trimmed[..open].trim();
    if name.contains(')') {
        return None;
    }

    let signature = if body.trim().is_empty() {
        Vec::new()
    } else {
        body.split(',').map(|token| token.trim().to_string()).collect()
    };

    Some((name, Some(signature)))
}
