//! Composite resource identifiers.
//!
//! Child resources are addressed by their parent's UUID plus one or more
//! names, e.g. a load balancer backend member is
//! `{loadbalancer UUID}/{backend name}/{member name}`. The joined string is
//! stored as the resource `id` in state, so the format must stay stable:
//! components are joined with [`SEPARATOR`] and nothing is escaped.
//!
//! # Example
//!
//! ```
//! use upcloud_provider::id::{marshal_id, unmarshal_id};
//!
//! let id = marshal_id(&["0aded5c1", "web", "member-1"]).unwrap();
//! assert_eq!(id, "0aded5c1/web/member-1");
//!
//! let [lb, backend, member] = unmarshal_id::<3>(&id).unwrap();
//! assert_eq!((lb.as_str(), backend.as_str(), member.as_str()), ("0aded5c1", "web", "member-1"));
//! ```

use thiserror::Error;

/// Separator between identifier components.
pub const SEPARATOR: char = '/';

/// Errors produced while encoding or decoding a composite identifier.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum IdError {
    /// No components were given.
    #[error("an ID needs at least one component")]
    NoComponents,

    /// The ID has fewer components than the caller asked for.
    #[error("not enough components in ID: expected {expected}, found {found}")]
    NotEnoughComponents {
        /// Number of components requested.
        expected: usize,
        /// Number of components present.
        found: usize,
    },

    /// A component is empty.
    #[error("ID component {index} is empty")]
    EmptyComponent {
        /// Zero-based position of the empty component.
        index: usize,
    },

    /// A component contains the separator and would not decode back.
    #[error("ID component '{component}' contains the separator '/'")]
    SeparatorInComponent {
        /// The offending component.
        component: String,
    },
}

/// Join identifier components into a single ID string.
pub fn marshal_id(components: &[&str]) -> Result<String, IdError> {
    if components.is_empty() {
        return Err(IdError::NoComponents);
    }
    for (index, component) in components.iter().enumerate() {
        if component.is_empty() {
            return Err(IdError::EmptyComponent { index });
        }
        if component.contains(SEPARATOR) {
            return Err(IdError::SeparatorInComponent {
                component: (*component).to_string(),
            });
        }
    }
    Ok(components.join("/"))
}

/// Split an ID string into exactly `N` components.
///
/// Components past the first `N` are ignored, which keeps IDs written by
/// older releases decodable.
pub fn unmarshal_id<const N: usize>(id: &str) -> Result<[String; N], IdError> {
    let parts: Vec<&str> = id.split(SEPARATOR).collect();
    if parts.len() < N {
        return Err(IdError::NotEnoughComponents {
            expected: N,
            found: parts.len(),
        });
    }
    if parts.len() > N {
        tracing::debug!(id, expected = N, found = parts.len(), "ignoring trailing ID components");
    }

    let mut out: [String; N] = std::array::from_fn(|_| String::new());
    for (index, (slot, part)) in out.iter_mut().zip(parts).enumerate() {
        if part.is_empty() {
            return Err(IdError::EmptyComponent { index });
        }
        *slot = part.to_string();
    }
    Ok(out)
}
