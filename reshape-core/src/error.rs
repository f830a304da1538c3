//! Error types for the reshape runtime.

use thiserror::Error;

use crate::reactive::{TokenId, TokenKind};

/// Errors raised by shapes and hooks.
///
/// Dispatch, reconciliation and value reads are otherwise total: an unset
/// store falls back to its initial value and an unset event payload is
/// simply absent.
#[derive(Error, Debug)]
pub enum Error {
    /// A hook ran while no shape was executing a unit body.
    #[error("no active context: hooks can only be used inside a unit body")]
    NoActiveContext,

    /// A hook ran inside a shape operation but outside any node, for example
    /// from a listener or a lifecycle callback.
    #[error("no current node: hooks can only be used inside a unit body")]
    NoCurrentNode,

    /// A token that is not a live handle of the expected kind.
    #[error("incorrect {kind}: {id} is not owned by this runtime")]
    Incorrect { kind: TokenKind, id: TokenId },

    /// A single flush applied more actions than the shape allows.
    #[error("action limit exceeded: {limit} actions applied in one flush")]
    ActionLimit { limit: usize },

    #[error("invalid shape config: {0}")]
    Config(#[from] serde_json::Error),
}

/// Result alias used across the crate.
pub type Result<T> = std::result::Result<T, Error>;
