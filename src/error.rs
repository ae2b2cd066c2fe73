// PopContext
// copyright zipxing@hotmail.com 2022～2025

//! Error type shared by the context, the geometry model and the node network.
//!
//! "Not found" is not an error here: lookups such as `ParticleList::find`,
//! `ContextData::has_prim_part` or `get_blind_data` return `Option`. Only
//! cheap, checkable misuse is reported through `PopError`.

use crate::{geo::PrimId, geo::Storage, node::NodeId};

#[derive(Debug, Clone, PartialEq)]
pub enum PopError {
    /// the context has no geometry detail yet
    NoDetail,
    /// cook requested without a designated cook node
    NoCookPop,
    UnknownNode(NodeId),
    /// the node graph loops back onto this node
    CookCycle(NodeId),
    UnknownPrimitive(PrimId),
    AttribMissing(String),
    AttribMismatch {
        name: String,
        expected: (Storage, usize),
        actual: (Storage, usize),
    },
    PointOutOfRange { index: usize, count: usize },
    Config(String),
    Io(String),
    Log(String),
}

impl std::fmt::Display for PopError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PopError::NoDetail => write!(f, "context has no geometry detail"),
            PopError::NoCookPop => write!(f, "no cook node set on context"),
            PopError::UnknownNode(id) => write!(f, "unknown node {}", id),
            PopError::CookCycle(id) => write!(f, "cook cycle through node {}", id),
            PopError::UnknownPrimitive(id) => write!(f, "unknown particle primitive {}", id),
            PopError::AttribMissing(name) => write!(f, "missing point attribute '{}'", name),
            PopError::AttribMismatch {
                name,
                expected,
                actual,
            } => write!(
                f,
                "attribute '{}' is {:?}x{}, expected {:?}x{}",
                name, actual.0, actual.1, expected.0, expected.1
            ),
            PopError::PointOutOfRange { index, count } => {
                write!(f, "point {} out of range ({} points)", index, count)
            }
            PopError::Config(msg) => write!(f, "config error: {}", msg),
            PopError::Io(msg) => write!(f, "i/o error: {}", msg),
            PopError::Log(msg) => write!(f, "log init error: {}", msg),
        }
    }
}

impl std::error::Error for PopError {}

impl From<std::io::Error> for PopError {
    fn from(e: std::io::Error) -> Self {
        PopError::Io(e.to_string())
    }
}

impl From<toml::de::Error> for PopError {
    fn from(e: toml::de::Error) -> Self {
        PopError::Config(e.to_string())
    }
}

pub type Result<T> = std::result::Result<T, PopError>;
