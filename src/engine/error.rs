use crate::model::{ManagerId, SlotId, Span};

#[derive(Debug)]
pub enum EngineError {
    ManagerNotFound(ManagerId),
    SlotNotFound(SlotId),
    ManagerExists(ManagerId),
    SlotExists(SlotId),
    HasSlots(ManagerId),
    InvalidSpan(Span),
    LimitExceeded(&'static str),
    WalError(String),
}

impl std::fmt::Display for EngineError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EngineError::ManagerNotFound(id) => write!(f, "sales manager not found: {id}"),
            EngineError::SlotNotFound(id) => write!(f, "slot not found: {id}"),
            EngineError::ManagerExists(id) => write!(f, "sales manager already exists: {id}"),
            EngineError::SlotExists(id) => write!(f, "slot already exists: {id}"),
            EngineError::HasSlots(id) => {
                write!(f, "cannot delete sales manager {id}: still owns slots")
            }
            EngineError::InvalidSpan(span) => {
                write!(f, "invalid slot [{}, {}): start must be before end", span.start, span.end)
            }
            EngineError::LimitExceeded(msg) => write!(f, "limit exceeded: {msg}"),
            EngineError::WalError(e) => write!(f, "WAL error: {e}"),
        }
    }
}

impl std::error::Error for EngineError {}
