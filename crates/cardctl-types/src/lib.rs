//! Card Control Types - Canonical domain types for the card-control engine
//!
//! This crate has zero dependencies on other cardctl crates. It defines:
//!
//! - Identity types (TokenizedCardNumber, CardNumber, PersonaId, DocumentId)
//! - Control types and their category classification
//! - The control document model and outbound request payload
//! - The error taxonomy shared by every other crate

pub mod identity;
pub mod control;
pub mod document;
pub mod error;

pub use identity::*;
pub use control::*;
pub use document::*;
pub use error::*;
