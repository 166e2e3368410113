//! WhatsApp relay over the oraculo engine.
//!
//! ```text
//! webhook POST ──► webhook::parse_inbound ──► buffer::TurnBuffer
//!                                                   │ (debounce window)
//!                                                   ▼
//!                                         fired Turn channel
//!                                                   │
//!                                                   ▼
//!                      responder ──► AnswerPipeline ──► outbound::EvolutionApi
//! ```
//!
//! Rapid-fire inbound messages from one sender coalesce into a single
//! turn before the answer pipeline runs, so a burst of short WhatsApp
//! messages costs one model call instead of several.

pub mod buffer;
pub mod config;
pub mod outbound;
pub mod responder;
pub mod types;
pub mod webhook;

pub use buffer::{Turn, TurnBuffer};
pub use config::RelayConfig;
pub use outbound::EvolutionApi;
pub use responder::spawn_responder;
pub use types::RelayError;
pub use webhook::{InboundMessage, InboundRejection, RelayState, parse_inbound, router};
