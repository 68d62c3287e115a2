// Streaming layer
//
// Filters model generations down to the user-facing output and turns one
// request into a stream of SSE frames.

pub mod events;
pub mod filter;
pub mod session;

pub use events::{OutboundEvent, SessionFrame};
pub use filter::{DefaultClassifier, SuppressionClassifier, TokenFilter};
pub use session::ChatService;
