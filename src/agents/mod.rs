// Agent system modules
//
// Hierarchical agent teams: a dispatcher routes between teams, each team's
// supervisor routes between its workers, and workers run tool loops against
// the model backend.

pub mod context;
pub mod dispatcher;
pub mod errors;
pub mod events;
pub mod graph;
pub mod messages;
pub mod prompts;
pub mod state;
pub mod supervisor;
pub mod types;
pub mod worker;

// Re-export main types
pub use context::{ExecutionScope, RequestContext};
pub use dispatcher::{Dispatcher, DispatcherConfig};
pub use errors::{AgentError, AgentResult};
pub use graph::{GraphSettings, TeamGraph};
pub use supervisor::TeamSupervisor;
pub use types::{CompletionPolicy, Roster, TeamDescriptor, WorkerSpec};
pub use worker::WorkerNode;
