// Language model backends
//
// The agent system only depends on the `ChatModel` trait; `OpenAiCompatModel`
// talks to a real endpoint and `ScriptedModel` drives tests.

pub mod mock;
pub mod model;
pub mod openai;

pub use mock::{MockResponse, ScriptedModel};
pub use model::{generate, ChatModel, ModelError, ModelResponse};
pub use openai::OpenAiCompatModel;
