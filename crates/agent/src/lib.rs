//! The agent orchestration loop for Wayfinder.
//!
//! A turn moves through model calls and tool dispatch until the model
//! answers without tool calls:
//!
//! 1. **Receive** the user message and append it to the conversation
//! 2. **Call the model** through the middleware [`Pipeline`] (prompt
//!    injection, repair, synthesis, summarization) and the model router
//! 3. **If tool calls**: run them concurrently, append results in call
//!    order, loop back to step 2
//! 4. **If a call needs confirmation**: suspend and return the pending calls
//! 5. **If text response**: append it and return it to the caller
//!
//! The loop continues until the model responds with text only or the
//! iteration limit is reached.

pub mod context;
pub mod error;
pub mod loop_runner;
pub mod middleware;

#[cfg(test)]
mod test_helpers;

pub use context::{AgentContext, AgentContextBuilder, ContextCache};
pub use error::AgentError;
pub use loop_runner::{AgentLoop, Decision, Suspension, TurnOutcome};
pub use wayfinder_core::message::LoopState;
pub use middleware::{CallContext, Middleware, ModelRequest, Next, Pipeline, StateUpdate};
