//! Conversation state machines.
//!
//! Two machines share one session per user:
//! - **Onboarding** (`AwaitingJoin` → `MainMenu`): /start, the join gate, the
//!   main menu.
//! - **Admin** (`Idle` → `AwaitingInput`): configuration edits that take one
//!   message of structured input.
//!
//! Handlers take the current state and an `Event`, read and update the stores
//! through `BotContext`, and return the next state plus `Effect`s. The
//! interpreter executes those effects against the chat platform.

pub mod admin;
pub mod context;
pub mod effect;
pub mod event;
pub mod interpreter;
pub mod onboarding;
pub mod session;
pub mod state;

#[cfg(test)]
pub(crate) mod test_support;

pub use context::{BotContext, BotSettings, Transition};
pub use effect::{ConfigList, Effect, LogLevel, Reply};
pub use event::{AdminMenuAction, Event, MenuChoice};
pub use interpreter::Interpreter;
pub use session::SessionStore;
pub use state::{AdminSessionState, OnboardingState, Session};
