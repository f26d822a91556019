//! Explicit state machine for deployment approvals.
//!
//! The design separates:
//! - **State**: the latest `DeploymentRecord` of a (repository, environment)
//!   pair plus the approver registry
//! - **Events**: what happened (`Event`)
//! - **Effects**: what to do (`Effect`)
//! - **Transition**: pure function `(State, Event) -> (Record, Vec<Effect>)`
//!
//! The interpreter executes effects against the chat platform, the CI
//! platform and the record store. `resolver` ties the three together.

pub mod effect;
pub mod event;
pub mod interpreter;
pub mod resolver;
pub mod transition;

pub use effect::*;
pub use event::*;
pub use interpreter::{execute_effects, InterpreterContext};
pub use resolver::process_event;
pub use transition::*;
