//! Planning module for reconciliation passes.
//!
//! This module compares desired attributes against stored state and turns
//! the difference into an ordered list of remote commands.

mod builder;
mod command;
mod diff;
mod plan;

pub use builder::{Clause, CommandBuilder, LifecycleAction, StatementDialect};
pub use command::{Command, CommandKind, SuccessCriteria};
pub use diff::{AttributeChange, ChangeAction, Diff, DiffEngine, ExecutionMode};
pub use plan::{ActionType, Plan, ResourcePlan};
