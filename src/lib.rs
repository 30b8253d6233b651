// ============================================================================
// Strict linting - Dangerous or non-idiomatic practices are forbidden
// ============================================================================

#![deny(warnings)]                    // All warnings are treated as errors
#![deny(unsafe_code)]                 // Unsafe code is forbidden
#![deny(missing_docs)]                // All public items must be documented
#![deny(dead_code)]                   // Unused code is forbidden
#![deny(non_camel_case_types)]        // Types must follow CamelCase convention

// Additional strictness - Leave nothing unchecked
#![deny(unused_imports)]              // Unused imports are forbidden
#![deny(unused_variables)]            // Unused variables are forbidden
#![deny(unused_must_use)]             // Must handle Result and Option explicitly
#![deny(non_snake_case)]              // Variables and functions must be snake_case
#![deny(non_upper_case_globals)]      // Constants must be UPPER_CASE
#![deny(nonstandard_style)]           // Non-standard code style is forbidden
#![forbid(unsafe_op_in_unsafe_fn)]    // Unsafe ops in unsafe fns are forbidden

// Clippy lints (warnings only)
#![warn(clippy::all)]                 // All standard Clippy lints
#![warn(clippy::pedantic)]            // Very strict Clippy lints
#![warn(clippy::nursery)]             // Experimental lints
#![warn(clippy::unwrap_used)]         // unwrap() warning
#![warn(clippy::expect_used)]         // expect() warning
#![warn(clippy::panic)]               // panic!() warning
#![warn(clippy::print_stdout)]        // println!() warning
#![warn(clippy::todo)]                // TODO warning
#![warn(clippy::unimplemented)]       // unimplemented!() warning
#![warn(clippy::missing_const_for_fn)] // Force const when possible
#![warn(clippy::unwrap_in_result)]    // unwrap() in Result warning
#![warn(clippy::module_inception)]    // Module with same name as crate warning
#![warn(clippy::redundant_clone)]     // Useless clones warning
#![warn(clippy::shadow_unrelated)]    // Shadowing unrelated variables warning
#![warn(clippy::too_many_arguments)]  // Limit function arguments
#![warn(clippy::cognitive_complexity)] // Limit cognitive complexity

// Safety and robustness lints
#![deny(overflowing_literals)]        // Overflowing literals are forbidden
#![deny(arithmetic_overflow)]         // Arithmetic overflow is forbidden

// ============================================================================
// Crate Documentation
// ============================================================================

//! # Vantage Reconcile
//!
//! A declarative, idempotent reconciliation engine for Teradata Vantage
//! compute profiles.
//!
//! ## Overview
//!
//! Vantage Reconcile lets you declare compute profiles in a YAML file and
//! converge a system towards them:
//!
//! - Diff desired attributes against the last stored state
//! - Render the exact DDL a change needs (alter in place or drop and create)
//! - Send it through the Query Service and record the outcome durably
//! - Mark objects tainted whenever the remote outcome is unknown
//!
//! ## Architecture
//!
//! Every lifecycle call is one pass over one identity:
//!
//! 1. **Diff**: [`planner::DiffEngine`] classifies each attribute change
//! 2. **Build**: [`planner::CommandBuilder`] renders the statements
//! 3. **Record**: a write-ahead [`state::StateRecord`] is saved
//! 4. **Execute**: a [`executor::RemoteExecutor`] runs the statements
//! 5. **Settle**: the [`reconciler::Reconciler`] records the outcome
//!
//! ## Modules
//!
//! - [`resource`]: Attribute values, schemas, identities and states
//! - [`planner`]: Diff computation, command building and plans
//! - [`executor`]: Remote executor boundary and Query Service client
//! - [`state`]: State storage backends (local, S3, memory)
//! - [`reconciler`]: Per-object lifecycle state machine
//! - [`session`]: Runs over a whole configuration file
//! - [`config`]: Configuration parsing and validation
//! - [`cli`]: Command-line interface
//!
//! ## Example
//!
//! ```yaml
//! connection:
//!   base_url: https://vantage.example.com:1443
//!   system: prod
//!   user: dbc
//!
//! resources:
//!   - name: analytics
//!     type: compute_profile
//!     attributes:
//!       compute_profile_name: cp_analytics
//!       compute_group_name: cg_analytics
//!       query_strategy: STANDARD
//! ```

// ============================================================================
// Modules
// ============================================================================

pub mod cli;
pub mod config;
pub mod error;
pub mod executor;
pub mod planner;
pub mod reconciler;
pub mod resource;
pub mod session;
pub mod state;

// ============================================================================
// Re-exports
// ============================================================================

pub use cli::{Cli, Commands, OutputFormatter};
pub use config::{AttributeHasher, ConfigParser, ConfigValidator, VantageConfig};
pub use error::{Result, VantageError};
pub use executor::{CancelHandle, CancelSignal, ExecOutcome, QueryServiceExecutor, RemoteExecutor, cancel_pair};
pub use planner::{Command, CommandBuilder, Diff, DiffEngine, Plan};
pub use reconciler::{Created, ReadResult, Reconciler, Updated};
pub use resource::{AttributeSet, AttributeValue, ReconciliationState, ResourceIdentity, ResourceSchema};
pub use session::{ApplyReport, RefreshReport, Session};
pub use state::{LocalStateStore, MemoryStateStore, S3StateStore, StateRecord, StateStore};
