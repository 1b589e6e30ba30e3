//! # Client/Server Boundary Transform
//!
//! Rewrites JavaScript modules that carry a `"use client"` or `"use server"`
//! marker so that each bundle only sees its own side of the boundary.
//!
//! ## Pipeline
//!
//! 1. **Parse** with `oxc_parser` into an arena-allocated AST
//!    ([`parse_program`]).
//! 2. **Scan**: leading directives of the module and of every function body
//!    are classified. Both markers in one module is fatal. Class and object
//!    methods are members, never actions, but functions inside them are
//!    scanned like any other.
//! 3. **Rewrite**, depending on target and tier:
//!    - server target, `"use client"` module: body replaced by client
//!      references, one per export.
//!    - server target, `"use server"` module: every exported top-level function
//!      registered after the body.
//!    - server target, untagged module: inline actions hoisted to module scope
//!      with their captured values, exported in-place actions registered.
//!      Captures are resolved with `oxc_semantic`.
//!    - client target, `"use server"` module: body replaced by server
//!      references.
//! 4. **Inject**: registration imports, the carrier helper and hoisted
//!    declarations are spliced in once per module.
//! 5. **Print** with `oxc_codegen` ([`print_program`]). Comments stay with
//!    the nodes they were attached to.
//!
//! ## Invariants
//!
//! 1. Same input, same id generator, same output.
//! 2. Generated names never collide with a name already in the module.
//! 3. Every hoisted action and every registered export uses the id of its
//!    `(file, tier)` pair.
//! 4. A module without a marker in directive position is returned unchanged.

#[cfg(feature = "napi")]
pub use plugin::{transform_many_native, transform_native};

pub mod codegen;
pub mod config;
pub mod directives;
pub mod errors;
pub mod exports;
pub mod hoist;
pub mod ids;
pub mod inject;
pub mod parse;
pub mod plugin;
pub mod scope;
pub mod sidecar;
pub mod transform;

#[cfg(test)]
mod client_transform_tests;

pub use codegen::print_program;
pub use config::{EncryptionConfig, IdStrategy, RegistrationConfig, TransformOptions};
pub use directives::{Tier, USE_CLIENT, USE_SERVER};
pub use errors::{TransformError, TransformErrorKind, TransformResult};
pub use ids::{
    generator_for, DirectiveIdGenerator, HashedIdGenerator, IdGenerator, MemoizedIdGenerator,
    RelativePathIdGenerator,
};
pub use parse::parse_program;
pub use plugin::{transform_code, transform_many, TransformJob, TransformOutput};
pub use sidecar::ModuleLog;
pub use transform::{client_transform, server_transform, transform_program, Target};
