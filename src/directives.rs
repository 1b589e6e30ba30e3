use std::collections::HashSet;

use indexmap::IndexMap;
use oxc_ast::ast::*;
use oxc_ast_visit::{walk, Visit};
use oxc_syntax::scope::ScopeFlags;
use serde::{Deserialize, Serialize};

use crate::errors::{TransformError, TransformResult};

pub const USE_CLIENT: &str = "use client";
pub const USE_SERVER: &str = "use server";

const CONFLICT_MESSAGE: &str = "Cannot have both \"use client\" and \"use server\" in the same module";

/// Which side of the boundary a module or function belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Tier {
    #[serde(rename = "use client")]
    Client,
    #[serde(rename = "use server")]
    Server,
}

impl Tier {
    pub fn directive(self) -> &'static str {
        match self {
            Tier::Client => USE_CLIENT,
            Tier::Server => USE_SERVER,
        }
    }

    pub fn from_directive(value: &str) -> Option<Tier> {
        match value {
            USE_CLIENT => Some(Tier::Client),
            USE_SERVER => Some(Tier::Server),
            _ => None,
        }
    }

    pub fn other(self) -> Tier {
        match self {
            Tier::Client => Tier::Server,
            Tier::Server => Tier::Client,
        }
    }
}

impl std::fmt::Display for Tier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.directive())
    }
}

/// Result of [`scan_directives`].
///
/// Functions are keyed by their source span, which is unique per function
/// node and survives the node being moved.
#[derive(Debug, Clone, Default)]
pub struct DirectiveScan {
    /// Tier declared by the module's own leading directives.
    pub module_tier: Option<Tier>,
    /// Functions whose body carries a marker, in traversal order.
    pub marked: IndexMap<Span, Tier>,
}

impl DirectiveScan {
    pub fn tier_of(&self, func: Span) -> Option<Tier> {
        self.marked.get(&func).copied()
    }

    pub fn has_server_functions(&self) -> bool {
        self.marked.values().any(|tier| *tier == Tier::Server)
    }

    /// Spans of every `"use server"` function.
    pub fn server_functions(&self) -> HashSet<Span> {
        self.marked
            .iter()
            .filter(|(_, tier)| **tier == Tier::Server)
            .map(|(span, _)| *span)
            .collect()
    }

    /// Tier worth recording for this module: the module's own, or server when
    /// only function-level actions were found.
    pub fn effective_tier(&self) -> Option<Tier> {
        self.module_tier
            .or_else(|| self.has_server_functions().then_some(Tier::Server))
    }

    pub fn is_untouched(&self) -> bool {
        self.module_tier.is_none() && self.marked.is_empty()
    }
}

fn tiers_in(directives: &[Directive]) -> (bool, bool) {
    let client = directives.iter().any(|d| d.directive.as_str() == USE_CLIENT);
    let server = directives.iter().any(|d| d.directive.as_str() == USE_SERVER);
    (client, server)
}

/// Records marked function bodies. Object and class methods are members, not
/// actions, so their own bodies are skipped; functions nested inside them are
/// still visited.
#[derive(Default)]
struct MarkerCollector {
    marked: IndexMap<Span, Tier>,
    methods: HashSet<Span>,
    conflicting_function: bool,
}

impl MarkerCollector {
    fn record(&mut self, span: Span, directives: &[Directive]) {
        if self.methods.contains(&span) {
            return;
        }
        match tiers_in(directives) {
            (true, true) => self.conflicting_function = true,
            (true, false) => {
                self.marked.insert(span, Tier::Client);
            }
            (false, true) => {
                self.marked.insert(span, Tier::Server);
            }
            (false, false) => {}
        }
    }
}

impl<'a> Visit<'a> for MarkerCollector {
    fn visit_function(&mut self, func: &Function<'a>, flags: ScopeFlags) {
        if let Some(body) = &func.body {
            self.record(func.span, &body.directives);
        }
        walk::walk_function(self, func, flags);
    }

    fn visit_arrow_function_expression(&mut self, arrow: &ArrowFunctionExpression<'a>) {
        // A concise body cannot carry a directive.
        if !arrow.expression {
            self.record(arrow.span, &arrow.body.directives);
        }
        walk::walk_arrow_function_expression(self, arrow);
    }

    fn visit_method_definition(&mut self, method: &MethodDefinition<'a>) {
        self.methods.insert(method.value.span);
        walk::walk_method_definition(self, method);
    }

    fn visit_object_property(&mut self, prop: &ObjectProperty<'a>) {
        if prop.method || prop.kind != PropertyKind::Init {
            if let Expression::FunctionExpression(func) = &prop.value {
                self.methods.insert(func.span);
            }
        }
        walk::walk_object_property(self, prop);
    }
}

/// Classifies the module and every function by their leading markers.
///
/// The module's own marker is consumed here; it never reaches the output.
/// Comments attached to it move to the top of the module. Function-level
/// markers stay in place until the hoist pass decides what to do with each
/// function.
pub fn scan_directives(program: &mut Program, file: &str) -> TransformResult<DirectiveScan> {
    let module_tier = match tiers_in(&program.directives) {
        (true, true) => return Err(TransformError::conflict(CONFLICT_MESSAGE, file)),
        (true, false) => Some(Tier::Client),
        (false, true) => Some(Tier::Server),
        (false, false) => None,
    };

    let mut collector = MarkerCollector::default();
    collector.visit_program(program);

    if collector.conflicting_function {
        return Err(TransformError::conflict(CONFLICT_MESSAGE, file)
            .with_hint("A single function body carries both markers."));
    }
    if let Some(tier) = module_tier {
        if collector.marked.values().any(|marked| *marked == tier.other()) {
            return Err(TransformError::conflict(CONFLICT_MESSAGE, file).with_hint(format!(
                "The module is \"{}\" but a function inside it is \"{}\".",
                tier,
                tier.other()
            )));
        }
        strip_module_marker(program, tier);
    }

    tracing::debug!(
        file,
        module_tier = ?module_tier,
        marked_functions = collector.marked.len(),
        "classified module"
    );

    Ok(DirectiveScan {
        module_tier,
        marked: collector.marked,
    })
}

fn strip_module_marker(program: &mut Program, tier: Tier) {
    let removed: Vec<u32> = program
        .directives
        .iter()
        .filter(|d| d.directive.as_str() == tier.directive())
        .map(|d| d.span.start)
        .collect();
    program
        .directives
        .retain(|d| d.directive.as_str() != tier.directive());
    for comment in program.comments.iter_mut() {
        if removed.contains(&comment.attached_to) {
            comment.attached_to = 0;
        }
    }
}
