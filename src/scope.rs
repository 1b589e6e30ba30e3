//! Free-variable analysis for server actions.
//!
//! Scopes and symbol resolution come from `oxc_semantic`, built once on the
//! untouched program. A reference is captured when it reads a binding that
//! lives neither at module scope nor inside the action itself. Globals have
//! no symbol and are never captured.

use std::collections::{HashMap, HashSet};

use oxc_ast::ast::*;
use oxc_ast_visit::{walk, Visit};
use oxc_semantic::{ReferenceId, ScopeId, Scoping, SemanticBuilder};
use oxc_syntax::scope::ScopeFlags;

/// Symbol and scope tables for `program`.
pub fn build_scoping(program: &Program) -> Scoping {
    SemanticBuilder::new().build(program).semantic.into_scoping()
}

/// Captured names of every function whose span is in `targets`, in first
/// reference order.
pub fn free_variables(
    program: &Program,
    scoping: &Scoping,
    targets: &HashSet<Span>,
) -> HashMap<Span, Vec<String>> {
    let mut finder = TargetFinder {
        scoping,
        targets,
        found: HashMap::new(),
    };
    finder.visit_program(program);
    finder.found
}

struct TargetFinder<'s> {
    scoping: &'s Scoping,
    targets: &'s HashSet<Span>,
    found: HashMap<Span, Vec<String>>,
}

impl TargetFinder<'_> {
    fn analyze(&mut self, span: Span, own: Option<ScopeId>, refs: Vec<(ReferenceId, String)>) {
        let Some(own) = own else {
            return;
        };
        let vars = captured(self.scoping, own, refs);
        tracing::trace!(?span, captured = ?vars, "analyzed closure");
        self.found.insert(span, vars);
    }
}

impl<'a> Visit<'a> for TargetFinder<'_> {
    fn visit_function(&mut self, func: &Function<'a>, flags: ScopeFlags) {
        if self.targets.contains(&func.span) {
            let mut refs = ReferenceCollector::default();
            walk::walk_function(&mut refs, func, flags);
            self.analyze(func.span, func.scope_id.get(), refs.refs);
        }
        walk::walk_function(self, func, flags);
    }

    fn visit_arrow_function_expression(&mut self, arrow: &ArrowFunctionExpression<'a>) {
        if self.targets.contains(&arrow.span) {
            let mut refs = ReferenceCollector::default();
            walk::walk_arrow_function_expression(&mut refs, arrow);
            self.analyze(arrow.span, arrow.scope_id.get(), refs.refs);
        }
        walk::walk_arrow_function_expression(self, arrow);
    }
}

/// Every resolved identifier reference, in source order.
#[derive(Default)]
struct ReferenceCollector {
    refs: Vec<(ReferenceId, String)>,
}

impl<'a> Visit<'a> for ReferenceCollector {
    fn visit_identifier_reference(&mut self, ident: &IdentifierReference<'a>) {
        if let Some(reference) = ident.reference_id.get() {
            self.refs.push((reference, ident.name.to_string()));
        }
    }
}

fn captured(scoping: &Scoping, own: ScopeId, refs: Vec<(ReferenceId, String)>) -> Vec<String> {
    let root = scoping.root_scope_id();
    let mut vars: Vec<String> = Vec::new();
    for (reference, name) in refs {
        let reference = scoping.get_reference(reference);
        if !reference.is_read() {
            continue;
        }
        let Some(symbol) = reference.symbol_id() else {
            continue;
        };
        let declared_in = scoping.symbol_scope_id(symbol);
        if declared_in == root || scoping.scope_ancestors(declared_in).any(|s| s == own) {
            continue;
        }
        if !vars.contains(&name) {
            vars.push(name);
        }
    }
    vars
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::directives::scan_directives;
    use crate::parse::parse_program;
    use oxc_allocator::Allocator;

    fn free_vars(source: &str) -> Vec<Vec<String>> {
        let allocator = Allocator::default();
        let mut program = parse_program(&allocator, source, "test.jsx").unwrap();
        let scan = scan_directives(&mut program, "test.jsx").unwrap();
        let scoping = build_scoping(&program);
        let mut found = free_variables(&program, &scoping, &scan.server_functions());
        scan.marked
            .keys()
            .map(|span| found.remove(span).unwrap_or_default())
            .collect()
    }

    #[test]
    fn test_captures_outer_parameters_in_first_reference_order() {
        let vars = free_vars(
            r#"
            export function SayHello({ name, age }) {
                function formAction(formData) {
                    "use server";
                    console.log({ age, name, formData, age });
                }
                return formAction;
            }
            "#,
        );
        assert_eq!(vars, vec![vec!["age".to_string(), "name".to_string()]]);
    }

    #[test]
    fn test_module_bindings_and_globals_are_not_captured() {
        let vars = free_vars(
            r#"
            import db from "./db";
            const table = "users";
            function helper() {}
            export function Page() {
                const action = async () => {
                    "use server";
                    await db.insert(table, helper(), globalThis.value);
                };
                return action;
            }
            "#,
        );
        assert_eq!(vars, vec![Vec::<String>::new()]);
    }

    #[test]
    fn test_locals_and_nested_scopes_are_not_captured() {
        let vars = free_vars(
            r#"
            function outer(a) {
                const b = 1;
                return async (c) => {
                    "use server";
                    const d = 2;
                    for (let e of [a]) {
                        try { b; } catch (f) { f; }
                        const g = (h) => h + c + d + e;
                    }
                };
            }
            "#,
        );
        assert_eq!(vars, vec![vec!["a".to_string(), "b".to_string()]]);
    }

    #[test]
    fn test_var_hoists_to_enclosing_function() {
        let vars = free_vars(
            r#"
            function outer() {
                if (true) { var hoisted = 1; }
                return async () => {
                    "use server";
                    if (true) { var own = hoisted; }
                    return own;
                };
            }
            "#,
        );
        assert_eq!(vars, vec![vec!["hoisted".to_string()]]);
    }

    #[test]
    fn test_block_scoped_binding_shadows_outer() {
        let vars = free_vars(
            r#"
            function outer(x) {
                return async () => {
                    "use server";
                    { let x = 2; x; }
                    return x;
                };
            }
            "#,
        );
        assert_eq!(vars, vec![vec!["x".to_string()]]);
    }

    #[test]
    fn test_writes_are_not_reads() {
        let vars = free_vars(
            r#"
            function outer() {
                let count = 0;
                let total = 0;
                return async () => {
                    "use server";
                    count = 1;
                    total++;
                };
            }
            "#,
        );
        assert_eq!(vars, vec![vec!["total".to_string()]]);
    }

    #[test]
    fn test_named_function_expression_binds_itself() {
        let vars = free_vars(
            r#"
            function outer() {
                return async function again(n) {
                    "use server";
                    return n && again(n - 1);
                };
            }
            "#,
        );
        assert_eq!(vars, vec![Vec::<String>::new()]);
    }

    #[test]
    fn test_jsx_and_class_references_are_captured() {
        let vars = free_vars(
            r#"
            function outer(Icon, Base) {
                return async () => {
                    "use server";
                    class Local extends Base {}
                    return <Icon value={new Local()} />;
                };
            }
            "#,
        );
        assert_eq!(vars, vec![vec!["Base".to_string(), "Icon".to_string()]]);
    }

    #[test]
    fn test_class_method_parameters_are_captured() {
        let vars = free_vars(
            r#"
            export class Page {
                render(name) {
                    return async () => {
                        "use server";
                        return [name, this];
                    };
                }
            }
            "#,
        );
        assert_eq!(vars, vec![vec!["name".to_string()]]);
    }
}
