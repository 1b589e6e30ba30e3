//! Inline action extraction.
//!
//! A `"use server"` function that is not itself a module-top-level binding is
//! moved to module scope as
//!
//! ```js
//! export const _$$INLINE_ACTION = _$$server(async (_$$CLOSURE, ...params) => {
//!   var [a, b] = _$$CLOSURE.value;
//!   { ...original body }
//! }, "<id>", "_$$INLINE_ACTION");
//! ```
//!
//! and its original site becomes `_$$INLINE_ACTION.bind(null, _wrapBoundArgs(() => [a, b]))`,
//! or a bare `_$$INLINE_ACTION` when nothing is captured.

use std::collections::{HashMap, HashSet};

use indexmap::IndexMap;
use oxc_allocator::{Box as ArenaBox, TakeIn, Vec as ArenaVec};
use oxc_ast::{ast::*, AstBuilder, NONE};
use oxc_ast_visit::{walk_mut, VisitMut};
use oxc_span::SPAN;
use oxc_syntax::scope::ScopeFlags;

use crate::config::TransformOptions;
use crate::directives::{DirectiveScan, Tier, USE_SERVER};
use crate::errors::{TransformError, TransformResult};
use crate::ids::IdGenerator;
use crate::inject::{call, export_const, ident, string, thunk, var_statement, Injector};

const ACTION_BASE: &str = "$$INLINE_ACTION";
const CLOSURE_BASE: &str = "$$CLOSURE";
const CARRIER_VALUE: &str = "value";

/// Functions bound directly at module scope, by local name.
///
/// A function counts when it is a declaration, or the direct initializer of a
/// declarator, at the top level of the module, optionally under `export`.
/// Anything reached through an intervening expression does not count.
pub fn top_level_functions(program: &Program) -> IndexMap<String, Span> {
    let mut functions = IndexMap::new();
    for stmt in &program.body {
        match stmt {
            Statement::ExportNamedDeclaration(export) => {
                if let Some(declaration) = &export.declaration {
                    record_declaration(declaration, &mut functions);
                }
            }
            Statement::ExportDefaultDeclaration(export) => {
                if let ExportDefaultDeclarationKind::FunctionDeclaration(func) = &export.declaration {
                    record_function(func, &mut functions);
                }
            }
            Statement::FunctionDeclaration(func) => record_function(func, &mut functions),
            Statement::VariableDeclaration(decl) => record_variables(decl, &mut functions),
            _ => {}
        }
    }
    functions
}

fn record_declaration(declaration: &Declaration, functions: &mut IndexMap<String, Span>) {
    match declaration {
        Declaration::FunctionDeclaration(func) => record_function(func, functions),
        Declaration::VariableDeclaration(decl) => record_variables(decl, functions),
        _ => {}
    }
}

fn record_function(func: &Function, functions: &mut IndexMap<String, Span>) {
    if let Some(id) = &func.id {
        functions.insert(id.name.to_string(), func.span);
    }
}

fn record_variables(decl: &VariableDeclaration, functions: &mut IndexMap<String, Span>) {
    for declarator in &decl.declarations {
        let BindingPattern::BindingIdentifier(id) = &declarator.id else {
            continue;
        };
        match declarator.init.as_ref().map(Expression::get_inner_expression) {
            Some(Expression::FunctionExpression(func)) => {
                functions.insert(id.name.to_string(), func.span);
            }
            Some(Expression::ArrowFunctionExpression(arrow)) => {
                functions.insert(id.name.to_string(), arrow.span);
            }
            _ => {}
        }
    }
}

/// Everything the extraction needs from the surrounding transform.
pub struct HoistContext<'c> {
    pub file: &'c str,
    pub options: &'c TransformOptions,
    pub ids: &'c dyn IdGenerator,
}

/// Extracts every inline server action in `program`. Returns how many were
/// hoisted.
///
/// `captures` holds the free variables of every server function, keyed by
/// span, computed on the program before anything moved.
pub fn hoist_inline_actions<'a>(
    program: &mut Program<'a>,
    scan: &DirectiveScan,
    captures: &HashMap<Span, Vec<String>>,
    top_level: &IndexMap<String, Span>,
    injector: &mut Injector<'a>,
    ast: AstBuilder<'a>,
    ctx: &HoistContext,
) -> TransformResult<usize> {
    if !scan.has_server_functions() {
        return Ok(0);
    }

    let mut pass = HoistPass {
        ast,
        ctx,
        scan,
        captures,
        top_level: top_level.values().copied().collect(),
        injector,
        error: None,
        extracted: 0,
    };
    pass.visit_statements(&mut program.body);

    match pass.error {
        Some(err) => Err(err),
        None => Ok(pass.extracted),
    }
}

/// A server function lifted out of its expression or statement slot.
enum Action<'a> {
    Function(ArenaBox<'a, Function<'a>>),
    Arrow(ArenaBox<'a, ArrowFunctionExpression<'a>>),
}

impl Action<'_> {
    fn span(&self) -> Span {
        match self {
            Action::Function(func) => func.span,
            Action::Arrow(arrow) => arrow.span,
        }
    }
}

struct Encryption {
    decrypt: String,
    encrypt: String,
}

struct HoistPass<'a, 'c> {
    ast: AstBuilder<'a>,
    ctx: &'c HoistContext<'c>,
    scan: &'c DirectiveScan,
    captures: &'c HashMap<Span, Vec<String>>,
    top_level: HashSet<Span>,
    injector: &'c mut Injector<'a>,
    error: Option<TransformError>,
    extracted: usize,
}

impl<'a> HoistPass<'a, '_> {
    fn is_inline_action(&self, span: Span) -> bool {
        self.scan.tier_of(span) == Some(Tier::Server) && !self.top_level.contains(&span)
    }

    fn encryption(&mut self) -> Option<Encryption> {
        let config = self.ctx.options.encryption.as_ref()?;
        let decrypt = self
            .injector
            .import_named(&config.decrypt_export, &config.import_source);
        let encrypt = self
            .injector
            .import_named(&config.encrypt_export, &config.import_source);
        Some(Encryption { decrypt, encrypt })
    }

    /// Moves `action` to module scope and returns what replaces it in place.
    fn extract(&mut self, mut action: Action<'a>) -> Expression<'a> {
        let vars = self
            .captures
            .get(&action.span())
            .cloned()
            .unwrap_or_default();
        let id = self.injector.id(self.ctx.file, Tier::Server, self.ctx.ids);
        let name = self.injector.uid(ACTION_BASE);
        let slot = self.injector.reserve_hoist();

        let (encryption, closure) = if vars.is_empty() {
            (None, None)
        } else {
            let encryption = self.encryption();
            (encryption, Some(self.injector.uid(CLOSURE_BASE)))
        };
        let registration = &self.ctx.options.registration;
        let register = self
            .injector
            .import_named(&registration.server_export, &registration.import_source);

        // Actions nested inside this one are extracted after it.
        match &mut action {
            Action::Function(func) => walk_mut::walk_function(self, func, ScopeFlags::Function),
            Action::Arrow(arrow) => walk_mut::walk_arrow_function_expression(self, arrow),
        }

        let hoisted = self.hoisted_function(
            action,
            &vars,
            closure,
            encryption.as_ref().map(|e| e.decrypt.as_str()),
            &id,
            &name,
        );
        let ast = self.ast;
        let registered = call(
            ast,
            ident(ast, &register),
            [hoisted, string(ast, &id), string(ast, &name)],
        );
        self.injector
            .fill_hoist(slot, export_const(ast, &name, registered));
        self.extracted += 1;

        tracing::debug!(
            file = self.ctx.file,
            action = %name,
            captured = ?vars,
            "hoisted inline action"
        );

        self.replacement(&name, &vars, encryption.as_ref(), &id)
    }

    /// `async ([closure,] ...params) => { [var [...vars] = <carrier value>;] { body } }`
    fn hoisted_function(
        &self,
        action: Action<'a>,
        vars: &[String],
        closure: Option<String>,
        decrypt: Option<&str>,
        id: &str,
        name: &str,
    ) -> Expression<'a> {
        let ast = self.ast;
        // Marked arrows always have a block body.
        let (type_parameters, mut params, return_type, body) = match action {
            Action::Function(func) => {
                let func = func.unbox();
                (func.type_parameters, func.params, func.return_type, func.body)
            }
            Action::Arrow(arrow) => {
                let arrow = arrow.unbox();
                (arrow.type_parameters, arrow.params, arrow.return_type, Some(arrow.body))
            }
        };

        let mut original = ast.vec();
        if let Some(body) = body {
            let body = body.unbox();
            for directive in body.directives {
                if directive.directive.as_str() != USE_SERVER {
                    let value = ast.expression_string_literal(SPAN, directive.directive, None);
                    original.push(ast.statement_expression(directive.span, value));
                }
            }
            original.extend(body.statements);
        }

        params.kind = FormalParameterKind::ArrowFormalParameters;
        let mut statements: ArenaVec<'a, Statement<'a>> = ast.vec();
        if let Some(closure) = closure {
            let value = Expression::from(ast.member_expression_static(
                SPAN,
                ident(ast, &closure),
                ast.identifier_name(SPAN, CARRIER_VALUE),
                false,
            ));
            let init = match decrypt {
                Some(decrypt) => ast.expression_await(
                    SPAN,
                    call(
                        ast,
                        ident(ast, decrypt),
                        [
                            ast.expression_await(SPAN, value),
                            string(ast, id),
                            string(ast, name),
                        ],
                    ),
                ),
                None => value,
            };
            let pattern = ast.binding_pattern_array_pattern(
                SPAN,
                ast.vec_from_iter(vars.iter().map(|var| {
                    Some(ast.binding_pattern_binding_identifier(SPAN, ast.atom(var)))
                })),
                NONE,
            );
            statements.push(var_statement(ast, VariableDeclarationKind::Var, pattern, init));
            params.items.insert(
                0,
                ast.plain_formal_parameter(
                    SPAN,
                    ast.binding_pattern_binding_identifier(SPAN, ast.atom(&closure)),
                ),
            );
        }
        statements.push(ast.statement_block(SPAN, original));

        let body = ast.alloc_function_body(SPAN, ast.vec(), statements);
        ast.expression_arrow_function(SPAN, false, true, type_parameters, params, return_type, body)
    }

    fn replacement(
        &mut self,
        name: &str,
        vars: &[String],
        encryption: Option<&Encryption>,
        id: &str,
    ) -> Expression<'a> {
        let ast = self.ast;
        if vars.is_empty() {
            return ident(ast, name);
        }

        let captured = ast.expression_array(
            SPAN,
            ast.vec_from_iter(
                vars.iter()
                    .map(|var| ArrayExpressionElement::from(ident(ast, var))),
            ),
        );
        let produced = match encryption {
            Some(encryption) => call(
                ast,
                ident(ast, &encryption.encrypt),
                [captured, string(ast, id), string(ast, name)],
            ),
            None => captured,
        };
        let wrap = self.injector.wrap_bound_args();
        let carrier = call(ast, ident(ast, &wrap), [thunk(ast, produced)]);
        let bind = Expression::from(ast.member_expression_static(
            SPAN,
            ident(ast, name),
            ast.identifier_name(SPAN, "bind"),
            false,
        ));
        call(ast, bind, [ast.expression_null_literal(SPAN), carrier])
    }
}

impl<'a> VisitMut<'a> for HoistPass<'a, '_> {
    /// Nested action declarations are removed and re-bound as
    /// `var <name> = <replacement>;` at the top of their statement list.
    fn visit_statements(&mut self, stmts: &mut ArenaVec<'a, Statement<'a>>) {
        let mut rebound = Vec::new();
        let mut i = 0;
        while i < stmts.len() {
            if self.error.is_some() {
                return;
            }
            let nested_action = matches!(
                &stmts[i],
                Statement::FunctionDeclaration(func) if self.is_inline_action(func.span)
            );
            if !nested_action {
                self.visit_statement(&mut stmts[i]);
                i += 1;
                continue;
            }
            if let Statement::FunctionDeclaration(func) = stmts.remove(i) {
                let local = func.id.as_ref().map(|id| id.name);
                let replacement = self.extract(Action::Function(func));
                if let Some(local) = local {
                    let ast = self.ast;
                    rebound.push(var_statement(
                        ast,
                        VariableDeclarationKind::Var,
                        ast.binding_pattern_binding_identifier(SPAN, local),
                        replacement,
                    ));
                }
            }
        }
        for (at, stmt) in rebound.into_iter().enumerate() {
            stmts.insert(at, stmt);
        }
    }

    fn visit_export_default_declaration(&mut self, decl: &mut ExportDefaultDeclaration<'a>) {
        if let ExportDefaultDeclarationKind::FunctionDeclaration(func) = &decl.declaration {
            if func.id.is_none() && self.scan.tier_of(func.span) == Some(Tier::Server) {
                self.error = Some(TransformError::anonymous_action(self.ctx.file));
                return;
            }
        }
        walk_mut::walk_export_default_declaration(self, decl);
    }

    fn visit_expression(&mut self, expr: &mut Expression<'a>) {
        if self.error.is_some() {
            return;
        }
        let action = match expr {
            Expression::FunctionExpression(func) => self.is_inline_action(func.span),
            Expression::ArrowFunctionExpression(arrow) => self.is_inline_action(arrow.span),
            _ => false,
        };
        if !action {
            walk_mut::walk_expression(self, expr);
            return;
        }
        *expr = match expr.take_in(self.ast) {
            Expression::FunctionExpression(func) => self.extract(Action::Function(func)),
            Expression::ArrowFunctionExpression(arrow) => self.extract(Action::Arrow(arrow)),
            other => other,
        };
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codegen::{normalized, print_program};
    use crate::config::EncryptionConfig;
    use crate::directives::scan_directives;
    use crate::errors::TransformErrorKind;
    use crate::ids::DirectiveIdGenerator;
    use crate::parse::parse_program;
    use crate::scope::{build_scoping, free_variables};
    use oxc_allocator::Allocator;

    fn hoist(source: &str, options: &TransformOptions) -> TransformResult<(String, usize)> {
        let allocator = Allocator::default();
        let ast = AstBuilder::new(&allocator);
        let mut program = parse_program(&allocator, source, "use-server.js")?;
        let scan = scan_directives(&mut program, "use-server.js")?;
        let top_level = top_level_functions(&program);
        let scoping = build_scoping(&program);
        let captures = free_variables(&program, &scoping, &scan.server_functions());
        let mut injector = Injector::new(&program);
        let ctx = HoistContext {
            file: "use-server.js",
            options,
            ids: &DirectiveIdGenerator,
        };
        let count = hoist_inline_actions(
            &mut program,
            &scan,
            &captures,
            &top_level,
            &mut injector,
            ast,
            &ctx,
        )?;
        injector.finish(&mut program, ast);
        Ok((print_program(&program), count))
    }

    /// `source` as printed, without the trailing semicolon and newline.
    fn snippet(source: &str) -> String {
        normalized(source).trim_end().trim_end_matches(';').to_string()
    }

    #[test]
    fn test_top_level_functions() {
        let allocator = Allocator::default();
        let program = parse_program(
            &allocator,
            r#"
            function a() {}
            export async function b() {}
            const c = () => {}, d = 1;
            export const e = function named() {};
            export default function f() {}
            const g = wrap(async () => {});
            { function h() {} }
            "#,
            "t.js",
        )
        .unwrap();
        let functions = top_level_functions(&program);
        let names: Vec<&str> = functions.keys().map(String::as_str).collect();
        assert_eq!(names, vec!["a", "b", "c", "e", "f"]);
    }

    #[test]
    fn test_top_level_action_is_not_extracted() {
        let (printed, count) = hoist(
            "export async function save() { 'use server'; }",
            &TransformOptions::default(),
        )
        .unwrap();
        assert_eq!(count, 0);
        assert_eq!(
            printed,
            normalized("export async function save() { 'use server'; }")
        );
    }

    #[test]
    fn test_wrapped_action_is_extracted() {
        let (printed, count) = hoist(
            "export const save = withAuth(async (form) => { 'use server'; return form; });",
            &TransformOptions::default(),
        )
        .unwrap();
        assert_eq!(count, 1);
        assert_eq!(
            printed,
            normalized(
                r#"
                import { $$server as _$$server } from "mwap/runtime/server";
                export const _$$INLINE_ACTION = _$$server(async (form) => {
                    {
                        return form;
                    }
                }, "use server:use-server.js", "_$$INLINE_ACTION");
                export const save = withAuth(_$$INLINE_ACTION);
                "#
            )
        );
    }

    #[test]
    fn test_nested_actions_extract_outer_first() {
        let (printed, count) = hoist(
            r#"
            export function Page({ id }) {
                return async () => {
                    "use server";
                    const inner = async () => {
                        "use server";
                        return id;
                    };
                    return inner;
                };
            }
            "#,
            &TransformOptions::default(),
        )
        .unwrap();
        assert_eq!(count, 2);
        let outer = printed.find("export const _$$INLINE_ACTION =").unwrap();
        let inner = printed.find("export const _$$INLINE_ACTION2 =").unwrap();
        assert!(inner < outer, "later extraction sits closer to the imports");
        assert!(printed.contains(&snippet("var [id] = _$$CLOSURE.value;")));
        assert!(printed.contains(&snippet("var [id] = _$$CLOSURE2.value;")));
        assert!(printed.contains(&snippet(
            "_$$INLINE_ACTION2.bind(null, _wrapBoundArgs(() => [id]));"
        )));
    }

    #[test]
    fn test_nested_declaration_is_rebound_at_block_top() {
        let (printed, count) = hoist(
            r#"
            export function Form(user) {
                render(submit);
                async function submit(data) {
                    "use server";
                    return [user, data];
                }
            }
            "#,
            &TransformOptions::default(),
        )
        .unwrap();
        assert_eq!(count, 1);
        let rebound = printed
            .find(&snippet(
                "var submit = _$$INLINE_ACTION.bind(null, _wrapBoundArgs(() => [user]));",
            ))
            .unwrap();
        assert!(rebound < printed.find("render(submit)").unwrap());
        assert!(printed.contains("async (_$$CLOSURE, data) =>"), "{}", printed);
    }

    #[test]
    fn test_class_method_contents_are_extracted() {
        let (printed, count) = hoist(
            r#"
            export class Page {
                render(name) {
                    "use server";
                    const act = async () => { "use server"; return name; };
                    return act;
                }
                handler = async () => { "use server"; };
            }
            "#,
            &TransformOptions::default(),
        )
        .unwrap();
        assert_eq!(count, 2);
        assert!(printed.contains(&snippet(
            "const act = _$$INLINE_ACTION.bind(null, _wrapBoundArgs(() => [name]));"
        )));
        assert!(printed.contains("handler = _$$INLINE_ACTION2;"), "{}", printed);
        assert!(printed.contains("render(name) {"), "{}", printed);
    }

    #[test]
    fn test_remaining_directives_stay_in_body() {
        let (printed, _) = hoist(
            "function f() { return async () => { 'use strict'; 'use server'; work(); }; }",
            &TransformOptions::default(),
        )
        .unwrap();
        assert!(printed.contains("\"use strict\";"));
        assert!(!printed.contains("use server\";\n"));
    }

    #[test]
    fn test_anonymous_default_export_action_is_fatal() {
        let err = hoist(
            "export default async function () { 'use server'; }",
            &TransformOptions::default(),
        )
        .unwrap_err();
        assert_eq!(err.kind, TransformErrorKind::AnonymousAction);
        assert_eq!(err.message, "Expected a function with an id");
    }

    #[test]
    fn test_encrypted_carrier() {
        let options = TransformOptions::default().with_encryption(EncryptionConfig {
            import_source: "crypto-rt".to_string(),
            decrypt_export: "decrypt".to_string(),
            encrypt_export: "encrypt".to_string(),
        });
        let (printed, _) = hoist(
            "function f(x) { return async () => { 'use server'; return x; }; }",
            &options,
        )
        .unwrap();
        assert!(printed.starts_with("var _wrapBoundArgs = "));
        assert!(printed.contains(&snippet(
            "import { decrypt as _decrypt, encrypt as _encrypt } from \"crypto-rt\";\nimport { $$server as _$$server } from \"mwap/runtime/server\";"
        )));
        assert!(printed.contains(&snippet(
            "var [x] = await _decrypt(await _$$CLOSURE.value, \"use server:use-server.js\", \"_$$INLINE_ACTION\");"
        )));
        assert!(printed.contains(&snippet(
            "_wrapBoundArgs(() => _encrypt([x], \"use server:use-server.js\", \"_$$INLINE_ACTION\"));"
        )));
    }

    #[test]
    fn test_no_server_functions_is_a_no_op() {
        let (printed, count) = hoist(
            "function f() { return () => { 'use client'; }; }",
            &TransformOptions::default(),
        )
        .unwrap();
        assert_eq!(count, 0);
        assert_eq!(
            printed,
            normalized("function f() { return () => { 'use client'; }; }")
        );
    }
}
