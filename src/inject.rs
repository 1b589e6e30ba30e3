//! Per-invocation identity cache and the statements spliced into the module.
//!
//! Nothing here outlives one transform: a fresh [`Injector`] is created for
//! every module and consumed by [`Injector::finish`].

use std::collections::{HashMap, HashSet};

use indexmap::IndexMap;
use oxc_ast::{ast::*, AstBuilder, NONE};
use oxc_ast_visit::Visit;
use oxc_span::SPAN;

use crate::directives::Tier;
use crate::ids::IdGenerator;

/// Semantic key → previously computed result.
#[derive(Debug, Default)]
pub struct OnceCache {
    entries: HashMap<String, String>,
}

impl OnceCache {
    pub fn get(&self, key: &str) -> Option<&str> {
        self.entries.get(key).map(String::as_str)
    }

    pub fn once(&mut self, key: impl Into<String>, compute: impl FnOnce() -> String) -> String {
        self.entries.entry(key.into()).or_insert_with(compute).clone()
    }

    /// True the first time `key` is claimed, false ever after.
    pub fn claim(&mut self, key: impl Into<String>) -> bool {
        let key = key.into();
        if self.entries.contains_key(&key) {
            return false;
        }
        self.entries.insert(key, String::new());
        true
    }
}

/// Generates `_base`, `_base2`, `_base3`, ... avoiding every name in the module.
#[derive(Debug, Default)]
pub struct UidGenerator {
    taken: HashSet<String>,
}

struct NameCollector<'t> {
    taken: &'t mut HashSet<String>,
}

impl<'a> Visit<'a> for NameCollector<'_> {
    fn visit_identifier_reference(&mut self, ident: &IdentifierReference<'a>) {
        self.taken.insert(ident.name.to_string());
    }

    fn visit_binding_identifier(&mut self, ident: &BindingIdentifier<'a>) {
        self.taken.insert(ident.name.to_string());
    }
}

impl UidGenerator {
    pub fn for_program(program: &Program) -> Self {
        let mut taken = HashSet::new();
        NameCollector { taken: &mut taken }.visit_program(program);
        Self { taken }
    }

    pub fn generate(&mut self, base: &str) -> String {
        let base = base.trim_start_matches('_');
        let base = base.trim_end_matches(|c: char| c.is_ascii_digit());
        let mut i = 1;
        loop {
            let candidate = if i > 1 {
                format!("_{}{}", base, i)
            } else {
                format!("_{}", base)
            };
            if self.taken.insert(candidate.clone()) {
                return candidate;
            }
            i += 1;
        }
    }
}

/// Collects imports, the carrier helper and hoisted declarations while the
/// rewrite runs, then splices them in one pass.
pub struct Injector<'a> {
    cache: OnceCache,
    uids: UidGenerator,
    /// Source → `(imported, local)` in request order.
    imports: IndexMap<String, Vec<(String, String)>>,
    wrap_bound_args: Option<String>,
    hoists: Vec<Option<Statement<'a>>>,
}

impl<'a> Injector<'a> {
    pub fn new(program: &Program) -> Self {
        Self {
            cache: OnceCache::default(),
            uids: UidGenerator::for_program(program),
            imports: IndexMap::new(),
            wrap_bound_args: None,
            hoists: Vec::new(),
        }
    }

    pub fn cache(&mut self) -> &mut OnceCache {
        &mut self.cache
    }

    pub fn uid(&mut self, base: &str) -> String {
        self.uids.generate(base)
    }

    /// Id for `(file, tier)`, asked of `ids` at most once per invocation.
    pub fn id(&mut self, file: &str, tier: Tier, ids: &dyn IdGenerator) -> String {
        self.cache.once(format!("id:{}:{}", file, tier.directive()), || {
            ids.generate(file, tier)
        })
    }

    /// Local alias of `import { name } from "source"`, requested at most once.
    pub fn import_named(&mut self, name: &str, source: &str) -> String {
        let key = format!("import {{ {} }} from \"{}\"", name, source);
        if let Some(local) = self.cache.get(&key) {
            return local.to_string();
        }
        let local = self.uids.generate(name);
        self.imports
            .entry(source.to_string())
            .or_default()
            .push((name.to_string(), local.clone()));
        tracing::debug!(name, source, local = %local, "injected import");
        self.cache.once(key, || local.clone())
    }

    /// Name of the module-scope carrier helper, declared on first use.
    pub fn wrap_bound_args(&mut self) -> String {
        match &self.wrap_bound_args {
            Some(name) => name.clone(),
            None => {
                let name = self.uids.generate("wrapBoundArgs");
                self.wrap_bound_args = Some(name.clone());
                name
            }
        }
    }

    /// Keeps a place in hoist order for a declaration built later.
    pub fn reserve_hoist(&mut self) -> usize {
        self.hoists.push(None);
        self.hoists.len() - 1
    }

    pub fn fill_hoist(&mut self, slot: usize, stmt: Statement<'a>) {
        if let Some(entry) = self.hoists.get_mut(slot) {
            *entry = Some(stmt);
        }
    }

    #[cfg(test)]
    pub(crate) fn hoist_count(&self) -> usize {
        self.hoists.iter().flatten().count()
    }

    /// Splices everything collected into `program`.
    ///
    /// Each hoisted declaration goes right after the last import present when
    /// it is placed, so later extractions sit closer to the imports. Injected
    /// imports then go to the top, one declaration per source, and the carrier
    /// helper above them.
    pub fn finish(self, program: &mut Program<'a>, ast: AstBuilder<'a>) {
        for stmt in self.hoists.into_iter().flatten() {
            let at = program
                .body
                .iter()
                .rposition(|stmt| matches!(stmt, Statement::ImportDeclaration(_)))
                .map_or(0, |i| i + 1);
            program.body.insert(at, stmt);
        }

        for (i, (source, names)) in self.imports.into_iter().enumerate() {
            let specifiers = ast.vec_from_iter(names.into_iter().map(|(imported, local)| {
                ast.import_declaration_specifier_import_specifier(
                    SPAN,
                    ast.module_export_name_identifier_name(SPAN, ast.atom(&imported)),
                    ast.binding_identifier(SPAN, ast.atom(&local)),
                    ImportOrExportKind::Value,
                )
            }));
            let import = ast.alloc_import_declaration(
                SPAN,
                Some(specifiers),
                ast.string_literal(SPAN, ast.atom(&source), None),
                None,
                NONE,
                ImportOrExportKind::Value,
            );
            program.body.insert(i, Statement::ImportDeclaration(import));
        }

        if let Some(name) = self.wrap_bound_args {
            program.body.insert(0, wrap_bound_args_helper(ast, &name));
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// NODE BUILDERS
// ═══════════════════════════════════════════════════════════════════════════════

pub(crate) fn ident<'a>(ast: AstBuilder<'a>, name: &str) -> Expression<'a> {
    ast.expression_identifier(SPAN, ast.atom(name))
}

pub(crate) fn string<'a>(ast: AstBuilder<'a>, value: &str) -> Expression<'a> {
    ast.expression_string_literal(SPAN, ast.atom(value), None)
}

pub(crate) fn call<'a>(
    ast: AstBuilder<'a>,
    callee: Expression<'a>,
    arguments: impl IntoIterator<Item = Expression<'a>>,
) -> Expression<'a> {
    let arguments = ast.vec_from_iter(arguments.into_iter().map(Argument::from));
    ast.expression_call(SPAN, callee, NONE, arguments, false)
}

pub(crate) fn var_statement<'a>(
    ast: AstBuilder<'a>,
    kind: VariableDeclarationKind,
    id: BindingPattern<'a>,
    init: Expression<'a>,
) -> Statement<'a> {
    let declarator = ast.variable_declarator(SPAN, kind, id, NONE, Some(init), false);
    Statement::VariableDeclaration(ast.alloc_variable_declaration(
        SPAN,
        kind,
        ast.vec1(declarator),
        false,
    ))
}

/// `export const <name> = <init>;`
pub(crate) fn export_const<'a>(ast: AstBuilder<'a>, name: &str, init: Expression<'a>) -> Statement<'a> {
    let kind = VariableDeclarationKind::Const;
    let id = ast.binding_pattern_binding_identifier(SPAN, ast.atom(name));
    let declarator = ast.variable_declarator(SPAN, kind, id, NONE, Some(init), false);
    let declaration = ast.declaration_variable(SPAN, kind, ast.vec1(declarator), false);
    Statement::ExportNamedDeclaration(ast.alloc_export_named_declaration(
        SPAN,
        Some(declaration),
        ast.vec(),
        None,
        ImportOrExportKind::Value,
        NONE,
    ))
}

/// `() => <body>`
pub(crate) fn thunk<'a>(ast: AstBuilder<'a>, body: Expression<'a>) -> Expression<'a> {
    let params = ast.alloc_formal_parameters(
        SPAN,
        FormalParameterKind::ArrowFormalParameters,
        ast.vec(),
        NONE,
    );
    let body = ast.alloc_function_body(SPAN, ast.vec(), ast.vec1(ast.statement_expression(SPAN, body)));
    ast.expression_arrow_function(SPAN, true, false, NONE, params, NONE, body)
}

/// ```js
/// var _wrapBoundArgs = (thunk) => {
///   let cache = undefined;
///   return { get value() { if (!cache) { cache = thunk(); } return cache; } };
/// };
/// ```
fn wrap_bound_args_helper<'a>(ast: AstBuilder<'a>, name: &str) -> Statement<'a> {
    let fill = ast.statement_if(
        SPAN,
        ast.expression_unary(SPAN, UnaryOperator::LogicalNot, ident(ast, "cache")),
        ast.statement_block(
            SPAN,
            ast.vec1(ast.statement_expression(
                SPAN,
                ast.expression_assignment(
                    SPAN,
                    AssignmentOperator::Assign,
                    AssignmentTarget::from(
                        ast.simple_assignment_target_assignment_target_identifier(SPAN, "cache"),
                    ),
                    call(ast, ident(ast, "thunk"), []),
                ),
            )),
        ),
        None,
    );
    let getter = ast.expression_function(
        SPAN,
        FunctionType::FunctionExpression,
        None,
        false,
        false,
        false,
        NONE,
        NONE,
        ast.alloc_formal_parameters(
            SPAN,
            FormalParameterKind::UniqueFormalParameters,
            ast.vec(),
            NONE,
        ),
        NONE,
        Some(ast.alloc_function_body(
            SPAN,
            ast.vec(),
            ast.vec_from_iter([fill, ast.statement_return(SPAN, Some(ident(ast, "cache")))]),
        )),
    );
    let carrier = ast.expression_object(
        SPAN,
        ast.vec1(ast.object_property_kind_object_property(
            SPAN,
            PropertyKind::Get,
            ast.property_key_static_identifier(SPAN, "value"),
            getter,
            false,
            false,
            false,
        )),
    );

    let params = ast.alloc_formal_parameters(
        SPAN,
        FormalParameterKind::ArrowFormalParameters,
        ast.vec1(ast.plain_formal_parameter(
            SPAN,
            ast.binding_pattern_binding_identifier(SPAN, "thunk"),
        )),
        NONE,
    );
    let body = ast.alloc_function_body(
        SPAN,
        ast.vec(),
        ast.vec_from_iter([
            var_statement(
                ast,
                VariableDeclarationKind::Let,
                ast.binding_pattern_binding_identifier(SPAN, "cache"),
                ident(ast, "undefined"),
            ),
            ast.statement_return(SPAN, Some(carrier)),
        ]),
    );
    let arrow = ast.expression_arrow_function(SPAN, false, false, NONE, params, NONE, body);

    var_statement(
        ast,
        VariableDeclarationKind::Var,
        ast.binding_pattern_binding_identifier(SPAN, ast.atom(name)),
        arrow,
    )
}
