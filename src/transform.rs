use indexmap::IndexMap;
use oxc_allocator::Allocator;
use oxc_ast::{ast::*, AstBuilder};
use oxc_span::SPAN;
use serde::{Deserialize, Serialize};

use crate::config::TransformOptions;
use crate::directives::{scan_directives, DirectiveScan, Tier};
use crate::errors::{TransformError, TransformResult};
use crate::exports::{ExportTracker, DEFAULT_EXPORT};
use crate::hoist::{hoist_inline_actions, top_level_functions, HoistContext};
use crate::ids::IdGenerator;
use crate::inject::{call, export_const, ident, string, Injector};
use crate::scope::{build_scoping, free_variables};

/// Which bundle the module is being built for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Target {
    Server,
    Client,
}

impl std::str::FromStr for Target {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "server" => Ok(Target::Server),
            "client" => Ok(Target::Client),
            other => Err(format!("unknown target '{}', expected server or client", other)),
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// ENTRY POINTS
// ═══════════════════════════════════════════════════════════════════════════════

/// Rewrites `program` for `target`. Returns the tier found, `None` when the
/// module has nothing for this target to do.
///
/// New nodes are allocated in `allocator`, the arena `program` was parsed into.
pub fn transform_program<'a>(
    allocator: &'a Allocator,
    program: &mut Program<'a>,
    file: &str,
    target: Target,
    options: &TransformOptions,
    ids: &dyn IdGenerator,
) -> TransformResult<Option<Tier>> {
    match target {
        Target::Server => server_transform(allocator, program, file, options, ids),
        Target::Client => client_transform(allocator, program, file, options, ids),
    }
}

/// Server bundle.
///
/// * `"use client"` module: body replaced by client references.
/// * `"use server"` module: body kept, each exported top-level function
///   registered after it.
/// * otherwise: inline actions hoisted, exported in-place actions registered.
pub fn server_transform<'a>(
    allocator: &'a Allocator,
    program: &mut Program<'a>,
    file: &str,
    options: &TransformOptions,
    ids: &dyn IdGenerator,
) -> TransformResult<Option<Tier>> {
    let scan = scan_directives(program, file)?;
    if scan.is_untouched() {
        return Ok(None);
    }

    let ast = AstBuilder::new(allocator);
    let ctx = HoistContext { file, options, ids };
    let exports = ExportTracker::collect(program, file)?;
    let mut injector = Injector::new(program);

    if scan.module_tier == Some(Tier::Client) {
        replace_module(program, Tier::Client, &exports, &mut injector, ast, &ctx)?;
        injector.finish(program, ast);
        return Ok(Some(Tier::Client));
    }

    let top_level = top_level_functions(program);
    let scoping = build_scoping(program);
    let captures = free_variables(program, &scoping, &scan.server_functions());
    hoist_inline_actions(program, &scan, &captures, &top_level, &mut injector, ast, &ctx)?;
    let registrations = register_exports(&scan, &exports, &top_level, &mut injector, ast, &ctx)?;

    injector.finish(program, ast);
    program.body.extend(registrations);
    Ok(scan.effective_tier())
}

/// Client bundle. Only a `"use server"` module changes: its body becomes
/// server references.
pub fn client_transform<'a>(
    allocator: &'a Allocator,
    program: &mut Program<'a>,
    file: &str,
    options: &TransformOptions,
    ids: &dyn IdGenerator,
) -> TransformResult<Option<Tier>> {
    let scan = scan_directives(program, file)?;
    match scan.module_tier {
        Some(Tier::Server) => {
            let ast = AstBuilder::new(allocator);
            let ctx = HoistContext { file, options, ids };
            let exports = ExportTracker::collect(program, file)?;
            let mut injector = Injector::new(program);
            replace_module(program, Tier::Server, &exports, &mut injector, ast, &ctx)?;
            injector.finish(program, ast);
            Ok(Some(Tier::Server))
        }
        Some(Tier::Client) => Ok(Some(Tier::Client)),
        None => Ok(None),
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// MODULE-LEVEL REWRITE
// ═══════════════════════════════════════════════════════════════════════════════

/// Discards the body and emits one
/// `export const <name> = <register>({}, <id>, "<name>");` per export.
/// Legal comments move to the top of the module.
fn replace_module<'a>(
    program: &mut Program<'a>,
    tier: Tier,
    exports: &ExportTracker,
    injector: &mut Injector<'a>,
    ast: AstBuilder<'a>,
    ctx: &HoistContext,
) -> TransformResult<()> {
    let registration = &ctx.options.registration;
    let export_name = match tier {
        Tier::Client => &registration.client_export,
        Tier::Server => &registration.server_export,
    };

    let mut body = Vec::with_capacity(exports.len());
    for public in exports.public_names() {
        if public == DEFAULT_EXPORT && tier == Tier::Server {
            return Err(TransformError::default_export(ctx.file));
        }
        if !injector.cache().claim(format!("export:{}", public)) {
            continue;
        }
        let register = injector.import_named(export_name, &registration.import_source);
        let id = injector.id(ctx.file, tier, ctx.ids);
        let reference = call(
            ast,
            ident(ast, &register),
            [
                ast.expression_object(SPAN, ast.vec()),
                string(ast, &id),
                string(ast, public),
            ],
        );
        body.push(if public == DEFAULT_EXPORT {
            Statement::ExportDefaultDeclaration(ast.alloc_export_default_declaration(
                SPAN,
                ExportDefaultDeclarationKind::from(reference),
            ))
        } else {
            export_const(ast, public, reference)
        });
    }

    tracing::debug!(
        file = ctx.file,
        tier = %tier,
        exports = body.len(),
        "replaced module body"
    );
    for comment in program.comments.iter_mut() {
        if comment.is_legal() {
            comment.attached_to = 0;
        }
    }
    program.body.clear();
    program.body.extend(body);
    Ok(())
}

// ═══════════════════════════════════════════════════════════════════════════════
// EXPORT REGISTRATION
// ═══════════════════════════════════════════════════════════════════════════════

/// `<register>(<local>, <id>, "<public>");` for every export that names a
/// top-level function: all of them in a `"use server"` module, only marked
/// ones otherwise. One call per local; the first public name wins.
fn register_exports<'a>(
    scan: &DirectiveScan,
    exports: &ExportTracker,
    top_level: &IndexMap<String, Span>,
    injector: &mut Injector<'a>,
    ast: AstBuilder<'a>,
    ctx: &HoistContext,
) -> TransformResult<Vec<Statement<'a>>> {
    let module_scoped = scan.module_tier == Some(Tier::Server);
    let registration = &ctx.options.registration;

    let mut calls = Vec::new();
    for (public, entry) in exports.iter() {
        if entry.reexport {
            continue;
        }
        let Some(func) = top_level.get(&entry.local) else {
            continue;
        };
        if !module_scoped && scan.tier_of(*func) != Some(Tier::Server) {
            continue;
        }
        if module_scoped && public == DEFAULT_EXPORT {
            return Err(TransformError::default_export(ctx.file));
        }
        if !injector.cache().claim(format!("export:{}", entry.local)) {
            continue;
        }

        let register =
            injector.import_named(&registration.server_export, &registration.import_source);
        let id = injector.id(ctx.file, Tier::Server, ctx.ids);
        calls.push(ast.statement_expression(
            SPAN,
            call(
                ast,
                ident(ast, &register),
                [
                    ident(ast, &entry.local),
                    string(ast, &id),
                    string(ast, public),
                ],
            ),
        ));
    }

    if !calls.is_empty() {
        tracing::debug!(file = ctx.file, registered = calls.len(), "registered exports");
    }
    Ok(calls)
}
