//! Public export name → local binding map.

use std::collections::{HashMap, HashSet};

use indexmap::IndexMap;
use oxc_ast::ast::*;

use crate::errors::{TransformError, TransformResult};

pub const DEFAULT_EXPORT: &str = "default";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExportEntry {
    /// Local binding the public name resolves to. `"default"` for anonymous
    /// default exports.
    pub local: String,
    /// `export { x } from "mod"`: the local side names nothing in this module.
    pub reexport: bool,
}

/// Export map in source encounter order.
///
/// Re-declaring a public name overwrites its local but keeps its first position.
/// Type-only exports are not tracked.
#[derive(Debug, Clone, Default)]
pub struct ExportTracker {
    entries: IndexMap<String, ExportEntry>,
}

impl ExportTracker {
    pub fn collect(program: &Program, file: &str) -> TransformResult<Self> {
        let aliases = alias_table(program);
        let mut tracker = ExportTracker::default();
        for stmt in &program.body {
            match stmt {
                Statement::ExportNamedDeclaration(export) => tracker.named(export, file)?,
                Statement::ExportDefaultDeclaration(export) => {
                    tracker.default_export(&export.declaration, &aliases)
                }
                Statement::ExpressionStatement(stmt) => {
                    tracker.assignment(&stmt.expression, &aliases)
                }
                _ => {}
            }
        }
        tracing::debug!(file, exports = tracker.entries.len(), "tracked exports");
        Ok(tracker)
    }

    fn insert(&mut self, public: &str, local: &str, reexport: bool) {
        let entry = ExportEntry {
            local: local.to_string(),
            reexport,
        };
        match self.entries.get_mut(public) {
            Some(existing) => *existing = entry,
            None => {
                self.entries.insert(public.to_string(), entry);
            }
        }
    }

    fn named(&mut self, export: &ExportNamedDeclaration, file: &str) -> TransformResult<()> {
        if export.export_kind.is_type() {
            return Ok(());
        }
        let reexport = export.source.is_some();
        for specifier in &export.specifiers {
            if specifier.export_kind.is_type() {
                continue;
            }
            let public = specifier.exported.name();
            match &specifier.local {
                ModuleExportName::StringLiteral(local) if !reexport => {
                    return Err(TransformError::missing_local(&public, file)
                        .with_hint(format!("\"{}\" is a string, not a binding", local.value)))
                }
                local => self.insert(&public, &local.name(), reexport),
            }
        }

        match &export.declaration {
            Some(Declaration::VariableDeclaration(decl)) if !decl.declare => {
                for declarator in &decl.declarations {
                    for name in pattern_names(&declarator.id) {
                        self.insert(&name, &name, false);
                    }
                }
            }
            Some(Declaration::FunctionDeclaration(func)) => {
                if let Some(id) = &func.id {
                    self.insert(&id.name, &id.name, false);
                }
            }
            Some(Declaration::ClassDeclaration(class)) => {
                if let Some(id) = &class.id {
                    self.insert(&id.name, &id.name, false);
                }
            }
            Some(Declaration::TSEnumDeclaration(decl)) if !decl.declare => {
                self.insert(&decl.id.name, &decl.id.name, false);
            }
            _ => {}
        }
        Ok(())
    }

    fn default_export(
        &mut self,
        declaration: &ExportDefaultDeclarationKind,
        aliases: &HashMap<String, String>,
    ) {
        let local = match declaration {
            ExportDefaultDeclarationKind::FunctionDeclaration(func) => {
                func.id.as_ref().map(|id| id.name.to_string())
            }
            ExportDefaultDeclarationKind::ClassDeclaration(class) => {
                class.id.as_ref().map(|id| id.name.to_string())
            }
            ExportDefaultDeclarationKind::TSInterfaceDeclaration(_) => return,
            other => match other.as_expression().map(Expression::get_inner_expression) {
                Some(Expression::Identifier(ident)) => Some(resolve_alias(&ident.name, aliases)),
                _ => None,
            },
        };
        let local = local.unwrap_or_else(|| DEFAULT_EXPORT.to_string());
        self.insert(DEFAULT_EXPORT, &local, false);
    }

    /// `exports.x = ...` / `module.exports.x = ...`
    fn assignment(&mut self, expr: &Expression, aliases: &HashMap<String, String>) {
        let Expression::AssignmentExpression(assign) = expr else {
            return;
        };
        if assign.operator != AssignmentOperator::Assign {
            return;
        }
        let AssignmentTarget::StaticMemberExpression(member) = &assign.left else {
            return;
        };
        if !is_exports_object(&member.object) {
            return;
        }
        let local = match assign.right.get_inner_expression() {
            Expression::Identifier(ident) => Some(resolve_alias(&ident.name, aliases)),
            Expression::FunctionExpression(func) => func.id.as_ref().map(|id| id.name.to_string()),
            _ => None,
        };
        if let Some(local) = local {
            self.insert(&member.property.name, &local, false);
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &ExportEntry)> {
        self.entries
            .iter()
            .map(|(public, entry)| (public.as_str(), entry))
    }

    pub fn public_names(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[cfg(test)]
    pub(crate) fn local_of(&self, public: &str) -> Option<&str> {
        self.entries.get(public).map(|entry| entry.local.as_str())
    }
}

fn is_exports_object(object: &Expression) -> bool {
    match object {
        Expression::Identifier(ident) => ident.name == "exports",
        Expression::StaticMemberExpression(member) => {
            member.property.name == "exports"
                && matches!(&member.object, Expression::Identifier(ident) if ident.name == "module")
        }
        _ => false,
    }
}

/// Top-level `const x = y;` aliases.
fn alias_table(program: &Program) -> HashMap<String, String> {
    let mut aliases = HashMap::new();
    let mut record = |decl: &VariableDeclaration| {
        if decl.kind != VariableDeclarationKind::Const {
            return;
        }
        for declarator in &decl.declarations {
            if let (BindingPattern::BindingIdentifier(id), Some(Expression::Identifier(target))) =
                (&declarator.id, &declarator.init)
            {
                aliases.insert(id.name.to_string(), target.name.to_string());
            }
        }
    };
    for stmt in &program.body {
        match stmt {
            Statement::VariableDeclaration(decl) => record(decl),
            Statement::ExportNamedDeclaration(export) => {
                if let Some(Declaration::VariableDeclaration(decl)) = &export.declaration {
                    record(decl);
                }
            }
            _ => {}
        }
    }
    aliases
}

fn resolve_alias(name: &str, aliases: &HashMap<String, String>) -> String {
    let mut current = name;
    let mut seen = HashSet::new();
    while let Some(next) = aliases.get(current) {
        if !seen.insert(current) {
            break;
        }
        current = next;
    }
    current.to_string()
}

/// Every name a binding pattern introduces, left to right.
fn pattern_names(pattern: &BindingPattern) -> Vec<String> {
    let mut names = Vec::new();
    collect_pattern_names(pattern, &mut names);
    names
}

fn collect_pattern_names(pattern: &BindingPattern, names: &mut Vec<String>) {
    match pattern {
        BindingPattern::BindingIdentifier(id) => names.push(id.name.to_string()),
        BindingPattern::ObjectPattern(object) => {
            for prop in &object.properties {
                collect_pattern_names(&prop.value, names);
            }
            if let Some(rest) = &object.rest {
                collect_pattern_names(&rest.argument, names);
            }
        }
        BindingPattern::ArrayPattern(array) => {
            for element in array.elements.iter().flatten() {
                collect_pattern_names(element, names);
            }
            if let Some(rest) = &array.rest {
                collect_pattern_names(&rest.argument, names);
            }
        }
        BindingPattern::AssignmentPattern(assign) => collect_pattern_names(&assign.left, names),
    }
}
