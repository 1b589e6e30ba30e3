//! Printer service.
//!
//! The rewritten program goes back to text through `oxc_codegen`. Nodes the
//! transform builds carry an empty span, so comments stay with the source
//! nodes they were attached to.

use oxc_ast::ast::Program;
use oxc_codegen::Codegen;

/// Print `program` as JavaScript source text.
pub fn print_program(program: &Program) -> String {
    Codegen::new().build(program).code
}

/// Parse and print `source` without changes. Scenario tests compare
/// transform output against this so formatting never matters.
#[cfg(test)]
pub(crate) fn normalized(source: &str) -> String {
    let allocator = oxc_allocator::Allocator::default();
    let program = crate::parse::parse_program(&allocator, source, "expected.js")
        .unwrap_or_else(|err| panic!("expected source does not parse: {}", err));
    print_program(&program)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parse::parse_program;
    use oxc_allocator::Allocator;

    /// Prints `source`, then checks the printed text parses and prints the same.
    fn round_trip(source: &str) -> String {
        let allocator = Allocator::default();
        let program = parse_program(&allocator, source, "t.js").unwrap();
        let printed = print_program(&program);

        let again = Allocator::default();
        let reparsed = parse_program(&again, &printed, "t.js")
            .unwrap_or_else(|err| panic!("printed code does not parse: {}\n{}", err, printed));
        assert_eq!(print_program(&reparsed), printed);
        printed
    }

    #[test]
    fn test_new_callee_keeps_parentheses() {
        let printed = round_trip("new (a().b)();");
        assert!(printed.contains("new (a().b)()"), "{}", printed);
    }

    #[test]
    fn test_member_on_integer_literal_stays_valid() {
        let printed = round_trip("x = (1).toString();");
        assert!(!printed.contains("1.toString"), "{}", printed);
        assert!(printed.contains("toString()"));
    }

    #[test]
    fn test_in_operator_inside_for_init_is_wrapped() {
        let printed = round_trip("for (var i = 0, j = (1 in o); i < j; i++) {}");
        assert!(printed.contains("(1 in o)"), "{}", printed);
    }

    #[test]
    fn test_legal_and_pure_comments_survive() {
        let printed = round_trip("/*! license */\nexport const a = /* @__PURE__ */ make();");
        assert!(printed.contains("/*! license */"), "{}", printed);
        assert!(printed.contains("/* @__PURE__ */ make()"), "{}", printed);
    }

    #[test]
    fn test_typescript_is_printed_as_written() {
        let printed = round_trip("export function f(a: number): string { return String(a); }");
        assert!(printed.contains("a: number"), "{}", printed);
    }
}
