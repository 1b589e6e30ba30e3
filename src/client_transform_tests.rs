//! Client-bundle scenarios.

#[cfg(test)]
mod tests {
    use oxc_allocator::Allocator;

    use crate::codegen::{normalized, print_program};
    use crate::config::{RegistrationConfig, TransformOptions};
    use crate::directives::Tier;
    use crate::errors::{TransformErrorKind, TransformResult};
    use crate::ids::{DirectiveIdGenerator, IdGenerator};
    use crate::parse::parse_program;
    use crate::transform::client_transform;

    fn client_options() -> TransformOptions {
        TransformOptions {
            registration: RegistrationConfig {
                import_source: "mwap/runtime/client".to_string(),
                ..RegistrationConfig::default()
            },
            ..TransformOptions::default()
        }
    }

    fn run_with(
        source: &str,
        file: &str,
        ids: &dyn IdGenerator,
    ) -> TransformResult<(Option<Tier>, String)> {
        let allocator = Allocator::default();
        let mut program = parse_program(&allocator, source, file)?;
        let tier = client_transform(&allocator, &mut program, file, &client_options(), ids)?;
        Ok((tier, print_program(&program)))
    }

    fn run(source: &str, file: &str) -> TransformResult<(Option<Tier>, String)> {
        run_with(source, file, &DirectiveIdGenerator)
    }

    #[test]
    fn test_use_server_module_is_replaced() {
        let (tier, printed) = run(
            r#"
            "use server";
            import { Imported } from "third-party-imported";
            export { Exported } from "third-party-exported";
            export { Imported };
            export const varDeclaration = "varDeclaration";
            export const functionDeclaration = function functionDeclaration() {};
            export function Component() {}
            "#,
            "use-server.js",
        )
        .unwrap();

        assert_eq!(tier, Some(Tier::Server));
        assert_eq!(
            printed,
            normalized(
                r#"
                import { $$server as _$$server } from "mwap/runtime/client";
                export const Exported = _$$server({}, "use server:use-server.js", "Exported");
                export const Imported = _$$server({}, "use server:use-server.js", "Imported");
                export const varDeclaration = _$$server({}, "use server:use-server.js", "varDeclaration");
                export const functionDeclaration = _$$server({}, "use server:use-server.js", "functionDeclaration");
                export const Component = _$$server({}, "use server:use-server.js", "Component");
                "#
            )
        );
    }

    #[test]
    fn test_legal_comment_survives_module_replacement() {
        let (_, printed) = run(
            "/*! (c) Acme */\n\"use server\";\n// gone\nexport async function save() {}",
            "use-server.js",
        )
        .unwrap();
        assert!(printed.starts_with("/*! (c) Acme */"), "{}", printed);
        assert!(!printed.contains("// gone"), "{}", printed);
    }

    #[test]
    fn test_default_export_is_fatal() {
        let err = run(
            "\"use server\";\nexport default async function save() {}",
            "use-server.js",
        )
        .unwrap_err();
        assert_eq!(err.kind, TransformErrorKind::DefaultExport);
    }

    #[test]
    fn test_use_client_module_only_loses_marker() {
        let (tier, printed) = run(
            "\"use client\";\nimport { useState } from \"react\";\nexport function Counter() { return useState(0); }",
            "counter.js",
        )
        .unwrap();
        assert_eq!(tier, Some(Tier::Client));
        assert_eq!(
            printed,
            normalized(
                "import { useState } from \"react\";\nexport function Counter() { return useState(0); }"
            )
        );
    }

    #[test]
    fn test_untagged_module_is_unchanged() {
        let source = r#"
            export function Page() {
                const save = async () => {
                    "use server";
                };
                return save;
            }
        "#;
        let (tier, printed) = run(source, "page.js").unwrap();
        assert_eq!(tier, None);
        assert_eq!(printed, normalized(source));
    }

    #[test]
    fn test_conflicting_module_markers_are_fatal() {
        let err = run("'use client';\n'use server';\nexport const a = 1;", "both.js").unwrap_err();
        assert_eq!(err.kind, TransformErrorKind::DirectiveConflict);
    }

    #[test]
    fn test_custom_id_generator() {
        let ids = |file: &str, tier: Tier| format!("{}@{}", tier, file.len());
        let (_, printed) = run_with(
            "\"use server\";\nexport async function save() {}",
            "/app/a.js",
            &ids,
        )
        .unwrap();
        assert_eq!(
            printed,
            normalized(
                r#"
                import { $$server as _$$server } from "mwap/runtime/client";
                export const save = _$$server({}, "use server@9", "save");
                "#
            )
        );
    }
}
