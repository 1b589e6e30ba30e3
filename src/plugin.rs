//! Build-pipeline hook: source text in, rewritten source text out.

use lazy_static::lazy_static;
use oxc_allocator::Allocator;
use rayon::prelude::*;
use regex::Regex;
use serde::{Deserialize, Serialize};

#[cfg(feature = "napi")]
use napi_derive::napi;

use crate::codegen::print_program;
use crate::config::TransformOptions;
use crate::errors::TransformResult;
use crate::ids::IdGenerator;
use crate::parse::parse_program;
use crate::sidecar::ModuleLog;
use crate::transform::{transform_program, Target};

lazy_static! {
    static ref DIRECTIVE_HINT: Regex = Regex::new(r#"["']use (server|client)["']"#).unwrap();
}

/// True when `code` might carry a marker and is worth parsing.
pub fn may_contain_directive(code: &str) -> bool {
    DIRECTIVE_HINT.is_match(code)
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
#[cfg_attr(feature = "napi", napi(object))]
pub struct TransformOutput {
    pub code: String,
    /// `"use client"` or `"use server"`.
    pub directive: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
#[cfg_attr(feature = "napi", napi(object))]
pub struct TransformJob {
    pub file_id: String,
    pub code: String,
}

/// Transforms one module. `Ok(None)` means the bundler should keep the source
/// as it is.
pub fn transform_code(
    code: &str,
    file_id: &str,
    target: Target,
    options: &TransformOptions,
    ids: &dyn IdGenerator,
    log: Option<&ModuleLog>,
) -> TransformResult<Option<TransformOutput>> {
    if !may_contain_directive(code) {
        return Ok(None);
    }

    let allocator = Allocator::default();
    let mut program = parse_program(&allocator, code, file_id)?;
    let Some(tier) = transform_program(&allocator, &mut program, file_id, target, options, ids)?
    else {
        tracing::trace!(file = file_id, "no directive in directive position");
        return Ok(None);
    };

    if let Some(log) = log {
        log.record(file_id, tier);
    }
    tracing::debug!(file = file_id, ?target, tier = %tier, "transformed module");

    Ok(Some(TransformOutput {
        code: print_program(&program),
        directive: tier.directive().to_string(),
    }))
}

/// Runs [`transform_code`] over independent modules in parallel. Results come
/// back in job order.
pub fn transform_many(
    jobs: &[TransformJob],
    target: Target,
    options: &TransformOptions,
    ids: &dyn IdGenerator,
    log: Option<&ModuleLog>,
) -> Vec<TransformResult<Option<TransformOutput>>> {
    jobs.par_iter()
        .map(|job| transform_code(&job.code, &job.file_id, target, options, ids, log))
        .collect()
}

// ═══════════════════════════════════════════════════════════════════════════════
// NAPI SURFACE
// ═══════════════════════════════════════════════════════════════════════════════

#[cfg(feature = "napi")]
fn napi_setup(
    target: &str,
    options_json: Option<String>,
) -> napi::Result<(Target, TransformOptions, Option<ModuleLog>)> {
    let target: Target = target.parse().map_err(napi::Error::from_reason)?;
    let options = match options_json {
        Some(json) => TransformOptions::from_json(&json)
            .map_err(|e| napi::Error::from_reason(e.to_string()))?,
        None => TransformOptions::default(),
    };
    let log = match &options.module_log {
        Some(path) => {
            Some(ModuleLog::load(path).map_err(|e| napi::Error::from_reason(e.to_string()))?)
        }
        None => None,
    };
    Ok((target, options, log))
}

#[cfg(feature = "napi")]
fn napi_persist(log: Option<&ModuleLog>) -> napi::Result<()> {
    match log {
        Some(log) => log
            .persist()
            .map_err(|e| napi::Error::from_reason(e.to_string())),
        None => Ok(()),
    }
}

#[cfg(feature = "napi")]
#[napi]
pub fn transform_native(
    code: String,
    file_id: String,
    target: String,
    options_json: Option<String>,
) -> napi::Result<Option<TransformOutput>> {
    let (target, options, log) = napi_setup(&target, options_json)?;
    let ids = crate::ids::generator_for(&options);
    let output = transform_code(&code, &file_id, target, &options, ids.as_ref(), log.as_ref())
        .map_err(|e| napi::Error::from_reason(e.to_string()))?;
    napi_persist(log.as_ref())?;
    Ok(output)
}

#[cfg(feature = "napi")]
#[napi]
pub fn transform_many_native(
    jobs: Vec<TransformJob>,
    target: String,
    options_json: Option<String>,
) -> napi::Result<Vec<Option<TransformOutput>>> {
    let (target, options, log) = napi_setup(&target, options_json)?;
    let ids = crate::ids::generator_for(&options);
    let outputs = transform_many(&jobs, target, &options, ids.as_ref(), log.as_ref())
        .into_iter()
        .collect::<TransformResult<Vec<_>>>()
        .map_err(|e| napi::Error::from_reason(e.to_string()))?;
    napi_persist(log.as_ref())?;
    Ok(outputs)
}
