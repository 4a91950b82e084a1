//! Persisted artifacts of one extraction run.
//!
//! | file | contents |
//! |------|----------|
//! | `label_value_pairs.json` | every pair found, `basis` set on matched ones |
//! | `spatial_preextract.json` | field key → value from the anchor rules |
//! | `sections.json` | detected sections with y-ranges and categories |
//! | `fields.json` | field key → `{value, source, verified}` |
//! | `passes.json` | phase trace, per-request reports and stats |
//! | `comparison.json` | ground-truth report, when one was computed |
//!
//! Every file is written to a `.tmp` sibling first and renamed into place, so
//! a reader never sees a half-written artifact.

use crate::compare::ComparisonReport;
use crate::error::ExtractError;
use crate::output::{ExtractionOutput, ExtractionStats, FieldSource, FieldValue, PassReport, Phase};
use serde::Serialize;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

pub const LABEL_VALUE_PAIRS: &str = "label_value_pairs.json";
pub const SPATIAL_PREEXTRACT: &str = "spatial_preextract.json";
pub const SECTIONS: &str = "sections.json";
pub const FIELDS: &str = "fields.json";
pub const PASSES: &str = "passes.json";
pub const COMPARISON: &str = "comparison.json";

#[derive(Serialize)]
struct FieldRecord<'a> {
    value: &'a FieldValue,
    source: FieldSource,
    verified: Option<bool>,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    unnormalized: bool,
}

#[derive(Serialize)]
struct PassTrace<'a> {
    document: &'a str,
    form_type: &'a str,
    phases: &'a [Phase],
    passes: &'a [PassReport],
    stats: &'a ExtractionStats,
}

fn write_failed(path: &Path) -> impl FnOnce(std::io::Error) -> ExtractError + '_ {
    move |source| ExtractError::ArtifactWriteFailed {
        path: path.to_path_buf(),
        source,
    }
}

/// Pretty-print `value` to `path` atomically.
pub async fn write_json<T: Serialize + ?Sized>(path: &Path, value: &T) -> Result<(), ExtractError> {
    let json = serde_json::to_vec_pretty(value)
        .map_err(|e| ExtractError::Internal(format!("serialising {}: {}", path.display(), e)))?;

    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent).await.map_err(write_failed(path))?;
    }
    let tmp_path = path.with_extension("json.tmp");
    tokio::fs::write(&tmp_path, &json).await.map_err(write_failed(path))?;
    tokio::fs::rename(&tmp_path, path).await.map_err(write_failed(path))?;
    debug!("Wrote {} ({} bytes)", path.display(), json.len());
    Ok(())
}

/// Write every artifact of `output` under `dir`. Returns the files written.
pub async fn write_artifacts(
    dir: &Path,
    output: &ExtractionOutput,
    comparison: Option<&ComparisonReport>,
) -> Result<Vec<PathBuf>, ExtractError> {
    let mut written = Vec::new();

    let path = dir.join(LABEL_VALUE_PAIRS);
    write_json(&path, &output.label_value_pairs).await?;
    written.push(path);

    let path = dir.join(SPATIAL_PREEXTRACT);
    write_json(&path, &output.spatial_fields).await?;
    written.push(path);

    let path = dir.join(SECTIONS);
    write_json(&path, &output.sections).await?;
    written.push(path);

    let fields: BTreeMap<&str, FieldRecord<'_>> = output
        .fields
        .iter()
        .map(|(k, f)| {
            (
                k.as_str(),
                FieldRecord {
                    value: &f.value,
                    source: f.source,
                    verified: f.verified,
                    unnormalized: f.unnormalized,
                },
            )
        })
        .collect();
    let path = dir.join(FIELDS);
    write_json(&path, &fields).await?;
    written.push(path);

    let trace = PassTrace {
        document: &output.document,
        form_type: &output.form_type,
        phases: &output.phases,
        passes: &output.passes,
        stats: &output.stats,
    };
    let path = dir.join(PASSES);
    write_json(&path, &trace).await?;
    written.push(path);

    if let Some(report) = comparison {
        let path = dir.join(COMPARISON);
        write_json(&path, report).await?;
        written.push(path);
    }

    info!("Wrote {} artifacts to {}", written.len(), dir.display());
    Ok(written)
}
