use std::{
    fs,
    path::{Path, PathBuf},
};

use anyhow::Context;
use client_core::{ExplanationResult, ImageRef};

/// Writes the inline visualizations of `explanation` (and its rationale) into
/// `dir` as `<stem>-gradcam.<ext>`, `<stem>-lime.<ext>` and
/// `<stem>-explanation.txt`. Plain-URL references are skipped.
pub fn save_explanation(
    dir: &Path,
    stem: &str,
    explanation: &ExplanationResult,
) -> anyhow::Result<Vec<PathBuf>> {
    fs::create_dir_all(dir)
        .with_context(|| format!("failed to create output directory {}", dir.display()))?;

    let mut written = Vec::new();
    let visualizations: [(&str, &ImageRef); 2] = [
        ("gradcam", &explanation.heatmap_overlay),
        ("lime", &explanation.segment_visualization),
    ];
    for (suffix, image) in visualizations {
        let Some(inline) = image.decode_inline() else {
            tracing::info!(kind = suffix, "visualization is not inline; not saved");
            continue;
        };
        let path = dir.join(format!("{stem}-{suffix}.{}", inline.extension()));
        fs::write(&path, &inline.bytes)
            .with_context(|| format!("failed to write {}", path.display()))?;
        written.push(path);
    }

    if !explanation.rationale.is_empty() {
        let path = dir.join(format!("{stem}-explanation.txt"));
        fs::write(&path, format!("{}\n", explanation.rationale))
            .with_context(|| format!("failed to write {}", path.display()))?;
        written.push(path);
    }
    Ok(written)
}

/// File-name stem for exported artifacts of `file_name`.
pub fn artifact_stem(file_name: &str) -> String {
    Path::new(file_name)
        .file_stem()
        .and_then(|stem| stem.to_str())
        .map(str::trim)
        .filter(|stem| !stem.is_empty())
        .unwrap_or("leaf")
        .to_string()
}
