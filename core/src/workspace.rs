//! Creates and tears down the per-execution scratch directory tree and
//! classifies the files a sandbox run leaves behind in `outputs/`.

use std::collections::BTreeMap;
use std::path::Path;

use tokio::fs;
use uuid::Uuid;

use crate::error::Result;
use crate::model::{Artifact, Workspace};

const SCRIPT_EXTENSION: &str = "py";

pub async fn prepare(script: &str, serialized_data: &str) -> Result<Workspace> {
    let root = std::env::temp_dir().join(format!("sandbox_{}", Uuid::new_v4()));
    let data_dir = root.join("data");
    let outputs_dir = root.join("outputs");
    let script_file = root.join(format!("script.{SCRIPT_EXTENSION}"));

    fs::create_dir_all(&data_dir).await?;
    fs::create_dir_all(&outputs_dir).await?;
    fs::write(&script_file, script).await?;
    fs::write(data_dir.join("data.csv"), serialized_data).await?;

    Ok(Workspace { root, script_file, data_dir, outputs_dir })
}

/// Reads every regular file directly under `outputs/` (non-recursive) and
/// classifies it by extension. Called both after a clean exit and after a
/// crash, since the program may have written partial output before failing.
pub async fn collect_outputs(workspace: &Workspace) -> Result<BTreeMap<String, Artifact>> {
    let mut outputs = BTreeMap::new();

    let mut entries = match fs::read_dir(&workspace.outputs_dir).await {
        Ok(entries) => entries,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(outputs),
        Err(err) => return Err(err.into()),
    };

    while let Some(entry) = entries.next_entry().await? {
        let path = entry.path();
        if !entry.file_type().await?.is_file() {
            continue;
        }
        let filename = entry.file_name().to_string_lossy().into_owned();
        let artifact = classify(&path, &filename).await?;
        outputs.insert(filename, artifact);
    }

    Ok(outputs)
}

async fn classify(path: &Path, filename: &str) -> Result<Artifact> {
    let lower = filename.to_ascii_lowercase();

    if lower.ends_with(".json") {
        let bytes = fs::read(path).await?;
        return Ok(match serde_json::from_slice::<serde_json::Value>(&bytes) {
            Ok(value) => Artifact::Json { value },
            Err(_) => Artifact::Text { text: String::from_utf8_lossy(&bytes).into_owned() },
        });
    }
    if lower.ends_with(".png") {
        return Ok(Artifact::Image { bytes: fs::read(path).await?, mime: "image/png".to_string() });
    }
    if lower.ends_with(".jpg") || lower.ends_with(".jpeg") {
        return Ok(Artifact::Image { bytes: fs::read(path).await?, mime: "image/jpeg".to_string() });
    }
    if lower.ends_with(".html") {
        return Ok(Artifact::Html { text: fs::read_to_string(path).await? });
    }
    if lower.ends_with(".csv") {
        return Ok(Artifact::Csv { text: fs::read_to_string(path).await? });
    }
    if lower.ends_with(".txt") {
        return Ok(Artifact::Text { text: fs::read_to_string(path).await? });
    }

    let bytes = fs::read(path).await?;
    match String::from_utf8(bytes.clone()) {
        Ok(text) => Ok(Artifact::Text { text }),
        Err(_) => Ok(Artifact::Binary { bytes }),
    }
}

/// Removes the workspace root. Idempotent: a missing directory is not an
/// error, since cleanup may run twice on some panic-unwind paths.
pub async fn destroy(workspace: &Workspace) -> Result<()> {
    match fs::remove_dir_all(&workspace.root).await {
        Ok(()) => Ok(()),
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(err) => Err(err.into()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn prepare_then_destroy_leaves_no_trace() {
        let workspace = prepare("print(1)", "a,b\n1,2\n").await.expect("prepare");
        assert!(workspace.root.exists());
        assert!(workspace.script_file.exists());

        destroy(&workspace).await.expect("destroy");
        assert!(!workspace.root.exists());
    }

    #[tokio::test]
    async fn collect_outputs_classifies_by_extension() {
        let workspace = prepare("print(1)", "a,b\n1,2\n").await.expect("prepare");

        fs::write(workspace.outputs_dir.join("metrics.json"), r#"{"x":1}"#).await.expect("write");
        fs::write(workspace.outputs_dir.join("insights.txt"), "ok").await.expect("write");
        fs::write(workspace.outputs_dir.join("report.html"), "<h1>r</h1>").await.expect("write");

        let outputs = collect_outputs(&workspace).await.expect("collect");
        assert!(matches!(outputs.get("metrics.json"), Some(Artifact::Json { .. })));
        assert!(matches!(outputs.get("insights.txt"), Some(Artifact::Text { .. })));
        assert!(matches!(outputs.get("report.html"), Some(Artifact::Html { .. })));

        destroy(&workspace).await.expect("destroy");
    }

    #[tokio::test]
    async fn collect_outputs_is_stable_across_repeated_calls() {
        let workspace = prepare("print(1)", "a,b\n1,2\n").await.expect("prepare");
        fs::write(workspace.outputs_dir.join("metrics.json"), r#"{"x":1}"#).await.expect("write");

        let first = collect_outputs(&workspace).await.expect("collect");
        let second = collect_outputs(&workspace).await.expect("collect");
        assert_eq!(first.len(), second.len());

        destroy(&workspace).await.expect("destroy");
    }

    #[tokio::test]
    async fn missing_outputs_dir_yields_empty_map() {
        let workspace = prepare("print(1)", "a,b\n1,2\n").await.expect("prepare");
        fs::remove_dir_all(&workspace.outputs_dir).await.expect("remove");

        let outputs = collect_outputs(&workspace).await.expect("collect");
        assert!(outputs.is_empty());

        destroy(&workspace).await.expect("destroy");
    }
}
