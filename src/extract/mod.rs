//! Finding note files and turning them into plain-text documents.

pub mod text;

use std::path::{Component, Path};

use anyhow::{Context, Result, anyhow, bail};
use ignore::WalkBuilder;

use crate::card::{DocumentMeta, DocumentUnit, GENERAL, NoteFile};
pub use text::{NoteFormat, extract_text};

/// Every supported note under `root`, in path order.
///
/// The first directory below `root` names the subject and the second the
/// subtopic; files closer to the root fall back to "General".
pub fn discover_notes(root: &Path) -> Result<Vec<NoteFile>> {
    if !root.is_dir() {
        bail!("Notes folder does not exist: {}", root.display());
    }

    let mut builder = WalkBuilder::new(root);
    builder
        .hidden(true)
        .git_ignore(true)
        .git_exclude(true)
        .sort_by_file_path(|a, b| a.cmp(b));

    let mut notes = Vec::new();
    for entry in builder.build() {
        let entry = entry.map_err(|err| anyhow!(err))?;
        if !entry.file_type().map(|ft| ft.is_file()).unwrap_or(false) {
            continue;
        }
        let path = entry.path();
        if NoteFormat::from_path(path).is_none() {
            continue;
        }
        let relative = path
            .strip_prefix(root)
            .with_context(|| format!("{} is outside {}", path.display(), root.display()))?;
        notes.push(NoteFile {
            full_path: path.to_path_buf(),
            meta: classify(relative),
        });
    }

    Ok(notes)
}

fn classify(relative: &Path) -> DocumentMeta {
    let parts: Vec<String> = relative
        .components()
        .filter_map(|component| match component {
            Component::Normal(part) => Some(part.to_string_lossy().into_owned()),
            _ => None,
        })
        .collect();

    let file_name = parts.last().cloned().unwrap_or_default();
    let (subject, subtopic) = match parts.len() {
        0 | 1 => (GENERAL.to_string(), GENERAL.to_string()),
        2 => (parts[0].clone(), GENERAL.to_string()),
        _ => (parts[0].clone(), parts[1].clone()),
    };

    DocumentMeta::new(subject, subtopic, file_name)
}

pub async fn load_document(note: &NoteFile) -> Result<DocumentUnit> {
    let text = extract_text(&note.full_path).await?;
    Ok(DocumentUnit::new(text, note.meta.clone()))
}
