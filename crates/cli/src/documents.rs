//! Document subcommands: list, show, create, edit, delete, resolve.
//!
//! Each command opens the document through the editor, so the same
//! lifecycle rules apply as for library callers: edits go through `read`,
//! conflicted documents refuse further reads until resolved.

use anyhow::{Context, Result};
use comfy_table::{presets::UTF8_FULL, Cell, ContentArrangement, Table};

use docsync_core::codec::DocumentCodec;
use docsync_core::conflict::has_conflict_markers;
use docsync_core::document::codec_for_kind;
use docsync_core::{DocumentHandle, DocumentSnapshot, Editor, FieldValue, FileSystem, Resolution};

use crate::style;

/// List every document in the data directory.
pub fn run_list(editor: &Editor) -> Result<()> {
    let fs = editor.file_system();
    let names = editor
        .all_file_names()
        .context("failed to list documents")?;

    if names.is_empty() {
        println!();
        println!("{}", style::dim("No documents"));
        println!();
        return Ok(());
    }

    println!();
    println!("{}", style::header(&format!("Documents ({})", names.len())));
    println!();

    let mut table = Table::new();
    table.load_preset(UTF8_FULL);
    table.set_content_arrangement(ContentArrangement::Dynamic);
    table.set_header(vec!["Name", "Size", "Modified", "Status"]);

    for name in &names {
        table.add_row(list_row(fs.as_ref(), name).map(Cell::new));
    }

    println!("{}", table);
    println!();

    Ok(())
}

/// Open, read, and print one document.
pub async fn run_show(editor: &Editor, name: &str, kind: &str, json: bool) -> Result<()> {
    let handle = open_and_read(editor, name, kind).await?;
    let snapshot = handle
        .snapshot()
        .await
        .with_context(|| format!("document '{}' is no longer open", name))?;

    if json {
        println!("{}", serde_json::to_string_pretty(&snapshot)?);
        return Ok(());
    }

    println!();
    println!("{}", style::header(&snapshot.name));
    println!("  Kind    : {}", snapshot.kind);
    println!("  State   : {}", style::state(snapshot.state));
    println!(
        "  Modified: {}",
        snapshot
            .modified_at
            .map(|t| t.format("%Y-%m-%d %H:%M:%S UTC").to_string())
            .unwrap_or_else(|| "—".to_string())
    );
    println!();
    println!("{}", fields_table(&snapshot));
    println!();

    if snapshot.state.is_conflict() {
        println!(
            "{}",
            style::warn("Resolve with: docsync resolve <NAME> --accept incoming|current")
        );
        println!();
    }

    Ok(())
}

/// Create a document holding the kind's defaults.
pub async fn run_create(editor: &Editor, name: &str, kind: &str) -> Result<()> {
    editor
        .create_kind(name, kind)
        .await
        .with_context(|| format!("failed to create '{}'", name))?;
    println!("{}", style::success(&format!("Created {} ({})", name, kind)));
    Ok(())
}

/// Set one field and save.
pub async fn run_edit(
    editor: &Editor,
    name: &str,
    kind: &str,
    field: &str,
    raw: &str,
) -> Result<()> {
    let codec = codec_for_kind(kind)?;
    let value = parse_value(codec, field, raw)?;

    let handle = open_and_read(editor, name, kind).await?;
    let state = handle.state().await;
    if state.is_conflict() {
        anyhow::bail!(
            "'{}' is in conflict; resolve it before editing (docsync resolve {} --accept ...)",
            name,
            name
        );
    }

    handle.set_field(field, value).await?;
    handle
        .save()
        .await
        .with_context(|| format!("failed to save '{}'", name))?;

    println!("{}", style::success(&format!("{}: {} = {}", name, field, raw)));
    Ok(())
}

pub async fn run_delete(editor: &Editor, name: &str, kind: &str) -> Result<()> {
    let handle = editor
        .open_kind(name, kind)
        .await
        .with_context(|| format!("failed to open '{}'", name))?;
    handle
        .delete()
        .await
        .with_context(|| format!("failed to delete '{}'", name))?;
    println!("{}", style::success(&format!("Deleted {}", name)));
    Ok(())
}

/// Keep one side of a conflicted document and write it back.
pub async fn run_resolve(
    editor: &Editor,
    name: &str,
    kind: &str,
    accept: Resolution,
) -> Result<()> {
    let handle = open_and_read(editor, name, kind).await?;
    handle
        .resolve(accept)
        .await
        .with_context(|| format!("failed to resolve '{}'", name))?;
    handle
        .save()
        .await
        .with_context(|| format!("failed to save '{}'", name))?;

    println!(
        "{}",
        style::success(&format!("{} resolved (accepted {})", name, accept))
    );
    Ok(())
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

async fn open_and_read(editor: &Editor, name: &str, kind: &str) -> Result<DocumentHandle> {
    let handle = editor
        .open_kind(name, kind)
        .await
        .with_context(|| format!("failed to open '{}'", name))?;
    handle
        .read()
        .await
        .with_context(|| format!("failed to read '{}'", name))?;
    Ok(handle)
}

/// Name, size, mtime and status cells for one file. A read failure shows
/// up in the status cell rather than as an empty file.
fn list_row(fs: &dyn FileSystem, name: &str) -> [String; 4] {
    let modified = fs
        .modified_time(name)
        .map(|t| t.format("%Y-%m-%d %H:%M:%S").to_string())
        .unwrap_or_else(|_| "—".to_string());
    let (size, status) = match fs.read_bytes(name) {
        Ok(bytes) if has_conflict_markers(&bytes) => {
            (format!("{} B", bytes.len()), style::warn("conflict markers"))
        }
        Ok(bytes) => (format!("{} B", bytes.len()), style::dim("clean")),
        Err(e) => ("—".to_string(), style::error(&format!("unreadable: {}", e))),
    };
    [name.to_string(), size, modified, status]
}

/// Interpret `raw` according to the declared type of `field`.
fn parse_value(codec: &dyn DocumentCodec, field: &str, raw: &str) -> Result<FieldValue> {
    let spec = codec
        .schema()
        .iter()
        .find(|spec| spec.name == field)
        .with_context(|| format!("'{}' is not a field of {} documents", field, codec.kind()))?;

    let value = match spec.default.to_value() {
        FieldValue::String(_) => FieldValue::String(raw.to_string()),
        FieldValue::Number(_) => FieldValue::Number(
            raw.parse::<serde_json::Number>()
                .with_context(|| format!("'{}' expects a number, got '{}'", field, raw))?,
        ),
        FieldValue::Bool(_) => FieldValue::Bool(
            raw.parse()
                .with_context(|| format!("'{}' expects true or false, got '{}'", field, raw))?,
        ),
        FieldValue::Opaque(_) => anyhow::bail!("'{}' cannot be edited", field),
    };
    Ok(value)
}

fn fields_table(snapshot: &DocumentSnapshot) -> Table {
    let mut table = Table::new();
    table.load_preset(UTF8_FULL);
    table.set_content_arrangement(ContentArrangement::Dynamic);

    let show = |value: Option<&FieldValue>| value.map(|v| v.to_string()).unwrap_or_default();

    match (&snapshot.incoming, &snapshot.current_on_disk) {
        (Some(incoming), Some(on_disk)) => {
            table.set_header(vec!["Field", "Current", "On disk", "Incoming"]);
            for (key, value) in snapshot.fields.iter() {
                table.add_row(vec![
                    Cell::new(key),
                    Cell::new(value.to_string()),
                    Cell::new(show(on_disk.get(key))),
                    Cell::new(show(incoming.get(key))),
                ]);
            }
        }
        (Some(incoming), None) => {
            table.set_header(vec!["Field", "Current", "Incoming"]);
            for (key, value) in snapshot.fields.iter() {
                table.add_row(vec![
                    Cell::new(key),
                    Cell::new(value.to_string()),
                    Cell::new(show(incoming.get(key))),
                ]);
            }
        }
        _ => {
            table.set_header(vec!["Field", "Value"]);
            for (key, value) in snapshot.fields.iter() {
                table.add_row(vec![Cell::new(key), Cell::new(value.to_string())]);
            }
        }
    }
    table
}
