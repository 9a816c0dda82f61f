use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use chrono::Local;
use core_types::{Attachment, AttachmentKind, Note, Theme};
use notebook::{NoteEdit, Notebook, views};

use crate::cli::{Commands, ThemeAction};

pub async fn execute(notebook: &Notebook, command: Commands) -> Result<()> {
    match command {
        Commands::Signup { email, password } => {
            let account = notebook.sign_up(&email, &password).await?;
            println!("Signed up and signed in as {} ({})", account.email, account.id);
        }
        Commands::Signin { email, password } => {
            let account = notebook.sign_in(&email, &password).await?;
            println!("Signed in as {}", account.email);
        }
        Commands::Signout => {
            notebook.sign_out().await?;
            println!("Signed out");
        }
        Commands::Whoami => match notebook.current_user() {
            Some(account) => println!("{} ({})", account.email, account.id),
            None => println!("Not signed in"),
        },
        Commands::List { folder, search } => {
            let notes =
                notebook.visible_notes(folder.as_deref(), search.as_deref().unwrap_or_default());
            if notes.is_empty() {
                println!("No notes");
            }
            for note in &notes {
                println!("{}", summary_line(note));
            }
        }
        Commands::New { folder } => {
            let note = notebook.create_note(folder.as_deref())?;
            println!("{}", note.id);
        }
        Commands::Edit {
            id,
            title,
            content,
            folder,
            tags,
        } => {
            let edit = NoteEdit {
                title,
                content,
                folder,
                tags: tags.as_deref().map(parse_tags),
            };
            if edit.is_empty() {
                bail!("nothing to change; pass --title, --content, --folder or --tags");
            }
            let note = notebook.update_note(&id, edit)?;
            println!("{}", summary_line(&note));
        }
        Commands::Delete { id } => {
            notebook.delete_note(&id).await?;
            println!("Deleted {id}");
        }
        Commands::Pin { id } => {
            let pinned = notebook.toggle_pin(&id).await?;
            println!("{} {id}", if pinned { "Pinned" } else { "Unpinned" });
        }
        Commands::Attach { id, path, mime } => {
            let attachment = read_attachment(&path, mime.as_deref())?;
            let attachment_id = attachment.id.clone();
            notebook.add_attachment(&id, attachment).await?;
            println!("{attachment_id}");
        }
        Commands::Detach { id, attachment_id } => {
            notebook.remove_attachment(&id, &attachment_id).await?;
            println!("Removed {attachment_id}");
        }
        Commands::Folders => {
            for (folder, count) in notebook.folder_counts() {
                println!("{folder:<16} {count}");
            }
        }
        Commands::Export { folder, out } => {
            let json = notebook
                .export_json(folder.as_deref())
                .context("failed to serialize notes")?;
            let out = out
                .unwrap_or_else(|| PathBuf::from(views::export_file_name(Local::now().date_naive())));
            fs::write(&out, json).with_context(|| format!("failed to write {}", out.display()))?;
            println!("Exported to {}", out.display());
        }
        Commands::Theme { action } => {
            let theme = match action {
                None => notebook.theme().await?,
                Some(ThemeAction::Toggle) => notebook.toggle_theme().await?,
                Some(ThemeAction::Dark) => set(notebook, Theme::Dark).await?,
                Some(ThemeAction::Light) => set(notebook, Theme::Light).await?,
            };
            println!("{theme}");
        }
    }
    Ok(())
}

async fn set(notebook: &Notebook, theme: Theme) -> Result<Theme> {
    notebook.set_theme(theme).await?;
    Ok(theme)
}

fn summary_line(note: &Note) -> String {
    let pin = if note.is_pinned { "*" } else { " " };
    let mut line = format!(
        "{pin} {}  {:<10} {}  ({} words, {} chars, updated {})",
        note.id,
        note.folder,
        note.title,
        views::word_count(&note.content),
        views::char_count(&note.content),
        note.updated_at.with_timezone(&Local).format("%Y-%m-%d %H:%M"),
    );
    if !note.tags.is_empty() {
        line.push_str(&format!(" [{}]", note.tags.join(", ")));
    }
    if !note.attachments.is_empty() {
        line.push_str(&format!(" +{} attachment(s)", note.attachments.len()));
    }
    line
}

fn parse_tags(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|tag| !tag.is_empty())
        .map(str::to_string)
        .collect()
}

fn read_attachment(path: &Path, mime: Option<&str>) -> Result<Attachment> {
    let bytes = fs::read(path).with_context(|| format!("failed to read {}", path.display()))?;
    let name = path
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .with_context(|| format!("{} is not a file", path.display()))?;
    let mime = mime.map(str::to_string).unwrap_or_else(|| guess_mime(path));
    Ok(Attachment::from_bytes(
        AttachmentKind::from_mime(&mime),
        name,
        &bytes,
    ))
}

fn guess_mime(path: &Path) -> String {
    let extension = path
        .extension()
        .map(|ext| ext.to_string_lossy().to_ascii_lowercase())
        .unwrap_or_default();
    match extension.as_str() {
        "png" => "image/png",
        "jpg" | "jpeg" => "image/jpeg",
        "gif" => "image/gif",
        "webp" => "image/webp",
        "svg" => "image/svg+xml",
        _ => "application/pdf",
    }
    .to_string()
}
