use std::borrow::Borrow;

use chrono::NaiveDate;
use core_types::Note;
use indexmap::IndexMap;

/// Notes in `folder` (all folders when `None`) whose title or content contains
/// `query`, ignoring case. An empty query matches everything.
pub fn filter<'a>(notes: &'a [Note], folder: Option<&str>, query: &str) -> Vec<&'a Note> {
    let needle = query.to_lowercase();
    notes
        .iter()
        .filter(|note| folder.is_none_or(|folder| note.folder == folder))
        .filter(|note| {
            needle.is_empty()
                || note.title.to_lowercase().contains(&needle)
                || note.content.to_lowercase().contains(&needle)
        })
        .collect()
}

/// Pinned notes first, then most recently updated.
pub fn sort_for_display<N: Borrow<Note>>(notes: &mut [N]) {
    notes.sort_by(|a, b| {
        let (a, b): (&Note, &Note) = (a.borrow(), b.borrow());
        b.is_pinned
            .cmp(&a.is_pinned)
            .then_with(|| b.updated_at.cmp(&a.updated_at))
    });
}

/// Note count per folder: the configured folders first (zero when empty),
/// followed by any other folder that notes refer to.
pub fn folder_counts(notes: &[Note], folders: &[String]) -> IndexMap<String, usize> {
    let mut counts: IndexMap<String, usize> =
        folders.iter().map(|folder| (folder.clone(), 0)).collect();
    for note in notes {
        *counts.entry(note.folder.clone()).or_default() += 1;
    }
    counts
}

pub fn word_count(text: &str) -> usize {
    text.split_whitespace().count()
}

pub fn char_count(text: &str) -> usize {
    text.chars().count()
}

pub fn export_json(notes: &[Note], folder: Option<&str>) -> serde_json::Result<String> {
    let selected = filter(notes, folder, "");
    serde_json::to_string_pretty(&selected)
}

pub fn export_file_name(date: NaiveDate) -> String {
    format!("minnotes-export-{}.json", date.format("%Y-%m-%d"))
}
