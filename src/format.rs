//! Note-facing fields for an imported card.
//!
//! Every card becomes exactly [`NoteFields::FIELD_COUNT`] fields, in order:
//! front, back, foreign-audio tag, native-audio tag, tooltip.  Media payloads
//! are written to the destination directory before their tags are emitted.
//! Absent fields render as empty text.
//!
//! Card numbers are not unique within a deck, so a formatter remembers the
//! media names it has handed out and numbers any repeat:
//! `{prefix}{card_number}_{n}{suffix}` with `n` counting from 2.

use std::collections::HashSet;
use std::io;
use std::path::{Path, PathBuf};

use serde::Serialize;
use thiserror::Error;
use tracing::debug;
use uuid::Uuid;

use crate::blob::{Blob, MediaKind};
use crate::card::CardRecord;
use crate::deck::Deck;

#[derive(Error, Debug)]
pub enum FormatError {
    #[error("Cannot write media file {}: {source}", .path.display())]
    Io { path: PathBuf, source: io::Error },
}

// ── NoteFields ───────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct NoteFields {
    pub front:         String,
    pub back:          String,
    pub foreign_audio: String,
    pub native_audio:  String,
    pub tooltip:       String,
    /// Media filenames written for this card.
    #[serde(skip)]
    pub media:         Vec<String>,
}

impl NoteFields {
    pub const FIELD_COUNT: usize = 5;

    pub fn as_array(&self) -> [&str; Self::FIELD_COUNT] {
        [&self.front, &self.back, &self.foreign_audio, &self.native_audio, &self.tooltip]
    }

    pub fn into_array(self) -> [String; Self::FIELD_COUNT] {
        [self.front, self.back, self.foreign_audio, self.native_audio, self.tooltip]
    }
}

// ── FieldFormatter ───────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct FieldFormatter {
    dest_dir: PathBuf,
    prefix:   String,
    used:     HashSet<String>,
}

impl FieldFormatter {
    pub fn new<P: AsRef<Path>>(dest_dir: P, prefix: impl Into<String>) -> Self {
        Self {
            dest_dir: dest_dir.as_ref().to_owned(),
            prefix:   prefix.into(),
            used:     HashSet::new(),
        }
    }

    /// Formatter with a fresh media prefix derived from the deck title.
    pub fn for_deck<P: AsRef<Path>>(dest_dir: P, deck: &Deck) -> Self {
        Self::new(dest_dir, media_prefix(&deck.title))
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    pub fn dest_dir(&self) -> &Path {
        &self.dest_dir
    }

    /// `{prefix}{card_number}{suffix}`
    pub fn media_filename(&self, card_number: u32, kind: MediaKind) -> String {
        format!("{}{}{}", self.prefix, card_number, kind.file_suffix())
    }

    pub fn format(&mut self, card: &CardRecord) -> Result<NoteFields, FormatError> {
        let mut media = Vec::new();

        let foreign_audio = match &card.foreign_audio {
            Some(blob) => format!("[sound:{}]", self.write_media(card.number, MediaKind::ForeignAudio, blob, &mut media)?),
            None       => String::new(),
        };
        let native_audio = match &card.native_audio {
            Some(blob) => format!("[sound:{}]", self.write_media(card.number, MediaKind::NativeAudio, blob, &mut media)?),
            None       => String::new(),
        };
        let image = match &card.image {
            Some(blob) => format!("<img src=\"{}\"><br/>", self.write_media(card.number, MediaKind::Image, blob, &mut media)?),
            None       => String::new(),
        };

        let front = format!(
            "{}{}{}",
            card.foreign_title.as_deref().unwrap_or_default(),
            wrap(card.foreign_subtitle.as_deref(), "<br/><p>", "</p>"),
            wrap(card.foreign_alt_answer.as_deref(), "<br/><p>Also: ", "</p>"),
        );
        let back = format!(
            "{}{}{}{}",
            image,
            card.native_title.as_deref().unwrap_or_default(),
            wrap(card.native_subtitle.as_deref(), "<br/><p>", "</p>"),
            wrap(card.native_alt_answer.as_deref(), "<br/><p>Also: ", "</p>"),
        );

        Ok(NoteFields {
            front,
            back,
            foreign_audio,
            native_audio,
            tooltip: wrap(card.native_tooltip.as_deref(), "<small>", "</small>"),
            media,
        })
    }

    pub fn format_deck(&mut self, deck: &Deck) -> Result<Vec<NoteFields>, FormatError> {
        deck.cards.iter().map(|card| self.format(card)).collect()
    }

    /// First name for this card and kind not yet handed out.
    fn claim_filename(&mut self, card_number: u32, kind: MediaKind) -> String {
        let mut name = self.media_filename(card_number, kind);
        let mut n = 2u32;
        while self.used.contains(&name) {
            name = format!("{}{}_{}{}", self.prefix, card_number, n, kind.file_suffix());
            n += 1;
        }
        self.used.insert(name.clone());
        name
    }

    fn write_media(
        &mut self,
        card_number: u32,
        kind:        MediaKind,
        blob:        &Blob,
        written:     &mut Vec<String>,
    ) -> Result<String, FormatError> {
        let name = self.claim_filename(card_number, kind);
        let path = self.dest_dir.join(&name);
        blob.write_to(&path).map_err(|source| FormatError::Io { path: path.clone(), source })?;
        debug!("Wrote {} bytes to {}", blob.len(), path.display());
        written.push(name.clone());
        Ok(name)
    }
}

fn wrap(content: Option<&str>, prefix: &str, suffix: &str) -> String {
    match content {
        Some(c) if !c.is_empty() => format!("{prefix}{c}{suffix}"),
        _ => String::new(),
    }
}

/// Per-import media prefix: eight random hex digits plus a filesystem-safe
/// form of `title`, so files from separate imports never collide.
pub fn media_prefix(title: &str) -> String {
    let tag = Uuid::new_v4().simple().to_string();
    let mut safe: String = title
        .chars()
        .map(|c| if c.is_alphanumeric() || c == '-' { c } else { '_' })
        .collect();
    safe = safe.trim_matches('_').to_owned();
    if safe.is_empty() {
        safe.push_str("deck");
    }
    format!("{}_{}_", &tag[..8], safe)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn text_card(foreign: &str, native: &str) -> CardRecord {
        CardRecord {
            number: 5,
            foreign_title: Some(foreign.into()),
            native_title: Some(native.into()),
            ..CardRecord::default()
        }
    }

    #[test]
    fn plain_titles() {
        let mut f = FieldFormatter::new("/nonexistent", "p_");
        let note = f.format(&text_card("Hola", "Hello")).unwrap();
        assert_eq!(note.front, "Hola");
        assert_eq!(note.back, "Hello");
        assert_eq!(note.foreign_audio, "");
        assert_eq!(note.native_audio, "");
        assert_eq!(note.tooltip, "");
        assert!(note.media.is_empty());
        assert_eq!(note.as_array().len(), NoteFields::FIELD_COUNT);
    }

    #[test]
    fn subtitles_alt_answers_and_tooltip() {
        let card = CardRecord {
            foreign_subtitle:   Some("la".into()),
            foreign_alt_answer: Some("Buenos".into()),
            native_subtitle:    Some("the".into()),
            native_alt_answer:  Some("Hi".into()),
            native_tooltip:     Some("greeting".into()),
            ..text_card("Hola", "Hello")
        };
        let note = FieldFormatter::new("/nonexistent", "p_").format(&card).unwrap();
        assert_eq!(note.front, "Hola<br/><p>la</p><br/><p>Also: Buenos</p>");
        assert_eq!(note.back, "Hello<br/><p>the</p><br/><p>Also: Hi</p>");
        assert_eq!(note.tooltip, "<small>greeting</small>");
    }

    #[test]
    fn empty_text_is_not_wrapped() {
        let card = CardRecord {
            foreign_subtitle: Some(String::new()),
            native_tooltip:   Some(String::new()),
            ..text_card("a", "b")
        };
        let note = FieldFormatter::new("/nonexistent", "p_").format(&card).unwrap();
        assert_eq!(note.front, "a");
        assert_eq!(note.tooltip, "");
    }

    #[test]
    fn media_filenames() {
        let f = FieldFormatter::new("/tmp", "12Deck");
        assert_eq!(f.media_filename(3, MediaKind::ForeignAudio), "12Deck3_foreign.ogg");
        assert_eq!(f.media_filename(3, MediaKind::NativeAudio), "12Deck3_native.ogg");
        assert_eq!(f.media_filename(3, MediaKind::Image), "12Deck3_image.jpg");
    }

    #[test]
    fn repeated_card_numbers_get_distinct_media() {
        let dir = tempfile::tempdir().unwrap();
        let mut f = FieldFormatter::new(dir.path(), "p");
        let first = CardRecord { foreign_audio: Some(Blob::new(b"AAAA".to_vec())), ..text_card("a", "b") };
        let second = CardRecord { foreign_audio: Some(Blob::new(b"BBBB".to_vec())), ..text_card("c", "d") };

        let a = f.format(&first).unwrap();
        let b = f.format(&second).unwrap();
        assert_eq!(a.foreign_audio, "[sound:p5_foreign.ogg]");
        assert_eq!(b.foreign_audio, "[sound:p5_2_foreign.ogg]");
        assert_eq!(std::fs::read(dir.path().join("p5_foreign.ogg")).unwrap(), b"AAAA");
        assert_eq!(std::fs::read(dir.path().join("p5_2_foreign.ogg")).unwrap(), b"BBBB");
    }

    #[test]
    fn media_write_failure_is_reported() {
        let card = CardRecord {
            foreign_audio: Some(Blob::new(vec![1])),
            ..text_card("a", "b")
        };
        let err = FieldFormatter::new("/definitely/not/a/dir", "p_").format(&card).unwrap_err();
        assert!(matches!(err, FormatError::Io { .. }));
    }

    #[test]
    fn prefixes_are_unique_and_safe() {
        let a = media_prefix("My Deck / Vol. 1");
        let b = media_prefix("My Deck / Vol. 1");
        assert_ne!(a, b);
        assert!(a.ends_with("_My_Deck___Vol__1_"));
        assert!(!a.contains('/'));
        assert!(media_prefix("").ends_with("_deck_"));
    }
}
