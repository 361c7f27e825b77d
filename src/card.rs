//! Card nodes and bitmask-driven card bodies.
//!
//! # Card node (20 bytes)
//! ```text
//! [ next: u32 ][ card_number: u32 ][ boundary: u32 ][ data_pointer: u32 ][ attributes: u32 ]
//! ```
//!
//! # Card body
//! ```text
//! data_pointer + 0   reserved
//! data_pointer + 4   card number (u32)
//! data_pointer + 8   one u32 pointer slot per *present* field, packed
//! ```
//! Slots exist only for fields whose bit is set in `attributes`, in the order
//! of [`CardField::CANONICAL`].  An absent field occupies no slot, so every
//! later slot shifts down by four bytes.

use serde::Serialize;
use tracing::debug;

use crate::blob::{extract_blob, Blob, MediaKind};
use crate::buffer::{ByteBuffer, ReadError};
use crate::codec::decode_string;

/// Size of one card-list node.
pub const CARD_NODE_LEN: usize = 20;
/// Offset of the card number inside a card body.
pub const CARD_NUMBER_OFFSET: usize = 4;
/// Offset of the first pointer slot inside a card body.
pub const FIRST_SLOT_OFFSET: usize = 8;
/// Width of one pointer slot.
pub const SLOT_LEN: usize = 4;

// ── Field table ──────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
    Text,
    Media(MediaKind),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CardField {
    NativeTitle,
    NativeSubtitle,
    ForeignTitle,
    ForeignSubtitle,
    NativeAltAnswer,
    ForeignAltAnswer,
    ForeignTranslit,
    NativeTooltip,
    ForeignAudio,
    NativeAudio,
    Image,
}

/// Union of every attribute bit that owns a slot.
pub const KNOWN_BITS: u32 = 0x1FFC;

impl CardField {
    /// Slot order inside a card body.  Reordering this table breaks decoding.
    pub const CANONICAL: [CardField; 11] = [
        CardField::NativeTitle,
        CardField::NativeSubtitle,
        CardField::ForeignTitle,
        CardField::ForeignSubtitle,
        CardField::NativeAltAnswer,
        CardField::ForeignAltAnswer,
        CardField::ForeignTranslit,
        CardField::NativeTooltip,
        CardField::ForeignAudio,
        CardField::NativeAudio,
        CardField::Image,
    ];

    #[inline]
    pub fn bit(self) -> u32 {
        match self {
            CardField::NativeTitle      => 1 << 2,
            CardField::NativeSubtitle   => 1 << 3,
            CardField::ForeignTitle     => 1 << 4,
            CardField::ForeignSubtitle  => 1 << 5,
            CardField::NativeAltAnswer  => 1 << 6,
            CardField::ForeignAltAnswer => 1 << 7,
            CardField::ForeignTranslit  => 1 << 8,
            CardField::NativeTooltip    => 1 << 9,
            CardField::ForeignAudio     => 1 << 10,
            CardField::NativeAudio      => 1 << 11,
            CardField::Image            => 1 << 12,
        }
    }

    pub fn kind(self) -> FieldKind {
        match self {
            CardField::ForeignAudio => FieldKind::Media(MediaKind::ForeignAudio),
            CardField::NativeAudio  => FieldKind::Media(MediaKind::NativeAudio),
            CardField::Image        => FieldKind::Media(MediaKind::Image),
            _                       => FieldKind::Text,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            CardField::NativeTitle      => "native_title",
            CardField::NativeSubtitle   => "native_subtitle",
            CardField::ForeignTitle     => "foreign_title",
            CardField::ForeignSubtitle  => "foreign_subtitle",
            CardField::NativeAltAnswer  => "native_alt_answer",
            CardField::ForeignAltAnswer => "foreign_alt_answer",
            CardField::ForeignTranslit  => "foreign_translit",
            CardField::NativeTooltip    => "native_tooltip",
            CardField::ForeignAudio     => "foreign_audio",
            CardField::NativeAudio      => "native_audio",
            CardField::Image            => "image",
        }
    }

    /// Fields present in `attributes`, in slot order.
    pub fn present_in(attributes: u32) -> impl Iterator<Item = CardField> {
        Self::CANONICAL.into_iter().filter(move |f| attributes & f.bit() != 0)
    }
}

// ── CardNode ─────────────────────────────────────────────────────────────────

/// One entry of the card list.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CardNode {
    pub next:         u32,
    pub card_number:  u32,
    /// Read for offset correctness; meaning unknown.
    pub boundary:     u32,
    pub data_pointer: u32,
    pub attributes:   u32,
}

impl CardNode {
    pub fn read(buf: &ByteBuffer, offset: usize) -> Result<Self, ReadError> {
        let (next, card_number, boundary, data_pointer, attributes): (u32, u32, u32, u32, u32) =
            buf.read(offset)?;
        Ok(Self { next, card_number, boundary, data_pointer, attributes })
    }
}

// ── CardRecord ───────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CardRecord {
    /// Card number stored in the card body.
    pub number:      u32,
    /// Card number stored in the list node.
    pub node_number: u32,
    pub boundary:    u32,
    pub attributes:  u32,
    /// Attribute bits with no known field; they own no slot.
    pub unknown_bits: u32,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub native_title:       Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub native_subtitle:    Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub foreign_title:      Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub foreign_subtitle:   Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub native_alt_answer:  Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub foreign_alt_answer: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub foreign_translit:   Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub native_tooltip:     Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub foreign_audio:      Option<Blob>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub native_audio:       Option<Blob>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub image:              Option<Blob>,
}

impl CardRecord {
    /// Number of pointer slots the body occupies.
    pub fn slots_consumed(&self) -> usize {
        (self.attributes & KNOWN_BITS).count_ones() as usize
    }

    /// Text of a text-kind field; `None` for absent or media fields.
    pub fn text(&self, field: CardField) -> Option<&str> {
        match field {
            CardField::NativeTitle      => self.native_title.as_deref(),
            CardField::NativeSubtitle   => self.native_subtitle.as_deref(),
            CardField::ForeignTitle     => self.foreign_title.as_deref(),
            CardField::ForeignSubtitle  => self.foreign_subtitle.as_deref(),
            CardField::NativeAltAnswer  => self.native_alt_answer.as_deref(),
            CardField::ForeignAltAnswer => self.foreign_alt_answer.as_deref(),
            CardField::ForeignTranslit  => self.foreign_translit.as_deref(),
            CardField::NativeTooltip    => self.native_tooltip.as_deref(),
            CardField::ForeignAudio | CardField::NativeAudio | CardField::Image => None,
        }
    }

    /// Payload of a media-kind field.
    pub fn media(&self, kind: MediaKind) -> Option<&Blob> {
        match kind {
            MediaKind::ForeignAudio => self.foreign_audio.as_ref(),
            MediaKind::NativeAudio  => self.native_audio.as_ref(),
            MediaKind::Image        => self.image.as_ref(),
        }
    }

    pub fn is_present(&self, field: CardField) -> bool {
        match field.kind() {
            FieldKind::Text        => self.text(field).is_some(),
            FieldKind::Media(kind) => self.media(kind).is_some(),
        }
    }

    /// Present fields in slot order.
    pub fn present_fields(&self) -> Vec<CardField> {
        CardField::CANONICAL.into_iter().filter(|f| self.is_present(*f)).collect()
    }

    fn text_slot(&mut self, field: CardField) -> Option<&mut Option<String>> {
        match field {
            CardField::NativeTitle      => Some(&mut self.native_title),
            CardField::NativeSubtitle   => Some(&mut self.native_subtitle),
            CardField::ForeignTitle     => Some(&mut self.foreign_title),
            CardField::ForeignSubtitle  => Some(&mut self.foreign_subtitle),
            CardField::NativeAltAnswer  => Some(&mut self.native_alt_answer),
            CardField::ForeignAltAnswer => Some(&mut self.foreign_alt_answer),
            CardField::ForeignTranslit  => Some(&mut self.foreign_translit),
            CardField::NativeTooltip    => Some(&mut self.native_tooltip),
            CardField::ForeignAudio | CardField::NativeAudio | CardField::Image => None,
        }
    }

    fn media_slot(&mut self, kind: MediaKind) -> &mut Option<Blob> {
        match kind {
            MediaKind::ForeignAudio => &mut self.foreign_audio,
            MediaKind::NativeAudio  => &mut self.native_audio,
            MediaKind::Image        => &mut self.image,
        }
    }
}

/// Decode the card body at `data_pointer` using `attributes` as the
/// presence mask.
///
/// A media slot holding a null pointer leaves that field absent; a text slot
/// holding a null pointer yields an empty string.
pub fn decode_card(buf: &ByteBuffer, data_pointer: u32, attributes: u32) -> Result<CardRecord, ReadError> {
    let base = data_pointer as usize;
    let number = buf.read_u32(base.saturating_add(CARD_NUMBER_OFFSET))?;

    let mut record = CardRecord {
        number,
        attributes,
        unknown_bits: attributes & !KNOWN_BITS,
        ..CardRecord::default()
    };
    if record.unknown_bits != 0 {
        debug!("Card {} carries unknown attribute bits {:#x}", number, record.unknown_bits);
    }

    let mut cursor = base.saturating_add(FIRST_SLOT_OFFSET);
    for field in CardField::present_in(attributes) {
        let target = buf.read_u32(cursor)?;
        cursor = cursor.saturating_add(SLOT_LEN);

        match field.kind() {
            FieldKind::Text => {
                let text = decode_string(buf, i64::from(target))?;
                if let Some(slot) = record.text_slot(field) {
                    *slot = Some(text);
                }
            }
            FieldKind::Media(kind) => {
                if target == 0 {
                    debug!("Card {} has a null {} pointer", number, field.name());
                    continue;
                }
                *record.media_slot(kind) = Some(extract_blob(buf, target as usize)?);
            }
        }
    }

    Ok(record)
}
