//! Builder for byte-exact deck containers.
//!
//! Produces files in the layout [`crate::deck`] decodes: header, deck-detail
//! nodes, card nodes, card bodies and a trailing pool of strings and blobs.
//! It exists to make fixtures; it does not try to reproduce every byte a
//! real authoring tool would emit.
//!
//! ```
//! use b4u::{ByteBuffer, CardRecord, Deck, DeckWriter};
//!
//! let mut w = DeckWriter::new();
//! w.detail("Name", "Colors").card(&CardRecord {
//!     number: 1,
//!     native_title: Some("red".into()),
//!     foreign_title: Some("rojo".into()),
//!     ..CardRecord::default()
//! });
//! let deck = Deck::parse(&ByteBuffer::from_bytes(w.build()))?;
//! assert_eq!(deck.title, "Colors");
//! assert_eq!(deck.cards[0].foreign_title.as_deref(), Some("rojo"));
//! # Ok::<(), b4u::DeckError>(())
//! ```

use std::fs;
use std::io;
use std::path::Path;

use byteorder::{ByteOrder, LittleEndian};

use crate::blob::encode_blob;
use crate::card::{CardField, CardRecord, FieldKind, CARD_NODE_LEN, FIRST_SLOT_OFFSET, SLOT_LEN};
use crate::codec::{encode_fixed, encode_string, FIXED_LABEL_WIDTH};
use crate::deck::{
    ANCHOR_LITERAL, ANCHOR_PROBES, CARD_COUNT_OFFSET, CARD_HEAD_OFFSET, CARD_LIST_SKIP,
    DETAIL_HEAD_OFFSET, DETAIL_LABEL_OFFSET, DETAIL_NODE_LEN, DETAIL_VALUE_OFFSET,
};

/// Bytes reserved for the fixed header before any node.
pub const HEADER_LEN: usize = 192;

#[derive(Debug, Clone)]
enum DetailValue {
    Text(String),
    Raw(u32),
}

#[derive(Debug, Clone)]
enum CardEntry {
    Record(CardRecord),
    Raw { number: u32, data_pointer: u32, attributes: u32 },
}

#[derive(Debug, Clone)]
pub struct DeckWriter {
    anchor_probe:  Option<usize>,
    details:       Vec<(String, DetailValue)>,
    cards:         Vec<CardEntry>,
    declared_count: Option<u32>,
}

impl Default for DeckWriter {
    fn default() -> Self {
        Self::new()
    }
}

impl DeckWriter {
    pub fn new() -> Self {
        Self {
            anchor_probe:   Some(ANCHOR_PROBES[0]),
            details:        Vec::new(),
            cards:          Vec::new(),
            declared_count: None,
        }
    }

    /// Place the `Cards` literal at `probe`, or omit it with `None`.
    pub fn anchor_at(&mut self, probe: Option<usize>) -> &mut Self {
        self.anchor_probe = probe;
        self
    }

    /// Add a detail node whose value points at a masked string.
    pub fn detail(&mut self, label: &str, text: &str) -> &mut Self {
        self.details.push((label.to_owned(), DetailValue::Text(text.to_owned())));
        self
    }

    /// Add a detail node whose value word is stored verbatim.
    pub fn detail_raw(&mut self, label: &str, value: u32) -> &mut Self {
        self.details.push((label.to_owned(), DetailValue::Raw(value)));
        self
    }

    /// Add a card laid out from the fields present in `card`.
    pub fn card(&mut self, card: &CardRecord) -> &mut Self {
        self.cards.push(CardEntry::Record(card.clone()));
        self
    }

    /// Add a card node pointing at an arbitrary body.
    pub fn raw_card(&mut self, number: u32, data_pointer: u32, attributes: u32) -> &mut Self {
        self.cards.push(CardEntry::Raw { number, data_pointer, attributes });
        self
    }

    /// Override the card count stored next to the anchor.
    pub fn declared_card_count(&mut self, count: u32) -> &mut Self {
        self.declared_count = Some(count);
        self
    }

    pub fn build(&self) -> Vec<u8> {
        let mut out = vec![0u8; HEADER_LEN];

        // Detail nodes are contiguous, their values go to the pool.
        let detail_base = out.len();
        out.resize(detail_base + self.details.len() * DETAIL_NODE_LEN, 0);
        for (i, (label, value)) in self.details.iter().enumerate() {
            let node = detail_base + i * DETAIL_NODE_LEN;
            let next = if i + 1 < self.details.len() { node + DETAIL_NODE_LEN } else { 0 };
            let word = match value {
                DetailValue::Text(text) => append(&mut out, &encode_string(text)),
                DetailValue::Raw(raw)   => *raw,
            };
            put_u32(&mut out, node, next as u32);
            let label = encode_fixed(label, FIXED_LABEL_WIDTH);
            out[node + DETAIL_LABEL_OFFSET..node + DETAIL_LABEL_OFFSET + FIXED_LABEL_WIDTH]
                .copy_from_slice(&label);
            put_u32(&mut out, node + DETAIL_VALUE_OFFSET, word);
        }
        if !self.details.is_empty() {
            put_u32(&mut out, DETAIL_HEAD_OFFSET, detail_base as u32);
        }

        let card_base = out.len();
        out.resize(card_base + self.cards.len() * CARD_NODE_LEN, 0);
        for (i, entry) in self.cards.iter().enumerate() {
            let node = card_base + i * CARD_NODE_LEN;
            let next = if i + 1 < self.cards.len() { node + CARD_NODE_LEN } else { 0 };
            let (number, boundary, data_pointer, attributes) = match entry {
                CardEntry::Record(card) => {
                    let (ptr, mask) = write_body(&mut out, card);
                    (card.node_number, card.boundary, ptr, mask)
                }
                CardEntry::Raw { number, data_pointer, attributes } => {
                    (*number, 0, *data_pointer, *attributes)
                }
            };
            for (k, word) in [next as u32, number, boundary, data_pointer, attributes].into_iter().enumerate() {
                put_u32(&mut out, node + k * 4, word);
            }
        }

        if let Some(probe) = self.anchor_probe {
            out[probe..probe + ANCHOR_LITERAL.len()].copy_from_slice(ANCHOR_LITERAL);
            let anchor = probe + CARD_LIST_SKIP;
            let count = self.declared_count.unwrap_or(self.cards.len() as u32);
            put_u32(&mut out, anchor + CARD_COUNT_OFFSET, count);
            let head = if self.cards.is_empty() { 0 } else { card_base as u32 };
            put_u32(&mut out, anchor + CARD_HEAD_OFFSET, head);
        }

        out
    }

    pub fn write_to<P: AsRef<Path>>(&self, path: P) -> io::Result<()> {
        fs::write(path, self.build())
    }
}

/// Append a card body and its payloads; returns (body offset, attribute mask).
fn write_body(out: &mut Vec<u8>, card: &CardRecord) -> (u32, u32) {
    let present: Vec<CardField> = card.present_fields();
    let mask = present.iter().fold(card.unknown_bits, |acc, f| acc | f.bit());

    let body = out.len();
    out.resize(body + FIRST_SLOT_OFFSET + present.len() * SLOT_LEN, 0);
    put_u32(out, body + 4, card.number);

    for (i, field) in present.iter().enumerate() {
        let encoded = match field.kind() {
            FieldKind::Text        => encode_string(card.text(*field).unwrap_or_default()),
            FieldKind::Media(kind) => encode_blob(card.media(kind).map(|b| b.data()).unwrap_or_default()),
        };
        let target = append(out, &encoded);
        put_u32(out, body + FIRST_SLOT_OFFSET + i * SLOT_LEN, target);
    }
    (body as u32, mask)
}

fn append(out: &mut Vec<u8>, bytes: &[u8]) -> u32 {
    let at = out.len() as u32;
    out.extend_from_slice(bytes);
    at
}

fn put_u32(out: &mut [u8], at: usize, value: u32) {
    LittleEndian::write_u32(&mut out[at..at + 4], value);
}
