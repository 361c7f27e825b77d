//! Deck decoding: anchor discovery and the two linked-list walks.
//!
//! # Fixed header locations
//! | Offset | Content |
//! |--------|---------|
//! | 92 | `u32` pointer to the first deck-detail node |
//! | 104 / 108 / 112 | candidate positions of the ASCII literal `Cards` |
//!
//! The first probe holding `Cards` fixes the card-list anchor at
//! `probe + 32`.  From the anchor, `+4` holds the declared card count and
//! `+16` the pointer to the first card node.  A file with no matching probe
//! is not a deck.
//!
//! # Deck-detail node (44 bytes)
//! ```text
//! +0   next: u32
//! +4   label: 24 B, NUL padded
//! +40  value: u32   (string pointer, or a Unix timestamp for CreationDate)
//! ```
//!
//! Both lists end at a zero pointer.  Walks are bounded so that a cyclic
//! list becomes [`DeckError::MalformedLinkedList`] instead of a hang.

use std::path::Path;

use chrono::DateTime;
use serde::Serialize;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::buffer::{ByteBuffer, ReadError};
use crate::card::{decode_card, CardNode, CardRecord, CARD_NODE_LEN};
use crate::codec::{decode_fixed, decode_string, FIXED_LABEL_WIDTH};

pub const DETAIL_HEAD_OFFSET: usize = 92;
pub const ANCHOR_PROBES: [usize; 3] = [104, 108, 112];
pub const ANCHOR_LITERAL: &[u8; 5] = b"Cards";
/// Distance from the matched `Cards` literal to the card-list anchor.
pub const CARD_LIST_SKIP: usize = 32;
pub const CARD_COUNT_OFFSET: usize = 4;
pub const CARD_HEAD_OFFSET: usize = 16;

pub const DETAIL_LABEL_OFFSET: usize = 4;
pub const DETAIL_VALUE_OFFSET: usize = 40;
pub const DETAIL_NODE_LEN: usize = 44;

pub const CREATION_DATE_FORMAT: &str = "%Y %B %d";

// ── Errors ───────────────────────────────────────────────────────────────────

#[derive(Error, Debug)]
pub enum DeckError {
    #[error("Not a recognized deck: source file is missing or unreadable")]
    SourceUnavailable,
    #[error("Not a recognized deck: no \"Cards\" anchor at offsets 104, 108 or 112")]
    AnchorNotFound,
    #[error("Malformed {list} list: no terminator after {hops} nodes")]
    MalformedLinkedList { list: &'static str, hops: usize },
    #[error("Card {index} could not be decoded: {source}")]
    BadCard { index: usize, source: ReadError },
    #[error("Read error: {0}")]
    Read(#[from] ReadError),
}

impl DeckError {
    /// Whole-file failures that mean "this is not a deck at all".
    pub fn is_unrecognized_format(&self) -> bool {
        matches!(self, DeckError::SourceUnavailable | DeckError::AnchorNotFound)
    }
}

// ── DecodeOptions ────────────────────────────────────────────────────────────

/// Configuration for [`Deck::parse_with`].
#[derive(Debug, Clone)]
pub struct DecodeOptions {
    /// Upper bound on nodes visited per list.  `None` derives a bound from
    /// the buffer size (one node per four bytes).
    pub max_list_hops:  Option<usize>,
    /// Skip cards whose body fails to decode instead of failing the deck.
    pub skip_bad_cards: bool,
}

impl Default for DecodeOptions {
    fn default() -> Self {
        Self {
            max_list_hops:  None,
            skip_bad_cards: true,
        }
    }
}

impl DecodeOptions {
    fn hop_limit(&self, buf: &ByteBuffer) -> usize {
        self.max_list_hops.unwrap_or(buf.len() / 4 + 1)
    }
}

// ── Detail labels ────────────────────────────────────────────────────────────

/// Recognized deck-detail labels.  Any other label is read and ignored.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DetailLabel {
    Name,
    Side1Lang,
    Side2Lang,
    Description,
    Copyright,
    CopyrightUrl,
    CreationDate,
    AppCreatorName,
}

impl DetailLabel {
    pub const ALL: [DetailLabel; 8] = [
        DetailLabel::Name,
        DetailLabel::Side1Lang,
        DetailLabel::Side2Lang,
        DetailLabel::Description,
        DetailLabel::Copyright,
        DetailLabel::CopyrightUrl,
        DetailLabel::CreationDate,
        DetailLabel::AppCreatorName,
    ];

    /// Label text as stored on disk.
    pub fn label(self) -> &'static str {
        match self {
            DetailLabel::Name           => "Name",
            DetailLabel::Side1Lang      => "Side1Lang",
            DetailLabel::Side2Lang      => "Side2Lang",
            DetailLabel::Description    => "Description",
            DetailLabel::Copyright      => "Copyright",
            DetailLabel::CopyrightUrl   => "CopyrightURL",
            DetailLabel::CreationDate   => "CreationDate",
            DetailLabel::AppCreatorName => "AppCreatorName",
        }
    }

    pub fn from_label(label: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|l| l.label() == label)
    }

    /// Interpret the node's value word.
    fn decode_value(self, buf: &ByteBuffer, value: u32) -> Result<String, ReadError> {
        match self {
            DetailLabel::CreationDate => Ok(format_timestamp(value)),
            _ => decode_string(buf, i64::from(value)),
        }
    }
}

/// Render a Unix timestamp the way deck listings show it.
pub fn format_timestamp(seconds: u32) -> String {
    DateTime::from_timestamp(i64::from(seconds), 0)
        .map(|dt| dt.format(CREATION_DATE_FORMAT).to_string())
        .unwrap_or_default()
}

// ── Deck ─────────────────────────────────────────────────────────────────────

/// A decoded deck.  Only ever handed out after a successful parse.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Deck {
    pub title:            String,
    pub description:      String,
    pub native_language:  String,
    pub foreign_language: String,
    pub copyright:        String,
    pub copyright_url:    String,
    pub creation_date:    String,
    pub app_creator_name: String,
    /// Card count stored next to the card-list anchor.
    pub declared_card_count: u32,
    /// Cards in list order.
    pub cards:            Vec<CardRecord>,
}

impl Deck {
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, DeckError> {
        Self::open_with(path, &DecodeOptions::default())
    }

    pub fn open_with<P: AsRef<Path>>(path: P, opts: &DecodeOptions) -> Result<Self, DeckError> {
        Self::parse_with(&ByteBuffer::open(path), opts)
    }

    pub fn parse(buf: &ByteBuffer) -> Result<Self, DeckError> {
        Self::parse_with(buf, &DecodeOptions::default())
    }

    pub fn parse_with(buf: &ByteBuffer, opts: &DecodeOptions) -> Result<Self, DeckError> {
        if buf.is_absent() {
            return Err(DeckError::SourceUnavailable);
        }
        let anchor = find_card_anchor(buf).ok_or(DeckError::AnchorNotFound)?;
        debug!("Card-list anchor at offset {}", anchor);

        let limit = opts.hop_limit(buf);
        let mut deck = Deck::default();
        walk_details(buf, &mut deck, limit)?;

        deck.declared_card_count = buf.read_u32(anchor + CARD_COUNT_OFFSET)?;
        let head = buf.read_u32(anchor + CARD_HEAD_OFFSET)?;
        let nodes = walk_card_nodes(buf, head, limit, opts)?;
        deck.cards = decode_cards(buf, &nodes, opts)?;

        if deck.cards.len() != deck.declared_card_count as usize {
            warn!(
                "Deck declares {} cards, decoded {}",
                deck.declared_card_count,
                deck.cards.len()
            );
        }
        info!("Decoded deck '{}' with {} cards", deck.title, deck.cards.len());
        Ok(deck)
    }

    /// Mutable access to the attribute a detail label populates.
    pub fn attribute_mut(&mut self, label: DetailLabel) -> &mut String {
        match label {
            DetailLabel::Name           => &mut self.title,
            DetailLabel::Side1Lang      => &mut self.native_language,
            DetailLabel::Side2Lang      => &mut self.foreign_language,
            DetailLabel::Description    => &mut self.description,
            DetailLabel::Copyright      => &mut self.copyright,
            DetailLabel::CopyrightUrl   => &mut self.copyright_url,
            DetailLabel::CreationDate   => &mut self.creation_date,
            DetailLabel::AppCreatorName => &mut self.app_creator_name,
        }
    }

    pub fn attribute(&self, label: DetailLabel) -> &str {
        match label {
            DetailLabel::Name           => &self.title,
            DetailLabel::Side1Lang      => &self.native_language,
            DetailLabel::Side2Lang      => &self.foreign_language,
            DetailLabel::Description    => &self.description,
            DetailLabel::Copyright      => &self.copyright,
            DetailLabel::CopyrightUrl   => &self.copyright_url,
            DetailLabel::CreationDate   => &self.creation_date,
            DetailLabel::AppCreatorName => &self.app_creator_name,
        }
    }
}

// ── Traversal ────────────────────────────────────────────────────────────────

/// Probe the three known positions for `Cards`; return the card-list anchor.
pub fn find_card_anchor(buf: &ByteBuffer) -> Option<usize> {
    ANCHOR_PROBES
        .into_iter()
        .find(|&probe| matches!(buf.read::<[u8; 5]>(probe), Ok(lit) if &lit == ANCHOR_LITERAL))
        .map(|probe| probe + CARD_LIST_SKIP)
}

fn walk_details(buf: &ByteBuffer, deck: &mut Deck, limit: usize) -> Result<(), DeckError> {
    let mut pointer = buf.read_u32(DETAIL_HEAD_OFFSET)?;
    let mut hops = 0usize;

    while pointer != 0 {
        if hops == limit {
            return Err(DeckError::MalformedLinkedList { list: "deck-detail", hops });
        }
        hops += 1;

        let node = pointer as usize;
        let label = decode_fixed(buf, node.saturating_add(DETAIL_LABEL_OFFSET), FIXED_LABEL_WIDTH)?;
        match DetailLabel::from_label(&label) {
            Some(detail) => {
                let value = buf.read_u32(node.saturating_add(DETAIL_VALUE_OFFSET))?;
                match detail.decode_value(buf, value) {
                    Ok(text) => *deck.attribute_mut(detail) = text,
                    Err(e)   => warn!("Deck detail {} unreadable: {}", label, e),
                }
            }
            None => debug!("Ignoring deck detail '{}'", label),
        }
        pointer = buf.read_u32(node)?;
    }
    debug!("Walked {} deck-detail nodes", hops);
    Ok(())
}

fn walk_card_nodes(
    buf:   &ByteBuffer,
    head:  u32,
    limit: usize,
    opts:  &DecodeOptions,
) -> Result<Vec<CardNode>, DeckError> {
    let mut nodes = Vec::new();
    let mut pointer = head;

    while pointer != 0 {
        if nodes.len() == limit {
            return Err(DeckError::MalformedLinkedList { list: "card", hops: limit });
        }
        match CardNode::read(buf, pointer as usize) {
            Ok(node) => {
                pointer = node.next;
                nodes.push(node);
            }
            Err(source) if opts.skip_bad_cards => {
                // The chain is broken here; keep what came before it.
                warn!("Card node at {} unreadable, stopping card list: {}", pointer, source);
                break;
            }
            Err(source) => return Err(DeckError::BadCard { index: nodes.len(), source }),
        }
    }
    debug!("Walked {} card nodes ({} bytes each)", nodes.len(), CARD_NODE_LEN);
    Ok(nodes)
}

fn decode_node(buf: &ByteBuffer, node: &CardNode) -> Result<CardRecord, ReadError> {
    let mut card = decode_card(buf, node.data_pointer, node.attributes)?;
    card.node_number = node.card_number;
    card.boundary = node.boundary;
    Ok(card)
}

fn decode_cards(
    buf:   &ByteBuffer,
    nodes: &[CardNode],
    opts:  &DecodeOptions,
) -> Result<Vec<CardRecord>, DeckError> {
    // Bodies are independent once the node list is known.
    #[cfg(feature = "parallel")]
    let results: Vec<Result<CardRecord, ReadError>> = {
        use rayon::prelude::*;
        nodes.par_iter().map(|node| decode_node(buf, node)).collect()
    };

    #[cfg(not(feature = "parallel"))]
    let results: Vec<Result<CardRecord, ReadError>> =
        nodes.iter().map(|node| decode_node(buf, node)).collect();

    let mut cards = Vec::with_capacity(results.len());
    for (index, result) in results.into_iter().enumerate() {
        match result {
            Ok(card) => cards.push(card),
            Err(source) if opts.skip_bad_cards => {
                warn!("Skipping card {} (node number {}): {}", index, nodes[index].card_number, source);
            }
            Err(source) => return Err(DeckError::BadCard { index, source }),
        }
    }
    Ok(cards)
}
