pub mod buffer;
pub mod codec;
pub mod blob;
pub mod card;
pub mod deck;
pub mod format;
pub mod writer;

pub use buffer::{ByteBuffer, Layout, ReadError};
pub use codec::{decode_string, decode_fixed, encode_string};
pub use blob::{Blob, MediaKind, extract_blob};
pub use card::{CardField, CardRecord, decode_card};
pub use deck::{Deck, DeckError, DecodeOptions, DetailLabel};
pub use format::{FieldFormatter, FormatError, NoteFields};
pub use writer::DeckWriter;
