use b4u::blob::encode_blob;
use b4u::card::{CardField, KNOWN_BITS};
use b4u::codec::STRING_MASK;
use b4u::deck::{ANCHOR_PROBES, CARD_HEAD_OFFSET, CARD_LIST_SKIP};
use b4u::{
    decode_card, decode_string, encode_string, Blob, ByteBuffer, CardRecord, Deck, DeckError,
    DeckWriter, FieldFormatter, NoteFields,
};
use proptest::prelude::*;
use tempfile::{tempdir, NamedTempFile};

fn sample_deck() -> DeckWriter {
    let mut w = DeckWriter::new();
    w.detail("Name", "Spanish Basics")
        .detail("Side1Lang", "English")
        .detail("Side2Lang", "Spanish")
        .detail("Description", "Everyday words")
        .detail("GUID", "not a deck attribute")
        .detail("Copyright", "(c) Example Press")
        .detail("CopyrightURL", "http://example.com")
        .detail_raw("CreationDate", 1_262_304_000)
        .detail("AppCreatorName", "Byki Deluxe");
    w.card(&CardRecord {
        number:         1,
        node_number:    1,
        foreign_title:  Some("perro".into()),
        native_title:   Some("dog".into()),
        foreign_audio:  Some(Blob::new(b"OggS-foreign".to_vec())),
        native_audio:   Some(Blob::new(b"OggS-native".to_vec())),
        ..CardRecord::default()
    });
    w.card(&CardRecord {
        number:         2,
        node_number:    2,
        foreign_title:  Some("gato".into()),
        native_title:   Some("cat".into()),
        native_tooltip: Some("noun".into()),
        image:          Some(Blob::new(vec![0xFF, 0xD8, 0xFF, 0xE0])),
        ..CardRecord::default()
    });
    w
}

#[test]
fn test_open_and_decode_file() {
    let file = NamedTempFile::new().unwrap();
    sample_deck().write_to(file.path()).unwrap();

    let deck = Deck::open(file.path()).unwrap();
    assert_eq!(deck.title, "Spanish Basics");
    assert_eq!(deck.native_language, "English");
    assert_eq!(deck.foreign_language, "Spanish");
    assert_eq!(deck.description, "Everyday words");
    assert_eq!(deck.copyright, "(c) Example Press");
    assert_eq!(deck.copyright_url, "http://example.com");
    assert_eq!(deck.creation_date, "2010 January 01");
    assert_eq!(deck.app_creator_name, "Byki Deluxe");
    assert_eq!(deck.cards.len(), 2);
    assert_eq!(deck.cards[0].foreign_audio.as_ref().unwrap().data(), b"OggS-foreign");
    assert_eq!(deck.cards[1].image.as_ref().unwrap().len(), 4);
}

#[test]
fn test_missing_file_is_unrecognized() {
    let dir = tempdir().unwrap();
    let err = Deck::open(dir.path().join("absent.b4u")).unwrap_err();
    assert!(matches!(err, DeckError::SourceUnavailable));
    assert!(err.is_unrecognized_format());
}

#[test]
fn test_non_deck_file_is_unrecognized() {
    let file = NamedTempFile::new().unwrap();
    std::fs::write(file.path(), vec![0x42u8; 4096]).unwrap();
    let err = Deck::open(file.path()).unwrap_err();
    assert!(matches!(err, DeckError::AnchorNotFound));
}

#[test]
fn test_export_writes_media_and_five_fields() {
    let dir = tempdir().unwrap();
    let deck = Deck::parse(&ByteBuffer::from_bytes(sample_deck().build())).unwrap();
    let mut formatter = FieldFormatter::new(dir.path(), "42Spanish");
    let notes = formatter.format_deck(&deck).unwrap();

    assert_eq!(notes.len(), 2);
    for note in &notes {
        assert_eq!(note.as_array().len(), NoteFields::FIELD_COUNT);
    }

    let first = &notes[0];
    assert_eq!(first.front, "perro");
    assert_eq!(first.back, "dog");
    assert_eq!(first.foreign_audio, "[sound:42Spanish1_foreign.ogg]");
    assert_eq!(first.native_audio, "[sound:42Spanish1_native.ogg]");
    assert_eq!(first.tooltip, "");
    assert_eq!(
        std::fs::read(dir.path().join("42Spanish1_foreign.ogg")).unwrap(),
        b"OggS-foreign"
    );
    assert_eq!(
        std::fs::read(dir.path().join("42Spanish1_native.ogg")).unwrap(),
        b"OggS-native"
    );

    let second = &notes[1];
    assert_eq!(second.back, "<img src=\"42Spanish2_image.jpg\"><br/>cat");
    assert_eq!(second.tooltip, "<small>noun</small>");
    assert_eq!(second.foreign_audio, "");
    assert_eq!(second.media, vec!["42Spanish2_image.jpg".to_string()]);
    assert!(dir.path().join("42Spanish2_image.jpg").exists());
}

#[test]
fn test_for_deck_prefix_embeds_title() {
    let dir = tempdir().unwrap();
    let deck = Deck::parse(&ByteBuffer::from_bytes(sample_deck().build())).unwrap();
    let mut formatter = FieldFormatter::for_deck(dir.path(), &deck);
    assert!(formatter.prefix().ends_with("_Spanish_Basics_"));
    let notes = formatter.format_deck(&deck).unwrap();
    for name in notes.iter().flat_map(|n| n.media.iter()) {
        assert!(name.starts_with(formatter.prefix()));
        assert!(dir.path().join(name).exists());
    }
}

#[test]
fn test_same_numbered_cards_keep_their_own_media() {
    let mut w = DeckWriter::new();
    w.detail("Name", "Dupes");
    for (title, audio) in [("uno", b"AAAA"), ("dos", b"BBBB")] {
        w.card(&CardRecord {
            number:        5,
            foreign_title: Some(title.into()),
            foreign_audio: Some(Blob::new(audio.to_vec())),
            ..CardRecord::default()
        });
    }
    let deck = Deck::parse(&ByteBuffer::from_bytes(w.build())).unwrap();
    assert_eq!(deck.cards[0].number, deck.cards[1].number);

    let dir = tempdir().unwrap();
    let mut formatter = FieldFormatter::new(dir.path(), "p");
    let notes = formatter.format_deck(&deck).unwrap();
    assert_ne!(notes[0].foreign_audio, notes[1].foreign_audio);
    assert_eq!(std::fs::read(dir.path().join(&notes[0].media[0])).unwrap(), b"AAAA");
    assert_eq!(std::fs::read(dir.path().join(&notes[1].media[0])).unwrap(), b"BBBB");
}

#[test]
fn test_bad_card_does_not_abort_deck() {
    let mut w = sample_deck();
    // Second card's body pointer runs off the end of the file.
    w.raw_card(99, u32::MAX - 2, 4 | 16);
    let deck = Deck::parse(&ByteBuffer::from_bytes(w.build())).unwrap();
    assert_eq!(deck.cards.len(), 2);
    assert_eq!(deck.declared_card_count, 3);
}

#[test]
fn test_dangling_card_node_keeps_earlier_cards() {
    let mut bytes = sample_deck().build();
    let head_at = ANCHOR_PROBES[0] + CARD_LIST_SKIP + CARD_HEAD_OFFSET;
    let head = u32::from_le_bytes(bytes[head_at..head_at + 4].try_into().unwrap()) as usize;
    // First node's next pointer now points past the end.
    bytes[head..head + 4].copy_from_slice(&0x00FF_FFFFu32.to_le_bytes());
    let deck = Deck::parse(&ByteBuffer::from_bytes(bytes)).unwrap();
    assert_eq!(deck.cards.len(), 1);
    assert_eq!(deck.cards[0].foreign_title.as_deref(), Some("perro"));
}

#[test]
fn test_json_dump_omits_absent_fields() {
    let deck = Deck::parse(&ByteBuffer::from_bytes(sample_deck().build())).unwrap();
    let json = serde_json::to_value(&deck).unwrap();
    assert_eq!(json["title"], "Spanish Basics");
    let card = &json["cards"][1];
    assert_eq!(card["native_tooltip"], "noun");
    assert_eq!(card["image"]["len"], 4);
    assert!(card.get("foreign_audio").is_none());
}

#[test]
fn test_slot_count_matches_mask_popcount() {
    for mask in [0u32, 4, 4 | 16, 1024, KNOWN_BITS, 0x0AA8, 0x1554] {
        let mut card = CardRecord { number: mask, ..CardRecord::default() };
        for field in CardField::present_in(mask) {
            match field {
                CardField::ForeignAudio => card.foreign_audio = Some(Blob::new(vec![1])),
                CardField::NativeAudio  => card.native_audio = Some(Blob::new(vec![2])),
                CardField::Image        => card.image = Some(Blob::new(vec![3])),
                CardField::NativeTitle        => card.native_title = Some("nt".into()),
                CardField::NativeSubtitle     => card.native_subtitle = Some("ns".into()),
                CardField::ForeignTitle       => card.foreign_title = Some("ft".into()),
                CardField::ForeignSubtitle    => card.foreign_subtitle = Some("fs".into()),
                CardField::NativeAltAnswer    => card.native_alt_answer = Some("na".into()),
                CardField::ForeignAltAnswer   => card.foreign_alt_answer = Some("fa".into()),
                CardField::ForeignTranslit    => card.foreign_translit = Some("tr".into()),
                CardField::NativeTooltip      => card.native_tooltip = Some("tt".into()),
            }
        }
        let mut w = DeckWriter::new();
        w.card(&card);
        let deck = Deck::parse(&ByteBuffer::from_bytes(w.build())).unwrap();
        let decoded = &deck.cards[0];
        assert_eq!(decoded.attributes, mask);
        assert_eq!(decoded.slots_consumed(), mask.count_ones() as usize);
        assert_eq!(decoded.present_fields(), CardField::present_in(mask).collect::<Vec<_>>());
    }
}

#[test]
fn test_foreign_audio_blob_honors_header_skip() {
    let payload: Vec<u8> = (0u8..=99).collect();
    let mut bytes = vec![0u8; 32];
    let blob_at = bytes.len() as u32;
    bytes.extend_from_slice(&encode_blob(&payload));
    bytes[24..28].copy_from_slice(&7u32.to_le_bytes()); // card number at body + 4
    bytes[28..32].copy_from_slice(&blob_at.to_le_bytes()); // first slot at body + 8

    let card = decode_card(&ByteBuffer::from_bytes(bytes), 20, 1024).unwrap();
    assert_eq!(card.number, 7);
    assert_eq!(card.foreign_audio.unwrap().data(), &payload[..]);
}

fn mask_units(text: &str) -> Vec<u8> {
    let mut out = Vec::new();
    let units: Vec<u16> = text.encode_utf16().collect();
    out.extend_from_slice(&(units.len() as u16).to_le_bytes());
    for u in units {
        out.extend_from_slice(&(u ^ STRING_MASK).to_le_bytes());
    }
    out
}

proptest! {
    #[test]
    fn prop_string_codec_roundtrip(text in "\\PC{0,64}", pad in 1usize..64) {
        let mut bytes = vec![0u8; pad];
        bytes.extend_from_slice(&encode_string(&text));
        let buf = ByteBuffer::from_bytes(bytes);
        let decoded = decode_string(&buf, pad as i64).unwrap();
        prop_assert_eq!(&decoded, &text);

        // Re-encoding the decoded text reproduces the stored bytes.
        prop_assert_eq!(encode_string(&decoded), mask_units(&text));
    }

    #[test]
    fn prop_non_positive_offsets_never_read(offset in i64::MIN..=0) {
        prop_assert_eq!(decode_string(&ByteBuffer::absent(), offset).unwrap(), "");
    }

    #[test]
    fn prop_reads_never_panic(bytes in proptest::collection::vec(any::<u8>(), 0..512), ptr in any::<u32>(), mask in any::<u32>()) {
        let buf = ByteBuffer::from_bytes(bytes);
        let _ = decode_card(&buf, ptr, mask);
        let _ = Deck::parse(&buf);
    }
}
