//! DVB text decoding (EN 300 468 Annex A).

use encoding_rs::{Encoding, UTF_16BE, UTF_8, WINDOWS_1252};

/// Decode a DVB SI string to UTF-8.
///
/// The optional leading selector byte picks the character table. Strings
/// without a selector use the default table, approximated with Latin-1.
/// Emphasis and line-break control codes are dropped.
pub fn decode_dvb_string(data: &[u8]) -> String {
    let Some(&first) = data.first() else {
        return String::new();
    };

    let (encoding, body): (&'static Encoding, &[u8]) = match first {
        0x01..=0x0B => match Encoding::for_label(format!("iso-8859-{}", first + 4).as_bytes()) {
            Some(encoding) => (encoding, &data[1..]),
            None => (WINDOWS_1252, &data[1..]),
        },
        0x10 if data.len() >= 3 => {
            let table = ((data[1] as u16) << 8) | data[2] as u16;
            let encoding = Encoding::for_label(format!("iso-8859-{}", table).as_bytes())
                .unwrap_or(WINDOWS_1252);
            (encoding, &data[3..])
        }
        0x11 => (UTF_16BE, &data[1..]),
        0x15 => (UTF_8, &data[1..]),
        0x00..=0x1F => (WINDOWS_1252, &data[1..]),
        _ => (WINDOWS_1252, data),
    };

    if encoding == UTF_16BE || encoding == UTF_8 {
        let (text, _) = encoding.decode_without_bom_handling(body);
        return text
            .chars()
            .filter(|c| !matches!(*c as u32, 0x80..=0x9F | 0xE080..=0xE09F))
            .collect();
    }

    let filtered: Vec<u8> = body
        .iter()
        .copied()
        .filter(|b| !(0x80..=0x9F).contains(b))
        .collect();
    let (text, _) = encoding.decode_without_bom_handling(&filtered);
    text.into_owned()
}
