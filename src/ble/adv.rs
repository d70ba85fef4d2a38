//! Advertising payload: build ours, pick apart theirs.

use heapless::String;

use crate::ble::AdvData;

const AD_FLAGS: u8 = 0x01;
const AD_SHORT_NAME: u8 = 0x08;
const AD_COMPLETE_NAME: u8 = 0x09;

/// LE General Discoverable.
const FLAGS_GENERAL_DISCOVERABLE: u8 = 0x02;

/// Build `flags + complete local name`. Names that do not fit are cut.
pub fn build(name: &str) -> AdvData {
    let mut data = AdvData::new();
    let _ = data.extend_from_slice(&[0x02, AD_FLAGS, FLAGS_GENERAL_DISCOVERABLE]);

    let room = data.capacity() - data.len() - 2;
    let name = &name.as_bytes()[..name.len().min(room)];
    let _ = data.push(name.len() as u8 + 1);
    let _ = data.push(AD_COMPLETE_NAME);
    let _ = data.extend_from_slice(name);
    data
}

/// Iterator over `(ad_type, value)` structures. Stops at the first
/// malformed length.
pub struct AdStructures<'a> {
    data: &'a [u8],
}

impl<'a> Iterator for AdStructures<'a> {
    type Item = (u8, &'a [u8]);

    fn next(&mut self) -> Option<Self::Item> {
        let (&len, rest) = self.data.split_first()?;
        let len = len as usize;
        if len == 0 || len > rest.len() {
            self.data = &[];
            return None;
        }
        let (structure, tail) = rest.split_at(len);
        self.data = tail;
        Some((structure[0], &structure[1..]))
    }
}

pub fn structures(data: &[u8]) -> AdStructures<'_> {
    AdStructures { data }
}

/// Complete or shortened local name, if advertised.
pub fn local_name(data: &[u8]) -> Option<String<32>> {
    let (_, value) =
        structures(data).find(|(ty, _)| *ty == AD_COMPLETE_NAME || *ty == AD_SHORT_NAME)?;
    let mut name = String::new();
    for &b in value {
        if name.push(b as char).is_err() {
            break;
        }
    }
    Some(name)
}

/// Byte-substring search over the raw payload.
pub fn contains_marker(data: &[u8], marker: &[u8]) -> bool {
    if marker.is_empty() {
        return true;
    }
    data.windows(marker.len()).any(|w| w == marker)
}

/// A beacon code looks like `XXXX#XXXX` with alphanumeric `X`.
pub fn is_beacon_code(code: &[u8]) -> bool {
    code.len() == 9
        && code[4] == b'#'
        && code[..4].iter().all(u8::is_ascii_alphanumeric)
        && code[5..].iter().all(u8::is_ascii_alphanumeric)
}

/// First beacon code embedded anywhere in the payload.
pub fn beacon_code(data: &[u8]) -> Option<String<9>> {
    let window = data.windows(9).find(|w| is_beacon_code(w))?;
    let mut code = String::new();
    for &b in window {
        let _ = code.push(b as char);
    }
    Some(code)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn payload_layout() {
        let data = build("QuadCorder1");
        assert_eq!(&data[..5], &[0x02, 0x01, 0x02, 12, 0x09]);
        assert_eq!(&data[5..], b"QuadCorder1");
    }

    #[test]
    fn long_name_is_truncated_to_fit() {
        let data = build("a-name-that-is-far-too-long-for-one-packet");
        assert_eq!(data.len(), 31);
        // 26 name bytes + the type byte.
        assert_eq!(data[3], 27);
    }

    #[test]
    fn name_round_trips() {
        let data = build("67D7A2D5A08D#6CDD");
        assert_eq!(local_name(&data).unwrap().as_str(), "67D7A2D5A08D#6CDD");
    }

    #[test]
    fn shortened_name() {
        let data = [0x02, 0x01, 0x06, 0x05, 0x08, b'B', b'T', b' ', b'K'];
        assert_eq!(local_name(&data).unwrap().as_str(), "BT K");
    }

    #[test]
    fn no_name() {
        assert_eq!(local_name(&[0x02, 0x01, 0x06]), None);
        assert_eq!(local_name(&[]), None);
    }

    #[test]
    fn malformed_length_stops_walk() {
        assert_eq!(structures(&[0x00, 0x09, b'x']).count(), 0);
        // Claims 9 bytes, only 2 present.
        assert_eq!(structures(&[0x02, 0x01, 0x06, 0x09, 0x09, b'x']).count(), 1);
    }

    #[test]
    fn marker_and_code() {
        let data = build("67D7A2D5A08D#6CDD");
        assert!(contains_marker(&data, b"67D7A2D5"));
        assert!(!contains_marker(&build("QuadCorder1"), b"67D7A2D5"));
        assert_eq!(beacon_code(&data).unwrap().as_str(), "A08D#6CDD");
    }

    #[test]
    fn code_shape() {
        assert!(is_beacon_code(b"0000#CCCC"));
        assert!(!is_beacon_code(b"0000-CCCC"));
        assert!(!is_beacon_code(b"000#CCCC"));
        assert!(!is_beacon_code(b"00 0#CCCC"));
    }
}
