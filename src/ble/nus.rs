//! Nordic UART service and the plaintext command protocol on top of it.
//!
//! Peers write a command to RX; we answer with a notification on TX.
//! `"find me"` starts the beacon alarm; anything else gets a scolding.

use heapless::{String, Vec};

use crate::ble::Uuid;
use crate::config::MAX_MESSAGE_LEN;
use crate::error::{Error, Result};

pub const SERVICE_UUID: Uuid = Uuid::Uuid128([
    0x6E, 0x40, 0x00, 0x01, 0xB5, 0xA3, 0xF3, 0x93, 0xE0, 0xA9, 0xE5, 0x0E, 0x24, 0xDC, 0xCA, 0x9E,
]);

/// Peer writes here.
pub const RX_UUID: Uuid = Uuid::Uuid128([
    0x6E, 0x40, 0x00, 0x02, 0xB5, 0xA3, 0xF3, 0x93, 0xE0, 0xA9, 0xE5, 0x0E, 0x24, 0xDC, 0xCA, 0x9E,
]);

/// We notify here.
pub const TX_UUID: Uuid = Uuid::Uuid128([
    0x6E, 0x40, 0x00, 0x03, 0xB5, 0xA3, 0xF3, 0x93, 0xE0, 0xA9, 0xE5, 0x0E, 0x24, 0xDC, 0xCA, 0x9E,
]);

pub const FIND_ME: &str = "find me";
pub const LIT_UP: &str = "lit up!";
pub const NOT_LIT: &str = "not lit";
pub const TRY_AGAIN: &str = "try again, hombre";

pub type Message = String<MAX_MESSAGE_LEN>;

/// One outgoing packet: message plus trailing newline.
pub type Packet = Vec<u8, { MAX_MESSAGE_LEN + 1 }>;

/// Decode a written value as trimmed text. Invalid UTF-8 decodes to an
/// empty message, which no command matches.
pub fn decode(raw: &[u8]) -> Message {
    let mut message = Message::new();
    let text = core::str::from_utf8(raw).unwrap_or("").trim();
    for ch in text.chars() {
        if message.push(ch).is_err() {
            break;
        }
    }
    message
}

/// Frame `text` for notification.
pub fn encode(text: &str) -> Result<Packet> {
    if text.len() > MAX_MESSAGE_LEN {
        return Err(Error::MessageTooLong);
    }
    let mut packet = Packet::new();
    packet
        .extend_from_slice(text.as_bytes())
        .map_err(|_| Error::BufferOverflow)?;
    packet.push(b'\n').map_err(|_| Error::BufferOverflow)?;
    Ok(packet)
}

#[derive(Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Command {
    FindMe,
    Unknown(Message),
}

impl Command {
    pub fn parse(message: &str) -> Self {
        if message == FIND_ME {
            Command::FindMe
        } else {
            let mut other = Message::new();
            let _ = other.push_str(message);
            Command::Unknown(other)
        }
    }

    /// Immediate reply to this command.
    pub fn reply(&self) -> &'static str {
        match self {
            Command::FindMe => LIT_UP,
            Command::Unknown(_) => TRY_AGAIN,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decode_trims_and_checks_utf8() {
        assert_eq!(decode(b"  find me\r\n").as_str(), "find me");
        assert_eq!(decode(&[0xFF, 0xFE]).as_str(), "");
    }

    #[test]
    fn commands() {
        assert_eq!(Command::parse("find me"), Command::FindMe);
        assert_eq!(Command::parse("find me").reply(), "lit up!");
        let other = Command::parse("hello");
        assert!(matches!(other, Command::Unknown(ref m) if m.as_str() == "hello"));
        assert_eq!(other.reply(), "try again, hombre");
        assert!(matches!(Command::parse("FIND ME"), Command::Unknown(_)));
    }

    #[test]
    fn encode_appends_newline() {
        assert_eq!(encode(LIT_UP).unwrap().as_slice(), b"lit up!\n");
        assert_eq!(encode(TRY_AGAIN).unwrap().len(), 18);
        assert_eq!(
            encode("this message is far too long"),
            Err(Error::MessageTooLong)
        );
    }
}
