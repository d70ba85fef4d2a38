//! GPS line source and a minimal NMEA reader.
//!
//! Only GGA sentences are decoded; they carry everything the handheld
//! shows (position and satellites in use). A GGA with fix quality 0 clears
//! the fix, so stale coordinates are never shown as current.

use heapless::Vec;

use crate::config::GPS_LINE_LEN;
use crate::mailbox::Mailbox;
use crate::nav::Coord;

pub type Line = Vec<u8, GPS_LINE_LEN>;

/// Non-blocking supplier of raw NMEA lines.
pub trait GpsSource {
    fn read_line(&mut self) -> Option<Line>;
}

/// The UART task posts each line; the scheduler takes the latest.
impl GpsSource for &Mailbox<Line> {
    fn read_line(&mut self) -> Option<Line> {
        self.take()
    }
}

#[derive(Clone, Copy, Debug, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Fix {
    pub position: Coord,
    pub satellites: u8,
}

#[derive(Default)]
pub struct NmeaReader {
    line: Line,
    fix: Option<Fix>,
    satellites: u8,
    sentences: u32,
}

impl NmeaReader {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed raw bytes. Returns `true` if a sentence was decoded.
    pub fn feed(&mut self, bytes: &[u8]) -> bool {
        let mut decoded = false;
        for &b in bytes {
            match b {
                b'\r' => {}
                b'\n' => {
                    decoded |= self.finish_line();
                }
                b'$' => {
                    self.line.clear();
                    let _ = self.line.push(b);
                }
                _ => {
                    if self.line.push(b).is_err() {
                        debug!("nmea: line overflow");
                        self.line.clear();
                    }
                }
            }
        }
        decoded
    }

    /// Pull every available line from `source`.
    pub fn poll(&mut self, source: &mut impl GpsSource) -> bool {
        let mut decoded = false;
        while let Some(line) = source.read_line() {
            decoded |= self.feed(&line);
            // Sources may strip the terminator.
            if !line.ends_with(b"\n") {
                decoded |= self.feed(b"\n");
            }
        }
        decoded
    }

    fn finish_line(&mut self) -> bool {
        let line = core::mem::take(&mut self.line);
        let Ok(text) = core::str::from_utf8(&line) else {
            return false;
        };
        let Some(body) = checked_body(text) else {
            debug!("nmea: bad sentence");
            return false;
        };
        let mut fields = body.split(',');
        let Some(talker) = fields.next() else {
            return false;
        };
        if talker.len() != 5 || !talker.ends_with("GGA") {
            return false;
        }
        self.sentences = self.sentences.wrapping_add(1);
        self.apply_gga(fields);
        true
    }

    fn apply_gga<'s>(&mut self, mut fields: impl Iterator<Item = &'s str>) {
        let _time = fields.next();
        let lat = fields.next().zip(fields.next());
        let lon = fields.next().zip(fields.next());
        let quality = fields.next().and_then(|q| q.parse::<u8>().ok()).unwrap_or(0);
        self.satellites = fields.next().and_then(|s| s.parse().ok()).unwrap_or(0);

        let position = match (lat, lon) {
            (Some((lat, ns)), Some((lon, ew))) if quality > 0 => {
                degrees(lat, 2, ns, "S").zip(degrees(lon, 3, ew, "W"))
            }
            _ => None,
        };
        self.fix = position.map(|(lat, lon)| Fix {
            position: Coord::new(lat, lon),
            satellites: self.satellites,
        });
    }

    pub fn fix(&self) -> Option<Fix> {
        self.fix
    }

    pub fn position(&self) -> Option<Coord> {
        self.fix.map(|f| f.position)
    }

    pub fn latitude(&self) -> Option<f64> {
        self.fix.map(|f| f.position.lat)
    }

    pub fn longitude(&self) -> Option<f64> {
        self.fix.map(|f| f.position.lon)
    }

    pub fn satellites_in_use(&self) -> u8 {
        self.satellites
    }

    pub fn sentences(&self) -> u32 {
        self.sentences
    }
}

/// Strip `$` and verify the `*hh` checksum when present.
fn checked_body(text: &str) -> Option<&str> {
    let text = text.strip_prefix('$')?;
    match text.split_once('*') {
        Some((body, sum)) => {
            let expected = u8::from_str_radix(sum.trim(), 16).ok()?;
            let actual = body.bytes().fold(0u8, |acc, b| acc ^ b);
            (actual == expected).then_some(body)
        }
        None => Some(text),
    }
}

/// `dddmm.mmmm` with `deg_digits` leading degree digits, signed by hemisphere.
fn degrees(value: &str, deg_digits: usize, hemi: &str, negative: &str) -> Option<f64> {
    if value.len() <= deg_digits {
        return None;
    }
    let (d, m) = value.split_at(deg_digits);
    let deg: f64 = d.parse().ok()?;
    let min: f64 = m.parse().ok()?;
    let v = deg + min / 60.0;
    Some(if hemi == negative { -v } else { v })
}

#[cfg(test)]
mod tests {
    use super::*;

    const GGA: &str = "GPGGA,123519,4202.4327,N,08626.1501,W,1,08,0.9,190.0,M,-34.0,M,,";

    fn with_checksum(body: &str) -> std::string::String {
        let sum = body.bytes().fold(0u8, |a, b| a ^ b);
        format!("${}*{:02X}\r\n", body, sum)
    }

    #[test]
    fn decodes_gga() {
        let mut r = NmeaReader::new();
        assert!(r.feed(with_checksum(GGA).as_bytes()));
        let fix = r.fix().unwrap();
        assert!((fix.position.lat - 42.040545).abs() < 1e-5);
        assert!((fix.position.lon + 86.435835).abs() < 1e-5);
        assert_eq!(r.satellites_in_use(), 8);
    }

    #[test]
    fn bad_checksum_is_dropped() {
        let mut r = NmeaReader::new();
        let mut line = with_checksum(GGA).into_bytes();
        // Corrupt one digit of the latitude.
        line[16] = b'9';
        assert!(!r.feed(&line));
        assert_eq!(r.fix(), None);
    }

    #[test]
    fn no_fix_quality_clears_position() {
        let mut r = NmeaReader::new();
        r.feed(with_checksum(GGA).as_bytes());
        assert!(r.position().is_some());
        r.feed(with_checksum("GPGGA,123520,,,,,0,00,,,M,,M,,").as_bytes());
        assert_eq!(r.position(), None);
        assert_eq!(r.latitude(), None);
        assert_eq!(r.satellites_in_use(), 0);
    }

    #[test]
    fn split_across_feeds_and_other_sentences() {
        let line = with_checksum("GNGGA,000001,3352.1000,S,15112.6000,E,2,05,1.0,10.0,M,0.0,M,,");
        let (a, b) = line.as_bytes().split_at(20);
        let mut r = NmeaReader::new();
        assert!(!r.feed(b"$GPRMC,ignored*00\r\n"));
        assert!(!r.feed(a));
        assert!(r.feed(b));
        let fix = r.fix().unwrap();
        assert!(fix.position.lat < 0.0);
        assert!(fix.position.lon > 151.0);
    }

    #[test]
    fn mailbox_source() {
        let mailbox: Mailbox<Line> = Mailbox::new();
        let mut source = &mailbox;
        let mut r = NmeaReader::new();
        assert!(!r.poll(&mut source));

        let text = with_checksum("GPGGA,123519,4202.4327,N,08626.1501,W,1,04,0.9,190.0,M,-34.0,M,,");
        let mut line = Line::new();
        line.extend_from_slice(text.trim_end().as_bytes()).unwrap();
        mailbox.post(line);
        assert!(r.poll(&mut source));
        assert_eq!(r.fix().unwrap().satellites, 4);
    }
}
