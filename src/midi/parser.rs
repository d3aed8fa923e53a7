//! # MIDI Byte Stream Parser
//!
//! Incremental decoder for the MIDI 1.0 wire format as delivered by raw MIDI
//! character devices.
//!
//! ## Message Framing
//!
//! | Status | Message | Data bytes |
//! |--------|---------|------------|
//! | 0x8n | Note off | 2 |
//! | 0x9n | Note on | 2 |
//! | 0xAn | Poly aftertouch | 2 |
//! | 0xBn | Control change | 2 |
//! | 0xCn | Program change | 1 |
//! | 0xDn | Channel aftertouch | 1 |
//! | 0xEn | Pitch bend | 2 |
//! | 0xF0..0xF7 | SysEx / system common | variable |
//! | 0xF8..0xFF | Real-time | 0 |
//!
//! Channel messages support running status: once a status byte has been seen,
//! further data pairs reuse it until another channel or system common status
//! arrives. Real-time bytes may appear anywhere, even between data bytes, and
//! do not disturb the message in progress.

use super::MidiEvent;

const STATUS_NOTE_OFF: u8 = 0x80;
const STATUS_NOTE_ON: u8 = 0x90;
const STATUS_SYSEX_START: u8 = 0xF0;
const STATUS_SYSEX_END: u8 = 0xF7;
const STATUS_REALTIME_MIN: u8 = 0xF8;

/// Number of data bytes following a status byte.
fn data_length(status: u8) -> usize {
    match status & 0xF0 {
        0xC0 | 0xD0 => 1,
        0x80 | 0x90 | 0xA0 | 0xB0 | 0xE0 => 2,
        _ => match status {
            0xF1 | 0xF3 => 1,
            0xF2 => 2,
            _ => 0,
        },
    }
}

/// Stateful MIDI byte stream decoder.
///
/// # Examples
///
/// ```
/// use midi_pilot::midi::MidiEvent;
/// use midi_pilot::midi::parser::MidiParser;
///
/// let mut parser = MidiParser::new();
/// let events = parser.feed(&[0x90, 36, 100, 38, 90]);
/// assert_eq!(events, vec![
///     MidiEvent::NoteOn { channel: 0, note: 36, velocity: 100 },
///     MidiEvent::NoteOn { channel: 0, note: 38, velocity: 90 },
/// ]);
/// ```
#[derive(Debug, Default)]
pub struct MidiParser {
    /// Running status, if any.
    status: Option<u8>,
    data: [u8; 2],
    data_len: usize,
    in_sysex: bool,
}

impl MidiParser {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Feeds a chunk of bytes and returns every completed event.
    pub fn feed(&mut self, bytes: &[u8]) -> Vec<MidiEvent> {
        bytes.iter().filter_map(|&b| self.push(b)).collect()
    }

    /// Feeds a single byte, returning an event when it completes one.
    pub fn push(&mut self, byte: u8) -> Option<MidiEvent> {
        if byte >= STATUS_REALTIME_MIN {
            return Some(MidiEvent::Other { status: byte });
        }

        if byte & 0x80 != 0 {
            return self.push_status(byte);
        }

        if self.in_sysex {
            return None;
        }

        // Data byte with no status to attach to
        let status = self.status?;

        self.data[self.data_len] = byte;
        self.data_len += 1;

        if self.data_len < data_length(status) {
            return None;
        }

        self.data_len = 0;
        let event = Self::decode(status, self.data);

        // System common messages do not establish running status
        if status >= STATUS_SYSEX_START {
            self.status = None;
        }

        Some(event)
    }

    fn push_status(&mut self, status: u8) -> Option<MidiEvent> {
        self.data_len = 0;

        match status {
            STATUS_SYSEX_START => {
                self.in_sysex = true;
                self.status = None;
                None
            }
            STATUS_SYSEX_END => {
                self.in_sysex = false;
                None
            }
            _ => {
                self.in_sysex = false;
                if data_length(status) == 0 {
                    // Tune request and undefined system common bytes
                    self.status = None;
                    return Some(MidiEvent::Other { status });
                }
                self.status = Some(status);
                None
            }
        }
    }

    fn decode(status: u8, data: [u8; 2]) -> MidiEvent {
        let channel = status & 0x0F;
        match status & 0xF0 {
            STATUS_NOTE_ON if data[1] > 0 => MidiEvent::NoteOn {
                channel,
                note: data[0],
                velocity: data[1],
            },
            // Note on with velocity 0 is a note off
            STATUS_NOTE_ON | STATUS_NOTE_OFF => MidiEvent::NoteOff {
                channel,
                note: data[0],
                velocity: data[1],
            },
            _ => MidiEvent::Other { status },
        }
    }

    /// Clears running status and any partial message.
    pub fn reset(&mut self) {
        *self = Self::default();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_note_on() {
        let mut parser = MidiParser::new();
        assert_eq!(parser.push(0x90), None);
        assert_eq!(parser.push(60), None);
        assert_eq!(
            parser.push(127),
            Some(MidiEvent::NoteOn { channel: 0, note: 60, velocity: 127 })
        );
    }

    #[test]
    fn test_note_off_and_channel() {
        let mut parser = MidiParser::new();
        let events = parser.feed(&[0x83, 60, 64]);
        assert_eq!(events, vec![MidiEvent::NoteOff { channel: 3, note: 60, velocity: 64 }]);
    }

    #[test]
    fn test_zero_velocity_note_on_is_note_off() {
        let mut parser = MidiParser::new();
        let events = parser.feed(&[0x90, 36, 0]);
        assert_eq!(events, vec![MidiEvent::NoteOff { channel: 0, note: 36, velocity: 0 }]);
    }

    #[test]
    fn test_running_status() {
        let mut parser = MidiParser::new();
        let events = parser.feed(&[0x91, 36, 100, 36, 0, 37, 80]);
        assert_eq!(
            events,
            vec![
                MidiEvent::NoteOn { channel: 1, note: 36, velocity: 100 },
                MidiEvent::NoteOff { channel: 1, note: 36, velocity: 0 },
                MidiEvent::NoteOn { channel: 1, note: 37, velocity: 80 },
            ]
        );
    }

    #[test]
    fn test_realtime_inside_message() {
        let mut parser = MidiParser::new();
        let events = parser.feed(&[0x90, 36, 0xF8, 100]);
        assert_eq!(
            events,
            vec![
                MidiEvent::Other { status: 0xF8 },
                MidiEvent::NoteOn { channel: 0, note: 36, velocity: 100 },
            ]
        );
    }

    #[test]
    fn test_sysex_is_skipped() {
        let mut parser = MidiParser::new();
        let events = parser.feed(&[0xF0, 0x7E, 0x00, 0x06, 0x01, 0xF7, 0x90, 40, 90]);
        assert_eq!(events, vec![MidiEvent::NoteOn { channel: 0, note: 40, velocity: 90 }]);
    }

    #[test]
    fn test_sysex_clears_running_status() {
        let mut parser = MidiParser::new();
        let events = parser.feed(&[0x90, 36, 100, 0xF0, 0x01, 0xF7, 36, 100]);
        assert_eq!(events, vec![MidiEvent::NoteOn { channel: 0, note: 36, velocity: 100 }]);
    }

    #[test]
    fn test_orphan_data_bytes_ignored() {
        let mut parser = MidiParser::new();
        assert!(parser.feed(&[36, 100, 37]).is_empty());
    }

    #[test]
    fn test_program_change_single_data_byte() {
        let mut parser = MidiParser::new();
        let events = parser.feed(&[0xC0, 5, 0x90, 36, 100]);
        assert_eq!(
            events,
            vec![
                MidiEvent::Other { status: 0xC0 },
                MidiEvent::NoteOn { channel: 0, note: 36, velocity: 100 },
            ]
        );
    }

    #[test]
    fn test_control_change_is_other() {
        let mut parser = MidiParser::new();
        let events = parser.feed(&[0xB0, 64, 127]);
        assert_eq!(events, vec![MidiEvent::Other { status: 0xB0 }]);
    }

    #[test]
    fn test_song_position_does_not_set_running_status() {
        let mut parser = MidiParser::new();
        let events = parser.feed(&[0xF2, 0x10, 0x20, 36, 100]);
        assert_eq!(events, vec![MidiEvent::Other { status: 0xF2 }]);
    }

    #[test]
    fn test_interrupted_message_restarts() {
        let mut parser = MidiParser::new();
        // Note on interrupted by a new status after one data byte
        let events = parser.feed(&[0x90, 36, 0x80, 36, 0]);
        assert_eq!(events, vec![MidiEvent::NoteOff { channel: 0, note: 36, velocity: 0 }]);
    }

    #[test]
    fn test_reset() {
        let mut parser = MidiParser::new();
        parser.feed(&[0x90, 36]);
        parser.reset();
        assert!(parser.feed(&[100]).is_empty());
    }

    #[test]
    fn test_data_length() {
        assert_eq!(data_length(0x90), 2);
        assert_eq!(data_length(0x8F), 2);
        assert_eq!(data_length(0xC3), 1);
        assert_eq!(data_length(0xD0), 1);
        assert_eq!(data_length(0xF1), 1);
        assert_eq!(data_length(0xF2), 2);
        assert_eq!(data_length(0xF6), 0);
    }
}
