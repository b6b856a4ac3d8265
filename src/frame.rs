//! Binary message framing for the streaming TTS WebSocket protocol.
//!
//! Every message starts with a bit-packed header:
//!
//! ```text
//! byte 0: version (high nibble) | header size (low nibble, x4 bytes)
//! byte 1: message type (high)   | flags (low)
//! byte 2: serialization (high)  | compression (low)
//! bytes 3..4*header_size: reserved, zero
//! ```
//!
//! followed by a fixed order of conditional fields (event, session id,
//! connect id, sequence, error code) and a length-prefixed payload. All
//! multi-byte integers are big endian. Which conditional fields are present
//! is a pure function of `(type, flag, event)`; [`marshal`](Frame::marshal)
//! and [`unmarshal`](Frame::unmarshal) consult the same table so the two
//! directions cannot drift apart.

use std::fmt;

use thiserror::Error;

/// Errors produced while encoding or decoding a wire frame.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FrameError {
    /// Input shorter than the 3-byte fixed header prefix.
    #[error("frame too short: expected at least 3 bytes, got {0}")]
    TooShort(usize),

    /// Input ended in the middle of a declared field.
    #[error("frame truncated while reading {0}")]
    Truncated(&'static str),

    /// Bytes left over after the payload was fully consumed.
    #[error("unexpected {0} trailing byte(s) after payload")]
    TrailingBytes(usize),

    /// Protocol version nibble outside the defined range.
    #[error("unsupported protocol version: {0}")]
    InvalidVersion(u8),

    /// Header size nibble outside the defined range.
    #[error("unsupported header size: {0}")]
    InvalidHeaderSize(u8),

    /// Unknown message type nibble.
    #[error("invalid message type: {0}")]
    InvalidMsgType(u8),

    /// Unknown message flag nibble.
    #[error("invalid message flag: {0}")]
    InvalidFlag(u8),

    /// Unknown serialization method nibble.
    #[error("invalid serialization method: {0}")]
    InvalidSerialization(u8),

    /// Unknown compression method nibble.
    #[error("invalid compression method: {0}")]
    InvalidCompression(u8),

    /// Unknown event number.
    #[error("invalid event type: {0}")]
    InvalidEvent(i32),

    /// A length-prefixed field does not fit in a u32 length.
    #[error("{field} size ({size}) exceeds max(u32)")]
    FieldTooLarge {
        /// Name of the offending field.
        field: &'static str,
        /// Actual byte length.
        size: usize,
    },

    /// A string field contained invalid UTF-8.
    #[error("invalid UTF-8 in {0}")]
    InvalidUtf8(&'static str),
}

/// Message type, carried in the high nibble of header byte 1.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum MsgType {
    /// Full request from the client (JSON payload).
    FullClientRequest = 0b1,
    /// Audio-only chunk from the client.
    AudioOnlyClient = 0b10,
    /// Full response from the server (JSON payload).
    FullServerResponse = 0b1001,
    /// Audio-only chunk from the server (raw audio payload).
    AudioOnlyServer = 0b1011,
    /// Front-end (timestamp/phoneme) result from the server.
    FrontEndResultServer = 0b1100,
    /// Error report from the server.
    Error = 0b1111,
}

impl TryFrom<u8> for MsgType {
    type Error = FrameError;

    fn try_from(value: u8) -> Result<Self, FrameError> {
        match value {
            0b1 => Ok(MsgType::FullClientRequest),
            0b10 => Ok(MsgType::AudioOnlyClient),
            0b1001 => Ok(MsgType::FullServerResponse),
            0b1011 => Ok(MsgType::AudioOnlyServer),
            0b1100 => Ok(MsgType::FrontEndResultServer),
            0b1111 => Ok(MsgType::Error),
            other => Err(FrameError::InvalidMsgType(other)),
        }
    }
}

/// Message flags, carried in the low nibble of header byte 1.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum MsgTypeFlag {
    /// Non-terminal packet with no sequence number.
    NoSeq = 0,
    /// Non-terminal packet with sequence > 0.
    PositiveSeq = 0b1,
    /// Last packet with no sequence number.
    LastNoSeq = 0b10,
    /// Last packet with sequence < 0.
    NegativeSeq = 0b11,
    /// Packet carries an event number (i32).
    WithEvent = 0b100,
}

impl TryFrom<u8> for MsgTypeFlag {
    type Error = FrameError;

    fn try_from(value: u8) -> Result<Self, FrameError> {
        match value {
            0 => Ok(MsgTypeFlag::NoSeq),
            0b1 => Ok(MsgTypeFlag::PositiveSeq),
            0b10 => Ok(MsgTypeFlag::LastNoSeq),
            0b11 => Ok(MsgTypeFlag::NegativeSeq),
            0b100 => Ok(MsgTypeFlag::WithEvent),
            other => Err(FrameError::InvalidFlag(other)),
        }
    }
}

/// Payload serialization method, high nibble of header byte 2.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum Serialization {
    /// Raw bytes.
    Raw = 0,
    /// JSON text.
    Json = 0b1,
    /// Thrift binary.
    Thrift = 0b11,
    /// Custom serialization.
    Custom = 0b1111,
}

impl TryFrom<u8> for Serialization {
    type Error = FrameError;

    fn try_from(value: u8) -> Result<Self, FrameError> {
        match value {
            0 => Ok(Serialization::Raw),
            0b1 => Ok(Serialization::Json),
            0b11 => Ok(Serialization::Thrift),
            0b1111 => Ok(Serialization::Custom),
            other => Err(FrameError::InvalidSerialization(other)),
        }
    }
}

/// Payload compression method, low nibble of header byte 2.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum Compression {
    /// No compression.
    None = 0,
    /// Gzip.
    Gzip = 0b1,
    /// Custom compression.
    Custom = 0b1111,
}

impl TryFrom<u8> for Compression {
    type Error = FrameError;

    fn try_from(value: u8) -> Result<Self, FrameError> {
        match value {
            0 => Ok(Compression::None),
            0b1 => Ok(Compression::Gzip),
            0b1111 => Ok(Compression::Custom),
            other => Err(FrameError::InvalidCompression(other)),
        }
    }
}

/// Event number carried by frames with [`MsgTypeFlag::WithEvent`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(i32)]
pub enum EventType {
    /// Default event.
    None = 0,

    /// Client asks the server to set up a connection.
    StartConnection = 1,
    /// Client asks the server to tear down the connection.
    FinishConnection = 2,

    /// Connection established successfully.
    ConnectionStarted = 50,
    /// Connection failed (for example, authentication failure).
    ConnectionFailed = 51,
    /// Connection ended.
    ConnectionFinished = 52,

    /// Client starts a synthesis session.
    StartSession = 100,
    /// Client cancels a synthesis session.
    CancelSession = 101,
    /// Client finishes a synthesis session.
    FinishSession = 102,

    /// Session established.
    SessionStarted = 150,
    /// Session canceled.
    SessionCanceled = 151,
    /// Session completed normally.
    SessionFinished = 152,
    /// Session failed.
    SessionFailed = 153,
    /// Usage/charge report for the session.
    UsageResponse = 154,

    /// Generic task request.
    TaskRequest = 200,
    /// Mid-session configuration update.
    UpdateConfig = 201,

    /// Audio output muted.
    AudioMuted = 250,

    /// Greeting.
    SayHello = 300,

    /// Start of a synthesized sentence.
    TtsSentenceStart = 350,
    /// End of a synthesized sentence.
    TtsSentenceEnd = 351,
    /// Synthesized audio response.
    TtsResponse = 352,
    /// Synthesis ended.
    TtsEnded = 359,
}

impl TryFrom<i32> for EventType {
    type Error = FrameError;

    fn try_from(value: i32) -> Result<Self, FrameError> {
        match value {
            0 => Ok(EventType::None),
            1 => Ok(EventType::StartConnection),
            2 => Ok(EventType::FinishConnection),
            50 => Ok(EventType::ConnectionStarted),
            51 => Ok(EventType::ConnectionFailed),
            52 => Ok(EventType::ConnectionFinished),
            100 => Ok(EventType::StartSession),
            101 => Ok(EventType::CancelSession),
            102 => Ok(EventType::FinishSession),
            150 => Ok(EventType::SessionStarted),
            151 => Ok(EventType::SessionCanceled),
            152 => Ok(EventType::SessionFinished),
            153 => Ok(EventType::SessionFailed),
            154 => Ok(EventType::UsageResponse),
            200 => Ok(EventType::TaskRequest),
            201 => Ok(EventType::UpdateConfig),
            250 => Ok(EventType::AudioMuted),
            300 => Ok(EventType::SayHello),
            350 => Ok(EventType::TtsSentenceStart),
            351 => Ok(EventType::TtsSentenceEnd),
            352 => Ok(EventType::TtsResponse),
            359 => Ok(EventType::TtsEnded),
            other => Err(FrameError::InvalidEvent(other)),
        }
    }
}

/// Which conditional fields a frame carries on the wire.
///
/// Shared by [`Frame::marshal`] and [`Frame::unmarshal`].
#[derive(Debug, Clone, Copy)]
struct FieldLayout {
    event: bool,
    session_id: bool,
    connect_id: bool,
    sequence: bool,
    error_code: bool,
}

fn field_layout(msg_type: MsgType, flag: MsgTypeFlag, event: EventType) -> FieldLayout {
    let with_event = flag == MsgTypeFlag::WithEvent;

    // Connection-level events have no session context.
    let session_id = with_event
        && !matches!(
            event,
            EventType::StartConnection
                | EventType::FinishConnection
                | EventType::ConnectionStarted
                | EventType::ConnectionFailed
        );

    let connect_id = with_event
        && matches!(
            event,
            EventType::ConnectionStarted
                | EventType::ConnectionFailed
                | EventType::ConnectionFinished
        );

    let sequence = matches!(
        msg_type,
        MsgType::FullClientRequest
            | MsgType::FullServerResponse
            | MsgType::FrontEndResultServer
            | MsgType::AudioOnlyClient
            | MsgType::AudioOnlyServer
    ) && matches!(flag, MsgTypeFlag::PositiveSeq | MsgTypeFlag::NegativeSeq);

    FieldLayout {
        event: with_event,
        session_id,
        connect_id,
        sequence,
        error_code: msg_type == MsgType::Error,
    }
}

/// One protocol message: bit-packed header, conditional fields, payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    /// Protocol revision (1..=4).
    pub version: u8,
    /// Header length multiplier; real header length is `4 * header_size`.
    pub header_size: u8,
    /// Message type.
    pub msg_type: MsgType,
    /// Message flags.
    pub flag: MsgTypeFlag,
    /// Payload serialization method.
    pub serialization: Serialization,
    /// Payload compression method.
    pub compression: Compression,
    /// Event number, meaningful only with [`MsgTypeFlag::WithEvent`].
    pub event: EventType,
    /// Session identifier, present for session-scoped events.
    pub session_id: String,
    /// Connection identifier, present for connection status events.
    pub connect_id: String,
    /// Sequence number, present for sequenced packets.
    pub sequence: i32,
    /// Error code, present only on [`MsgType::Error`] frames.
    pub error_code: u32,
    /// Payload bytes: JSON on full requests/responses, raw audio on
    /// audio-only server frames.
    pub payload: Vec<u8>,
}

impl Frame {
    /// Creates a frame with version 1, a 4-byte header, JSON serialization
    /// and no compression.
    pub fn new(msg_type: MsgType, flag: MsgTypeFlag) -> Self {
        Self {
            version: 1,
            header_size: 1,
            msg_type,
            flag,
            serialization: Serialization::Json,
            compression: Compression::None,
            event: EventType::None,
            session_id: String::new(),
            connect_id: String::new(),
            sequence: 0,
            error_code: 0,
            payload: Vec::new(),
        }
    }

    /// Creates an unsequenced full client request carrying `payload`.
    pub fn full_client_request(payload: Vec<u8>) -> Self {
        let mut frame = Self::new(MsgType::FullClientRequest, MsgTypeFlag::NoSeq);
        frame.payload = payload;
        frame
    }

    /// Serializes the frame to wire bytes.
    pub fn marshal(&self) -> Result<Vec<u8>, FrameError> {
        if !(1..=4).contains(&self.version) {
            return Err(FrameError::InvalidVersion(self.version));
        }
        if !(1..=4).contains(&self.header_size) {
            return Err(FrameError::InvalidHeaderSize(self.header_size));
        }

        let header_len = 4 * self.header_size as usize;
        let mut buf = Vec::with_capacity(header_len + self.payload.len() + 16);
        buf.push((self.version << 4) | self.header_size);
        buf.push(((self.msg_type as u8) << 4) | self.flag as u8);
        buf.push(((self.serialization as u8) << 4) | self.compression as u8);
        buf.resize(header_len, 0);

        let layout = field_layout(self.msg_type, self.flag, self.event);
        if layout.event {
            buf.extend_from_slice(&(self.event as i32).to_be_bytes());
        }
        if layout.session_id {
            write_string(&mut buf, "session id", &self.session_id)?;
        }
        if layout.connect_id {
            write_string(&mut buf, "connect id", &self.connect_id)?;
        }
        if layout.sequence {
            buf.extend_from_slice(&self.sequence.to_be_bytes());
        }
        if layout.error_code {
            buf.extend_from_slice(&self.error_code.to_be_bytes());
        }

        let size = self.payload.len();
        if size > u32::MAX as usize {
            return Err(FrameError::FieldTooLarge {
                field: "payload",
                size,
            });
        }
        buf.extend_from_slice(&(size as u32).to_be_bytes());
        buf.extend_from_slice(&self.payload);

        Ok(buf)
    }

    /// Deserializes a frame from wire bytes.
    ///
    /// The whole input must be consumed: trailing bytes beyond what the
    /// declared lengths cover are rejected, as is any truncated field.
    pub fn unmarshal(data: &[u8]) -> Result<Self, FrameError> {
        if data.len() < 3 {
            return Err(FrameError::TooShort(data.len()));
        }

        let mut reader = Reader::new(data);

        let b0 = reader.u8("header")?;
        let version = b0 >> 4;
        let header_size = b0 & 0x0F;
        if !(1..=4).contains(&version) {
            return Err(FrameError::InvalidVersion(version));
        }
        if !(1..=4).contains(&header_size) {
            return Err(FrameError::InvalidHeaderSize(header_size));
        }

        let b1 = reader.u8("header")?;
        let msg_type = MsgType::try_from(b1 >> 4)?;
        let flag = MsgTypeFlag::try_from(b1 & 0x0F)?;

        let b2 = reader.u8("header")?;
        let serialization = Serialization::try_from(b2 >> 4)?;
        let compression = Compression::try_from(b2 & 0x0F)?;

        reader.take(4 * header_size as usize - 3, "header padding")?;

        let mut frame = Frame {
            version,
            header_size,
            msg_type,
            flag,
            serialization,
            compression,
            ..Frame::new(msg_type, flag)
        };

        if flag == MsgTypeFlag::WithEvent {
            frame.event = EventType::try_from(reader.i32("event")?)?;
        }

        let layout = field_layout(msg_type, flag, frame.event);
        if layout.session_id {
            frame.session_id = read_string(&mut reader, "session id")?;
        }
        if layout.connect_id {
            frame.connect_id = read_string(&mut reader, "connect id")?;
        }
        if layout.sequence {
            frame.sequence = reader.i32("sequence")?;
        }
        if layout.error_code {
            frame.error_code = reader.u32("error code")?;
        }

        let payload_len = reader.u32("payload length")? as usize;
        frame.payload = reader.take(payload_len, "payload")?.to_vec();

        let remaining = reader.remaining();
        if remaining > 0 {
            return Err(FrameError::TrailingBytes(remaining));
        }

        Ok(frame)
    }
}

impl fmt::Display for Frame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}/{:?}", self.msg_type, self.event)?;
        if matches!(self.flag, MsgTypeFlag::PositiveSeq | MsgTypeFlag::NegativeSeq) {
            write!(f, " seq={}", self.sequence)?;
        }
        if self.msg_type == MsgType::Error {
            write!(
                f,
                " code={} payload={}",
                self.error_code,
                String::from_utf8_lossy(&self.payload)
            )
        } else {
            write!(f, " payload={}B", self.payload.len())
        }
    }
}

fn write_string(buf: &mut Vec<u8>, field: &'static str, value: &str) -> Result<(), FrameError> {
    let bytes = value.as_bytes();
    if bytes.len() > u32::MAX as usize {
        return Err(FrameError::FieldTooLarge {
            field,
            size: bytes.len(),
        });
    }
    buf.extend_from_slice(&(bytes.len() as u32).to_be_bytes());
    buf.extend_from_slice(bytes);
    Ok(())
}

fn read_string(reader: &mut Reader<'_>, field: &'static str) -> Result<String, FrameError> {
    let len = reader.u32(field)? as usize;
    let bytes = reader.take(len, field)?;
    String::from_utf8(bytes.to_vec()).map_err(|_| FrameError::InvalidUtf8(field))
}

/// Cursor over wire bytes with named-field truncation errors.
struct Reader<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    fn new(data: &'a [u8]) -> Self {
        Self { data, pos: 0 }
    }

    fn take(&mut self, n: usize, field: &'static str) -> Result<&'a [u8], FrameError> {
        if self.data.len() - self.pos < n {
            return Err(FrameError::Truncated(field));
        }
        let slice = &self.data[self.pos..self.pos + n];
        self.pos += n;
        Ok(slice)
    }

    fn u8(&mut self, field: &'static str) -> Result<u8, FrameError> {
        Ok(self.take(1, field)?[0])
    }

    fn u32(&mut self, field: &'static str) -> Result<u32, FrameError> {
        let bytes = self.take(4, field)?;
        Ok(u32::from_be_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
    }

    fn i32(&mut self, field: &'static str) -> Result<i32, FrameError> {
        let bytes = self.take(4, field)?;
        Ok(i32::from_be_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
    }

    fn remaining(&self) -> usize {
        self.data.len() - self.pos
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_full_client_request_layout() {
        let frame = Frame::full_client_request(br#"{"a":1}"#.to_vec());
        let bytes = frame.marshal().unwrap();
        assert_eq!(
            bytes,
            vec![
                0x11, 0x10, 0x10, 0x00, // header + padding
                0, 0, 0, 7, // payload length
                b'{', b'"', b'a', b'"', b':', b'1', b'}',
            ]
        );
    }

    #[test]
    fn test_round_trip_plain() {
        let frame = Frame::full_client_request(b"hello".to_vec());
        let decoded = Frame::unmarshal(&frame.marshal().unwrap()).unwrap();
        assert_eq!(decoded, frame);
    }

    #[test]
    fn test_round_trip_with_session_event() {
        let mut frame = Frame::new(MsgType::FullServerResponse, MsgTypeFlag::WithEvent);
        frame.event = EventType::SessionFinished;
        frame.session_id = "session-42".to_string();
        frame.payload = br#"{"status":"ok"}"#.to_vec();
        let decoded = Frame::unmarshal(&frame.marshal().unwrap()).unwrap();
        assert_eq!(decoded, frame);
    }

    #[test]
    fn test_round_trip_with_connect_event() {
        let mut frame = Frame::new(MsgType::FullServerResponse, MsgTypeFlag::WithEvent);
        frame.event = EventType::ConnectionFinished;
        frame.session_id = "sess".to_string();
        frame.connect_id = "conn-7".to_string();
        let decoded = Frame::unmarshal(&frame.marshal().unwrap()).unwrap();
        assert_eq!(decoded, frame);
    }

    #[test]
    fn test_round_trip_sequenced() {
        let mut frame = Frame::new(MsgType::AudioOnlyServer, MsgTypeFlag::NegativeSeq);
        frame.serialization = Serialization::Raw;
        frame.sequence = -3;
        frame.payload = vec![0xDE, 0xAD];
        let decoded = Frame::unmarshal(&frame.marshal().unwrap()).unwrap();
        assert_eq!(decoded, frame);
        assert_eq!(decoded.sequence, -3);
    }

    #[test]
    fn test_round_trip_error_frame() {
        let mut frame = Frame::new(MsgType::Error, MsgTypeFlag::NoSeq);
        frame.error_code = 45000001;
        frame.payload = b"quota exceeded".to_vec();
        let decoded = Frame::unmarshal(&frame.marshal().unwrap()).unwrap();
        assert_eq!(decoded, frame);
    }

    #[test]
    fn test_round_trip_wide_header() {
        let mut frame = Frame::full_client_request(b"x".to_vec());
        frame.header_size = 4;
        let bytes = frame.marshal().unwrap();
        // 16-byte header, 13 of them reserved padding.
        assert_eq!(bytes[0], 0x14);
        assert!(bytes[3..16].iter().all(|&b| b == 0));
        assert_eq!(Frame::unmarshal(&bytes).unwrap(), frame);
    }

    #[test]
    fn test_connection_events_omit_session_id() {
        let mut frame = Frame::new(MsgType::FullClientRequest, MsgTypeFlag::WithEvent);
        frame.event = EventType::StartConnection;
        frame.session_id = "ignored".to_string();
        let bytes = frame.marshal().unwrap();
        // header(4) + event(4) + payload length(4): no session id field.
        assert_eq!(bytes.len(), 12);

        frame.event = EventType::TtsSentenceStart;
        let bytes = frame.marshal().unwrap();
        assert_eq!(bytes.len(), 12 + 4 + "ignored".len());
    }

    #[test]
    fn test_too_short() {
        assert_eq!(Frame::unmarshal(&[]), Err(FrameError::TooShort(0)));
        assert_eq!(Frame::unmarshal(&[0x11, 0x10]), Err(FrameError::TooShort(2)));
    }

    #[test]
    fn test_trailing_bytes_rejected() {
        let mut bytes = Frame::full_client_request(b"abc".to_vec())
            .marshal()
            .unwrap();
        bytes.push(0);
        assert_eq!(Frame::unmarshal(&bytes), Err(FrameError::TrailingBytes(1)));
    }

    #[test]
    fn test_truncated_payload_rejected() {
        let bytes = Frame::full_client_request(b"abcdef".to_vec())
            .marshal()
            .unwrap();
        assert_eq!(
            Frame::unmarshal(&bytes[..bytes.len() - 2]),
            Err(FrameError::Truncated("payload"))
        );
    }

    #[test]
    fn test_invalid_nibbles_rejected() {
        // Type nibble 0 is not a legal message type.
        assert_eq!(
            Frame::unmarshal(&[0x11, 0x00, 0x10, 0x00, 0, 0, 0, 0]),
            Err(FrameError::InvalidMsgType(0))
        );
        // Flag nibble 5 is undefined.
        assert_eq!(
            Frame::unmarshal(&[0x11, 0x15, 0x10, 0x00, 0, 0, 0, 0]),
            Err(FrameError::InvalidFlag(5))
        );
        // Version 0 is undefined.
        assert_eq!(
            Frame::unmarshal(&[0x01, 0x10, 0x10, 0x00, 0, 0, 0, 0]),
            Err(FrameError::InvalidVersion(0))
        );
    }

    #[test]
    fn test_invalid_event_rejected() {
        let mut frame = Frame::new(MsgType::FullServerResponse, MsgTypeFlag::WithEvent);
        frame.event = EventType::SessionStarted;
        let mut bytes = frame.marshal().unwrap();
        // Overwrite the event number with an unknown value.
        bytes[4..8].copy_from_slice(&999i32.to_be_bytes());
        assert_eq!(Frame::unmarshal(&bytes), Err(FrameError::InvalidEvent(999)));
    }
}
