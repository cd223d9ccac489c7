use tandem_core::{NANOS_PER_SEC, Nanos};

use crate::error::ProtocolError;

/// Wall-clock protocol message kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum WallClockMessageType {
    Request = 0,
    Response = 1,
    /// Response whose transmit timestamp will be refined by a follow-up.
    ResponseWithFollowUp = 2,
    FollowUp = 3,
}

impl TryFrom<u8> for WallClockMessageType {
    type Error = ProtocolError;

    fn try_from(raw: u8) -> Result<Self, ProtocolError> {
        match raw {
            0 => Ok(Self::Request),
            1 => Ok(Self::Response),
            2 => Ok(Self::ResponseWithFollowUp),
            3 => Ok(Self::FollowUp),
            other => Err(ProtocolError::UnknownMessageType(other)),
        }
    }
}

/// The fixed 32-byte wall-clock datagram, big-endian throughout.
///
/// ```text
/// offset  size  field
/// 0       1     message type (0..=3)
/// 1       1     precision, signed power-of-two seconds
/// 2       2     reserved (zero on send, ignored on receive)
/// 4       4     max frequency error, units of 1/256 ppm
/// 8       8     originate timestamp (u32 seconds, u32 nanoseconds)
/// 16      8     receive timestamp
/// 24      8     transmit timestamp
/// ```
///
/// Timestamps count nanoseconds since an arbitrary but consistent
/// monotonic origin on the sender.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WallClockMessage {
    pub msg_type: WallClockMessageType,
    /// log2 of the sender clock's precision in seconds.
    pub precision_exp: i8,
    /// Sender clock's maximum frequency error, ppm.
    pub max_freq_error_ppm: f64,
    pub originate: Nanos,
    pub receive: Nanos,
    pub transmit: Nanos,
}

impl WallClockMessage {
    pub const SIZE: usize = 32;

    /// A fresh client request carrying only the originate timestamp.
    pub fn request(originate: Nanos) -> Self {
        Self {
            msg_type: WallClockMessageType::Request,
            precision_exp: 0,
            max_freq_error_ppm: 0.0,
            originate,
            receive: 0,
            transmit: 0,
        }
    }

    /// Server reply to `request`, echoing its originate timestamp.
    pub fn response(
        request: &WallClockMessage,
        msg_type: WallClockMessageType,
        precision_exp: i8,
        max_freq_error_ppm: f64,
        receive: Nanos,
        transmit: Nanos,
    ) -> Self {
        Self {
            msg_type,
            precision_exp,
            max_freq_error_ppm,
            originate: request.originate,
            receive,
            transmit,
        }
    }

    /// Sender precision in seconds.
    pub fn precision_secs(&self) -> f64 {
        2f64.powi(self.precision_exp as i32)
    }

    /// Encode a measured precision (seconds) as the wire exponent: the
    /// smallest power of two not below the measurement.
    pub fn precision_exponent_for(precision_secs: f64) -> i8 {
        precision_secs.log2().ceil() as i8
    }

    /// Whether `other` is the follow-up completing this type-2
    /// response: matched by equal originate and receive timestamps.
    pub fn is_follow_up_of(&self, other: &WallClockMessage) -> bool {
        self.msg_type == WallClockMessageType::FollowUp
            && other.msg_type == WallClockMessageType::ResponseWithFollowUp
            && self.originate == other.originate
            && self.receive == other.receive
    }

    pub fn encode(&self) -> [u8; Self::SIZE] {
        let mut buf = [0u8; Self::SIZE];
        buf[0] = self.msg_type as u8;
        buf[1] = self.precision_exp as u8;
        // bytes 2..4 reserved, zero on send
        let mfe = (self.max_freq_error_ppm * 256.0).round() as u32;
        buf[4..8].copy_from_slice(&mfe.to_be_bytes());
        encode_timestamp(&mut buf[8..16], self.originate);
        encode_timestamp(&mut buf[16..24], self.receive);
        encode_timestamp(&mut buf[24..32], self.transmit);
        buf
    }

    pub fn decode(data: &[u8]) -> Result<Self, ProtocolError> {
        if data.len() < Self::SIZE {
            return Err(ProtocolError::TooShort(data.len(), Self::SIZE));
        }
        let msg_type = WallClockMessageType::try_from(data[0])?;
        let precision_exp = data[1] as i8;
        let mfe = u32::from_be_bytes(data[4..8].try_into().expect("4 bytes"));
        Ok(Self {
            msg_type,
            precision_exp,
            max_freq_error_ppm: mfe as f64 / 256.0,
            originate: decode_timestamp(&data[8..16]),
            receive: decode_timestamp(&data[16..24]),
            transmit: decode_timestamp(&data[24..32]),
        })
    }
}

fn encode_timestamp(buf: &mut [u8], nanos: Nanos) {
    let secs = (nanos / NANOS_PER_SEC) as u32;
    let frac = (nanos % NANOS_PER_SEC) as u32;
    buf[0..4].copy_from_slice(&secs.to_be_bytes());
    buf[4..8].copy_from_slice(&frac.to_be_bytes());
}

fn decode_timestamp(buf: &[u8]) -> Nanos {
    let secs = u32::from_be_bytes(buf[0..4].try_into().expect("4 bytes")) as i64;
    let frac = u32::from_be_bytes(buf[4..8].try_into().expect("4 bytes")) as i64;
    secs * NANOS_PER_SEC + frac
}

/// One measurement of the server clock from a request/response
/// exchange, everything in nanoseconds.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Candidate {
    /// Client send time.
    pub t1: Nanos,
    /// Server receive time.
    pub t2: Nanos,
    /// Server transmit time.
    pub t3: Nanos,
    /// Client arrival time.
    pub t4: Nanos,
    /// Server-advertised clock precision, seconds.
    pub precision_secs: f64,
    /// Server-advertised maximum frequency error, ppm.
    pub max_freq_error_ppm: f64,
}

impl Candidate {
    /// Build a candidate from a decoded response and its arrival time.
    /// `None` for messages that are not responses.
    pub fn from_response(msg: &WallClockMessage, t4: Nanos) -> Option<Self> {
        match msg.msg_type {
            WallClockMessageType::Request => None,
            _ => Some(Self {
                t1: msg.originate,
                t2: msg.receive,
                t3: msg.transmit,
                t4,
                precision_secs: msg.precision_secs(),
                max_freq_error_ppm: msg.max_freq_error_ppm,
            }),
        }
    }

    /// Refined copy taking the authoritative transmit timestamp (and
    /// precision figures) from a follow-up message. The arrival time
    /// stays that of the original response.
    pub fn with_follow_up(&self, follow_up: &WallClockMessage) -> Self {
        Self {
            t3: follow_up.transmit,
            precision_secs: follow_up.precision_secs(),
            max_freq_error_ppm: follow_up.max_freq_error_ppm,
            ..*self
        }
    }

    /// Estimated server-minus-client clock offset.
    pub fn offset_nanos(&self) -> Nanos {
        ((self.t3 + self.t2) - (self.t4 + self.t1)) / 2
    }

    /// Round-trip time excluding server processing.
    pub fn rtt_nanos(&self) -> Nanos {
        (self.t4 - self.t1) - (self.t3 - self.t2)
    }
}
