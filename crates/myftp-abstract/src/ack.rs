//! Acknowledgment datagrams: `ACK!==!<cursor>`.

use thiserror::Error;

use crate::control::SEPARATOR;

const PREFIX: &str = "ACK";

/// Receive buffer large enough for any acknowledgment of a `u32` cursor.
pub const MAX_ACK_LEN: usize = PREFIX.len() + SEPARATOR.len() + 10;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum AckError {
    #[error("acknowledgment is not valid UTF-8")]
    NotText,
    #[error("not an acknowledgment token: {0:?}")]
    Malformed(String),
}

/// Cumulative acknowledgment: every sequence below the cursor has arrived.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Ack(pub u32);

impl Ack {
    pub fn encode(&self) -> Vec<u8> {
        format!("{PREFIX}{SEPARATOR}{}", self.0).into_bytes()
    }

    pub fn decode(buf: &[u8]) -> Result<Self, AckError> {
        let text = std::str::from_utf8(buf).map_err(|_| AckError::NotText)?;
        let value = text
            .strip_prefix(PREFIX)
            .and_then(|rest| rest.strip_prefix(SEPARATOR))
            .and_then(|digits| digits.parse::<u32>().ok())
            .ok_or_else(|| AckError::Malformed(text.to_string()))?;
        Ok(Ack(value))
    }
}
