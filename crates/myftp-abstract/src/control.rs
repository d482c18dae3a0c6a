//! Session control datagrams exchanged outside the reliability engine.
//!
//! | datagram               | meaning                                        |
//! |------------------------|------------------------------------------------|
//! | empty                  | connect                                        |
//! | `get!==!`              | the sender will request a file from us         |
//! | `write!==!<name>`      | we should request `<name>` from the sender     |
//! | `<name>!==!<port>`     | file request, reply to `<port>`                |
//! | `FNF` / `<count>`      | reply: not found / total packets to expect     |

use thiserror::Error;

pub const SEPARATOR: &str = "!==!";
pub const NOT_FOUND: &str = "FNF";

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ControlError {
    #[error("control datagram is not valid UTF-8")]
    NotText,
    #[error("unrecognised session command {0:?}")]
    UnknownCommand(String),
    #[error("malformed file request {0:?}")]
    MalformedRequest(String),
    #[error("malformed request reply {0:?}")]
    MalformedReply(String),
}

fn as_text(buf: &[u8]) -> Result<&str, ControlError> {
    std::str::from_utf8(buf).map_err(|_| ControlError::NotText)
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Connect,
    Get,
    Write { name: String },
}

impl Command {
    pub fn encode(&self) -> Vec<u8> {
        match self {
            Command::Connect => Vec::new(),
            Command::Get => format!("get{SEPARATOR}").into_bytes(),
            Command::Write { name } => format!("write{SEPARATOR}{name}").into_bytes(),
        }
    }

    pub fn decode(buf: &[u8]) -> Result<Self, ControlError> {
        if buf.is_empty() {
            return Ok(Command::Connect);
        }
        let text = as_text(buf)?;
        match text.split_once(SEPARATOR) {
            Some(("get", _)) => Ok(Command::Get),
            Some(("write", name)) if !name.is_empty() => Ok(Command::Write {
                name: name.to_string(),
            }),
            _ => Err(ControlError::UnknownCommand(text.to_string())),
        }
    }
}

/// Request for a file, naming the port the transfer should be sent to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileRequest {
    pub name: String,
    pub reply_port: u16,
}

impl FileRequest {
    pub fn encode(&self) -> Vec<u8> {
        format!("{}{SEPARATOR}{}", self.name, self.reply_port).into_bytes()
    }

    pub fn decode(buf: &[u8]) -> Result<Self, ControlError> {
        let text = as_text(buf)?;
        let malformed = || ControlError::MalformedRequest(text.to_string());
        let (name, port) = text.rsplit_once(SEPARATOR).ok_or_else(malformed)?;
        if name.is_empty() {
            return Err(malformed());
        }
        let reply_port = port.parse().map_err(|_| malformed())?;
        Ok(Self {
            name: name.to_string(),
            reply_port,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestReply {
    NotFound,
    Accepted { total_packets: u32 },
}

impl RequestReply {
    pub fn encode(&self) -> Vec<u8> {
        match self {
            RequestReply::NotFound => NOT_FOUND.as_bytes().to_vec(),
            RequestReply::Accepted { total_packets } => total_packets.to_string().into_bytes(),
        }
    }

    pub fn decode(buf: &[u8]) -> Result<Self, ControlError> {
        let text = as_text(buf)?;
        if text == NOT_FOUND {
            return Ok(RequestReply::NotFound);
        }
        text.parse()
            .map(|total_packets| RequestReply::Accepted { total_packets })
            .map_err(|_| ControlError::MalformedReply(text.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn session_commands() {
        assert_eq!(Command::decode(b""), Ok(Command::Connect));
        assert_eq!(Command::decode(b"get!==!"), Ok(Command::Get));
        assert_eq!(
            Command::decode(b"write!==!notes.txt"),
            Ok(Command::Write {
                name: "notes.txt".into()
            })
        );
        assert_eq!(
            Command::Write {
                name: "a.bin".into()
            }
            .encode(),
            b"write!==!a.bin"
        );
        assert!(matches!(
            Command::decode(b"ACK!==!4"),
            Err(ControlError::UnknownCommand(_))
        ));
        assert!(Command::decode(b"write!==!").is_err());
    }

    #[test]
    fn file_request_carries_reply_port() {
        let req = FileRequest {
            name: "report.pdf".into(),
            reply_port: 5006,
        };
        assert_eq!(req.encode(), b"report.pdf!==!5006");
        assert_eq!(FileRequest::decode(b"report.pdf!==!5006"), Ok(req));
    }

    #[test]
    fn file_request_rejects_bad_port() {
        assert!(FileRequest::decode(b"report.pdf!==!http").is_err());
        assert!(FileRequest::decode(b"report.pdf").is_err());
        assert!(FileRequest::decode(b"!==!5006").is_err());
    }

    #[test]
    fn replies() {
        assert_eq!(RequestReply::decode(b"FNF"), Ok(RequestReply::NotFound));
        assert_eq!(
            RequestReply::decode(b"3"),
            Ok(RequestReply::Accepted { total_packets: 3 })
        );
        assert_eq!(RequestReply::Accepted { total_packets: 42 }.encode(), b"42");
        assert!(RequestReply::decode(b"ACK!==!1").is_err());
    }
}
