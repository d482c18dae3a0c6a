//! Interactive client shell.

use std::net::SocketAddr;
use std::str::FromStr;

use thiserror::Error;
use tokio::net::lookup_host;
use tracing::info;

use myftp_abstract::Command;

use crate::interrupt::Interrupts;
use crate::session::{Fetch, Peer, Served, SessionError};
use crate::store::FileStore;

pub const HELP: &str = "\
Commands may be abbreviated.
connect <host>  connect to remote myftp
put <file>      send file
get <file>      receive file
quit            exit myftp
?               print this help information";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ShellCommand {
    Connect { host: String },
    Get { name: String },
    Put { name: String },
    Quit,
    Help,
    Empty,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ParseError {
    #[error("usage: {0}")]
    MissingArgument(&'static str),
    #[error("unknown command {0:?}, type ? for help")]
    Unknown(String),
}

/// `word` is `full` or a prefix of it.
fn abbreviates(word: &str, full: &str) -> bool {
    !word.is_empty() && full.starts_with(word)
}

impl FromStr for ShellCommand {
    type Err = ParseError;

    fn from_str(line: &str) -> Result<Self, Self::Err> {
        let mut words = line.split_whitespace();
        let Some(word) = words.next() else {
            return Ok(ShellCommand::Empty);
        };
        let mut argument = |usage| {
            words
                .next()
                .map(str::to_string)
                .ok_or(ParseError::MissingArgument(usage))
        };

        if word == "?" || abbreviates(word, "help") {
            Ok(ShellCommand::Help)
        } else if abbreviates(word, "connect") {
            Ok(ShellCommand::Connect {
                host: argument("connect <host>")?,
            })
        } else if abbreviates(word, "get") {
            Ok(ShellCommand::Get {
                name: argument("get <file>")?,
            })
        } else if abbreviates(word, "put") {
            Ok(ShellCommand::Put {
                name: argument("put <file>")?,
            })
        } else if abbreviates(word, "quit") {
            Ok(ShellCommand::Quit)
        } else {
            Err(ParseError::Unknown(word.to_string()))
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    Continue,
    Quit,
}

pub struct Client<S> {
    peer: Peer<S>,
    server_port: u16,
    server: Option<SocketAddr>,
    interrupts: Interrupts,
}

impl<S: FileStore> Client<S> {
    pub fn new(peer: Peer<S>, server_port: u16, interrupts: Interrupts) -> Self {
        Self {
            peer,
            server_port,
            server: None,
            interrupts,
        }
    }

    pub fn server(&self) -> Option<SocketAddr> {
        self.server
    }

    /// Run one command, printing its result for the user.
    pub async fn execute(&mut self, command: ShellCommand) -> Result<Flow, SessionError> {
        match command {
            ShellCommand::Empty => {}
            ShellCommand::Help => println!("{HELP}"),
            ShellCommand::Quit => return Ok(Flow::Quit),
            ShellCommand::Connect { host } => self.connect(&host).await?,
            ShellCommand::Get { name } => {
                let Some(server) = self.connected() else {
                    return Ok(Flow::Continue);
                };
                self.peer.send_command(server, &Command::Get).await?;
                let scope = self.interrupts.begin_transfer();
                match self.peer.request_file(server, &name, scope.token()).await? {
                    Fetch::Stored { path, bytes } => {
                        println!("received {name} ({bytes} bytes) into {}", path.display())
                    }
                    Fetch::NotFound => println!("File not found. Please try again."),
                }
            }
            ShellCommand::Put { name } => {
                let Some(server) = self.connected() else {
                    return Ok(Flow::Continue);
                };
                self.peer
                    .send_command(server, &Command::Write { name })
                    .await?;
                let scope = self.interrupts.begin_transfer();
                match self.peer.serve_file_request(scope.token()).await? {
                    Served::Sent { name, bytes } => println!("sent {name} ({bytes} bytes)"),
                    Served::NotFound { name } => println!("{name}: no such file to send"),
                }
            }
        }
        Ok(Flow::Continue)
    }

    fn connected(&self) -> Option<SocketAddr> {
        if self.server.is_none() {
            println!("You are not connected to any server yet.");
        }
        self.server
    }

    async fn connect(&mut self, host: &str) -> Result<(), SessionError> {
        let addr = lookup_host((host, self.server_port))
            .await?
            .next()
            .ok_or_else(|| {
                std::io::Error::new(
                    std::io::ErrorKind::NotFound,
                    format!("no address found for {host}"),
                )
            })?;
        self.peer.send_command(addr, &Command::Connect).await?;
        info!(%addr, "connect sent");
        println!("Connection established with {host}.");
        self.server = Some(addr);
        Ok(())
    }
}
