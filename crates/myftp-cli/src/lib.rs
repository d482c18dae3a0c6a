//! UDP front end of myftp: config, file store, session handshake and shell.

pub mod config;
pub mod interrupt;
pub mod link;
pub mod session;
pub mod shell;
pub mod store;

pub use config::{NodeConfig, Overrides};
pub use interrupt::Interrupts;
pub use session::{Fetch, Peer, Served, SessionError};
pub use shell::{Client, Flow, ShellCommand};
pub use store::{DirStore, FileStore, StoreError};
