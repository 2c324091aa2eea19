use std::io;

use super::bitstream::StreamError;
use super::packet::PacketError;

#[derive(Debug, thiserror::Error)]
pub enum NetError {
    #[error("socket error: {0}")]
    Io(#[from] io::Error),
    #[error(transparent)]
    Stream(#[from] StreamError),
    #[error(transparent)]
    Packet(#[from] PacketError),
    #[error("message of {size} bytes exceeds limit of {max}")]
    MessageTooLarge { size: usize, max: usize },
    #[error("not connected")]
    NotConnected,
    #[error("invalid state: {0}")]
    InvalidState(&'static str),
}
