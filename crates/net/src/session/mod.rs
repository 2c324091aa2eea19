mod client;
mod events;
mod frame;
mod server;

pub use client::{Client, ClientState, LocalPlayer};
pub use events::{DisconnectReason, ServerEvent, SessionEvent};
pub use frame::{Action, ActionBuffer, Frame, FrameHistory, InputSource, MAX_ACTIONS};
pub use server::{Server, free_network_id};
