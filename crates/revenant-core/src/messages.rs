//! Synthetic frames handlers inject as side effects: user-visible text,
//! leave-lobby notifications and seeded item drops.

use revenant_proto::payloads::subcommand::{self, ItemData};
use revenant_proto::payloads::{chat, lobby};
use revenant_proto::Dialect;

use crate::channel::Channel;
use crate::error::SessionError;

/// Opcode of the info-message frame shown in the client's message log
pub const MSG_INFO: u16 = 0x11;

/// Send a user-visible text message on `channel`
///
/// # Errors
///
/// Propagates channel framing/cipher failures.
pub fn send_text(
    channel: &mut Channel,
    dialect: Dialect,
    opcode: u16,
    message: &str,
) -> Result<(), SessionError> {
    let payload = chat::build_text(dialect, message);
    channel.send(opcode, 0, &payload)
}

/// Notify the client that `slot` left, naming the new leader
///
/// # Errors
///
/// Propagates channel framing/cipher failures.
pub fn send_leave_lobby(
    channel: &mut Channel,
    slot: u8,
    leader_id: u8,
) -> Result<(), SessionError> {
    let payload = lobby::build_leave_lobby(slot, leader_id);
    channel.send(0x69, u32::from(slot), &payload)
}

/// Send a drop-item container for an operator-seeded item
///
/// # Errors
///
/// Propagates channel framing/cipher failures.
#[allow(clippy::too_many_arguments)]
pub fn send_drop_item(
    channel: &mut Channel,
    item: &ItemData,
    from_enemy: bool,
    area: u8,
    x: f32,
    z: f32,
    request_id: u16,
) -> Result<(), SessionError> {
    let record = subcommand::build_drop_item(item, from_enemy, area, x, z, request_id);
    channel.send(0x60, 0, &record)
}
