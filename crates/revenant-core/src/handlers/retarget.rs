//! Retarget handlers: the server-side reconnect frames and the client's
//! ship-select answer that sends it back to the home server.

use std::net::{IpAddr, Ipv4Addr, SocketAddr};

use revenant_proto::hash::crc32;
use revenant_proto::payloads::handshake::{build_reconnect, Reconnect};
use revenant_proto::Command;

use crate::context::ProxyContext;
use crate::error::SessionError;
use crate::handlers::{identity, HandlerAction};
use crate::messages;
use crate::session::Session;

fn ipv4_of(addr: SocketAddr) -> Option<Ipv4Addr> {
    match addr.ip() {
        IpAddr::V4(ip) => Some(ip),
        IpAddr::V6(_) => None,
    }
}

/// Server `19` (and patch `14`) reconnect
///
/// Some servers deliberately undersize this frame so the client's receive
/// buffer aliases the previous frame's bytes; the proxy keeps those bytes
/// around and performs the same aliasing before decoding.
pub fn server_19_patch_14(
    _ctx: &ProxyContext,
    session: &mut Session,
    cmd: &mut Command,
) -> Result<HandlerAction, SessionError> {
    // Fill an under-read frame from the previous server frame, then
    // normalise to the fixed record size
    if cmd.payload.len() < session.prev_server_frame.len() {
        let from = cmd.payload.len();
        cmd.payload.extend_from_slice(&session.prev_server_frame[from..]);
    }
    if cmd.payload.len() < Reconnect::LEN {
        cmd.payload.resize(Reconnect::LEN, 0);
    }

    if session.enable_remote_ip_crc_patch {
        session.remote_ip_crc = crc32(&cmd.payload[..4]);
    }

    let (address, port) = {
        let view = Reconnect::parse(&mut cmd.payload)?;
        (view.address(), view.port())
    };
    session.next_destination = Some(SocketAddr::new(
        IpAddr::V4(Ipv4Addr::from(address)),
        port,
    ));

    if !session.client_channel.connected() {
        tracing::warn!("reconnect with no client present; dropping");
        return Ok(HandlerAction::Suppress);
    }

    if cmd.opcode_byte() == 0x14 {
        // Patch-server redirects are hidden from the client entirely: drop
        // the server leg, reconnect it to the new target, and let the new
        // server's init frame re-key it
        session.server_channel.crypt_in = None;
        session.server_channel.crypt_out = None;
        session.pending_server_reconnect = true;
        return Ok(HandlerAction::Suppress);
    }

    let mut view = Reconnect::parse(&mut cmd.payload)?;
    if session.client_channel.is_virtual {
        // A virtual client reconnects in-process; only the port matters,
        // and keeping the address intact defeats the same-network check
        view.set_port(session.local_port);
    } else {
        let Some(local) = session.client_channel.local_addr.and_then(ipv4_of) else {
            return Err(SessionError::ChannelClosed("client (not ipv4)"));
        };
        view.set_address(u32::from(local));
        let port = session.client_channel.local_addr.map_or(session.local_port, |a| a.port());
        view.set_port(port);
    }
    Ok(HandlerAction::modified())
}

/// Client `A0`/`A1` (ship/block select): a linked client is sent back to
/// the home server instead of the remote server's menus
pub fn client_a0_a1(
    ctx: &ProxyContext,
    session: &mut Session,
    _cmd: &mut Command,
) -> Result<HandlerAction, SessionError> {
    let Some(license) = session.license.clone() else {
        return Ok(HandlerAction::Forward);
    };

    // The client still believes the lobby is populated; empty it before
    // the scene change
    let occupied: Vec<u8> = session
        .lobby_players
        .iter()
        .enumerate()
        .filter(|(_, p)| p.guild_card_number != 0)
        .map(|(slot, _)| slot as u8)
        .collect();
    let leader = session.lobby_client_id;
    for slot in occupied {
        messages::send_leave_lobby(&mut session.client_channel, slot, leader)?;
    }

    messages::send_text(
        &mut session.client_channel,
        session.dialect,
        messages::MSG_INFO,
        &format!("You've returned to\n\tC6{}", ctx.name),
    )?;

    // Restore the home client config so the login server sees the flags
    // this session accumulated
    let config = identity::build_home_config_04(session, license.serial_number);
    session.client_channel.send(0x04, 0, &config)?;

    let port = ctx.home_ports.for_dialect(session.dialect);
    let address = if session.client_channel.is_virtual {
        let Some(dest) = session.next_destination.and_then(ipv4_of) else {
            return Err(SessionError::ChannelClosed("virtual client without destination"));
        };
        u32::from(dest)
    } else {
        let Some(local) = session.client_channel.local_addr.and_then(ipv4_of) else {
            return Err(SessionError::ChannelClosed("client (not ipv4)"));
        };
        u32::from(local)
    };
    session.client_channel.send(0x19, 0, &build_reconnect(address, port))?;

    Ok(HandlerAction::Suppress)
}
