//! Identity substitution: every frame carrying a guild card number is
//! rewritten so the client only ever sees its licensed serial number and
//! the remote server only ever sees the number it assigned.

use revenant_proto::payloads::chat::{GuildCardSearch, GuildCardSearchResult, SimpleMail, TextHeader};
use revenant_proto::payloads::lobby::{ArrowUpdate, CardLobbyGame, ChoiceSearchResult, CARD_LOBBY_ENTRIES};
use revenant_proto::payloads::login::{self, UpdateClientConfig};
use revenant_proto::{Command, CLIENT_CONFIG_SIZE};

use crate::context::ProxyContext;
use crate::error::SessionError;
use crate::handlers::HandlerAction;
use crate::messages;
use crate::session::Session;

/// Banner tail the client's config buffer would hold after a short `04`
/// when no guild card number had been assigned yet
pub const BANNER_PORT_MAP: &[u8; CLIENT_CONFIG_SIZE] = b"t Port Map. Copyright SEGA Enter";

/// Banner tail the client's config buffer would hold after a short `04`
/// once a guild card number exists
pub const BANNER_LOBBY_SERVER: &[u8; CLIENT_CONFIG_SIZE] = b"t Lobby Server. Copyright SEGA E";

/// Magic leading the home client-config blob
pub const CLIENT_CONFIG_MAGIC: u64 = 0x24_3F64_4A52_6E76;

/// Serialize the session flags as the home client-config blob restored when
/// the client returns to the home server
#[must_use]
pub fn export_home_config(session: &Session) -> [u8; CLIENT_CONFIG_SIZE] {
    let mut cfg = [0u8; CLIENT_CONFIG_SIZE];
    cfg[..8].copy_from_slice(&CLIENT_CONFIG_MAGIC.to_le_bytes());
    cfg[10..12].copy_from_slice(&session.flags.bits().to_le_bytes());
    cfg
}

/// Server `04` UpdateClientConfig: learn the assigned guild card number,
/// stash the config blob, hide the number from a linked client
pub fn server_04(
    _ctx: &ProxyContext,
    session: &mut Session,
    cmd: &mut Command,
) -> Result<HandlerAction, SessionError> {
    let had_guild_card = session.remote_guild_card_number != 0;
    let observed = {
        let view = UpdateClientConfig::parse(&mut cmd.payload)?;
        view.guild_card_number()
    };

    if session.remote_guild_card_number != observed {
        session.remote_guild_card_number = observed;
        tracing::info!(number = observed, "remote guild card number set");
        messages::send_text(
            &mut session.client_channel,
            session.dialect,
            messages::MSG_INFO,
            &format!(
                "The remote server\nhas assigned your\nGuild Card number as\n\tC6{observed}"
            ),
        )?;
    }

    // The client copies a full 0x20 bytes out of this frame regardless of
    // its length, so a short 04 leaks the tail of the previous frame into
    // its config buffer. Reproduce that: the tail is the copyright banner
    // of whichever init frame preceded this one.
    let banner = if had_guild_card { BANNER_LOBBY_SERVER } else { BANNER_PORT_MAP };
    session.remote_client_config.copy_from_slice(banner);
    {
        let mut view = UpdateClientConfig::parse(&mut cmd.payload)?;
        let cfg_len = view.cfg().len().min(CLIENT_CONFIG_SIZE);
        session.remote_client_config[..cfg_len].copy_from_slice(&view.cfg()[..cfg_len]);
        if let Some(license) = session.license.as_ref() {
            view.set_guild_card_number(license.serial_number);
        }
    }

    // A client that never saw an 04 answers its first one with a 96
    // checksum; the real checksum never crossed the proxy, so send noise
    if !had_guild_card {
        let checksum = rand::random::<u64>() & 0x0000_FFFF_FFFF_FFFF;
        session.server_channel.send(0x96, 0, &checksum.to_le_bytes())?;
    }

    Ok(HandlerAction::forward_or_modified(session.is_linked()))
}

/// Server `06` chat: rewrite the embedded sender number when it is ours
pub fn server_06(
    _ctx: &ProxyContext,
    session: &mut Session,
    cmd: &mut Command,
) -> Result<HandlerAction, SessionError> {
    let Some(license) = session.license.as_ref() else {
        return Ok(HandlerAction::Forward);
    };
    let mut view = TextHeader::parse(&mut cmd.payload)?;
    if view.guild_card_number() == session.remote_guild_card_number {
        view.set_guild_card_number(license.serial_number);
        return Ok(HandlerAction::modified());
    }
    Ok(HandlerAction::Forward)
}

/// Server `41` search result: rewrite both identity fields
pub fn server_41(
    _ctx: &ProxyContext,
    session: &mut Session,
    cmd: &mut Command,
) -> Result<HandlerAction, SessionError> {
    let Some(license) = session.license.as_ref() else {
        return Ok(HandlerAction::Forward);
    };
    let mut view = GuildCardSearchResult::parse(&mut cmd.payload)?;
    let mut changed = false;
    if view.searcher() == session.remote_guild_card_number {
        view.set_searcher(license.serial_number);
        changed = true;
    }
    if view.result() == session.remote_guild_card_number {
        view.set_result(license.serial_number);
        changed = true;
    }
    Ok(HandlerAction::forward_or_modified(changed))
}

/// Client `40` search request: the reverse substitution
pub fn client_40(
    _ctx: &ProxyContext,
    session: &mut Session,
    cmd: &mut Command,
) -> Result<HandlerAction, SessionError> {
    let Some(license) = session.license.as_ref() else {
        return Ok(HandlerAction::Forward);
    };
    let mut view = GuildCardSearch::parse(&mut cmd.payload)?;
    let mut changed = false;
    if view.searcher() == license.serial_number {
        view.set_searcher(session.remote_guild_card_number);
        changed = true;
    }
    if view.target() == license.serial_number {
        view.set_target(session.remote_guild_card_number);
        changed = true;
    }
    Ok(HandlerAction::forward_or_modified(changed))
}

/// Server `81` simple mail: rewrite sender and recipient
pub fn server_81(
    _ctx: &ProxyContext,
    session: &mut Session,
    cmd: &mut Command,
) -> Result<HandlerAction, SessionError> {
    let Some(license) = session.license.as_ref() else {
        return Ok(HandlerAction::Forward);
    };
    let mut view = SimpleMail::parse(session.dialect, &mut cmd.payload)?;
    let mut changed = false;
    if view.from_guild_card() == session.remote_guild_card_number {
        view.set_from_guild_card(license.serial_number);
        changed = true;
    }
    if view.to_guild_card() == session.remote_guild_card_number {
        view.set_to_guild_card(license.serial_number);
        changed = true;
    }
    Ok(HandlerAction::forward_or_modified(changed))
}

/// Client `81` simple mail: reverse substitution, plus scrubbing the
/// uninitialised buffer tail clients send after the text terminator
pub fn client_81(
    _ctx: &ProxyContext,
    session: &mut Session,
    cmd: &mut Command,
) -> Result<HandlerAction, SessionError> {
    let mut view = SimpleMail::parse(session.dialect, &mut cmd.payload)?;
    if let Some(license) = session.license.as_ref() {
        if view.from_guild_card() == license.serial_number {
            view.set_from_guild_card(session.remote_guild_card_number);
        }
        if view.to_guild_card() == license.serial_number {
            view.set_to_guild_card(session.remote_guild_card_number);
        }
    }
    view.clear_text_tail(session.dialect);
    Ok(HandlerAction::modified())
}

/// Server `88` arrow update: rewrite every matching entry
pub fn server_88(
    _ctx: &ProxyContext,
    session: &mut Session,
    cmd: &mut Command,
) -> Result<HandlerAction, SessionError> {
    let Some(license) = session.license.as_ref() else {
        return Ok(HandlerAction::Forward);
    };
    let count = cmd.flag as usize;
    let mut view = ArrowUpdate::parse(&mut cmd.payload, count)?;
    let mut changed = false;
    for i in 0..count {
        if view.guild_card(i)? == session.remote_guild_card_number {
            view.set_guild_card(i, license.serial_number)?;
            changed = true;
        }
    }
    Ok(HandlerAction::forward_or_modified(changed))
}

/// Server `C4` choice-search results: rewrite every matching entry
pub fn server_c4(
    _ctx: &ProxyContext,
    session: &mut Session,
    cmd: &mut Command,
) -> Result<HandlerAction, SessionError> {
    let Some(license) = session.license.as_ref() else {
        return Ok(HandlerAction::Forward);
    };
    let count = cmd.flag as usize;
    let mut view = ChoiceSearchResult::parse(&mut cmd.payload, count)?;
    let mut changed = false;
    for i in 0..count {
        if view.guild_card(i)? == session.remote_guild_card_number {
            view.set_guild_card(i, license.serial_number)?;
            changed = true;
        }
    }
    Ok(HandlerAction::forward_or_modified(changed))
}

/// Server `E4` Episode-3 card-lobby entries
pub fn server_e4(
    _ctx: &ProxyContext,
    session: &mut Session,
    cmd: &mut Command,
) -> Result<HandlerAction, SessionError> {
    let Some(license) = session.license.as_ref() else {
        return Ok(HandlerAction::Forward);
    };
    let mut view = CardLobbyGame::parse(&mut cmd.payload)?;
    let mut changed = false;
    for i in 0..CARD_LOBBY_ENTRIES {
        if view.guild_card(i) == session.remote_guild_card_number {
            view.set_guild_card(i, license.serial_number);
            changed = true;
        }
    }
    Ok(HandlerAction::forward_or_modified(changed))
}

/// Build the fake `04` restoring the home client config on return
#[must_use]
pub fn build_home_config_04(session: &Session, serial_number: u32) -> Vec<u8> {
    login::build_04(serial_number, &export_home_config(session))
}
