//! Roster handlers: joins, leaves and leadership tracking.

use revenant_proto::payloads::lobby::{JoinGame, JoinLobby, LeaveLobby, JOIN_GAME_ENTRIES};
use revenant_proto::Command;

use crate::context::ProxyContext;
use crate::error::SessionError;
use crate::handlers::HandlerAction;
use crate::messages;
use crate::session::{Session, SessionFlags, GAME_SLOTS, LOBBY_SLOTS};

/// Record a leadership change and notify the client when it gained the lead
pub(crate) fn update_leader(session: &mut Session, leader_id: u8) -> Result<(), SessionError> {
    if session.leader_client_id == leader_id {
        return Ok(());
    }
    session.leader_client_id = leader_id;
    tracing::info!(leader_id, "room leader changed");
    if leader_id == session.lobby_client_id {
        messages::send_text(
            &mut session.client_channel,
            session.dialect,
            0x06,
            "\tC6You are now the leader",
        )?;
    }
    Ok(())
}

/// Server `64` JoinGame: fixed four entries, identity substitution and the
/// operator's section-id/event/seed overrides
pub fn server_64(
    _ctx: &ProxyContext,
    session: &mut Session,
    cmd: &mut Command,
) -> Result<HandlerAction, SessionError> {
    // Every slot is rewritten below, so a plain resize is enough
    session.reset_lobby(GAME_SLOTS);

    let serial = session.license.as_ref().map(|l| l.serial_number);
    let remote = session.remote_guild_card_number;
    let dialect = session.dialect;
    let count = (cmd.flag as usize).min(JOIN_GAME_ENTRIES);

    let mut changed = false;
    let mut roster = Vec::with_capacity(count);
    let (client_id, leader_id);
    {
        let mut view = JoinGame::parse(dialect, &mut cmd.payload)?;
        client_id = view.client_id();
        leader_id = view.leader_id();

        for slot in 0..count {
            if let Some(serial) = serial {
                if view.guild_card(slot)? == remote {
                    view.set_guild_card(slot, serial)?;
                    changed = true;
                }
            }
            let name = view.ep3_name(slot).unwrap_or_default();
            roster.push((slot, view.guild_card(slot)?, name));
        }

        if let Some(section_id) = session.options.override_section_id {
            view.set_section_id(section_id);
            changed = true;
        }
        if let Some(event) = session.options.override_lobby_event {
            view.set_event(event);
            changed = true;
        }
        if let Some(seed) = session.options.override_random_seed {
            view.set_rare_seed(seed);
            changed = true;
        }
    }

    session.lobby_client_id = client_id;
    update_leader(session, leader_id)?;
    for (slot, guild_card, name) in roster {
        session.set_lobby_player(slot, guild_card, name);
    }

    Ok(HandlerAction::forward_or_modified(changed))
}

/// Server `65`/`67`/`68` JoinLobby: entries keyed by their client id, roster
/// reset on a full lobby join, event/number overrides
pub fn server_65_67_68(
    _ctx: &ProxyContext,
    session: &mut Session,
    cmd: &mut Command,
) -> Result<HandlerAction, SessionError> {
    if cmd.opcode_byte() == 0x67 {
        session.reset_lobby(LOBBY_SLOTS);
        tracing::info!("cleared lobby players");

        // Joining a lobby can permanently stop this client from confirming
        // message boxes; latch that into the persistent flag so the home
        // server learns it when the client returns
        if session.flags.has(SessionFlags::NO_MESSAGE_BOX_CONFIRM_AFTER_LOBBY_JOIN) {
            session.flags.set(SessionFlags::NO_MESSAGE_BOX_CONFIRM);
        }
    }

    let serial = session.license.as_ref().map(|l| l.serial_number);
    let remote = session.remote_guild_card_number;
    let dialect = session.dialect;
    let count = cmd.flag as usize;

    let mut changed = false;
    let mut roster = Vec::with_capacity(count);
    let (client_id, leader_id);
    {
        let mut view = JoinLobby::parse(dialect, &mut cmd.payload, count)?;
        client_id = view.client_id();
        leader_id = view.leader_id();

        for i in 0..count {
            let slot = usize::from(view.slot(i)?);
            if let Some(serial) = serial {
                if view.guild_card(i)? == remote {
                    view.set_guild_card(i, serial)?;
                    changed = true;
                }
            }
            roster.push((slot, view.guild_card(i)?, view.name(i)?));
        }

        if let Some(event) = session.options.override_lobby_event {
            view.set_event(event);
            changed = true;
        }
        if let Some(number) = session.options.override_lobby_number {
            view.set_lobby_number(number);
            changed = true;
        }
    }

    session.lobby_client_id = client_id;
    update_leader(session, leader_id)?;
    for (slot, guild_card, name) in roster {
        session.set_lobby_player(slot, guild_card, name);
    }

    Ok(HandlerAction::forward_or_modified(changed))
}

/// Server `66`/`69` LeaveLobby: clear the slot and track the leader
pub fn server_66_69(
    _ctx: &ProxyContext,
    session: &mut Session,
    cmd: &mut Command,
) -> Result<HandlerAction, SessionError> {
    let (slot, leader_id) = {
        let view = LeaveLobby::parse(&cmd.payload)?;
        (usize::from(view.client_id()), view.leader_id())
    };
    session.clear_lobby_player(slot);
    update_leader(session, leader_id)?;
    Ok(HandlerAction::Forward)
}
