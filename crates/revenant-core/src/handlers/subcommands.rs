//! Container-frame handlers (`60`/`62`/`6C`/`6D`/`C9`/`CB`): map capture,
//! item seeding, switch assist, the cheat helpers and the embedded
//! guild-card rewrite.

use revenant_files::capture::timestamp_us;
use revenant_files::prs;
use revenant_proto::payloads::subcommand::{
    self, DropRequest, SendGuildCard, StatChange, SwitchStateChanged,
};
use revenant_proto::payloads::get_u32_le;
use revenant_proto::{Command, Dialect};

use crate::context::ProxyContext;
use crate::error::SessionError;
use crate::handlers::HandlerAction;
use crate::messages;
use crate::session::Session;

/// Warn (non-fatally) about inner ids the proxy has no knowledge of
fn check_implemented(session: &Session, payload: &[u8]) {
    if payload.len() < 4 {
        tracing::warn!(session = session.id, "container frame with no contents");
        return;
    }
    for (id, _) in subcommand::iter(payload) {
        if !subcommand::is_implemented(id) {
            tracing::warn!(session = session.id, id, "unimplemented subcommand");
        }
    }
}

/// Markers identifying a compressed map payload on GC
const MAP_MARKER_KIND: u32 = 0xB6;
const MAP_MARKER_FORMAT: u32 = 0x41;

fn capture_gc_map(session: &mut Session, payload: &[u8]) {
    if payload.len() < 0x14 {
        return;
    }
    if get_u32_le(payload, 0) != MAP_MARKER_KIND || get_u32_le(payload, 8) != MAP_MARKER_FORMAT {
        return;
    }
    let map_id = get_u32_le(payload, 12);
    match prs::decompress(&payload[0x14..]) {
        Ok(map) => {
            let name = format!("map{map_id:08X}.{}.mnmd", timestamp_us());
            match session.capture.save_blob(&name, &map) {
                Ok(path) => {
                    tracing::info!(bytes = map.len(), path = %path.display(), "wrote map data")
                }
                Err(err) => tracing::warn!(%err, "failed to write map data"),
            }
        }
        Err(err) => tracing::warn!(%err, "map payload failed to decompress"),
    }
}

fn seed_drop(
    session: &mut Session,
    payload: &[u8],
    from_enemy: bool,
) -> Result<HandlerAction, SessionError> {
    let request = DropRequest::parse(payload)?;
    let Some(mut item) = session.next_drop_item.take() else {
        return Ok(HandlerAction::Forward);
    };
    item.id = session.allocate_item_id();
    let (area, x, z, request_id) =
        (request.area(), request.x(), request.z(), request.request_id());
    messages::send_drop_item(&mut session.server_channel, &item, from_enemy, area, x, z, request_id)?;
    messages::send_drop_item(&mut session.client_channel, &item, from_enemy, area, x, z, request_id)?;
    tracing::info!(request_id, "replaced drop with seeded item");
    Ok(HandlerAction::Suppress)
}

/// Server-direction container: map capture and drop seeding
pub fn server_container(
    _ctx: &ProxyContext,
    session: &mut Session,
    cmd: &mut Command,
) -> Result<HandlerAction, SessionError> {
    check_implemented(session, &cmd.payload);

    if session.options.save_files && session.dialect == Dialect::Gc {
        capture_gc_map(session, &cmd.payload);
    }

    let armed = session.next_drop_item.as_ref().is_some_and(|item| item.is_present());
    if armed && session.dialect != Dialect::Bb && !cmd.payload.is_empty() {
        let leading = cmd.payload[0];
        if leading == 0x60 || leading == 0xA2 {
            let payload = cmd.payload.clone();
            return seed_drop(session, &payload, leading == 0x60);
        }
    }

    Ok(HandlerAction::Forward)
}

const HP_RESTORE_TOTAL: u32 = 1020;

fn inject_hp_restore(session: &mut Session) -> Result<(), SessionError> {
    let mut records = Vec::new();
    let mut remaining = HP_RESTORE_TOTAL;
    while remaining > 0 {
        let amount = remaining.min(0xFF) as u8;
        records.extend_from_slice(&subcommand::build_stat_change(
            session.lobby_client_id,
            StatChange::AddHp,
            amount,
        ));
        remaining -= u32::from(amount);
    }
    session.client_channel.send(0x60, 0, &records)
}

fn inject_tp_restore(session: &mut Session) -> Result<(), SessionError> {
    let record =
        subcommand::build_stat_change(session.lobby_client_id, StatChange::AddTp, 0xFF);
    session.client_channel.send(0x60, 0, &record)
}

fn replay_switch(session: &mut Session, payload: &[u8]) -> Result<(), SessionError> {
    let state = SwitchStateChanged::parse(payload)?;
    if !state.enabled() || state.switch_id() == SwitchStateChanged::NO_SWITCH {
        return Ok(());
    }
    if let Some(previous) = session.last_switch_command {
        tracing::info!("switch assist: replaying previous enable command");
        session.server_channel.send(0x60, 0, &previous)?;
        session.client_channel.send(0x60, 0, &previous)?;
    }
    session.last_switch_command = Some(state.raw());
    Ok(())
}

/// Inner ids that consume HP when they land
const HP_CONSUMING_IDS: [u8; 2] = [0x2F, 0x4C];

/// Inner id that consumes TP
const TP_CONSUMING_ID: u8 = 0x48;

/// Client-direction container: guild-card rewrite, cheat helpers and
/// switch assist
pub fn client_container(
    _ctx: &ProxyContext,
    session: &mut Session,
    cmd: &mut Command,
) -> Result<HandlerAction, SessionError> {
    check_implemented(session, &cmd.payload);

    if cmd.payload.is_empty() {
        return Ok(HandlerAction::Forward);
    }

    if session.is_linked() && cmd.payload[0] == 0x06 {
        let serial = session.license.as_ref().map_or(0, |l| l.serial_number);
        let mut card = SendGuildCard::parse(&mut cmd.payload)?;
        if card.guild_card_number() == serial {
            card.set_guild_card_number(session.remote_guild_card_number);
        }
    }

    match cmd.payload[0] {
        id if HP_CONSUMING_IDS.contains(&id) && session.options.infinite_hp => {
            inject_hp_restore(session)?;
        }
        TP_CONSUMING_ID if session.options.infinite_tp => {
            inject_tp_restore(session)?;
        }
        0x05 if session.options.switch_assist => {
            let payload = cmd.payload.clone();
            replay_switch(session, &payload)?;
        }
        _ => {}
    }

    Ok(HandlerAction::Forward)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hp_restore_batches_to_total() {
        // 1020 HP in 0xFF steps is exactly four records
        let mut records = 0;
        let mut remaining = HP_RESTORE_TOTAL;
        while remaining > 0 {
            remaining -= remaining.min(0xFF);
            records += 1;
        }
        assert_eq!(records, 4);
    }
}
