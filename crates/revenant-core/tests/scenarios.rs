//! End-to-end broker scenarios driven through the byte-level channel API,
//! no sockets involved.

use std::sync::Arc;

use revenant_core::{broker, Channel, License, ProxyContext, Session, SessionFlags};
use revenant_crypto::bb::{BbKeyFile, BB_INITIAL_KEY_BYTES, BB_TABLE_WORDS};
use revenant_crypto::{BbCipher, PsoCipher, V3Cipher};
use revenant_proto::payloads::subcommand::ItemData;
use revenant_proto::payloads::{get_u16_le, get_u32_le, put_u32_le};
use revenant_proto::{header, Command, Dialect};

fn test_context(dir: &std::path::Path) -> ProxyContext {
    ProxyContext::new("testhome", dir)
}

fn test_session(dialect: Dialect, dir: &std::path::Path) -> Session {
    let mut session = Session::new(1, dialect, 9100, dir).unwrap();
    session.client_channel.attach(Some("10.0.0.5:9100".parse().unwrap()), false);
    session.server_channel.attach(Some("10.0.0.5:51000".parse().unwrap()), false);
    session
}

fn linked(mut session: Session) -> Session {
    session.license = Some(Arc::new(License {
        serial_number: 0xDEAD_BEEF,
        access_key: "AAAAAAAA".into(),
        ..Default::default()
    }));
    session.sub_version = 0x33;
    session
}

/// Decode the frames queued on a channel, optionally through a cipher
fn drain_frames(channel: &mut Channel, crypt: Option<Box<dyn PsoCipher>>) -> Vec<Command> {
    let bytes = channel.take_outgoing();
    let mut rx = Channel::new(channel.dialect());
    rx.crypt_in = crypt;
    rx.receive_bytes(&bytes).unwrap()
}

#[test]
fn gc_linked_handshake_impersonates_client() {
    let dir = tempfile::tempdir().unwrap();
    let ctx = test_context(dir.path());
    let mut session = linked(test_session(Dialect::Gc, dir.path()));

    let mut payload = vec![0u8; 0x48];
    put_u32_le(&mut payload, 0x40, 0x1111_1111);
    put_u32_le(&mut payload, 0x44, 0x2222_2222);
    broker::dispatch(&ctx, &mut session, true, Command::new(0x17, 0, payload)).unwrap();

    // The V3 keystream is positional, so one decrypting endpoint must see
    // the whole server-bound stream in order
    let mut upstream = Channel::new(Dialect::Gc);
    upstream.crypt_in = Some(Box::new(V3Cipher::new(0x2222_2222)));

    // Nothing reaches the client; one DB goes upstream under the new cipher
    assert!(!session.client_channel.has_outgoing());
    let frames = upstream.receive_bytes(&session.server_channel.take_outgoing()).unwrap();
    assert_eq!(frames.len(), 1);
    assert_eq!(frames[0].opcode, 0xDB);
    assert_eq!(&frames[0].payload[0x00..0x08], b"DEADBEEF");
    assert_eq!(&frames[0].payload[0x10..0x18], b"AAAAAAAA");
    assert_eq!(frames[0].payload[0x20], 0x33);

    // A 9A right after re-authenticates with a 9E carrying the same
    // credentials
    broker::dispatch(&ctx, &mut session, true, Command::new(0x9A, 0, Vec::new())).unwrap();
    let frames = upstream.receive_bytes(&session.server_channel.take_outgoing()).unwrap();
    assert_eq!(frames.len(), 1);
    assert_eq!(frames[0].opcode, 0x9E);
    assert_eq!(&frames[0].payload[0x14..0x1C], b"DEADBEEF");
    assert_eq!(&frames[0].payload[0x24..0x2C], b"AAAAAAAA");
}

#[test]
fn unlinked_handshake_mirrors_and_keys_both_legs() {
    let dir = tempfile::tempdir().unwrap();
    let ctx = test_context(dir.path());
    let mut session = test_session(Dialect::Gc, dir.path());

    let mut payload = vec![0u8; 0x48];
    put_u32_le(&mut payload, 0x40, 0x1111_1111);
    put_u32_le(&mut payload, 0x44, 0x2222_2222);
    broker::dispatch(&ctx, &mut session, true, Command::new(0x02, 0, payload.clone())).unwrap();

    // The init frame reaches the client in the clear
    let frames = drain_frames(&mut session.client_channel, None);
    assert_eq!(frames.len(), 1);
    assert_eq!(frames[0].opcode, 0x02);
    assert_eq!(frames[0].payload, payload);

    // Both legs are keyed afterwards
    assert!(session.client_channel.crypt_in.is_some());
    assert!(session.client_channel.crypt_out.is_some());
    assert!(session.server_channel.crypt_in.is_some());
    assert!(session.server_channel.crypt_out.is_some());
}

#[test]
fn guild_card_rewrite_both_directions() {
    let dir = tempfile::tempdir().unwrap();
    let ctx = test_context(dir.path());
    let mut session = linked(test_session(Dialect::Gc, dir.path()));
    session.license = Some(Arc::new(License { serial_number: 2000, ..Default::default() }));
    session.remote_guild_card_number = 1000;

    // Server 41: both fields rewritten to the licensed serial
    let mut payload = vec![0u8; 0x20];
    put_u32_le(&mut payload, 4, 1000);
    put_u32_le(&mut payload, 8, 1000);
    broker::dispatch(&ctx, &mut session, true, Command::new(0x41, 0, payload)).unwrap();
    let frames = drain_frames(&mut session.client_channel, None);
    assert_eq!(frames.len(), 1);
    assert_eq!(get_u32_le(&frames[0].payload, 4), 2000);
    assert_eq!(get_u32_le(&frames[0].payload, 8), 2000);

    // Client 40: the reverse substitution
    let mut payload = vec![0u8; 12];
    put_u32_le(&mut payload, 4, 2000);
    put_u32_le(&mut payload, 8, 2000);
    broker::dispatch(&ctx, &mut session, false, Command::new(0x40, 0, payload)).unwrap();
    let frames = drain_frames(&mut session.server_channel, None);
    assert_eq!(frames.len(), 1);
    assert_eq!(get_u32_le(&frames[0].payload, 4), 1000);
    assert_eq!(get_u32_le(&frames[0].payload, 8), 1000);
}

#[test]
fn retarget_under_read_aliases_previous_frame() {
    let dir = tempfile::tempdir().unwrap();
    let ctx = test_context(dir.path());
    let mut session = test_session(Dialect::Gc, dir.path());
    session.prev_server_frame = *b"ZZZZZZZZZZZZZZZZ";

    broker::dispatch(&ctx, &mut session, true, Command::new(0x19, 0, vec![0xAA, 0xBB, 0xCC]))
        .unwrap();

    // The destination comes from the aliased bytes
    let dest = session.next_destination.unwrap();
    assert_eq!(dest.ip().to_string(), "170.187.204.90");
    assert_eq!(dest.port(), 0x5A5A);

    // The client sees the proxy's own address instead
    let frames = drain_frames(&mut session.client_channel, None);
    assert_eq!(frames.len(), 1);
    assert_eq!(frames[0].opcode, 0x19);
    assert_eq!(&frames[0].payload[..4], &[10, 0, 0, 5]);
    assert_eq!(get_u16_le(&frames[0].payload, 4), 9100);
}

#[test]
fn seeded_item_replaces_next_drop() {
    let dir = tempfile::tempdir().unwrap();
    let ctx = test_context(dir.path());
    let mut session = test_session(Dialect::Gc, dir.path());
    let mut item = ItemData::default();
    item.data1[0] = 0x01;
    item.data1[1] = 0x02;
    item.data1[2] = 0x03;
    session.next_drop_item = Some(item);

    // 6x60 enemy drop request: area 3, request 0x55, x 1.0, z 2.0
    let mut record = vec![0u8; 16];
    record[0] = 0x60;
    record[1] = 0x04;
    record[4] = 3;
    record[6..8].copy_from_slice(&0x55u16.to_le_bytes());
    record[8..12].copy_from_slice(&1.0f32.to_le_bytes());
    record[12..16].copy_from_slice(&2.0f32.to_le_bytes());
    broker::dispatch(&ctx, &mut session, true, Command::new(0x60, 0, record)).unwrap();

    assert!(session.next_drop_item.is_none());
    for channel in [&mut session.server_channel, &mut session.client_channel] {
        let frames = drain_frames(channel, None);
        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].opcode, 0x60);
        let payload = &frames[0].payload;
        assert_eq!(payload[0], 0x5F);
        assert_eq!(payload[4], 3);
        assert_eq!(get_u16_le(payload, 6), 0x55);
        assert_eq!(&payload[16..19], &[0x01, 0x02, 0x03]);
    }
}

fn bb_key(tag: u8) -> Arc<BbKeyFile> {
    let mut initial_keys = [0u8; BB_INITIAL_KEY_BYTES];
    for (i, byte) in initial_keys.iter_mut().enumerate() {
        *byte = (i as u8).wrapping_mul(13).wrapping_add(tag);
    }
    let mut private_keys = [0u32; BB_TABLE_WORDS];
    let mut state = 0x1234_5678u32 ^ (u32::from(tag) << 24);
    for word in private_keys.iter_mut() {
        state = state.wrapping_mul(0x0001_9660).wrapping_add(0x3C6E_F35F);
        *word = state;
    }
    Arc::new(BbKeyFile { initial_keys, private_keys })
}

#[test]
fn bb_detector_resolves_and_both_directions_flow() {
    let dir = tempfile::tempdir().unwrap();
    let mut ctx = test_context(dir.path());
    let keys = [bb_key(0), bb_key(1), bb_key(2)];
    ctx.bb_master_keys = keys.to_vec();

    let mut session = test_session(Dialect::Bb, dir.path());

    // Server 03 with both 48-byte seeds
    let mut payload = vec![0u8; 0xC0];
    payload[0x60..0x90].fill(0x51); // server seed
    payload[0x90..0xC0].fill(0x52); // client seed
    broker::dispatch(&ctx, &mut session, true, Command::new(0x03, 0, payload)).unwrap();

    // The 03 reached the client unencrypted
    let frames = drain_frames(&mut session.client_channel, None);
    assert_eq!(frames.len(), 1);
    assert_eq!(frames[0].opcode, 0x03);

    // The client logs in under key 1; its first frame resolves the detector
    let server_seed = [0x51u8; 48];
    let client_seed = [0x52u8; 48];
    let mut client_out = BbCipher::new(&keys[1], &client_seed, false);
    let mut login = header::frame(Dialect::Bb, 0x93, 0, &vec![0u8; 0xAC]).unwrap();
    client_out.encrypt(&mut login).unwrap();

    let commands = session.client_channel.receive_bytes(&login).unwrap();
    assert_eq!(commands.len(), 1);
    assert_eq!(commands[0].opcode, 0x93);
    for cmd in commands {
        broker::dispatch(&ctx, &mut session, false, cmd).unwrap();
    }

    // The forwarded login decrypts on the server leg under the resolved key
    let frames = drain_frames(
        &mut session.server_channel,
        Some(Box::new(BbCipher::new(&keys[1], &client_seed, false))),
    );
    assert_eq!(frames.len(), 1);
    assert_eq!(frames[0].opcode, 0x93);

    // Server traffic flows back through the imitators to the client
    let mut server_out = BbCipher::new(&keys[1], &server_seed, false);
    let mut frame = header::frame(Dialect::Bb, 0xE7, 0, &[0u8; 16]).unwrap();
    server_out.encrypt(&mut frame).unwrap();
    let commands = session.server_channel.receive_bytes(&frame).unwrap();
    assert_eq!(commands.len(), 1);
    for cmd in commands {
        broker::dispatch(&ctx, &mut session, true, cmd).unwrap();
    }
    let frames = drain_frames(
        &mut session.client_channel,
        Some(Box::new(BbCipher::new(&keys[1], &server_seed, true))),
    );
    assert_eq!(frames.len(), 1);
    assert_eq!(frames[0].opcode, 0xE7);
}

#[test]
fn bb_detector_failure_is_fatal_before_forwarding() {
    let dir = tempfile::tempdir().unwrap();
    let mut ctx = test_context(dir.path());
    ctx.bb_master_keys = vec![bb_key(0), bb_key(2)];

    let mut session = test_session(Dialect::Bb, dir.path());
    let mut payload = vec![0u8; 0xC0];
    payload[0x90..0xC0].fill(0x52);
    broker::dispatch(&ctx, &mut session, true, Command::new(0x03, 0, payload)).unwrap();
    session.client_channel.take_outgoing();

    // Login encrypted under a key the proxy does not know
    let client_seed = [0x52u8; 48];
    let mut rogue = BbCipher::new(&bb_key(1), &client_seed, false);
    let mut login = header::frame(Dialect::Bb, 0x93, 0, &vec![0u8; 0xAC]).unwrap();
    rogue.encrypt(&mut login).unwrap();

    assert!(session.client_channel.receive_bytes(&login).is_err());
    assert!(!session.server_channel.has_outgoing());
}

#[test]
fn bb_resumed_session_replays_saved_login() {
    let dir = tempfile::tempdir().unwrap();
    let mut ctx = test_context(dir.path());
    let keys = [bb_key(0), bb_key(1)];
    ctx.bb_master_keys = keys.to_vec();

    // Resolve a detector the way the earlier unlinked session would have
    let old_seed = [0x10u8; 48];
    let mut detector = revenant_crypto::DetectorCipher::new(
        keys.to_vec(),
        &revenant_crypto::multikey::EXPECTED_FIRST_FRAME,
        old_seed,
    );
    let mut first = header::frame(Dialect::Bb, 0x93, 0, &vec![0u8; 0xAC]).unwrap();
    let mut client_out = BbCipher::new(&keys[0], &old_seed, false);
    client_out.encrypt(&mut first).unwrap();
    detector.decrypt(&mut first).unwrap();

    let mut session = test_session(Dialect::Bb, dir.path());
    session.detector = Some(detector.resolution());
    session.bb_login_frame = vec![0x77u8; 0xA0];
    session.enable_remote_ip_crc_patch = true;
    session.remote_ip_crc = 0x0102_0304;

    // The new upstream's 03 rekeys the server leg and replays the login
    let mut payload = vec![0u8; 0xC0];
    payload[0x60..0x90].fill(0x61);
    payload[0x90..0xC0].fill(0x62);
    broker::dispatch(&ctx, &mut session, true, Command::new(0x03, 0, payload)).unwrap();

    // Nothing new reaches the client
    assert!(!session.client_channel.has_outgoing());

    let client_seed = [0x62u8; 48];
    let frames = drain_frames(
        &mut session.server_channel,
        Some(Box::new(BbCipher::new(&keys[0], &client_seed, false))),
    );
    assert_eq!(frames.len(), 1);
    assert_eq!(frames[0].opcode, 0x93);
    // The replay carries the CRC patch at 0x94
    let expected = 0x0102_0304u32 ^ 0x9BC4_B7BA;
    assert_eq!(get_u32_le(&frames[0].payload, 0x94), expected);
    assert_eq!(frames[0].payload[0x90], 0x77);
}

#[test]
fn chat_commands_are_intercepted() {
    let dir = tempfile::tempdir().unwrap();
    let ctx = test_context(dir.path());
    let mut session = test_session(Dialect::Gc, dir.path());

    // A $command never reaches the server
    let mut payload = vec![0u8; 8];
    payload.extend_from_slice(b"$warp 5\0");
    broker::dispatch(&ctx, &mut session, false, Command::new(0x06, 0, payload)).unwrap();
    assert!(!session.server_channel.has_outgoing());

    // A doubled sigil goes out as a literal chat line
    let mut payload = vec![0u8; 8];
    payload.extend_from_slice(b"$$hello\0");
    broker::dispatch(&ctx, &mut session, false, Command::new(0x06, 0, payload)).unwrap();
    let frames = drain_frames(&mut session.server_channel, None);
    assert_eq!(frames.len(), 1);
    assert_eq!(frames[0].opcode, 0x06);
    assert_eq!(&frames[0].payload[8..14], b"$hello");

    // Empty chat is suppressed outright
    let payload = vec![0u8; 12];
    broker::dispatch(&ctx, &mut session, false, Command::new(0x06, 0, payload)).unwrap();
    assert!(!session.server_channel.has_outgoing());
}

#[test]
fn linked_client_is_sent_home_on_ship_select() {
    let dir = tempfile::tempdir().unwrap();
    let ctx = test_context(dir.path());
    let mut session = linked(test_session(Dialect::Gc, dir.path()));
    session.lobby_client_id = 2;
    session.lobby_players[1].guild_card_number = 555;
    session.lobby_players[4].guild_card_number = 777;

    broker::dispatch(&ctx, &mut session, false, Command::new(0xA0, 0, Vec::new())).unwrap();

    // Nothing goes upstream; the client gets leaves, a message, the home
    // config and the redirect, in that order
    assert!(!session.server_channel.has_outgoing());
    let frames = drain_frames(&mut session.client_channel, None);
    assert_eq!(frames.len(), 5);
    assert_eq!(frames[0].opcode, 0x69);
    assert_eq!(frames[0].payload[0], 1);
    assert_eq!(frames[1].opcode, 0x69);
    assert_eq!(frames[1].payload[0], 4);
    assert_eq!(frames[2].opcode, 0x11);
    assert_eq!(frames[3].opcode, 0x04);
    assert_eq!(get_u32_le(&frames[3].payload, 4), 0xDEAD_BEEF);
    assert_eq!(frames[4].opcode, 0x19);
    // Redirected to the proxy's own address at the console login port
    assert_eq!(&frames[4].payload[..4], &[10, 0, 0, 5]);
    assert_eq!(get_u16_le(&frames[4].payload, 4), 9100);
}

#[test]
fn cheat_protect_rewrite() {
    let dir = tempfile::tempdir().unwrap();
    let ctx = test_context(dir.path());
    let mut session = test_session(Dialect::Gc, dir.path());

    broker::dispatch(&ctx, &mut session, true, Command::new(0x97, 0, Vec::new())).unwrap();

    assert!(session.flags.has(SessionFlags::SAVE_ENABLED));
    let frames = drain_frames(&mut session.client_channel, None);
    assert_eq!(frames.len(), 1);
    assert_eq!(frames[0].opcode, 0x97);
    assert_eq!(frames[0].flag, 1);
}

#[test]
fn lobby_join_tracks_roster_and_leader() {
    let dir = tempfile::tempdir().unwrap();
    let ctx = test_context(dir.path());
    let mut session = test_session(Dialect::Gc, dir.path());

    // Join-lobby with two players; the GC entry is 0x40 bytes with the
    // slot id at +12 and the name at +16
    let mut payload = vec![0u8; 12 + 2 * 0x40];
    payload[0] = 3; // our client id
    payload[1] = 7; // leader
    for (i, (slot, card, name)) in [(3u32, 111u32, b"Us\0"), (7u32, 222u32, b"Ld\0")]
        .iter()
        .enumerate()
    {
        let off = 12 + i * 0x40;
        put_u32_le(&mut payload, off + 4, *card);
        put_u32_le(&mut payload, off + 12, *slot);
        payload[off + 16..off + 16 + name.len()].copy_from_slice(&name[..]);
    }
    broker::dispatch(&ctx, &mut session, true, Command::new(0x67, 2, payload)).unwrap();

    assert_eq!(session.lobby_client_id, 3);
    assert_eq!(session.leader_client_id, 7);
    assert_eq!(session.lobby_players.len(), 12);
    assert_eq!(session.lobby_players[3].guild_card_number, 111);
    assert_eq!(session.lobby_players[7].guild_card_number, 222);
    assert_eq!(session.lobby_players[7].name, "Ld");
    session.client_channel.take_outgoing();

    // The leader leaves; slot 7 empties and we become leader (with a
    // notification queued for the client)
    broker::dispatch(&ctx, &mut session, true, Command::new(0x69, 7, vec![7, 3, 0, 0])).unwrap();
    assert_eq!(session.lobby_players[7].guild_card_number, 0);
    assert_eq!(session.leader_client_id, 3);
    let frames = drain_frames(&mut session.client_channel, None);
    // Notification first, then the forwarded leave
    assert_eq!(frames.len(), 2);
    assert_eq!(frames[0].opcode, 0x06);
    assert_eq!(frames[1].opcode, 0x69);
}
