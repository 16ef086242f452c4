//! Handshake handlers: server-init frames on every dialect, the BB
//! pre-auth fingerprint and the GC re-login request.
//!
//! These are the only handlers that touch the cipher slots. The rule the
//! rest of the session depends on: a frame the client must read in the
//! clear is forwarded before its ciphers are installed, and a linked
//! session never disturbs the client leg at all.

use revenant_crypto::multikey::{DetectorCipher, ImitatorCipher, EXPECTED_FIRST_FRAME};
use revenant_crypto::{PsoCipher, V2Cipher, V3Cipher};
use revenant_proto::hash::fnv1a64;
use revenant_proto::payloads::handshake::{ServerInitBb, ServerInitV2V3};
use revenant_proto::payloads::login::{self, LoginCredentials};
use revenant_proto::{Command, Dialect};

use crate::context::ProxyContext;
use crate::error::SessionError;
use crate::handlers::HandlerAction;
use crate::session::{Session, SessionFlags};

/// Fingerprint of the pre-auth `22` frame sent by servers that checksum the
/// retarget address
const REMOTE_IP_CRC_FINGERPRINT: u64 = 0x8AF8_3143_16A2_7994;

/// Mask XORed over the address CRC when replaying a saved BB login
const REMOTE_IP_CRC_MASK: u32 = 0x9BC4_B7BA;

fn make_cipher(dialect: Dialect, seed: u32) -> Box<dyn PsoCipher> {
    if dialect.uses_v3_crypt() {
        Box::new(V3Cipher::new(seed))
    } else {
        Box::new(V2Cipher::new(seed))
    }
}

fn credentials(session: &Session) -> Option<LoginCredentials> {
    let license = session.license.as_ref()?;
    Some(LoginCredentials {
        guild_card_number: (session.remote_guild_card_number != 0)
            .then_some(session.remote_guild_card_number),
        serial_number: license.serial_number,
        access_key: license.access_key.clone(),
        sub_version: session.sub_version,
        language: session.language,
        name: session.character_name.clone(),
    })
}

/// `02`/`17` ServerInit on the V2/V3 dialects and the patch server
pub fn server_init_v2_v3(
    ctx: &ProxyContext,
    session: &mut Session,
    cmd: &mut Command,
) -> Result<HandlerAction, SessionError> {
    if session.dialect == Dialect::Patch && cmd.opcode_byte() == 0x17 {
        return Err(SessionError::PatchServerInit17);
    }

    let (server_key, client_key) = {
        let init = ServerInitV2V3::parse(&cmd.payload)?;
        (init.server_key(), init.client_key())
    };

    if !session.is_linked() {
        tracing::info!("unlinked session: mirroring handshake to the client");
        // The client must read this frame in the clear, so forward it
        // before any cipher exists on its leg
        session.client_channel.send(cmd.opcode, cmd.flag, &cmd.payload)?;

        session.server_channel.crypt_in = Some(make_cipher(session.dialect, server_key));
        session.server_channel.crypt_out = Some(make_cipher(session.dialect, client_key));
        session.client_channel.crypt_in = Some(make_cipher(session.dialect, client_key));
        session.client_channel.crypt_out = Some(make_cipher(session.dialect, server_key));
        return Ok(HandlerAction::Suppress);
    }

    tracing::info!("linked session: impersonating the client upstream");
    // The client keeps the ciphers from its original handshake; only the
    // server leg is rekeyed
    session.server_channel.crypt_in = Some(make_cipher(session.dialect, server_key));
    session.server_channel.crypt_out = Some(make_cipher(session.dialect, client_key));

    match session.dialect {
        Dialect::Patch => {
            session.server_channel.send(0x02, 0, &[])?;
            Ok(HandlerAction::Suppress)
        }
        Dialect::Dc | Dialect::Pc => {
            let creds = linked_credentials(session)?;
            if session.flags.has(SessionFlags::DC_V1) {
                let payload = login::build_93(&creds, session.hardware_id);
                session.server_channel.send(0x93, 0, &payload)?;
            } else {
                let payload = login::build_9d(&creds);
                session.server_channel.send(0x9D, 0, &payload)?;
            }
            Ok(HandlerAction::Suppress)
        }
        Dialect::Gc => {
            if cmd.opcode_byte() == 0x17 {
                let creds = linked_credentials(session)?;
                let license = session.license.as_ref().map(|l| l.gc_password.clone());
                let payload = login::build_db(&creds, license.as_deref().unwrap_or(""));
                session.server_channel.send(0xDB, 0, &payload)?;
                Ok(HandlerAction::Suppress)
            } else {
                // A 02 on GC skips licence verification; answer as if the
                // server had asked us to log in again
                server_gc_9a(ctx, session, cmd)
            }
        }
        Dialect::Xb => Err(SessionError::UnsupportedLicence("xb")),
        Dialect::Bb => Err(SessionError::UnsupportedLicence("bb handshake on v2/v3 path")),
    }
}

/// GC `9A`: the server asks the client to log in again; a linked session
/// answers with a licence-backed `9E` instead of letting the client see it
pub fn server_gc_9a(
    _ctx: &ProxyContext,
    session: &mut Session,
    _cmd: &mut Command,
) -> Result<HandlerAction, SessionError> {
    let Some(creds) = credentials(session) else {
        return Ok(HandlerAction::Forward);
    };
    let payload = login::build_9e(&creds, &session.remote_client_config);
    session.server_channel.send(0x9E, 0x01, &payload)?;
    Ok(HandlerAction::Suppress)
}

/// BB `03` ServerInit
pub fn server_init_bb(
    ctx: &ProxyContext,
    session: &mut Session,
    cmd: &mut Command,
) -> Result<HandlerAction, SessionError> {
    let (server_key, client_key) = {
        let init = ServerInitBb::parse(&cmd.payload)?;
        (init.server_key(), init.client_key())
    };

    if let Some(resolution) = session.detector.clone() {
        // Resumed from an unlinked session: the client already holds its
        // ciphers and believes it logged in; rekey the server leg with
        // imitators bound to the existing detector and replay the login
        if session.bb_login_frame.is_empty() {
            return Err(SessionError::MissingBbLogin);
        }
        session.server_channel.crypt_in =
            Some(Box::new(ImitatorCipher::new(resolution.clone(), server_key, false)));
        session.server_channel.crypt_out =
            Some(Box::new(ImitatorCipher::new(resolution, client_key, false)));

        let mut replay = session.bb_login_frame.clone();
        if session.enable_remote_ip_crc_patch && replay.len() >= 0x98 {
            let patched = session.remote_ip_crc ^ REMOTE_IP_CRC_MASK;
            replay[0x94..0x98].copy_from_slice(&patched.to_le_bytes());
        }
        session.server_channel.send(0x93, 0, &replay)?;
        return Ok(HandlerAction::Suppress);
    }

    // Fresh session: the client sees the unencrypted key material, then
    // every leg gets a multi-key cipher. The client's input slot is the
    // detector itself; everything else imitates its eventual choice.
    session.client_channel.send(cmd.opcode, cmd.flag, &cmd.payload)?;

    let detector =
        DetectorCipher::new(ctx.bb_master_keys.clone(), &EXPECTED_FIRST_FRAME, client_key);
    let resolution = detector.resolution();
    session.detector = Some(resolution.clone());

    session.client_channel.crypt_in = Some(Box::new(detector));
    session.client_channel.crypt_out =
        Some(Box::new(ImitatorCipher::new(resolution.clone(), server_key, true)));
    session.server_channel.crypt_in =
        Some(Box::new(ImitatorCipher::new(resolution.clone(), server_key, false)));
    session.server_channel.crypt_out =
        Some(Box::new(ImitatorCipher::new(resolution, client_key, false)));

    Ok(HandlerAction::Suppress)
}

/// BB client `93`: keep a copy of the login payload so a later server-leg
/// rekey can replay it without the client's help
pub fn client_bb_93(
    _ctx: &ProxyContext,
    session: &mut Session,
    cmd: &mut Command,
) -> Result<HandlerAction, SessionError> {
    session.bb_login_frame = cmd.payload.clone();
    Ok(HandlerAction::Forward)
}

/// BB `22`: short pre-handshake identification some servers send; its
/// fingerprint tells us the server will checksum the retarget address later
pub fn server_bb_preauth(
    _ctx: &ProxyContext,
    session: &mut Session,
    cmd: &mut Command,
) -> Result<HandlerAction, SessionError> {
    if cmd.payload.len() == 0x2C && fnv1a64(&cmd.payload) == REMOTE_IP_CRC_FINGERPRINT {
        tracing::info!("enabling remote IP CRC patch");
        session.enable_remote_ip_crc_patch = true;
    }
    Ok(HandlerAction::Forward)
}

fn linked_credentials(session: &Session) -> Result<LoginCredentials, SessionError> {
    credentials(session)
        .ok_or(SessionError::UnsupportedLicence("missing licence in linked handshake"))
}
