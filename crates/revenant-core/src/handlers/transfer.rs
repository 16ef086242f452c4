//! File-capture handlers: quest files, card lists, execute-code blobs and
//! player snapshots.
//!
//! Capture failures are transient by contract: they log at WARN and the
//! frame keeps flowing. Only frames the proxy must interpret (a malformed
//! execute-code envelope) can fail the session.

use revenant_crypto::V2Cipher;
use revenant_files::capture::timestamp_us;
use revenant_files::prs;
use revenant_proto::payloads::login::build_b3;
use revenant_proto::payloads::transfer::{card_list_body, ExecuteCode, OpenFile, WriteFile};
use revenant_proto::{Command, Dialect};

use crate::context::ProxyContext;
use crate::error::SessionError;
use crate::handlers::HandlerAction;
use crate::session::{Session, SessionFlags};

/// Server `44`/`A6` OpenFile: start a chunked capture
pub fn server_44_a6(
    _ctx: &ProxyContext,
    session: &mut Session,
    cmd: &mut Command,
) -> Result<HandlerAction, SessionError> {
    if !session.options.save_files {
        return Ok(HandlerAction::Forward);
    }
    let (filename, file_size) = {
        let view = OpenFile::parse(session.dialect, &cmd.payload)?;
        (view.filename(), view.file_size())
    };
    let is_download = cmd.opcode_byte() == 0xA6;
    match session.capture.open_file(&filename, file_size, is_download) {
        Ok(path) => tracing::info!(path = %path.display(), "opened capture file"),
        Err(err) => tracing::warn!(%err, %filename, "failed to open capture file"),
    }
    Ok(HandlerAction::Forward)
}

/// Server `13`/`A7` WriteFile: append one chunk
pub fn server_13_a7(
    _ctx: &ProxyContext,
    session: &mut Session,
    cmd: &mut Command,
) -> Result<HandlerAction, SessionError> {
    if !session.options.save_files {
        return Ok(HandlerAction::Forward);
    }
    let view = WriteFile::parse(&cmd.payload)?;
    let filename = view.filename();
    if view.data_size() as usize > view.chunk().len() {
        tracing::warn!(%filename, size = view.data_size(), "chunk size invalid; truncating");
    }
    match session.capture.write_chunk(&filename, view.chunk()) {
        Ok(Some(path)) => tracing::info!(path = %path.display(), "capture file complete"),
        Ok(None) => {}
        Err(err) => tracing::warn!(%err, %filename, "failed to append capture chunk"),
    }
    Ok(HandlerAction::Forward)
}

/// GC `B8`: persist the card list body behind its length prefix
pub fn server_gc_b8(
    _ctx: &ProxyContext,
    session: &mut Session,
    cmd: &mut Command,
) -> Result<HandlerAction, SessionError> {
    if !session.options.save_files {
        return Ok(HandlerAction::Forward);
    }
    match card_list_body(&cmd.payload) {
        Ok(body) => {
            let name = format!("cardupdate.{}.mnr", timestamp_us());
            match session.capture.save_blob(&name, body) {
                Ok(path) => {
                    tracing::info!(bytes = body.len(), path = %path.display(), "wrote card list")
                }
                Err(err) => tracing::warn!(%err, "failed to write card list"),
            }
        }
        Err(err) => tracing::warn!(%err, "card list data malformed; not saving"),
    }
    Ok(HandlerAction::Forward)
}

/// Recover the plaintext code blob from an encrypted execute-code envelope:
/// `{decompressed_size: u32, key: u32}` then a V2-encrypted PRS stream.
/// GC and DC accumulate the cipher words big-endian.
fn decode_encrypted_code(
    dialect: Dialect,
    code: &[u8],
) -> Result<Vec<u8>, SessionError> {
    if code.len() < 8 {
        return Err(SessionError::Proto(revenant_proto::ProtoError::TooShort {
            expected: 8,
            actual: code.len(),
        }));
    }
    let big_endian = matches!(dialect, Dialect::Gc | Dialect::Dc);
    let read_u32 = |chunk: &[u8]| {
        let bytes = [chunk[0], chunk[1], chunk[2], chunk[3]];
        if big_endian {
            u32::from_be_bytes(bytes)
        } else {
            u32::from_le_bytes(bytes)
        }
    };
    let decompressed_size = read_u32(&code[0..4]) as usize;
    let key = read_u32(&code[4..8]);

    let mut crypt = V2Cipher::new(key);
    let mut body = code[8..].to_vec();
    if big_endian {
        for chunk in body.chunks_exact_mut(4) {
            let word = read_u32(chunk) ^ crypt.next_key();
            chunk.copy_from_slice(&word.to_be_bytes());
        }
    } else {
        use revenant_crypto::PsoCipher;
        crypt.decrypt(&mut body)?;
    }

    let mut plain = prs::decompress(&body)?;
    if decompressed_size < plain.len() {
        plain.truncate(decompressed_size);
    } else if decompressed_size > plain.len() {
        return Err(SessionError::CodeSizeMismatch);
    }
    Ok(plain)
}

/// Server `B2` execute-code: capture (and optionally annotate) the blob,
/// then either forward it or answer on the client's behalf
pub fn server_b2(
    ctx: &ProxyContext,
    session: &mut Session,
    cmd: &mut Command,
) -> Result<HandlerAction, SessionError> {
    let code_size = {
        let view = ExecuteCode::parse(&cmd.payload)?;
        view.code_size() as usize
    };

    if code_size > 0 && session.options.save_files {
        let raw = {
            let view = ExecuteCode::parse(&cmd.payload)?;
            view.code().to_vec()
        };
        let code = if session.flags.has(SessionFlags::ENCRYPTED_SEND_FUNCTION_CALL) {
            decode_encrypted_code(session.dialect, &raw)?
        } else {
            let mut code = raw;
            if code.len() < code_size {
                code.resize(code_size, 0);
            }
            code
        };

        let stamp = timestamp_us();
        match session.capture.save_blob(&format!("code.{stamp}.bin"), &cmd.payload) {
            Ok(path) => tracing::info!(path = %path.display(), "wrote code from server"),
            Err(err) => tracing::warn!(%err, "failed to write code blob"),
        }

        if let Some(annotator) = ctx.code_annotator.as_ref() {
            match annotator.disassemble(&code) {
                Some(listing) => {
                    match session.capture.save_blob(&format!("code.{stamp}.txt"), listing.as_bytes())
                    {
                        Ok(path) => tracing::info!(path = %path.display(), "wrote disassembly"),
                        Err(err) => tracing::warn!(%err, "failed to write disassembly"),
                    }
                }
                None => tracing::info!("code blob could not be disassembled"),
            }
        }
    }

    if let Some(return_value) = session.function_call_return_value {
        tracing::info!(return_value, "answering execute-code on the client's behalf");
        session.server_channel.send(0xB3, cmd.flag, &build_b3(return_value))?;
        return Ok(HandlerAction::Suppress);
    }
    Ok(HandlerAction::Forward)
}

/// BB `E7`: persist the player-data snapshot
pub fn server_e7(
    _ctx: &ProxyContext,
    session: &mut Session,
    cmd: &mut Command,
) -> Result<HandlerAction, SessionError> {
    if session.options.save_files {
        let name = format!("player.{}.bin", timestamp_us());
        match session.capture.save_blob(&name, &cmd.payload) {
            Ok(path) => tracing::info!(path = %path.display(), "wrote player data"),
            Err(err) => tracing::warn!(%err, "failed to write player data"),
        }
    }
    Ok(HandlerAction::Forward)
}
