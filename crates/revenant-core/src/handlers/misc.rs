//! Remaining handlers: cheat-protection rewrite, message-box confirmation
//! shortcuts and client chat.

use revenant_proto::payloads::chat::{TextHeader, TEXT_BODY_OFFSET};
use revenant_proto::{text, Command, Dialect};

use crate::context::ProxyContext;
use crate::error::SessionError;
use crate::handlers::HandlerAction;
use crate::session::{Session, SessionFlags};

/// Server `97` cheat-protect: remember that saving is allowed and make
/// sure the client is always told so
pub fn server_97(
    _ctx: &ProxyContext,
    session: &mut Session,
    cmd: &mut Command,
) -> Result<HandlerAction, SessionError> {
    session.flags.set(SessionFlags::SAVE_ENABLED);
    if cmd.flag == 0 {
        return Ok(HandlerAction::Modified { opcode: Some(0x97), flag: Some(0x01) });
    }
    Ok(HandlerAction::Forward)
}

/// Server `1A`/`D5` large message box: if the client no longer confirms
/// closures, confirm on its behalf so the remote server does not stall
pub fn server_1a_d5(
    _ctx: &ProxyContext,
    session: &mut Session,
    _cmd: &mut Command,
) -> Result<HandlerAction, SessionError> {
    if matches!(session.dialect, Dialect::Gc | Dialect::Xb)
        && session.flags.has(SessionFlags::NO_MESSAGE_BOX_CONFIRM)
    {
        session.server_channel.send(0xD6, 0, &[])?;
    }
    Ok(HandlerAction::Forward)
}

/// Client `06` chat: command dispatch, the `$$` literal escape, empty-chat
/// suppression and the optional color-tag filter
pub fn client_06(
    ctx: &ProxyContext,
    session: &mut Session,
    cmd: &mut Command,
) -> Result<HandlerAction, SessionError> {
    if cmd.payload.len() < TEXT_BODY_OFFSET + 4 {
        return Ok(HandlerAction::Forward);
    }

    let message = {
        let view = TextHeader::parse(&mut cmd.payload)?;
        view.decode_text(session.dialect)
    };
    if message.is_empty() {
        return Ok(HandlerAction::Suppress);
    }

    let chars: Vec<char> = message.chars().collect();
    let is_command = chars[0] == '$'
        || (chars[0] == '\t' && chars.get(1) != Some(&'C') && chars.get(2) == Some(&'$'));
    if is_command {
        // Strip the color prefix a console client puts in front
        let body: String = if chars[0] == '$' {
            message
        } else {
            chars[2..].iter().collect()
        };
        if body.starts_with("$$") {
            // Doubled sigil: the player wanted a literal $ chat line
            let literal = &body[1..];
            let mut payload = vec![0u8; TEXT_BODY_OFFSET];
            payload.extend_from_slice(&text::encode(session.dialect, literal));
            while payload.len() % 4 != 0 {
                payload.push(0);
            }
            session.server_channel.send(0x06, 0, &payload)?;
        } else if let Some(line) = body.strip_prefix('$') {
            ctx.chat_commands.handle(session, line)?;
        }
        return Ok(HandlerAction::Suppress);
    }

    if session.options.enable_chat_filter {
        let mut body = cmd.payload[TEXT_BODY_OFFSET..].to_vec();
        if text::add_color_inplace(session.dialect, &mut body) {
            cmd.payload.truncate(TEXT_BODY_OFFSET);
            cmd.payload.extend_from_slice(&body);
            return Ok(HandlerAction::modified());
        }
    }
    Ok(HandlerAction::Forward)
}
