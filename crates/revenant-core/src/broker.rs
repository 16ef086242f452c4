//! The per-session broker: dispatch of one frame through the handler
//! table, and the async driver that owns a session for its whole life.
//!
//! The driver is cooperative and single-threaded per session: it reads from
//! whichever leg is ready, pushes each complete frame through the table,
//! then flushes whatever the handlers queued. Handlers never suspend; all
//! their I/O is synchronous and counts against this session's latency.

use std::sync::Arc;

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::TcpStream;

use revenant_proto::Command;

use crate::context::ProxyContext;
use crate::error::SessionError;
use crate::handlers::HandlerAction;
use crate::session::Session;
use crate::table;

/// Push one received frame through the handler table and forward, rewrite
/// or suppress it accordingly
///
/// # Errors
///
/// Propagates handler failures; the caller must drop the session on any
/// error (frames after a failed one must never be forwarded).
pub fn dispatch(
    ctx: &ProxyContext,
    session: &mut Session,
    from_server: bool,
    mut cmd: Command,
) -> Result<(), SessionError> {
    // Keep the head of sizeable server frames around; deliberately
    // undersized retarget frames alias into them
    if from_server && cmd.payload.len() >= session.prev_server_frame.len() {
        let len = session.prev_server_frame.len();
        session.prev_server_frame.copy_from_slice(&cmd.payload[..len]);
    }

    let handler = table::global().lookup(session.dialect, from_server, cmd.opcode_byte());
    let action = handler(ctx, session, &mut cmd)?;
    match action {
        HandlerAction::Forward => {
            forward(session, from_server, cmd.opcode, cmd.flag, &cmd.payload)?;
        }
        HandlerAction::Modified { opcode, flag } => {
            tracing::debug!(
                opcode = cmd.opcode,
                from_server,
                "command modified in transit"
            );
            forward(
                session,
                from_server,
                opcode.unwrap_or(cmd.opcode),
                flag.unwrap_or(cmd.flag),
                &cmd.payload,
            )?;
        }
        HandlerAction::Suppress => {
            tracing::debug!(opcode = cmd.opcode, from_server, "command not forwarded");
        }
    }
    Ok(())
}

fn forward(
    session: &mut Session,
    from_server: bool,
    opcode: u16,
    flag: u32,
    payload: &[u8],
) -> Result<(), SessionError> {
    let channel = if from_server {
        &mut session.client_channel
    } else {
        &mut session.server_channel
    };
    channel.send(opcode, flag, payload)
}

/// Drive a session until either leg closes or a handler fails
///
/// The client leg is generic so virtual (in-process) clients drive the same
/// loop as socket-backed ones; the server leg is always a real socket and
/// may be absent until the first retarget connects it.
///
/// # Errors
///
/// Returns the first fatal error; both legs are closed on return and
/// buffered bytes are discarded.
pub async fn run_session<C>(
    ctx: Arc<ProxyContext>,
    mut session: Session,
    mut client: C,
    mut server: Option<TcpStream>,
) -> Result<(), SessionError>
where
    C: AsyncRead + AsyncWrite + Unpin,
{
    let mut client_buf = vec![0u8; 0x4000];
    let mut server_buf = vec![0u8; 0x4000];

    loop {
        if session.pending_server_reconnect {
            session.pending_server_reconnect = false;
            let Some(dest) = session.next_destination else {
                return Err(SessionError::ChannelClosed("server (no destination)"));
            };
            let stream = TcpStream::connect(dest).await?;
            session.server_channel.detach();
            session.server_channel.attach(stream.local_addr().ok(), false);
            server = Some(stream);
            tracing::info!(session = session.id, %dest, "server leg reconnected");
        }

        if session.client_channel.has_outgoing() {
            let bytes = session.client_channel.take_outgoing();
            client.write_all(&bytes).await?;
        }
        if session.server_channel.has_outgoing() {
            if let Some(stream) = server.as_mut() {
                let bytes = session.server_channel.take_outgoing();
                stream.write_all(&bytes).await?;
            }
        }

        let (n, from_server) = {
            let server_read = async {
                match server.as_mut() {
                    Some(stream) => stream.read(&mut server_buf).await,
                    None => std::future::pending().await,
                }
            };
            tokio::select! {
                result = client.read(&mut client_buf) => (result?, false),
                result = server_read => (result?, true),
            }
        };

        if n == 0 {
            return Err(SessionError::ChannelClosed(if from_server { "server" } else { "client" }));
        }

        let commands = if from_server {
            session.server_channel.receive_bytes(&server_buf[..n])?
        } else {
            session.client_channel.receive_bytes(&client_buf[..n])?
        };
        for cmd in commands {
            dispatch(&ctx, &mut session, from_server, cmd)?;
        }
    }
}
