//! Per-connection worker: registers the session, decodes one message at a
//! time, and routes it through the dispatcher until disconnect.

use std::{net::SocketAddr, sync::Arc};

use common::{
    net::{MessageType, NetError, Packet, StreamReader, StreamWriter},
    utils::net::send_packet,
};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::Mutex as AsyncMutex;
use tracing::{info, warn};

use crate::{
    data::{self, ServerCtx},
    handlers::process_request,
};

/// Accept loop: one spawned worker per inbound connection.
pub async fn serve(listener: TcpListener, ctx: Arc<ServerCtx>) {
    loop {
        match listener.accept().await {
            Ok((stream, addr)) => {
                let ctx = ctx.clone();
                tokio::spawn(async move { handle_client(ctx, stream, addr).await });
            }
            Err(e) => {
                warn!(error = %e, "failed to accept connection");
                continue;
            }
        }
    }
}

/// Handle a new client connection
pub async fn handle_client(ctx: Arc<ServerCtx>, stream: TcpStream, addr: SocketAddr) {
    let conn_id = data::next_conn_id();
    let (rd, wt) = stream.into_split();
    let rd: StreamReader = Arc::new(AsyncMutex::new(rd));
    let wt: StreamWriter = Arc::new(AsyncMutex::new(wt));

    // Refuse explicitly when the table is full instead of serving a
    // connection that has no session.
    if !data::add_session(conn_id, addr.ip().to_string()) {
        warn!(%addr, "session table full, refusing connection");
        let _ = send_packet(
            &wt,
            &Packet::text(MessageType::Error, "Server is full, try again later"),
        )
        .await;
        return;
    }
    info!(%addr, conn_id, "new connection");

    loop {
        let packet = match common::utils::net::recv_packet(&rd).await {
            Ok(packet) => packet,
            Err(NetError::Closed) => break,
            Err(e) => {
                // Malformed header, oversized payload, torn frame: fatal
                // to the connection.
                warn!(conn_id, error = %e, "transport error, dropping connection");
                break;
            }
        };

        if packet.kind == MessageType::Disconnect {
            break;
        }

        if let Err(e) = process_request(&ctx, conn_id, &rd, &wt, packet).await {
            warn!(conn_id, error = %e, "failed to respond, dropping connection");
            break;
        }
    }

    data::remove_session(conn_id);
    info!(conn_id, "client disconnected");
}
