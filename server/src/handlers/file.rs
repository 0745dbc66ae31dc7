//! File-system and transfer handlers.
//!
//! Every mutation requires an authenticated session, and group-scoped
//! paths are checked against the membership store before the engine runs:
//! write-class operations need an accepted member, rename/delete of a
//! group-owned path need the owner.

use std::{io::Read, io::Write, sync::Arc};

use common::{
    net::{MessageType, NetError, Packet, StreamReader, StreamWriter, BUFFER_SIZE},
    utils::net::{recv_packet, send_packet},
};
use tracing::{info, warn};

use crate::{
    data::ServerCtx,
    fsops::FileEngine,
    handlers::auth::logged_in_session,
    types::Session,
};

async fn send_error(wt: &StreamWriter, msg: &str) -> Result<(), NetError> {
    send_packet(wt, &Packet::text(MessageType::Error, msg)).await
}

async fn send_success(wt: &StreamWriter, msg: String) -> Result<(), NetError> {
    send_packet(wt, &Packet::text(MessageType::Success, msg)).await
}

/// Write-class access: a group-scoped path demands accepted membership.
/// Non-group paths are unrestricted.
fn check_write_access(ctx: &ServerCtx, session: &Session, rel: &str) -> Result<(), String> {
    let Some(group_id) = FileEngine::group_scope(rel) else {
        return Ok(());
    };
    match ctx.groups.is_accepted_member(group_id, session.user_id) {
        Ok(true) => Ok(()),
        Ok(false) => {
            warn!(
                username = %session.username,
                group_id,
                path = rel,
                "write access denied on group path"
            );
            Err("Access denied: not a group member".to_string())
        }
        Err(e) => {
            warn!(error = %e, "group store failure during access check");
            Err("Database error".to_string())
        }
    }
}

/// Destructive-identity access: rename/delete of a group-owned path is
/// owner-only.
fn check_owner_access(ctx: &ServerCtx, session: &Session, rel: &str) -> Result<(), String> {
    let Some(group_id) = FileEngine::group_scope(rel) else {
        return Ok(());
    };
    match ctx.groups.is_owner(group_id, session.user_id) {
        Ok(true) => Ok(()),
        Ok(false) => {
            warn!(
                username = %session.username,
                group_id,
                path = rel,
                "owner-only access denied on group path"
            );
            Err("Access denied: group owner only".to_string())
        }
        Err(e) => {
            warn!(error = %e, "group store failure during access check");
            Err("Database error".to_string())
        }
    }
}

pub async fn handle_list_files(
    ctx: &Arc<ServerCtx>,
    wt: &StreamWriter,
    payload: &str,
) -> Result<(), NetError> {
    match ctx.engine.list(payload.trim()) {
        Ok(listing) => super::send_listing(wt, &listing).await,
        Err(e) => send_error(wt, &e.to_string()).await,
    }
}

pub async fn handle_create_folder(
    ctx: &Arc<ServerCtx>,
    conn_id: u64,
    wt: &StreamWriter,
    payload: &str,
) -> Result<(), NetError> {
    let Some(session) = logged_in_session(conn_id) else {
        return send_error(wt, "Login required").await;
    };
    let rel = payload.trim();
    if rel.is_empty() {
        return send_error(wt, "Usage: MKDIR <name>").await;
    }
    if let Err(msg) = check_write_access(ctx, &session, rel) {
        return send_error(wt, &msg).await;
    }

    match ctx.engine.create_folder(rel) {
        Ok(()) => {
            info!(username = %session.username, path = rel, "folder created");
            send_success(wt, "Folder created.".to_string()).await
        }
        Err(e) => send_error(wt, &e.to_string()).await,
    }
}

pub async fn handle_delete_item(
    ctx: &Arc<ServerCtx>,
    conn_id: u64,
    wt: &StreamWriter,
    payload: &str,
) -> Result<(), NetError> {
    let Some(session) = logged_in_session(conn_id) else {
        return send_error(wt, "Login required").await;
    };
    let rel = payload.trim();
    if rel.is_empty() {
        return send_error(wt, "Usage: DELETE <item>").await;
    }
    if let Err(msg) = check_owner_access(ctx, &session, rel) {
        return send_error(wt, &msg).await;
    }

    match ctx.engine.delete(rel) {
        Ok(()) => {
            info!(username = %session.username, path = rel, "item deleted");
            send_success(wt, "Item deleted.".to_string()).await
        }
        Err(e) => send_error(wt, &e.to_string()).await,
    }
}

pub async fn handle_rename_item(
    ctx: &Arc<ServerCtx>,
    conn_id: u64,
    wt: &StreamWriter,
    payload: &str,
) -> Result<(), NetError> {
    let Some(session) = logged_in_session(conn_id) else {
        return send_error(wt, "Login required").await;
    };
    let mut it = payload.split_whitespace();
    let (Some(old), Some(new)) = (it.next(), it.next()) else {
        return send_error(wt, "Usage: RENAME <old_name> <new_name>").await;
    };
    if let Err(msg) = check_owner_access(ctx, &session, old) {
        return send_error(wt, &msg).await;
    }

    match ctx.engine.rename(old, new) {
        Ok(()) => {
            info!(username = %session.username, from = old, to = new, "item renamed");
            send_success(wt, "Renamed successfully.".to_string()).await
        }
        Err(e) => send_error(wt, &e.to_string()).await,
    }
}

pub async fn handle_move_item(
    ctx: &Arc<ServerCtx>,
    conn_id: u64,
    wt: &StreamWriter,
    payload: &str,
) -> Result<(), NetError> {
    let Some(session) = logged_in_session(conn_id) else {
        return send_error(wt, "Login required").await;
    };
    let mut it = payload.split_whitespace();
    let (Some(src), Some(dst)) = (it.next(), it.next()) else {
        return send_error(wt, "Usage: MOVE <source> <destination>").await;
    };
    // Source and destination group scopes are checked independently.
    if let Err(msg) = check_write_access(ctx, &session, src) {
        return send_error(wt, &msg).await;
    }
    if let Err(msg) = check_write_access(ctx, &session, dst) {
        return send_error(wt, &msg).await;
    }

    match ctx.engine.move_item(src, dst) {
        Ok(()) => {
            info!(username = %session.username, from = src, to = dst, "item moved");
            send_success(wt, "Moved successfully.".to_string()).await
        }
        Err(e) => send_error(wt, &e.to_string()).await,
    }
}

pub async fn handle_copy_item(
    ctx: &Arc<ServerCtx>,
    conn_id: u64,
    wt: &StreamWriter,
    payload: &str,
) -> Result<(), NetError> {
    let Some(session) = logged_in_session(conn_id) else {
        return send_error(wt, "Login required").await;
    };
    let mut it = payload.split_whitespace();
    let (Some(src), Some(dst)) = (it.next(), it.next()) else {
        return send_error(wt, "Usage: COPY <source> <destination>").await;
    };
    // Only the destination is a write; reads are not group-gated.
    if let Err(msg) = check_write_access(ctx, &session, dst) {
        return send_error(wt, &msg).await;
    }

    match ctx.engine.copy_item(src, dst) {
        Ok(()) => {
            info!(username = %session.username, from = src, to = dst, "item copied");
            send_success(wt, "Copied successfully.".to_string()).await
        }
        Err(e) => send_error(wt, &e.to_string()).await,
    }
}

/// UPLOAD_REQ: payload is `"<name> <declared_size>"`. The declared size is
/// informational only; the true length is whatever arrives before
/// FILE_END. The destination file stays exclusively locked for the whole
/// receive loop.
pub async fn handle_upload(
    ctx: &Arc<ServerCtx>,
    conn_id: u64,
    rd: &StreamReader,
    wt: &StreamWriter,
    payload: &str,
) -> Result<(), NetError> {
    let Some(session) = logged_in_session(conn_id) else {
        return send_error(wt, "Login required").await;
    };
    let mut it = payload.split_whitespace();
    let Some(name) = it.next() else {
        return send_error(wt, "Usage: UPLOAD <file> <size>").await;
    };
    let declared_size: Option<u64> = it.next().and_then(|s| s.parse().ok());

    if let Err(msg) = check_write_access(ctx, &session, name) {
        return send_error(wt, &msg).await;
    }

    let mut file = match ctx.engine.create_upload(name) {
        Ok(file) => file,
        Err(e) => return send_error(wt, &e.to_string()).await,
    };

    send_success(wt, "Ready to receive".to_string()).await?;

    let mut total: u64 = 0;
    loop {
        let packet = recv_packet(rd).await?;
        match packet.kind {
            MessageType::FileData => {
                if let Err(e) = file.write_all(&packet.payload) {
                    warn!(file = name, error = %e, "upload write failed");
                    drop(file);
                    let _ = ctx.engine.delete(name);
                    return send_packet(
                        wt,
                        &Packet::text(MessageType::FileError, "Server write failed"),
                    )
                    .await;
                }
                total += packet.payload.len() as u64;
            }
            MessageType::FileEnd => break,
            other => {
                // Anything else aborts the transfer; the partial file is
                // discarded.
                warn!(file = name, ?other, "unexpected message during upload");
                drop(file);
                let _ = ctx.engine.delete(name);
                return send_packet(
                    wt,
                    &Packet::text(MessageType::FileError, "Transfer aborted"),
                )
                .await;
            }
        }
    }

    if let Err(e) = file.flush() {
        warn!(file = name, error = %e, "upload flush failed");
    }
    drop(file);

    info!(
        username = %session.username,
        file = name,
        bytes = total,
        declared = ?declared_size,
        "upload completed"
    );
    send_success(wt, format!("File uploaded successfully: {name}")).await
}

/// DOWNLOAD_REQ: replies SUCCESS with the byte length as text, then
/// streams FILE_DATA chunks capped at BUFFER_SIZE and a final FILE_END.
/// The file is held under a shared advisory lock for the whole read.
pub async fn handle_download(
    ctx: &Arc<ServerCtx>,
    wt: &StreamWriter,
    payload: &str,
) -> Result<(), NetError> {
    let name = payload.trim();
    if name.is_empty() {
        return send_error(wt, "Usage: DOWNLOAD <file>").await;
    }

    let (mut file, len) = match ctx.engine.open_download(name) {
        Ok(open) => open,
        Err(e) => return send_error(wt, &e.to_string()).await,
    };

    send_success(wt, len.to_string()).await?;

    let mut buf = [0u8; BUFFER_SIZE];
    loop {
        let n = match file.read(&mut buf) {
            Ok(0) => break,
            Ok(n) => n,
            Err(e) => {
                warn!(file = name, error = %e, "download read failed");
                return send_packet(
                    wt,
                    &Packet::text(MessageType::FileError, "Server read failed"),
                )
                .await;
            }
        };
        send_packet(
            wt,
            &Packet::new(MessageType::FileData, buf[..n].to_vec()),
        )
        .await?;
    }

    send_packet(wt, &Packet::empty(MessageType::FileEnd)).await?;
    info!(file = name, bytes = len, "download completed");
    Ok(())
}
