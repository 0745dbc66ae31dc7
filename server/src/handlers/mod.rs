pub mod auth;
pub mod client;
pub mod file;
pub mod group;

pub use client::{handle_client, serve};

use std::sync::Arc;

use common::{
    net::{MessageType, NetError, Packet, StreamReader, StreamWriter, BUFFER_SIZE},
    utils::net::send_packet,
};

use crate::data::ServerCtx;

/// Streams a rendered listing to the client. The text is split on
/// character boundaries into LIST_RESPONSE frames that each fit one
/// payload, terminated by an empty SUCCESS frame, so a large directory
/// or group roster never exceeds the frame cap.
pub(crate) async fn send_listing(wt: &StreamWriter, text: &str) -> Result<(), NetError> {
    let mut rest = text;
    while rest.len() > BUFFER_SIZE {
        let mut cut = BUFFER_SIZE;
        while !rest.is_char_boundary(cut) {
            cut -= 1;
        }
        send_packet(wt, &Packet::text(MessageType::ListResponse, &rest[..cut])).await?;
        rest = &rest[cut..];
    }
    send_packet(wt, &Packet::text(MessageType::ListResponse, rest)).await?;
    send_packet(wt, &Packet::empty(MessageType::Success)).await
}

/// Routes one decoded message to exactly one handler. Unknown or
/// out-of-band message types produce an ERROR response and no state
/// change; only transport failures propagate to the caller.
pub async fn process_request(
    ctx: &Arc<ServerCtx>,
    conn_id: u64,
    rd: &StreamReader,
    wt: &StreamWriter,
    packet: Packet,
) -> Result<(), NetError> {
    use MessageType::*;

    match packet.kind {
        Connect => {
            send_packet(wt, &Packet::text(Success, "Connected to FileHub server")).await
        }

        // --- AUTHENTICATION ---
        Register => auth::handle_register(ctx, wt, &packet.as_text()).await,
        Login => auth::handle_login(ctx, conn_id, wt, &packet.as_text()).await,
        Logout => auth::handle_logout(conn_id, wt).await,
        ChangePass => auth::handle_change_pass(ctx, conn_id, wt, &packet.as_text()).await,
        DeleteAccount => auth::handle_delete_account(ctx, conn_id, wt).await,

        // --- GROUP MANAGEMENT ---
        CreateGroup => group::handle_create_group(ctx, conn_id, wt, &packet.as_text()).await,
        ListGroups => group::handle_list_groups(ctx, wt).await,
        JoinGroup => group::handle_join_group(ctx, conn_id, wt, &packet.as_text()).await,
        LeaveGroup => group::handle_leave_group(ctx, conn_id, wt, &packet.as_text()).await,
        ListMembers => group::handle_list_members(ctx, wt, &packet.as_text()).await,
        KickMember => group::handle_kick_member(ctx, conn_id, wt, &packet.as_text()).await,
        InviteMember => group::handle_invite_member(ctx, conn_id, wt, &packet.as_text()).await,
        ApproveMember => group::handle_approve_member(ctx, conn_id, wt, &packet.as_text()).await,
        DeleteGroup => group::handle_delete_group(ctx, conn_id, wt, &packet.as_text()).await,

        // --- FILE SYSTEM ---
        ListFiles => file::handle_list_files(ctx, wt, &packet.as_text()).await,
        CreateFolder => file::handle_create_folder(ctx, conn_id, wt, &packet.as_text()).await,
        DeleteItem => file::handle_delete_item(ctx, conn_id, wt, &packet.as_text()).await,
        RenameItem => file::handle_rename_item(ctx, conn_id, wt, &packet.as_text()).await,
        MoveItem => file::handle_move_item(ctx, conn_id, wt, &packet.as_text()).await,
        CopyItem => file::handle_copy_item(ctx, conn_id, wt, &packet.as_text()).await,

        // --- FILE TRANSFER ---
        UploadReq => file::handle_upload(ctx, conn_id, rd, wt, &packet.as_text()).await,
        DownloadReq => file::handle_download(ctx, wt, &packet.as_text()).await,

        // Everything else is out of band here (transfer frames outside a
        // transfer, server-to-client types echoed back, ...).
        _ => send_packet(wt, &Packet::text(Error, "Unknown command")).await,
    }
}
