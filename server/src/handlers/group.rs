//! Group management handlers. Permission failures come back as the
//! `GroupError` reason strings; the flat-record store serializes every
//! read-modify-write internally.

use std::sync::Arc;

use common::{
    net::{MessageType, NetError, Packet, StreamWriter},
    utils::net::send_packet,
};
use tracing::{info, warn};

use crate::{
    data::ServerCtx,
    handlers::auth::logged_in_session,
    types::MemberStatus,
};

async fn send_error(wt: &StreamWriter, msg: &str) -> Result<(), NetError> {
    send_packet(wt, &Packet::text(MessageType::Error, msg)).await
}

async fn send_success(wt: &StreamWriter, msg: String) -> Result<(), NetError> {
    send_packet(wt, &Packet::text(MessageType::Success, msg)).await
}

fn parse_one_id(payload: &str) -> Option<i64> {
    payload.trim().parse().ok()
}

fn parse_two_ids(payload: &str) -> Option<(i64, i64)> {
    let mut it = payload.split_whitespace();
    let a = it.next()?.parse().ok()?;
    let b = it.next()?.parse().ok()?;
    Some((a, b))
}

pub async fn handle_create_group(
    ctx: &Arc<ServerCtx>,
    conn_id: u64,
    wt: &StreamWriter,
    payload: &str,
) -> Result<(), NetError> {
    let Some(session) = logged_in_session(conn_id) else {
        return send_error(wt, "Login required").await;
    };

    // Single whitespace-free token so the flat-record line format stays
    // unambiguous.
    let name = payload.trim();
    if name.is_empty() || name.split_whitespace().count() != 1 {
        return send_error(wt, "Invalid group name").await;
    }

    match ctx.groups.create_group(name, session.user_id) {
        Ok(group_id) => {
            if let Err(e) = ctx.engine.provision_group_dir(group_id) {
                warn!(group_id, error = %e, "failed to provision group directory");
            }
            info!(username = %session.username, group_id, "group created");
            send_success(wt, format!("Group '{name}' created with ID: {group_id}")).await
        }
        Err(e) => {
            warn!(error = %e, "group store failure during create");
            send_error(wt, "Failed to create group").await
        }
    }
}

pub async fn handle_list_groups(ctx: &Arc<ServerCtx>, wt: &StreamWriter) -> Result<(), NetError> {
    let groups = match ctx.groups.read_groups() {
        Ok(groups) => groups,
        Err(e) => {
            warn!(error = %e, "group store failure during list");
            return send_error(wt, "Database error").await;
        }
    };

    let mut out = String::from("--- Available Groups ---\n");
    for g in groups {
        out.push_str(&format!(
            "[ID: {}] {} (Owner: {})\n",
            g.group_id, g.name, g.owner_id
        ));
    }
    super::send_listing(wt, &out).await
}

pub async fn handle_join_group(
    ctx: &Arc<ServerCtx>,
    conn_id: u64,
    wt: &StreamWriter,
    payload: &str,
) -> Result<(), NetError> {
    let Some(session) = logged_in_session(conn_id) else {
        return send_error(wt, "Login required").await;
    };
    let Some(group_id) = parse_one_id(payload) else {
        return send_error(wt, "Usage: JOIN_GROUP <group_id>").await;
    };

    match ctx.groups.join(group_id, session.user_id) {
        Ok(()) => {
            info!(username = %session.username, group_id, "join request filed");
            send_success(wt, "Join request sent to owner".to_string()).await
        }
        Err(e) => send_error(wt, &e.to_string()).await,
    }
}

pub async fn handle_leave_group(
    ctx: &Arc<ServerCtx>,
    conn_id: u64,
    wt: &StreamWriter,
    payload: &str,
) -> Result<(), NetError> {
    let Some(session) = logged_in_session(conn_id) else {
        return send_error(wt, "Login required").await;
    };
    let Some(group_id) = parse_one_id(payload) else {
        return send_error(wt, "Usage: LEAVE_GROUP <group_id>").await;
    };

    match ctx.groups.leave(group_id, session.user_id) {
        Ok(()) => {
            info!(username = %session.username, group_id, "left group");
            send_success(wt, "Left group successfully".to_string()).await
        }
        Err(e) => send_error(wt, &e.to_string()).await,
    }
}

pub async fn handle_list_members(
    ctx: &Arc<ServerCtx>,
    wt: &StreamWriter,
    payload: &str,
) -> Result<(), NetError> {
    let Some(group_id) = parse_one_id(payload) else {
        return send_error(wt, "Usage: LIST_MEMBERS <group_id>").await;
    };

    let members = match ctx.groups.members_of(group_id) {
        Ok(members) => members,
        Err(e) => {
            warn!(error = %e, "group store failure during member list");
            return send_error(wt, "Database error").await;
        }
    };

    let mut out = String::from("--- Group Members ---\n");
    for m in members {
        out.push_str(&format!("User ID: {} ({})\n", m.user_id, m.status));
    }
    super::send_listing(wt, &out).await
}

pub async fn handle_kick_member(
    ctx: &Arc<ServerCtx>,
    conn_id: u64,
    wt: &StreamWriter,
    payload: &str,
) -> Result<(), NetError> {
    let Some(session) = logged_in_session(conn_id) else {
        return send_error(wt, "Login required").await;
    };
    let Some((group_id, target_id)) = parse_two_ids(payload) else {
        return send_error(wt, "Usage: KICK_MEMBER <group_id> <user_id>").await;
    };

    match ctx.groups.kick(group_id, target_id, session.user_id) {
        Ok(()) => {
            info!(group_id, target_id, by = %session.username, "member kicked");
            send_success(wt, "User kicked".to_string()).await
        }
        Err(e) => send_error(wt, &e.to_string()).await,
    }
}

pub async fn handle_invite_member(
    ctx: &Arc<ServerCtx>,
    conn_id: u64,
    wt: &StreamWriter,
    payload: &str,
) -> Result<(), NetError> {
    let Some(session) = logged_in_session(conn_id) else {
        return send_error(wt, "Login required").await;
    };
    let Some((group_id, target_id)) = parse_two_ids(payload) else {
        return send_error(wt, "Usage: INVITE_MEMBER <group_id> <user_id>").await;
    };

    match ctx.groups.invite(group_id, target_id, session.user_id) {
        Ok(MemberStatus::Accepted) => {
            info!(group_id, target_id, "member invited by owner");
            send_success(wt, "User invited and added".to_string()).await
        }
        Ok(MemberStatus::Pending) => {
            info!(group_id, target_id, "sponsored join request filed");
            send_success(wt, "Invite recorded; awaiting owner approval".to_string()).await
        }
        Err(e) => send_error(wt, &e.to_string()).await,
    }
}

pub async fn handle_approve_member(
    ctx: &Arc<ServerCtx>,
    conn_id: u64,
    wt: &StreamWriter,
    payload: &str,
) -> Result<(), NetError> {
    let Some(session) = logged_in_session(conn_id) else {
        return send_error(wt, "Login required").await;
    };
    let Some((group_id, target_id)) = parse_two_ids(payload) else {
        return send_error(wt, "Usage: APPROVE_MEMBER <group_id> <user_id>").await;
    };

    match ctx.groups.approve(group_id, target_id, session.user_id) {
        Ok(()) => {
            info!(group_id, target_id, "membership approved");
            send_success(wt, "Member approved".to_string()).await
        }
        Err(e) => send_error(wt, &e.to_string()).await,
    }
}

pub async fn handle_delete_group(
    ctx: &Arc<ServerCtx>,
    conn_id: u64,
    wt: &StreamWriter,
    payload: &str,
) -> Result<(), NetError> {
    let Some(session) = logged_in_session(conn_id) else {
        return send_error(wt, "Login required").await;
    };
    let Some(group_id) = parse_one_id(payload) else {
        return send_error(wt, "Usage: DELETE_GROUP <group_id>").await;
    };

    match ctx.groups.delete_group(group_id, session.user_id) {
        Ok(()) => {
            // Metadata deletion is committed; directory removal is
            // best-effort and failure leaves an orphan to clean up, not a
            // rollback.
            if let Err(e) = ctx.engine.remove_group_dir(group_id) {
                warn!(group_id, error = %e, "failed to remove group storage directory");
            }
            info!(group_id, by = %session.username, "group deleted");
            send_success(wt, "Group deleted".to_string()).await
        }
        Err(e) => send_error(wt, &e.to_string()).await,
    }
}
