//! Authentication handlers: REGISTER, LOGIN, LOGOUT, CHANGE_PASS,
//! DELETE_ACCOUNT. Payloads are space-separated token lists.

use std::sync::Arc;

use common::{
    net::{MessageType, NetError, Packet, StreamWriter},
    utils::net::send_packet,
};
use tracing::{info, warn};

use crate::{
    data::{self, ServerCtx},
    types::Session,
};

async fn send_error(wt: &StreamWriter, msg: &str) -> Result<(), NetError> {
    send_packet(wt, &Packet::text(MessageType::Error, msg)).await
}

async fn send_success(wt: &StreamWriter, msg: String) -> Result<(), NetError> {
    send_packet(wt, &Packet::text(MessageType::Success, msg)).await
}

/// The session, provided it is authenticated. Handlers for auth-required
/// operations bail out with the caller sending "Login required".
pub fn logged_in_session(conn_id: u64) -> Option<Session> {
    data::get_session(conn_id).filter(|s| s.is_logged_in)
}

pub async fn handle_register(
    ctx: &Arc<ServerCtx>,
    wt: &StreamWriter,
    payload: &str,
) -> Result<(), NetError> {
    let mut it = payload.split_whitespace();
    let (Some(username), Some(password)) = (it.next(), it.next()) else {
        return send_error(wt, "Missing username or password").await;
    };

    match ctx.users.register(username, password) {
        Ok(Some(new_id)) => {
            info!(username, user_id = new_id, "new user registered");
            send_success(
                wt,
                format!("Registration successful. Please login. ID: {new_id}"),
            )
            .await
        }
        Ok(None) => send_error(wt, "Username already exists").await,
        Err(e) => {
            warn!(error = %e, "user store failure during register");
            send_error(wt, "Registration failed").await
        }
    }
}

pub async fn handle_login(
    ctx: &Arc<ServerCtx>,
    conn_id: u64,
    wt: &StreamWriter,
    payload: &str,
) -> Result<(), NetError> {
    let Some(session) = data::get_session(conn_id) else {
        return send_error(wt, "No session").await;
    };
    // Re-authenticating would orphan the previous identity's state.
    if session.is_logged_in {
        return send_error(wt, "Already logged in").await;
    }

    let mut it = payload.split_whitespace();
    let (Some(username), Some(password)) = (it.next(), it.next()) else {
        return send_error(wt, "Missing username or password").await;
    };

    match ctx.users.check_login(username, password) {
        Ok(Some(user_id)) => {
            data::update_session(conn_id, |s| {
                s.user_id = user_id;
                s.username = username.to_string();
                s.is_logged_in = true;
            });
            info!(
                username,
                user_id,
                client_ip = %session.client_ip,
                "user logged in"
            );
            send_success(
                wt,
                format!("Login successful. Welcome {username} (ID: {user_id})"),
            )
            .await
        }
        Ok(None) => {
            // Do not reveal which of username/password was wrong.
            warn!(client_ip = %session.client_ip, "failed login attempt");
            send_error(wt, "Invalid username or password").await
        }
        Err(e) => {
            warn!(error = %e, "user store failure during login");
            send_error(wt, "Login failed").await
        }
    }
}

pub async fn handle_logout(conn_id: u64, wt: &StreamWriter) -> Result<(), NetError> {
    let Some(session) = logged_in_session(conn_id) else {
        return send_error(wt, "Login required").await;
    };

    data::update_session(conn_id, |s| {
        s.user_id = -1;
        s.username = "Guest".to_string();
        s.is_logged_in = false;
    });
    info!(username = %session.username, "user logged out");
    send_success(wt, format!("Logged out. Goodbye {}", session.username)).await
}

pub async fn handle_change_pass(
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
        return send_error(wt, "Usage: CHANGE_PASS <old> <new>").await;
    };

    match ctx.users.change_password(session.user_id, old, new) {
        Ok(true) => {
            info!(username = %session.username, "password changed");
            send_success(wt, "Password changed".to_string()).await
        }
        Ok(false) => send_error(wt, "Old password incorrect").await,
        Err(e) => {
            warn!(error = %e, "user store failure during password change");
            send_error(wt, "Password change failed").await
        }
    }
}

pub async fn handle_delete_account(
    ctx: &Arc<ServerCtx>,
    conn_id: u64,
    wt: &StreamWriter,
) -> Result<(), NetError> {
    let Some(session) = logged_in_session(conn_id) else {
        return send_error(wt, "Login required").await;
    };

    match ctx.users.delete_account(session.user_id) {
        Ok(true) => {
            data::update_session(conn_id, |s| {
                s.user_id = -1;
                s.username = "Guest".to_string();
                s.is_logged_in = false;
            });
            info!(username = %session.username, "account deleted");
            send_success(wt, "Account deleted".to_string()).await
        }
        Ok(false) => send_error(wt, "Account not found").await,
        Err(e) => {
            warn!(error = %e, "user store failure during account deletion");
            send_error(wt, "Account deletion failed").await
        }
    }
}
