//! Command parsing for the interactive prompt. Each command maps to one
//! request packet followed by one terminal response, except listings,
//! which may span several frames, and the file transfers, which run
//! their own send/receive loops.

use std::error::Error;

use common::{
    net::{MessageType, Packet, StreamReader, StreamWriter},
    utils::net::{recv_packet, send_packet},
};

use crate::transfer::{download_file, upload_file};

type BoxError = Box<dyn Error + Send + Sync>;

/// Processes one input line. Returns `false` when the user asked to exit.
pub async fn process_line(
    rd: &StreamReader,
    wt: &StreamWriter,
    line: &str,
) -> Result<bool, BoxError> {
    let mut it = line.split_whitespace();
    let Some(command) = it.next() else {
        return Ok(true);
    };
    let arg1 = it.next();
    let arg2 = it.next();

    let two_args = |name: &str| -> Option<String> {
        match (arg1, arg2) {
            (Some(a), Some(b)) => Some(format!("{a} {b}")),
            _ => {
                println!("Usage: {name}");
                None
            }
        }
    };

    match command.to_ascii_uppercase().as_str() {
        "EXIT" => {
            let _ = send_packet(wt, &Packet::empty(MessageType::Disconnect)).await;
            println!("Exiting...");
            return Ok(false);
        }
        "HELP" => print_menu(),

        // --- AUTHENTICATION ---
        "REGISTER" => {
            if let Some(payload) = two_args("REGISTER <username> <password>") {
                request(rd, wt, Packet::text(MessageType::Register, payload)).await?;
            }
        }
        "LOGIN" => {
            if let Some(payload) = two_args("LOGIN <username> <password>") {
                request(rd, wt, Packet::text(MessageType::Login, payload)).await?;
            }
        }
        "LOGOUT" => request(rd, wt, Packet::empty(MessageType::Logout)).await?,
        "CHANGE_PASS" => {
            if let Some(payload) = two_args("CHANGE_PASS <old> <new>") {
                request(rd, wt, Packet::text(MessageType::ChangePass, payload)).await?;
            }
        }
        "DELETE_ACCOUNT" => request(rd, wt, Packet::empty(MessageType::DeleteAccount)).await?,

        // --- GROUPS ---
        "CREATE_GROUP" => match arg1 {
            Some(name) => {
                request(rd, wt, Packet::text(MessageType::CreateGroup, name)).await?
            }
            None => println!("Usage: CREATE_GROUP <name>"),
        },
        "LIST_GROUPS" => request(rd, wt, Packet::empty(MessageType::ListGroups)).await?,
        "JOIN_GROUP" => match arg1 {
            Some(id) => request(rd, wt, Packet::text(MessageType::JoinGroup, id)).await?,
            None => println!("Usage: JOIN_GROUP <group_id>"),
        },
        "LEAVE_GROUP" => match arg1 {
            Some(id) => request(rd, wt, Packet::text(MessageType::LeaveGroup, id)).await?,
            None => println!("Usage: LEAVE_GROUP <group_id>"),
        },
        "LIST_MEMBERS" => match arg1 {
            Some(id) => request(rd, wt, Packet::text(MessageType::ListMembers, id)).await?,
            None => println!("Usage: LIST_MEMBERS <group_id>"),
        },
        "KICK_MEMBER" => {
            if let Some(payload) = two_args("KICK_MEMBER <group_id> <user_id>") {
                request(rd, wt, Packet::text(MessageType::KickMember, payload)).await?;
            }
        }
        "INVITE_MEMBER" => {
            if let Some(payload) = two_args("INVITE_MEMBER <group_id> <user_id>") {
                request(rd, wt, Packet::text(MessageType::InviteMember, payload)).await?;
            }
        }
        "APPROVE_MEMBER" => {
            if let Some(payload) = two_args("APPROVE_MEMBER <group_id> <user_id>") {
                request(rd, wt, Packet::text(MessageType::ApproveMember, payload)).await?;
            }
        }
        "DELETE_GROUP" => match arg1 {
            Some(id) => request(rd, wt, Packet::text(MessageType::DeleteGroup, id)).await?,
            None => println!("Usage: DELETE_GROUP <group_id>"),
        },

        // --- FILES ---
        "LIST" => {
            let payload = arg1.unwrap_or("");
            request(rd, wt, Packet::text(MessageType::ListFiles, payload)).await?;
        }
        "MKDIR" => match arg1 {
            Some(name) => request(rd, wt, Packet::text(MessageType::CreateFolder, name)).await?,
            None => println!("Usage: MKDIR <name>"),
        },
        "DELETE" => match arg1 {
            Some(item) => request(rd, wt, Packet::text(MessageType::DeleteItem, item)).await?,
            None => println!("Usage: DELETE <item>"),
        },
        "RENAME" => {
            if let Some(payload) = two_args("RENAME <old_name> <new_name>") {
                request(rd, wt, Packet::text(MessageType::RenameItem, payload)).await?;
            }
        }
        "MOVE" => {
            if let Some(payload) = two_args("MOVE <source> <destination>") {
                request(rd, wt, Packet::text(MessageType::MoveItem, payload)).await?;
            }
        }
        "COPY" => {
            if let Some(payload) = two_args("COPY <source> <destination>") {
                request(rd, wt, Packet::text(MessageType::CopyItem, payload)).await?;
            }
        }
        "UPLOAD" => match arg1 {
            Some(path) => upload_file(rd, wt, path).await?,
            None => println!("Usage: UPLOAD <file>"),
        },
        "DOWNLOAD" => match arg1 {
            Some(name) => download_file(rd, wt, name).await?,
            None => println!("Usage: DOWNLOAD <file>"),
        },

        other => println!("Unknown command: {other} (type HELP)"),
    }

    Ok(true)
}

/// One request, one printed response.
async fn request(rd: &StreamReader, wt: &StreamWriter, packet: Packet) -> Result<(), BoxError> {
    send_packet(wt, &packet).await?;
    let reply = recv_packet(rd).await?;
    match reply.kind {
        MessageType::Success => println!("[SUCCESS] {}", reply.as_text()),
        MessageType::Error => println!("[ERROR] {}", reply.as_text()),
        MessageType::ListResponse => {
            // Long listings arrive as several frames closed by an empty
            // SUCCESS terminator.
            let mut text = reply.as_text();
            loop {
                let next = recv_packet(rd).await?;
                match next.kind {
                    MessageType::ListResponse => text.push_str(&next.as_text()),
                    _ => break,
                }
            }
            println!("\n{text}\n--------------------");
        }
        other => println!("[INFO] {:?}: {}", other, reply.as_text()),
    }
    Ok(())
}

pub fn print_menu() {
    println!("--- ACCOUNT ---");
    println!("  REGISTER <username> <password>");
    println!("  LOGIN <username> <password>");
    println!("  LOGOUT");
    println!("  CHANGE_PASS <old> <new>");
    println!("  DELETE_ACCOUNT");
    println!("--- GROUPS ---");
    println!("  CREATE_GROUP <name>");
    println!("  LIST_GROUPS");
    println!("  JOIN_GROUP <group_id>");
    println!("  LEAVE_GROUP <group_id>");
    println!("  LIST_MEMBERS <group_id>");
    println!("  INVITE_MEMBER <group_id> <user_id>");
    println!("  APPROVE_MEMBER <group_id> <user_id>");
    println!("  KICK_MEMBER <group_id> <user_id>");
    println!("  DELETE_GROUP <group_id>");
    println!("--- FILES ---");
    println!("  LIST [path]");
    println!("  MKDIR <name>");
    println!("  UPLOAD <file>");
    println!("  DOWNLOAD <file>");
    println!("  DELETE <item>");
    println!("  RENAME <old_name> <new_name>");
    println!("  MOVE <source> <destination>");
    println!("  COPY <source> <destination>");
    println!("--- SYSTEM ---");
    println!("  HELP");
    println!("  EXIT");
}
