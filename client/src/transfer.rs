//! File transfer flows: stream a local file up in BUFFER_SIZE chunks,
//! or consume a FILE_DATA stream down into the working directory.

use std::error::Error;
use std::path::Path;

use common::{
    net::{MessageType, Packet, StreamReader, StreamWriter, BUFFER_SIZE},
    utils::{
        file::resolve_path,
        net::{recv_packet, send_packet},
    },
};
use tokio::{
    fs::File,
    io::{AsyncReadExt, AsyncWriteExt},
};

type BoxError = Box<dyn Error + Send + Sync>;

/// Uploads a local file under its base name. The server's "ready"
/// SUCCESS gates the data stream; the final SUCCESS confirms completion.
pub async fn upload_file(
    rd: &StreamReader,
    wt: &StreamWriter,
    local: &str,
) -> Result<(), BoxError> {
    let local = resolve_path(local)?;
    let name = local
        .file_name()
        .ok_or("Invalid file name")?
        .to_string_lossy()
        .into_owned();

    let mut file = File::open(&local).await?;
    let size = file.metadata().await?.len();

    send_packet(wt, &Packet::text(MessageType::UploadReq, format!("{name} {size}"))).await?;
    let reply = recv_packet(rd).await?;
    if reply.kind != MessageType::Success {
        println!("[ERROR] {}", reply.as_text());
        return Ok(());
    }

    let mut buf = [0u8; BUFFER_SIZE];
    let mut sent: u64 = 0;
    loop {
        let n = file.read(&mut buf).await?;
        if n == 0 {
            break;
        }
        send_packet(wt, &Packet::new(MessageType::FileData, buf[..n].to_vec())).await?;
        sent += n as u64;
    }
    send_packet(wt, &Packet::empty(MessageType::FileEnd)).await?;

    let reply = recv_packet(rd).await?;
    match reply.kind {
        MessageType::Success => println!("[SUCCESS] {} ({sent} bytes)", reply.as_text()),
        _ => println!("[ERROR] {}", reply.as_text()),
    }
    Ok(())
}

/// Downloads a remote file into the current directory under its base name.
pub async fn download_file(
    rd: &StreamReader,
    wt: &StreamWriter,
    remote: &str,
) -> Result<(), BoxError> {
    send_packet(wt, &Packet::text(MessageType::DownloadReq, remote)).await?;
    let reply = recv_packet(rd).await?;
    if reply.kind != MessageType::Success {
        println!("[ERROR] {}", reply.as_text());
        return Ok(());
    }
    let expected: u64 = reply.as_text().trim().parse().unwrap_or(0);

    let name = Path::new(remote)
        .file_name()
        .ok_or("Invalid file name")?
        .to_string_lossy()
        .into_owned();
    let mut file = File::create(&name).await?;

    let mut received: u64 = 0;
    loop {
        let packet = recv_packet(rd).await?;
        match packet.kind {
            MessageType::FileData => {
                file.write_all(&packet.payload).await?;
                received += packet.payload.len() as u64;
            }
            MessageType::FileEnd => break,
            MessageType::FileError => {
                println!("[ERROR] {}", packet.as_text());
                return Ok(());
            }
            other => return Err(format!("unexpected packet during download: {other:?}").into()),
        }
    }
    file.flush().await?;

    println!("[SUCCESS] Downloaded {name} ({received} of {expected} bytes)");
    Ok(())
}
