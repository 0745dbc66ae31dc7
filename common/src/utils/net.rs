//! Packet framing over a byte stream.
//!
//! Every message is a fixed header (`type: u32`, `payload_len: i32`, both
//! little-endian) followed by `payload_len` raw bytes. Short reads and
//! writes are absorbed by `read_exact`/`write_all`, so a frame is either
//! transferred whole or the call fails.

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::net::{MessageType, NetError, Packet, StreamReader, StreamWriter, BUFFER_SIZE};

const HEADER_LEN: usize = 8;

/// Reads one packet from the stream.
///
/// A clean close by the peer before any header byte arrives returns
/// [`NetError::Closed`]; EOF anywhere inside a frame is an I/O error. A
/// header whose declared length falls outside `[0, BUFFER_SIZE]` fails
/// before any payload is read, so a hostile peer cannot force an
/// unbounded allocation.
pub async fn read_packet<R>(reader: &mut R) -> Result<Packet, NetError>
where
    R: AsyncRead + Unpin,
{
    let mut header = [0u8; HEADER_LEN];

    // The first read tells a clean disconnect apart from a torn frame.
    let n = reader.read(&mut header).await?;
    if n == 0 {
        return Err(NetError::Closed);
    }
    reader.read_exact(&mut header[n..]).await?;

    let kind = u32::from_le_bytes(header[0..4].try_into().unwrap());
    let kind = MessageType::try_from(kind)?;

    let payload_len = i32::from_le_bytes(header[4..8].try_into().unwrap());
    if payload_len < 0 || payload_len as usize > BUFFER_SIZE {
        return Err(NetError::PayloadTooLarge(payload_len));
    }

    let mut payload = vec![0u8; payload_len as usize];
    reader.read_exact(&mut payload).await?;

    Ok(Packet { kind, payload })
}

/// Writes one packet to the stream: header first, then the payload if any.
pub async fn write_packet<W>(writer: &mut W, packet: &Packet) -> Result<(), NetError>
where
    W: AsyncWrite + Unpin,
{
    if packet.payload.len() > BUFFER_SIZE {
        return Err(NetError::PayloadTooLarge(packet.payload.len() as i32));
    }

    writer.write_all(&(packet.kind as u32).to_le_bytes()).await?;
    writer
        .write_all(&(packet.payload.len() as i32).to_le_bytes())
        .await?;
    if !packet.payload.is_empty() {
        writer.write_all(&packet.payload).await?;
    }
    writer.flush().await?;

    Ok(())
}

/// Reads one packet from a shared read half, holding its lock for the
/// duration of the frame.
pub async fn recv_packet(rd: &StreamReader) -> Result<Packet, NetError> {
    let mut reader = rd.lock().await;
    read_packet(&mut *reader).await
}

/// Writes one packet to a shared write half, holding its lock for the
/// duration of the frame.
pub async fn send_packet(wt: &StreamWriter, packet: &Packet) -> Result<(), NetError> {
    let mut writer = wt.lock().await;
    write_packet(&mut *writer, packet).await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn round_trip_preserves_type_and_payload() {
        let (mut a, mut b) = tokio::io::duplex(BUFFER_SIZE * 2);

        let sent = Packet::text(MessageType::Login, "alice pw1");
        write_packet(&mut a, &sent).await.unwrap();

        let got = read_packet(&mut b).await.unwrap();
        assert_eq!(got, sent);
    }

    #[tokio::test]
    async fn empty_payload_round_trips() {
        let (mut a, mut b) = tokio::io::duplex(64);

        write_packet(&mut a, &Packet::empty(MessageType::FileEnd))
            .await
            .unwrap();

        let got = read_packet(&mut b).await.unwrap();
        assert_eq!(got.kind, MessageType::FileEnd);
        assert!(got.payload.is_empty());
    }

    #[tokio::test]
    async fn oversized_declared_length_fails_decode() {
        let (mut a, mut b) = tokio::io::duplex(64);

        let mut frame = Vec::new();
        frame.extend_from_slice(&(MessageType::FileData as u32).to_le_bytes());
        frame.extend_from_slice(&(BUFFER_SIZE as i32 + 1).to_le_bytes());
        a.write_all(&frame).await.unwrap();

        match read_packet(&mut b).await {
            Err(NetError::PayloadTooLarge(len)) => assert_eq!(len, BUFFER_SIZE as i32 + 1),
            other => panic!("expected PayloadTooLarge, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn negative_declared_length_fails_decode() {
        let (mut a, mut b) = tokio::io::duplex(64);

        let mut frame = Vec::new();
        frame.extend_from_slice(&(MessageType::FileData as u32).to_le_bytes());
        frame.extend_from_slice(&(-1i32).to_le_bytes());
        a.write_all(&frame).await.unwrap();

        assert!(matches!(
            read_packet(&mut b).await,
            Err(NetError::PayloadTooLarge(-1))
        ));
    }

    #[tokio::test]
    async fn unknown_type_ordinal_fails_decode() {
        let (mut a, mut b) = tokio::io::duplex(64);

        let mut frame = Vec::new();
        frame.extend_from_slice(&999u32.to_le_bytes());
        frame.extend_from_slice(&0i32.to_le_bytes());
        a.write_all(&frame).await.unwrap();

        assert!(matches!(
            read_packet(&mut b).await,
            Err(NetError::UnknownType(999))
        ));
    }

    #[tokio::test]
    async fn clean_close_is_distinguished() {
        let (a, mut b) = tokio::io::duplex(64);
        drop(a);

        assert!(matches!(read_packet(&mut b).await, Err(NetError::Closed)));
    }

    #[tokio::test]
    async fn eof_mid_frame_is_an_io_error() {
        let (mut a, mut b) = tokio::io::duplex(64);

        // Header promises 10 bytes, peer closes after 3.
        let mut frame = Vec::new();
        frame.extend_from_slice(&(MessageType::FileData as u32).to_le_bytes());
        frame.extend_from_slice(&10i32.to_le_bytes());
        frame.extend_from_slice(b"abc");
        a.write_all(&frame).await.unwrap();
        drop(a);

        assert!(matches!(read_packet(&mut b).await, Err(NetError::Io(_))));
    }
}
