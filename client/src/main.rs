use std::sync::Arc;

use common::net::{StreamReader, StreamWriter};
use filehub_client::{
    cmd::{print_menu, process_line},
    config::ClientConfig,
};
use tokio::{
    io::{stdin, stdout, AsyncBufReadExt, AsyncWriteExt, BufReader},
    net::TcpStream,
    sync::Mutex as AsyncMutex,
};

#[tokio::main]
async fn main() {
    let config = match ClientConfig::load() {
        Ok(cfg) => cfg,
        Err(e) => {
            eprintln!("Failed to load config: {:?}", e);
            return;
        }
    };

    let addr = config.get_addr();
    let stream = match TcpStream::connect(&addr).await {
        Ok(stream) => stream,
        Err(e) => {
            eprintln!("Failed to connect to {}: {:?}", addr, e);
            return;
        }
    };
    println!("🔗 Connected to {}", addr);
    print_menu();

    let (rd, wt) = stream.into_split();
    let rd: StreamReader = Arc::new(AsyncMutex::new(rd));
    let wt: StreamWriter = Arc::new(AsyncMutex::new(wt));

    let mut lines = BufReader::new(stdin()).lines();
    let mut out = stdout();

    loop {
        let _ = out.write_all(b"> ").await;
        let _ = out.flush().await;

        let line = match lines.next_line().await {
            Ok(Some(line)) => line,
            Ok(None) => break,
            Err(e) => {
                eprintln!("Input error: {:?}", e);
                break;
            }
        };
        if line.trim().is_empty() {
            continue;
        }

        match process_line(&rd, &wt, &line).await {
            Ok(true) => {}
            Ok(false) => break,
            Err(e) => {
                eprintln!("Disconnected from server: {:?}", e);
                break;
            }
        }
    }
}
