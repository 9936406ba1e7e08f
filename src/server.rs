//! TCP accept loop and per-connection request/reply cycle (§4.G input/
//! output plumbing, ambient around the dispatcher).
//!
//! Grounded on the teacher's `eventloop.rs`/`net.rs` accept-and-serve loop,
//! replaced wholesale: the teacher multiplexes every client on one
//! `ae`-style reactor thread, this spawns one tokio task per connection and
//! lets `tokio::task::block_in_place` (inside `Dispatcher::exec`) handle
//! the synchronous locking section instead.

use std::sync::Arc;

use tokio::io::{AsyncWriteExt, BufReader};
use tokio::net::{TcpListener, TcpStream};
use tracing::{debug, info, instrument, warn};

use crate::conn::ConnState;
use crate::dispatcher::{CallContext, Dispatcher};
use crate::pubsub::{Message, PubSub};
use crate::reply::Reply;
use crate::resp::read_command;

/// Accepts connections on `bind_addr` until `shutdown` resolves, spawning
/// one task per connection. Each spawned task is left to finish on its own
/// — this does not wait for in-flight connections to drain, matching the
/// teacher's abrupt-exit shutdown style rather than a graceful-drain one.
pub async fn run(
    bind_addr: &str,
    dispatcher: Arc<Dispatcher>,
    pubsub: Arc<PubSub>,
    mut shutdown: tokio::sync::oneshot::Receiver<()>,
) -> anyhow::Result<()> {
    let listener = TcpListener::bind(bind_addr).await?;
    info!(addr = bind_addr, "accepting connections");

    loop {
        tokio::select! {
            accepted = listener.accept() => {
                let (stream, peer) = accepted?;
                let dispatcher = dispatcher.clone();
                let pubsub = pubsub.clone();
                tokio::spawn(async move {
                    if let Err(e) = handle_connection(stream, dispatcher, pubsub).await {
                        debug!(%peer, error = %e, "connection closed with error");
                    }
                });
            }
            _ = &mut shutdown => {
                info!("shutdown signal received, no longer accepting connections");
                return Ok(());
            }
        }
    }
}

#[instrument(skip(stream, dispatcher, pubsub), fields(conn_id))]
async fn handle_connection(
    stream: TcpStream,
    dispatcher: Arc<Dispatcher>,
    pubsub: Arc<PubSub>,
) -> anyhow::Result<()> {
    stream.set_nodelay(true).ok();
    let (read_half, mut write_half) = stream.into_split();
    let mut reader = BufReader::new(read_half);

    let (mut conn, mut pubsub_rx) = ConnState::new();
    tracing::Span::current().record("conn_id", conn.id);

    loop {
        tokio::select! {
            biased;

            pushed = pubsub_rx.recv() => {
                match pushed {
                    Some(msg) => {
                        let reply = message_to_reply(msg);
                        write_half.write_all(&reply.to_resp_bytes()).await?;
                    }
                    None => break, // sender half dropped, connection is going away
                }
            }

            command = read_command(&mut reader) => {
                let argv = match command {
                    Ok(Some(argv)) if !argv.is_empty() => argv,
                    Ok(Some(_)) => continue, // blank inline command
                    Ok(None) => break,
                    Err(e) => {
                        warn!(error = %e, "malformed request, closing connection");
                        let reply = Reply::error(format!("ERR Protocol error: {e}"));
                        write_half.write_all(&reply.to_resp_bytes()).await.ok();
                        break;
                    }
                };

                let mut ctx = CallContext { conn: &mut conn, pubsub: &pubsub, emit_aof: true };
                let reply = dispatcher.exec(&mut ctx, argv);
                write_half.write_all(&reply.to_resp_bytes()).await?;
            }
        }
    }

    pubsub.unsubscribe_all(conn.id);
    Ok(())
}

fn message_to_reply(msg: Message) -> Reply {
    match msg {
        Message::Message { channel, payload } => Reply::Multi(vec![
            Reply::bulk(bytes::Bytes::from_static(b"message")),
            Reply::bulk(channel),
            Reply::bulk(payload),
        ]),
        Message::PMessage {
            pattern,
            channel,
            payload,
        } => Reply::Multi(vec![
            Reply::bulk(bytes::Bytes::from_static(b"pmessage")),
            Reply::bulk(pattern),
            Reply::bulk(channel),
            Reply::bulk(payload),
        ]),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::Db;
    use std::time::Duration;
    use tokio::io::AsyncReadExt;
    use tokio::net::TcpStream;

    #[tokio::test]
    async fn ping_round_trips_over_tcp() {
        let db = Arc::new(Db::new(4, 16, None));
        let dispatcher = Arc::new(Dispatcher::new(db));
        let pubsub = Arc::new(PubSub::new());
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let (shutdown_tx, shutdown_rx) = tokio::sync::oneshot::channel();

        let dispatcher2 = dispatcher.clone();
        let pubsub2 = pubsub.clone();
        let server = tokio::spawn(async move {
            let (stream, _) = listener.accept().await.unwrap();
            handle_connection(stream, dispatcher2, pubsub2).await.ok();
        });

        let mut client = TcpStream::connect(addr).await.unwrap();
        client.write_all(b"PING\r\n").await.unwrap();

        let mut buf = [0u8; 32];
        let n = tokio::time::timeout(Duration::from_secs(1), client.read(&mut buf))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(&buf[..n], b"+PONG\r\n");

        drop(client);
        server.abort();
        let _ = shutdown_tx.send(());
    }
}
