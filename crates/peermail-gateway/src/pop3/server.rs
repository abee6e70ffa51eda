//! POP3 listener: one [`Pop3Session`] per accepted connection.

use std::net::SocketAddr;
use std::sync::Arc;

use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt};
use tokio::net::TcpListener;
use tracing::{debug, error, info, warn, Instrument};

use peermail_core::error::Result;

use super::session::Pop3Session;
use crate::mailbox::Mailbox;
use crate::transport::lines::LineReader;

pub async fn serve(listener: TcpListener, mailbox: Arc<dyn Mailbox>) -> Result<()> {
    if let Ok(addr) = listener.local_addr() {
        info!(%addr, "pop3 listening");
    }
    loop {
        let (stream, peer_addr) = match listener.accept().await {
            Ok(v) => v,
            Err(e) => {
                error!(error = %e, "pop3 accept failed");
                continue;
            }
        };
        let session = Pop3Session::new(Arc::clone(&mailbox));
        let span = tracing::info_span!("pop3", %peer_addr);
        tokio::spawn(
            async move {
                if let Err(e) = handle_connection(stream, session).await {
                    warn!(error = %e, "pop3 connection ended with error");
                }
            }
            .instrument(span),
        );
    }
}

pub async fn run(listen: SocketAddr, mailbox: Arc<dyn Mailbox>) -> Result<()> {
    let listener = TcpListener::bind(listen).await?;
    serve(listener, mailbox).await
}

/// Feed complete lines to the session in arrival order; close after QUIT.
pub async fn handle_connection<S>(stream: S, mut session: Pop3Session) -> Result<()>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let (rd, mut wr) = tokio::io::split(stream);
    let mut lines = LineReader::new(rd);

    wr.write_all(session.greeting().as_bytes()).await?;
    wr.flush().await?;

    while let Some(line) = lines.next_line().await? {
        let reply = session.process_line(&line).await;
        if !reply.is_empty() {
            wr.write_all(reply.as_bytes()).await?;
            wr.flush().await?;
        }
        if Pop3Session::is_quit(&line) {
            debug!("client quit");
            break;
        }
    }

    let _ = wr.shutdown().await;
    Ok(())
}
