//! SMTP listener: one task and one [`SmtpSession`] per accepted connection.

use std::net::SocketAddr;
use std::sync::Arc;

use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt};
use tokio::net::TcpListener;
use tracing::{debug, error, info, warn, Instrument};

use peermail_core::error::Result;

use super::session::{MailSink, SmtpSession};
use crate::transport::lines::LineReader;

/// Accept loop. Runs until the listener fails.
pub async fn serve(
    listener: TcpListener,
    hostname: Arc<str>,
    max_message_bytes: usize,
    sink: Arc<dyn MailSink>,
) -> Result<()> {
    if let Ok(addr) = listener.local_addr() {
        info!(%addr, "smtp listening");
    }
    loop {
        let (stream, peer_addr) = match listener.accept().await {
            Ok(v) => v,
            Err(e) => {
                error!(error = %e, "smtp accept failed");
                continue;
            }
        };
        let session = SmtpSession::new(Arc::clone(&hostname), Arc::clone(&sink))
            .with_message_limit(max_message_bytes);
        let span = tracing::info_span!("smtp", %peer_addr);
        tokio::spawn(
            async move {
                if let Err(e) = handle_connection(stream, session).await {
                    warn!(error = %e, "smtp connection ended with error");
                }
            }
            .instrument(span),
        );
    }
}

/// Bind and serve.
pub async fn run(
    listen: SocketAddr,
    hostname: Arc<str>,
    max_message_bytes: usize,
    sink: Arc<dyn MailSink>,
) -> Result<()> {
    let listener = TcpListener::bind(listen).await?;
    serve(listener, hostname, max_message_bytes, sink).await
}

/// Drive one session over a byte stream until QUIT or EOF.
pub async fn handle_connection<S>(stream: S, mut session: SmtpSession) -> Result<()>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let (rd, mut wr) = tokio::io::split(stream);
    let mut lines = LineReader::new(rd);

    wr.write_all(session.greeting().to_line().as_bytes()).await?;
    wr.flush().await?;

    while let Some(line) = lines.next_line().await? {
        let Some(reply) = session.handle_line(&line) else {
            continue;
        };
        wr.write_all(reply.to_line().as_bytes()).await?;
        wr.flush().await?;
        if reply.is_closing() {
            debug!("client quit");
            break;
        }
    }

    let _ = wr.shutdown().await;
    Ok(())
}
