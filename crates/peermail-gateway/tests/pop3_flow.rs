#![allow(clippy::unwrap_used)]
#![allow(clippy::expect_used)]
#![allow(clippy::panic)]

use std::sync::Arc;

use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, DuplexStream, Lines, ReadHalf, WriteHalf};

use peermail_gateway::mailbox::{InMemoryMailbox, Mailbox};
use peermail_gateway::pop3::server::handle_connection;
use peermail_gateway::pop3::Pop3Session;

struct Client {
    lines: Lines<BufReader<ReadHalf<DuplexStream>>>,
    wr: WriteHalf<DuplexStream>,
}

impl Client {
    async fn read(&mut self) -> String {
        self.lines.next_line().await.unwrap().expect("server closed")
    }

    async fn cmd(&mut self, line: &str) -> String {
        self.wr.write_all(format!("{line}\r\n").as_bytes()).await.unwrap();
        self.wr.flush().await.unwrap();
        self.read().await
    }

    /// Body lines of a multi-line reply, terminator excluded.
    async fn body(&mut self) -> Vec<String> {
        let mut out = Vec::new();
        loop {
            let line = self.read().await;
            if line == "." {
                return out;
            }
            out.push(line);
        }
    }
}

#[tokio::test]
async fn retrieve_and_delete_over_the_wire() {
    let mb = Arc::new(InMemoryMailbox::new());
    mb.store_message("a1", b"Subject: one\r\n\r\nhello\r\n.hidden".to_vec())
        .await
        .unwrap();
    mb.store_message("b2", b"Subject: two\r\n\r\nbye".to_vec())
        .await
        .unwrap();

    let (client, server) = tokio::io::duplex(64 * 1024);
    let task = tokio::spawn(handle_connection(server, Pop3Session::new(mb.clone())));
    let (rd, wr) = tokio::io::split(client);
    let mut c = Client {
        lines: BufReader::new(rd).lines(),
        wr,
    };

    assert!(c.read().await.starts_with("+OK"));
    assert!(c.cmd("STAT").await.starts_with("-ERR"));
    assert!(c.cmd("USER me").await.starts_with("+OK"));
    assert!(c.cmd("PASS secret").await.starts_with("+OK"));

    assert!(c.cmd("LIST").await.starts_with("+OK"));
    assert_eq!(c.body().await.len(), 2);

    assert!(c.cmd("UIDL").await.starts_with("+OK"));
    assert_eq!(c.body().await, vec!["1 a1".to_string(), "2 b2".to_string()]);

    assert!(c.cmd("RETR 1").await.starts_with("+OK"));
    assert_eq!(
        c.body().await,
        vec!["Subject: one", "", "hello", "..hidden"]
    );

    assert!(c.cmd("DELE 1").await.starts_with("+OK"));
    assert!(c.cmd("QUIT").await.starts_with("+OK"));
    task.await.unwrap().unwrap();

    let left = mb.list_messages().await.unwrap();
    assert_eq!(left.len(), 1);
    assert_eq!(left[0].id, "b2");
}

#[tokio::test]
async fn dropping_the_connection_keeps_deletions_uncommitted() {
    let mb = Arc::new(InMemoryMailbox::new());
    mb.store_message("a1", b"x".to_vec()).await.unwrap();

    let (client, server) = tokio::io::duplex(64 * 1024);
    let task = tokio::spawn(handle_connection(server, Pop3Session::new(mb.clone())));
    let (rd, wr) = tokio::io::split(client);
    let mut c = Client {
        lines: BufReader::new(rd).lines(),
        wr,
    };

    c.read().await;
    c.cmd("USER me").await;
    c.cmd("PASS x").await;
    assert!(c.cmd("DELE 1").await.starts_with("+OK"));
    drop(c);
    task.await.unwrap().unwrap();

    assert_eq!(mb.len(), 1);
}

#[tokio::test]
async fn quit_with_argument_closes_the_connection() {
    let mb = Arc::new(InMemoryMailbox::new());
    mb.store_message("a1", b"Subject: one\r\n\r\nhello".to_vec())
        .await
        .unwrap();

    let (client, server) = tokio::io::duplex(64 * 1024);
    let task = tokio::spawn(handle_connection(server, Pop3Session::new(mb.clone())));
    let (rd, wr) = tokio::io::split(client);
    let mut c = Client {
        lines: BufReader::new(rd).lines(),
        wr,
    };

    assert!(c.read().await.starts_with("+OK"));
    assert!(c.cmd("USER me").await.starts_with("+OK"));
    assert!(c.cmd("PASS secret").await.starts_with("+OK"));
    assert!(c.cmd("DELE 1").await.starts_with("+OK"));
    assert!(c.cmd("QUIT bye").await.starts_with("+OK"));

    assert!(c.lines.next_line().await.unwrap().is_none());
    task.await.unwrap().unwrap();
    assert!(mb.is_empty());
}
