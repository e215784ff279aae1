//! Scripted AMI server
//!
//! Speaks enough of the Asterisk side of the protocol to exercise the client
//! without a real PBX: banner, login, scripted frames, abrupt closes. Each
//! accepted connection plays the next [`Session`]; the last one repeats.

use parking_lot::Mutex;
use std::io;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::{TcpListener, TcpStream};
use tokio::task::JoinHandle;
use tokio::time::{sleep, Instant};
use tracing::{debug, error, info};

pub const DEFAULT_BANNER: &str = "Asterisk Call Manager/5.0.1";

/// Builder for AMI frames as Asterisk writes them
#[derive(Debug, Clone, Default)]
pub struct FrameBuilder {
    headers: Vec<(String, String)>,
}

impl FrameBuilder {
    pub fn event(name: &str) -> Self {
        Self::default().header("Event", name)
    }

    pub fn response(status: &str) -> Self {
        Self::default().header("Response", status)
    }

    pub fn header(mut self, key: &str, value: &str) -> Self {
        self.headers.push((key.to_string(), value.to_string()));
        self
    }

    pub fn action_id(self, action_id: &str) -> Self {
        self.header("ActionID", action_id)
    }

    /// Wire form, terminated by the empty line
    pub fn build(&self) -> String {
        let mut frame = String::new();
        for (key, value) in &self.headers {
            frame.push_str(&format!("{}: {}\r\n", key, value));
        }
        frame.push_str("\r\n");
        frame
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoginReply {
    Accept,
    Reject(String),
    /// Never answer the login action
    Ignore,
}

#[derive(Debug, Clone)]
pub enum Step {
    /// Write raw bytes as-is
    Send(String),
    Pause(Duration),
    /// Close the socket from the server side
    Close,
}

/// Script played on one accepted connection
#[derive(Debug, Clone)]
pub struct Session {
    banner: Option<String>,
    login: LoginReply,
    steps: Vec<Step>,
}

impl Session {
    pub fn accept() -> Self {
        Self {
            banner: Some(DEFAULT_BANNER.to_string()),
            login: LoginReply::Accept,
            steps: Vec::new(),
        }
    }

    pub fn reject(message: &str) -> Self {
        Self {
            login: LoginReply::Reject(message.to_string()),
            ..Self::accept()
        }
    }

    pub fn ignore_login() -> Self {
        Self {
            login: LoginReply::Ignore,
            ..Self::accept()
        }
    }

    /// Replace the greeting line; `None` sends nothing at all
    pub fn with_banner(mut self, banner: Option<&str>) -> Self {
        self.banner = banner.map(str::to_string);
        self
    }

    pub fn send(mut self, raw: impl Into<String>) -> Self {
        self.steps.push(Step::Send(raw.into()));
        self
    }

    pub fn send_frame(self, frame: FrameBuilder) -> Self {
        self.send(frame.build())
    }

    pub fn pause(mut self, duration: Duration) -> Self {
        self.steps.push(Step::Pause(duration));
        self
    }

    pub fn close(mut self) -> Self {
        self.steps.push(Step::Close);
        self
    }
}

/// Credentials presented by a client
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoginAttempt {
    pub username: String,
    pub secret: String,
    pub action_id: String,
    pub events: Option<String>,
}

#[derive(Debug, Default)]
struct Stats {
    connections: AtomicUsize,
    client_closes: AtomicUsize,
    logins: Mutex<Vec<LoginAttempt>>,
    accepted_at: Mutex<Vec<Instant>>,
}

pub struct AmiSimulator {
    addr: SocketAddr,
    stats: Arc<Stats>,
    task: JoinHandle<()>,
}

impl AmiSimulator {
    /// Listen on an ephemeral localhost port
    pub async fn start(sessions: Vec<Session>) -> io::Result<Self> {
        Self::bind("127.0.0.1:0", sessions).await
    }

    pub async fn bind(bind_address: &str, sessions: Vec<Session>) -> io::Result<Self> {
        let listener = TcpListener::bind(bind_address).await?;
        let addr = listener.local_addr()?;
        let stats = Arc::new(Stats::default());
        let sessions = if sessions.is_empty() {
            vec![Session::accept()]
        } else {
            sessions
        };

        info!(addr = %addr, "AMI simulator listening");
        let task = tokio::spawn(Self::accept_loop(listener, sessions, stats.clone()));

        Ok(Self { addr, stats, task })
    }

    async fn accept_loop(listener: TcpListener, sessions: Vec<Session>, stats: Arc<Stats>) {
        loop {
            match listener.accept().await {
                Ok((socket, peer)) => {
                    let index = stats.connections.fetch_add(1, Ordering::SeqCst);
                    stats.accepted_at.lock().push(Instant::now());
                    let session = sessions[index.min(sessions.len() - 1)].clone();
                    debug!(peer = %peer, session = index, "AMI simulator accepted connection");

                    let stats = stats.clone();
                    tokio::spawn(async move {
                        if let Err(e) = Self::play(socket, session, stats).await {
                            debug!(peer = %peer, error = %e, "AMI simulator session ended");
                        }
                    });
                }
                Err(e) => {
                    error!(error = %e, "AMI simulator failed to accept connection");
                    return;
                }
            }
        }
    }

    async fn play(socket: TcpStream, session: Session, stats: Arc<Stats>) -> io::Result<()> {
        let (read, mut write) = socket.into_split();
        let mut reader = BufReader::new(read);

        if let Some(banner) = &session.banner {
            write.write_all(format!("{}\r\n", banner).as_bytes()).await?;
        }

        let login = loop {
            let Some(frame) = read_frame(&mut reader).await? else {
                stats.client_closes.fetch_add(1, Ordering::SeqCst);
                return Ok(());
            };
            if header(&frame, "Action").is_some_and(|a| a.eq_ignore_ascii_case("Login")) {
                break frame;
            }
            let reply = FrameBuilder::response("Error")
                .action_id(header(&frame, "ActionID").unwrap_or_default())
                .header("Message", "Permission denied")
                .build();
            write.write_all(reply.as_bytes()).await?;
        };

        let action_id = header(&login, "ActionID").unwrap_or_default().to_string();
        stats.logins.lock().push(LoginAttempt {
            username: header(&login, "Username").unwrap_or_default().to_string(),
            secret: header(&login, "Secret").unwrap_or_default().to_string(),
            action_id: action_id.clone(),
            events: header(&login, "Events").map(str::to_string),
        });

        match &session.login {
            LoginReply::Accept => {
                let reply = FrameBuilder::response("Success")
                    .action_id(&action_id)
                    .header("Message", "Authentication accepted")
                    .build();
                write.write_all(reply.as_bytes()).await?;
            }
            LoginReply::Reject(message) => {
                let reply = FrameBuilder::response("Error")
                    .action_id(&action_id)
                    .header("Message", message)
                    .build();
                write.write_all(reply.as_bytes()).await?;
            }
            LoginReply::Ignore => {}
        }

        for step in &session.steps {
            match step {
                Step::Send(raw) => write.write_all(raw.as_bytes()).await?,
                Step::Pause(duration) => sleep(*duration).await,
                Step::Close => {
                    write.shutdown().await?;
                    return Ok(());
                }
            }
        }

        Self::hold(reader, write, stats).await
    }

    /// Answer pings until the client goes away
    async fn hold(
        mut reader: BufReader<OwnedReadHalf>,
        mut write: OwnedWriteHalf,
        stats: Arc<Stats>,
    ) -> io::Result<()> {
        while let Some(frame) = read_frame(&mut reader).await? {
            let action_id = header(&frame, "ActionID").unwrap_or_default();
            let reply = if header(&frame, "Action").is_some_and(|a| a.eq_ignore_ascii_case("Ping")) {
                FrameBuilder::response("Success")
                    .action_id(action_id)
                    .header("Ping", "Pong")
            } else {
                FrameBuilder::response("Error")
                    .action_id(action_id)
                    .header("Message", "Invalid/unknown command")
            };
            write.write_all(reply.build().as_bytes()).await?;
        }
        stats.client_closes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    pub fn port(&self) -> u16 {
        self.addr.port()
    }

    /// Connections accepted so far
    pub fn connections(&self) -> usize {
        self.stats.connections.load(Ordering::SeqCst)
    }

    /// Connections the client closed (as opposed to scripted closes)
    pub fn client_disconnects(&self) -> usize {
        self.stats.client_closes.load(Ordering::SeqCst)
    }

    pub fn logins(&self) -> Vec<LoginAttempt> {
        self.stats.logins.lock().clone()
    }

    /// Gaps between consecutive accepted connections
    pub fn reconnect_intervals(&self) -> Vec<Duration> {
        let accepted = self.stats.accepted_at.lock();
        accepted.windows(2).map(|w| w[1] - w[0]).collect()
    }

    /// Poll until `count` connections were accepted or `within` elapsed
    pub async fn wait_for_connections(&self, count: usize, within: Duration) -> bool {
        self.wait_until(within, || self.connections() >= count).await
    }

    /// Poll until the client closed `count` connections or `within` elapsed
    pub async fn wait_for_client_disconnects(&self, count: usize, within: Duration) -> bool {
        self.wait_until(within, || self.client_disconnects() >= count)
            .await
    }

    async fn wait_until(&self, within: Duration, condition: impl Fn() -> bool) -> bool {
        let deadline = Instant::now() + within;
        while Instant::now() < deadline {
            if condition() {
                return true;
            }
            sleep(Duration::from_millis(10)).await;
        }
        condition()
    }
}

impl Drop for AmiSimulator {
    fn drop(&mut self) {
        self.task.abort();
    }
}

/// Next frame as `(key, value)` lines; `None` on EOF
async fn read_frame(
    reader: &mut BufReader<OwnedReadHalf>,
) -> io::Result<Option<Vec<(String, String)>>> {
    let mut frame = Vec::new();
    let mut line = String::new();
    loop {
        line.clear();
        if reader.read_line(&mut line).await? == 0 {
            return Ok(None);
        }
        let trimmed = line.trim_end_matches(['\r', '\n']);
        if trimmed.is_empty() {
            if frame.is_empty() {
                continue;
            }
            return Ok(Some(frame));
        }
        if let Some((key, value)) = trimmed.split_once(':') {
            frame.push((key.trim().to_string(), value.trim().to_string()));
        }
    }
}

fn header<'a>(frame: &'a [(String, String)], key: &str) -> Option<&'a str> {
    frame
        .iter()
        .find(|(k, _)| k.eq_ignore_ascii_case(key))
        .map(|(_, v)| v.as_str())
}
