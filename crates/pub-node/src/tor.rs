//! Minimal Tor control-port client.
//!
//! Only what a node needs: authenticate, then `ADD_ONION` with the stored
//! key. Tor removes the onion service when this connection closes, so the
//! controller must live as long as the node.

use std::path::PathBuf;

use thiserror::Error;
use tokio::io::{split, AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader, ReadHalf, WriteHalf};
use tokio::net::TcpStream;
use tracing::{debug, info};

#[derive(Debug, Error)]
pub enum TorError {
    #[error("control port I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("control port protocol error: {0}")]
    Protocol(String),
    #[error("tor replied {status}: {message}")]
    Rejected { status: u16, message: String },
    #[error("unable to authenticate tor controller")]
    AuthenticationFailed,
}

/// One complete control-port reply.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ControlReply {
    pub status: u16,
    /// Text of every line, without the status code and separator.
    pub lines: Vec<String>,
}

impl ControlReply {
    pub fn is_ok(&self) -> bool {
        self.status == 250
    }

    /// Value of the first `KEY=value` line for `key`.
    pub fn value(&self, key: &str) -> Option<&str> {
        self.lines.iter().find_map(|line| {
            line.strip_prefix(key)
                .and_then(|rest| rest.strip_prefix('='))
        })
    }
}

/// Authentication details advertised by `PROTOCOLINFO`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProtocolInfo {
    pub methods: Vec<String>,
    pub cookie_file: Option<PathBuf>,
}

impl ProtocolInfo {
    fn from_reply(reply: &ControlReply) -> Self {
        let mut info = ProtocolInfo::default();
        for line in &reply.lines {
            let Some(rest) = line.strip_prefix("AUTH ") else {
                continue;
            };
            for (key, value) in parse_key_values(rest) {
                match key.as_str() {
                    "METHODS" => info.methods = value.split(',').map(str::to_string).collect(),
                    "COOKIEFILE" => info.cookie_file = Some(PathBuf::from(value)),
                    _ => {}
                }
            }
        }
        info
    }
}

/// Split `KEY=value KEY="quoted value"` pairs.
fn parse_key_values(input: &str) -> Vec<(String, String)> {
    let mut out = Vec::new();
    let mut rest = input.trim_start();
    while let Some(eq) = rest.find('=') {
        let key = rest[..eq].trim().to_string();
        let after = &rest[eq + 1..];
        let (value, remainder) = if let Some(quoted) = after.strip_prefix('"') {
            let mut value = String::new();
            let mut chars = quoted.char_indices();
            let mut end = quoted.len();
            while let Some((i, c)) = chars.next() {
                match c {
                    '\\' => {
                        if let Some((_, escaped)) = chars.next() {
                            value.push(escaped);
                        }
                    }
                    '"' => {
                        end = i + 1;
                        break;
                    }
                    _ => value.push(c),
                }
            }
            (value, &quoted[end..])
        } else {
            let end = after.find(' ').unwrap_or(after.len());
            (after[..end].to_string(), &after[end..])
        };
        out.push((key, value));
        rest = remainder.trim_start();
    }
    out
}

/// Quote a string for the control protocol.
fn quote(value: &str) -> String {
    let mut out = String::with_capacity(value.len() + 2);
    out.push('"');
    for c in value.chars() {
        if c == '"' || c == '\\' {
            out.push('\\');
        }
        out.push(c);
    }
    out.push('"');
    out
}

/// Control-port connection over any byte stream.
pub struct TorController<S> {
    reader: BufReader<ReadHalf<S>>,
    writer: WriteHalf<S>,
}

impl TorController<TcpStream> {
    pub async fn connect(host: &str, port: u16) -> Result<Self, TorError> {
        let stream = TcpStream::connect((host, port)).await?;
        debug!("connected to tor control port {}:{}", host, port);
        Ok(Self::new(stream))
    }

    /// Connect and authenticate: password if one is configured, otherwise
    /// cookie, otherwise none.
    ///
    /// Tor drops the connection after a failed `AUTHENTICATE`, so the null
    /// fallback uses a fresh connection.
    pub async fn connect_authenticated(host: &str, port: u16, password: &str) -> Result<Self, TorError> {
        let mut controller = Self::connect(host, port).await?;
        if !password.is_empty() {
            controller
                .authenticate_password(password)
                .await
                .map_err(|_| TorError::AuthenticationFailed)?;
            return Ok(controller);
        }

        match controller.authenticate_cookie().await {
            Ok(()) => Ok(controller),
            Err(e) => {
                debug!("cookie authentication failed ({}), trying null authentication", e);
                let mut controller = Self::connect(host, port).await?;
                controller
                    .authenticate_none()
                    .await
                    .map_err(|_| TorError::AuthenticationFailed)?;
                Ok(controller)
            }
        }
    }
}

impl<S: AsyncRead + AsyncWrite> TorController<S> {
    pub fn new(stream: S) -> Self {
        let (reader, writer) = split(stream);
        Self {
            reader: BufReader::new(reader),
            writer,
        }
    }

    /// Send one command line and read its reply. Non-250 replies are errors.
    pub async fn command(&mut self, line: &str) -> Result<ControlReply, TorError> {
        self.writer.write_all(line.as_bytes()).await?;
        self.writer.write_all(b"\r\n").await?;
        self.writer.flush().await?;

        let reply = self.read_reply().await?;
        if !reply.is_ok() {
            return Err(TorError::Rejected {
                status: reply.status,
                message: reply.lines.join("; "),
            });
        }
        Ok(reply)
    }

    async fn read_line(&mut self) -> Result<String, TorError> {
        let mut line = String::new();
        if self.reader.read_line(&mut line).await? == 0 {
            return Err(TorError::Protocol("connection closed".into()));
        }
        Ok(line.trim_end_matches(['\r', '\n']).to_string())
    }

    async fn read_reply(&mut self) -> Result<ControlReply, TorError> {
        let mut lines = Vec::new();
        loop {
            let line = self.read_line().await?;
            if line.len() < 4 || !line.is_char_boundary(3) || !line.is_char_boundary(4) {
                return Err(TorError::Protocol(format!("short reply line {:?}", line)));
            }
            let status: u16 = line[..3]
                .parse()
                .map_err(|_| TorError::Protocol(format!("bad status in {:?}", line)))?;
            let text = line[4..].to_string();

            match &line[3..4] {
                " " => {
                    lines.push(text);
                    return Ok(ControlReply { status, lines });
                }
                "-" => lines.push(text),
                "+" => {
                    // Data follows until a lone ".".
                    let mut data = text;
                    loop {
                        let next = self.read_line().await?;
                        if next == "." {
                            break;
                        }
                        data.push('\n');
                        data.push_str(next.strip_prefix('.').unwrap_or(&next));
                    }
                    lines.push(data);
                }
                other => {
                    return Err(TorError::Protocol(format!("bad separator {:?}", other)));
                }
            }
        }
    }

    pub async fn protocol_info(&mut self) -> Result<ProtocolInfo, TorError> {
        let reply = self.command("PROTOCOLINFO 1").await?;
        Ok(ProtocolInfo::from_reply(&reply))
    }

    pub async fn authenticate_password(&mut self, password: &str) -> Result<(), TorError> {
        self.command(&format!("AUTHENTICATE {}", quote(password))).await?;
        Ok(())
    }

    pub async fn authenticate_cookie(&mut self) -> Result<(), TorError> {
        let info = self.protocol_info().await?;
        let path = info
            .cookie_file
            .ok_or_else(|| TorError::Protocol("no cookie file advertised".into()))?;
        let cookie = tokio::fs::read(&path).await?;
        self.command(&format!("AUTHENTICATE {}", hex::encode(cookie))).await?;
        Ok(())
    }

    pub async fn authenticate_none(&mut self) -> Result<(), TorError> {
        self.command("AUTHENTICATE").await?;
        Ok(())
    }

    /// Publish an onion service for `key_blob` forwarding `virtual_port` to
    /// `127.0.0.1:local_port`. Returns the service id Tor reports.
    pub async fn add_onion(
        &mut self,
        key_type: &str,
        key_blob: &str,
        virtual_port: u16,
        local_port: u16,
    ) -> Result<String, TorError> {
        let reply = self
            .command(&format!(
                "ADD_ONION {}:{} Port={},127.0.0.1:{}",
                key_type, key_blob, virtual_port, local_port
            ))
            .await?;
        let service_id = reply
            .value("ServiceID")
            .ok_or_else(|| TorError::Protocol("ADD_ONION reply without ServiceID".into()))?
            .to_string();
        info!("onion service {} published", service_id);
        Ok(service_id)
    }
}
