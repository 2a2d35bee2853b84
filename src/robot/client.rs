use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use serde::de::{DeserializeOwned, IgnoredAny};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::config::{Credentials, RobotConfig};
use crate::error::RobotError;

use super::{Board, Extra, GpioPin, ResourceName};

/// Port used when the configured host carries none.
pub const DEFAULT_ROBOT_PORT: u16 = 9090;

#[derive(Serialize)]
struct Request<'a> {
    id: u64,
    method: &'a str,
    params: Value,
}

#[derive(Deserialize)]
struct Response {
    id: u64,
    #[serde(default)]
    result: Option<Value>,
    #[serde(default)]
    error: Option<RemoteError>,
}

#[derive(Deserialize)]
struct RemoteError {
    code: String,
    #[serde(default)]
    message: String,
}

impl From<RemoteError> for RobotError {
    fn from(e: RemoteError) -> Self {
        match e.code.as_str() {
            "unauthenticated" | "permission_denied" => RobotError::Auth(e.message),
            _ => RobotError::Remote {
                code: e.code,
                message: e.message,
            },
        }
    }
}

#[derive(Deserialize)]
struct PinReading {
    high: bool,
}

/// Requests queued for the session task before callers wait for capacity.
const CALL_QUEUE: usize = 32;

/// How long `close` waits for the session task to shut the socket down.
const CLOSE_TIMEOUT: Duration = Duration::from_secs(2);

type Reply = oneshot::Sender<Result<Value, RobotError>>;

struct Call {
    method: String,
    params: Value,
    reply: Reply,
}

/// One request/response stream to the robot service.
///
/// A dedicated task owns the socket. It numbers requests, writes each frame
/// whole and routes replies back by id, so callers may be dropped at any
/// point without tearing a frame. Replies nobody waits for are skipped.
struct Session {
    addr: String,
    calls: mpsc::Sender<Call>,
    shutdown: watch::Sender<bool>,
    task: std::sync::Mutex<Option<JoinHandle<()>>>,
}

impl Session {
    fn spawn(addr: String, stream: TcpStream) -> Self {
        let (calls, calls_rx) = mpsc::channel(CALL_QUEUE);
        let (shutdown, shutdown_rx) = watch::channel(false);
        let task = tokio::spawn(run_session(addr.clone(), stream, calls_rx, shutdown_rx));
        Self {
            addr,
            calls,
            shutdown,
            task: std::sync::Mutex::new(Some(task)),
        }
    }

    async fn call<R: DeserializeOwned>(&self, method: &str, params: Value) -> Result<R, RobotError> {
        let (reply, reply_rx) = oneshot::channel();
        let call = Call {
            method: method.to_string(),
            params,
            reply,
        };
        self.calls.send(call).await.map_err(|_| RobotError::Closed)?;
        let result = reply_rx.await.map_err(|_| RobotError::Closed)??;
        Ok(serde_json::from_value(result)?)
    }

    /// Stop the session task and shut the socket down. Calls still in flight
    /// fail with [`RobotError::Closed`].
    async fn close(&self) {
        if self.shutdown.send(true).is_err() {
            debug!("Robot session {} already stopped", self.addr);
        }
        let task = self
            .task
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .take();
        let Some(task) = task else {
            return;
        };

        let abort = task.abort_handle();
        match tokio::time::timeout(CLOSE_TIMEOUT, task).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => warn!("Robot session {} task failed: {}", self.addr, e),
            Err(_) => {
                warn!("Robot session {} did not stop in {:?}, aborting", self.addr, CLOSE_TIMEOUT);
                abort.abort();
            }
        }
    }
}

async fn run_session(
    addr: String,
    stream: TcpStream,
    mut calls: mpsc::Receiver<Call>,
    mut shutdown: watch::Receiver<bool>,
) {
    let (read, mut writer) = stream.into_split();
    let mut lines = BufReader::new(read).lines();
    let mut waiting: HashMap<u64, Reply> = HashMap::new();
    let mut next_id: u64 = 0;

    loop {
        tokio::select! {
            _ = shutdown.changed() => break,
            call = calls.recv() => {
                let Some(call) = call else { break };
                if call.reply.is_closed() {
                    debug!("Dropping {} call, caller went away", call.method);
                    continue;
                }
                next_id += 1;
                let frame = match encode(next_id, &call.method, call.params) {
                    Ok(frame) => frame,
                    Err(e) => {
                        let _ = call.reply.send(Err(e));
                        continue;
                    }
                };
                if let Err(e) = writer.write_all(&frame).await {
                    warn!("Error writing to robot {}: {}", addr, e);
                    let _ = call.reply.send(Err(e.into()));
                    break;
                }
                waiting.insert(next_id, call.reply);
            }
            // next_line is cancel safe; partial lines stay buffered
            line = lines.next_line() => match line {
                Ok(Some(line)) => dispatch(&addr, &mut waiting, &line),
                Ok(None) => {
                    warn!("Robot {} closed the session", addr);
                    break;
                }
                Err(e) => {
                    warn!("Error reading from robot {}: {}", addr, e);
                    break;
                }
            },
        }
    }

    calls.close();
    if let Err(e) = writer.shutdown().await {
        debug!("Error shutting down robot session {}: {}", addr, e);
    }
    debug!("Robot session {} stopped, {} calls abandoned", addr, waiting.len());
}

fn encode(id: u64, method: &str, params: Value) -> Result<Vec<u8>, RobotError> {
    let mut frame = serde_json::to_vec(&Request { id, method, params })?;
    frame.push(b'\n');
    Ok(frame)
}

/// Hand a reply line to the caller waiting on its id.
fn dispatch(addr: &str, waiting: &mut HashMap<u64, Reply>, line: &str) {
    let response: Response = match serde_json::from_str(line) {
        Ok(r) => r,
        Err(e) => {
            // no way to tell which request this answered
            warn!("Malformed reply from robot {}: {}", addr, e);
            for (_, reply) in waiting.drain() {
                let _ = reply.send(Err(RobotError::Protocol(e.to_string())));
            }
            return;
        }
    };

    let Some(reply) = waiting.remove(&response.id) else {
        debug!("Skipping reply {} with no waiting caller", response.id);
        return;
    };
    let result = match response.error {
        Some(err) => Err(err.into()),
        None => Ok(response.result.unwrap_or(Value::Null)),
    };
    if reply.send(result).is_err() {
        debug!("Caller of request {} went away", response.id);
    }
}

/// Client for a remote robot, holding one authenticated session.
pub struct RemoteRobot {
    session: Arc<Session>,
    resources: Vec<ResourceName>,
}

impl RemoteRobot {
    /// Dial and authenticate. The whole handshake is bounded by the configured
    /// dial timeout.
    pub async fn connect(config: &RobotConfig) -> Result<Self, RobotError> {
        if config.host.is_empty() {
            return Err(RobotError::MissingInput("hostname"));
        }
        if config.credentials.is_empty() {
            return Err(RobotError::MissingInput("credentials"));
        }
        if config.board_name.is_empty() {
            return Err(RobotError::MissingInput("board name"));
        }

        let addr = robot_address(&config.host);
        info!("Robot client connecting to {}...", addr);

        let handshake = async {
            let stream = TcpStream::connect(&addr)
                .await
                .map_err(|source| RobotError::Connect {
                    addr: addr.clone(),
                    source,
                })?;
            stream.set_nodelay(true)?;
            let session = Session::spawn(addr.clone(), stream);

            session
                .call::<IgnoredAny>("authenticate", auth_params(&config.credentials))
                .await?;
            let resources: Vec<ResourceName> = session.call("resource_names", json!({})).await?;
            Ok::<_, RobotError>(Self {
                session: Arc::new(session),
                resources,
            })
        };

        let robot = tokio::time::timeout(config.dial_timeout, handshake)
            .await
            .map_err(|_| RobotError::DialTimeout(config.dial_timeout))??;

        info!(
            "Robot client connected to {} ({} resources)",
            addr,
            robot.resources.len()
        );
        Ok(robot)
    }

    /// Resource names reported by the robot at connect time.
    pub fn resource_names(&self) -> &[ResourceName] {
        &self.resources
    }

    pub fn board(&self, name: &str) -> Result<RemoteBoard, RobotError> {
        if !self.resources.iter().any(|r| r.is_board() && r.name == name) {
            return Err(RobotError::NotFound {
                kind: "board",
                name: name.to_string(),
            });
        }
        Ok(RemoteBoard {
            session: Arc::clone(&self.session),
            name: name.to_string(),
        })
    }

    pub async fn close(&self) {
        self.session.close().await;
        info!("Robot client closed");
    }
}

pub struct RemoteBoard {
    session: Arc<Session>,
    name: String,
}

impl Board for RemoteBoard {
    type Pin = RemotePin;

    fn name(&self) -> &str {
        &self.name
    }

    async fn gpio_pin_by_name(&self, name: &str) -> Result<RemotePin, RobotError> {
        let params = json!({ "board": self.name, "pin": name });
        match self.session.call::<IgnoredAny>("board.gpio_pin", params).await {
            Ok(_) => Ok(RemotePin {
                session: Arc::clone(&self.session),
                board: self.name.clone(),
                name: name.to_string(),
            }),
            Err(RobotError::Remote { code, .. }) if code == "not_found" => {
                Err(RobotError::NotFound {
                    kind: "gpio pin",
                    name: name.to_string(),
                })
            }
            Err(e) => Err(e),
        }
    }
}

pub struct RemotePin {
    session: Arc<Session>,
    board: String,
    name: String,
}

impl GpioPin for RemotePin {
    async fn get(&self, extra: &Extra) -> Result<bool, RobotError> {
        let params = json!({ "board": self.board, "pin": self.name, "extra": extra });
        let reading: PinReading = self.session.call("board.gpio_get", params).await?;
        Ok(reading.high)
    }

    async fn set(&self, high: bool, extra: &Extra) -> Result<(), RobotError> {
        let params = json!({ "board": self.board, "pin": self.name, "high": high, "extra": extra });
        self.session
            .call::<IgnoredAny>("board.gpio_set", params)
            .await?;
        Ok(())
    }
}

fn auth_params(credentials: &Credentials) -> Value {
    match credentials {
        Credentials::LocationSecret(secret) => json!({
            "type": credentials.scheme(),
            "payload": secret,
        }),
        Credentials::ApiKey { id, key } => json!({
            "type": credentials.scheme(),
            "entity": id,
            "payload": key,
        }),
    }
}

/// Append the default port unless the host already ends in `:<port>`.
fn robot_address(host: &str) -> String {
    let has_port = host
        .rsplit_once(':')
        .is_some_and(|(h, port)| !h.is_empty() && !h.ends_with(':') && port.parse::<u16>().is_ok());
    if has_port {
        host.to_string()
    } else {
        format!("{host}:{DEFAULT_ROBOT_PORT}")
    }
}
