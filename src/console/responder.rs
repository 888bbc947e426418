use serde::Serialize;
use tokio::sync::mpsc;

/// One frame on a console connection: human-readable `response` lines for
/// commands, `log` lines from script runs, and a final `result` or `error`.
#[derive(Serialize, Clone, Debug, PartialEq)]
#[serde(tag = "type", content = "data", rename_all = "lowercase")]
pub enum ConsoleFrame {
    Response(String),
    Log(String),
    Error(String),
    Result(serde_json::Value),
}

impl ConsoleFrame {
    pub fn event_name(&self) -> &'static str {
        match self {
            ConsoleFrame::Response(_) => "response",
            ConsoleFrame::Log(_) => "log",
            ConsoleFrame::Error(_) => "error",
            ConsoleFrame::Result(_) => "result",
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum Outbound {
    Frame(ConsoleFrame),
    /// Ask the transport to close the connection after flushing.
    Close,
}

/// Response-emission capability handed to handlers and script runs. Sends
/// never fail; frames for a closed connection are dropped.
#[derive(Clone, Debug)]
pub struct Responder {
    tx: mpsc::UnboundedSender<Outbound>,
}

impl Responder {
    pub fn new(tx: mpsc::UnboundedSender<Outbound>) -> Self {
        Self { tx }
    }

    pub fn channel() -> (Self, mpsc::UnboundedReceiver<Outbound>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self::new(tx), rx)
    }

    pub fn response(&self, line: impl Into<String>) {
        self.frame(ConsoleFrame::Response(line.into()));
    }

    pub fn log(&self, line: impl Into<String>) {
        self.frame(ConsoleFrame::Log(line.into()));
    }

    pub fn close(&self) {
        let _ = self.tx.send(Outbound::Close);
    }

    pub fn frame(&self, frame: ConsoleFrame) {
        let _ = self.tx.send(Outbound::Frame(frame));
    }
}

/// Collects every frame queued so far, stopping at the first `Close`.
pub fn drain_frames(rx: &mut mpsc::UnboundedReceiver<Outbound>) -> Vec<ConsoleFrame> {
    let mut frames = Vec::new();
    while let Ok(item) = rx.try_recv() {
        match item {
            Outbound::Frame(frame) => frames.push(frame),
            Outbound::Close => break,
        }
    }
    frames
}
