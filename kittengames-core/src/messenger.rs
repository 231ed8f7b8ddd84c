// ABOUTME: Host side of the cross-frame protocol, run as an actor task behind a cloneable handle
// ABOUTME: Pushes hotkey config, relays frame hotkeys, and runs save/restore requests with timeouts

use crate::hotkeys::Hotkey;
use crate::protocol::{Envelope, FrameId, FrameMessage, FramePort, HostInbox};
use crate::save::GameData;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::{mpsc, oneshot};
use tokio::time::Instant;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MessengerConfig {
    /// How long a save extraction may take before it is reported as timed out.
    pub request_timeout: Duration,
    /// Delay before the second config push after attaching a frame.
    pub settle_delay: Duration,
    /// How long a restore waits for an error echo before counting as success.
    pub restore_grace: Duration,
}

impl Default for MessengerConfig {
    fn default() -> Self {
        Self {
            request_timeout: Duration::from_secs(10),
            settle_delay: Duration::from_millis(500),
            restore_grace: Duration::from_millis(1500),
        }
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum MessengerError {
    #[error("No response from the game within {0:?}")]
    Timeout(Duration),
    #[error("No game frame is attached")]
    NoFrame,
    #[error("Another save request is already in progress")]
    Busy,
    #[error("Game reported an error: {0}")]
    Frame(String),
    #[error("Messenger has shut down")]
    Closed,
}

/// Commands sent from MessengerHandle to the messenger task
#[derive(Debug)]
pub enum Command {
    Attach {
        port: FramePort,
        reply: oneshot::Sender<()>,
    },
    Detach {
        reply: oneshot::Sender<()>,
    },
    SetHotkeys {
        hotkeys: Vec<Hotkey>,
        enabled: bool,
        reply: oneshot::Sender<()>,
    },
    RequestSave {
        reply: oneshot::Sender<Result<GameData, MessengerError>>,
    },
    Restore {
        data: GameData,
        reply: oneshot::Sender<Result<(), MessengerError>>,
    },
    Shutdown {
        reply: oneshot::Sender<()>,
    },
}

/// Send + Sync handle to the messenger task.
#[derive(Debug, Clone)]
pub struct MessengerHandle {
    tx: mpsc::Sender<Command>,
}

impl MessengerHandle {
    /// Start tracking `port` as the game frame and push the config to it.
    pub async fn attach(&self, port: FramePort) -> Result<(), MessengerError> {
        self.call(|reply| Command::Attach { port, reply }).await
    }

    pub async fn detach(&self) -> Result<(), MessengerError> {
        self.call(|reply| Command::Detach { reply }).await
    }

    /// Replace the hotkey config and re-push it to the attached frame.
    pub async fn set_hotkeys(
        &self,
        hotkeys: Vec<Hotkey>,
        enabled: bool,
    ) -> Result<(), MessengerError> {
        self.call(|reply| Command::SetHotkeys {
            hotkeys,
            enabled,
            reply,
        })
        .await
    }

    /// Ask the frame for its storage.
    pub async fn request_save(&self) -> Result<GameData, MessengerError> {
        self.call(|reply| Command::RequestSave { reply }).await?
    }

    /// Send storage back into the frame.
    pub async fn restore(&self, data: GameData) -> Result<(), MessengerError> {
        self.call(|reply| Command::Restore { data, reply }).await?
    }

    pub async fn shutdown(&self) -> Result<(), MessengerError> {
        self.call(|reply| Command::Shutdown { reply }).await
    }

    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }

    async fn call<T>(
        &self,
        build: impl FnOnce(oneshot::Sender<T>) -> Command,
    ) -> Result<T, MessengerError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.tx
            .send(build(reply_tx))
            .await
            .map_err(|_| MessengerError::Closed)?;
        reply_rx.await.map_err(|_| MessengerError::Closed)
    }
}

enum Pending {
    Extract {
        deadline: Instant,
        reply: oneshot::Sender<Result<GameData, MessengerError>>,
    },
    Restore {
        deadline: Instant,
        reply: oneshot::Sender<Result<(), MessengerError>>,
    },
}

impl Pending {
    fn deadline(&self) -> Instant {
        match self {
            Self::Extract { deadline, .. } | Self::Restore { deadline, .. } => *deadline,
        }
    }
}

/// Host-side messenger state, owned by its task.
pub struct HostMessenger {
    config: MessengerConfig,
    frame: Option<FramePort>,
    hotkeys: Vec<Hotkey>,
    enabled: bool,
    pending: Option<Pending>,
    settle_at: Option<Instant>,
    triggers: mpsc::UnboundedSender<Hotkey>,
}

impl HostMessenger {
    /// Spawn the messenger over the host window's inbox.
    ///
    /// Returns the handle and the stream of hotkeys triggered inside the
    /// attached frame.
    pub fn spawn(
        config: MessengerConfig,
        inbox: HostInbox,
    ) -> (MessengerHandle, mpsc::UnboundedReceiver<Hotkey>) {
        let (tx, rx) = mpsc::channel::<Command>(32);
        let (triggers, trigger_rx) = mpsc::unbounded_channel();
        let messenger = Self {
            config,
            frame: None,
            hotkeys: Vec::new(),
            enabled: true,
            pending: None,
            settle_at: None,
            triggers,
        };
        tokio::spawn(messenger.run(rx, inbox));
        (MessengerHandle { tx }, trigger_rx)
    }

    async fn run(mut self, mut commands: mpsc::Receiver<Command>, mut inbox: HostInbox) {
        let mut inbox_open = true;
        loop {
            let far = Instant::now() + Duration::from_secs(86_400);
            let pending_deadline = self.pending.as_ref().map(Pending::deadline).unwrap_or(far);
            let settle_deadline = self.settle_at.unwrap_or(far);

            tokio::select! {
                cmd = commands.recv() => match cmd {
                    Some(cmd) => {
                        if !self.handle_command(cmd) {
                            break;
                        }
                    }
                    None => break,
                },
                envelope = inbox.recv(), if inbox_open => match envelope {
                    Some(envelope) => self.handle_envelope(envelope),
                    None => inbox_open = false,
                },
                _ = tokio::time::sleep_until(pending_deadline), if self.pending.is_some() => {
                    self.expire_pending();
                }
                _ = tokio::time::sleep_until(settle_deadline), if self.settle_at.is_some() => {
                    self.settle_at = None;
                    tracing::debug!("Settle delay elapsed, re-pushing hotkey config");
                    self.push_config();
                }
            }
        }
        tracing::debug!("Messenger stopped");
    }

    /// Returns false once the messenger should stop.
    fn handle_command(&mut self, cmd: Command) -> bool {
        match cmd {
            Command::Attach { port, reply } => {
                tracing::info!(frame = %port.id(), "Attaching game frame");
                self.fail_pending(MessengerError::NoFrame);
                self.frame = Some(port);
                self.push_config();
                self.settle_at = Some(Instant::now() + self.config.settle_delay);
                let _ = reply.send(());
            }
            Command::Detach { reply } => {
                if let Some(frame) = self.frame.take() {
                    tracing::info!(frame = %frame.id(), "Detached game frame");
                }
                self.settle_at = None;
                self.fail_pending(MessengerError::NoFrame);
                let _ = reply.send(());
            }
            Command::SetHotkeys {
                hotkeys,
                enabled,
                reply,
            } => {
                self.hotkeys = hotkeys;
                self.enabled = enabled;
                self.push_config();
                let _ = reply.send(());
            }
            Command::RequestSave { reply } => {
                if self.pending.is_some() {
                    let _ = reply.send(Err(MessengerError::Busy));
                    return true;
                }
                if !self.post(FrameMessage::SaveExtract) {
                    let _ = reply.send(Err(MessengerError::NoFrame));
                    return true;
                }
                self.pending = Some(Pending::Extract {
                    deadline: Instant::now() + self.config.request_timeout,
                    reply,
                });
            }
            Command::Restore { data, reply } => {
                if self.pending.is_some() {
                    let _ = reply.send(Err(MessengerError::Busy));
                    return true;
                }
                if !self.post(FrameMessage::SaveRestore { data }) {
                    let _ = reply.send(Err(MessengerError::NoFrame));
                    return true;
                }
                self.pending = Some(Pending::Restore {
                    deadline: Instant::now() + self.config.restore_grace,
                    reply,
                });
            }
            Command::Shutdown { reply } => {
                self.fail_pending(MessengerError::Closed);
                let _ = reply.send(());
                return false;
            }
        }
        true
    }

    fn handle_envelope(&mut self, envelope: Envelope) {
        let Envelope { source, message } = envelope;
        match message {
            FrameMessage::HotkeyRequest => {
                if self.is_attached(source) {
                    tracing::debug!(frame = %source, "Frame requested hotkey config");
                    self.push_config();
                } else {
                    tracing::debug!(frame = %source, "Ignoring config request from unknown frame");
                }
            }
            FrameMessage::Hotkey { hotkey } => {
                if !self.is_attached(source) {
                    tracing::debug!(frame = %source, "Ignoring hotkey from unrelated frame");
                    return;
                }
                tracing::info!(hotkey_id = %hotkey.id, action = hotkey.action.label(), "Hotkey triggered in frame");
                let _ = self.triggers.send(hotkey);
            }
            FrameMessage::SaveData { data } => match self.pending.take() {
                Some(Pending::Extract { reply, .. }) => {
                    tracing::info!(
                        local_storage = data.local_storage.len(),
                        cookies = data.cookies.len(),
                        indexed_db = data.indexed_db.len(),
                        "Save data received"
                    );
                    let _ = reply.send(Ok(data));
                }
                other => {
                    self.pending = other;
                    tracing::debug!(frame = %source, "Dropping save data with no pending request");
                }
            },
            FrameMessage::SaveError { error } => match self.pending.take() {
                Some(Pending::Extract { reply, .. }) => {
                    tracing::warn!(error = %error, "Save extraction failed in frame");
                    let _ = reply.send(Err(MessengerError::Frame(error)));
                }
                Some(Pending::Restore { reply, .. }) => {
                    tracing::warn!(error = %error, "Save restore failed in frame");
                    let _ = reply.send(Err(MessengerError::Frame(error)));
                }
                None => {
                    tracing::debug!(frame = %source, error = %error, "Dropping save error with no pending request");
                }
            },
            other => {
                tracing::debug!(frame = %source, kind = other.kind(), "Ignoring host-bound message");
            }
        }
    }

    fn expire_pending(&mut self) {
        match self.pending.take() {
            Some(Pending::Extract { reply, .. }) => {
                tracing::warn!(timeout = ?self.config.request_timeout, "Save request timed out");
                let _ = reply.send(Err(MessengerError::Timeout(self.config.request_timeout)));
            }
            Some(Pending::Restore { reply, .. }) => {
                tracing::info!("Save restored");
                let _ = reply.send(Ok(()));
            }
            None => {}
        }
    }

    fn fail_pending(&mut self, error: MessengerError) {
        match self.pending.take() {
            Some(Pending::Extract { reply, .. }) => {
                let _ = reply.send(Err(error));
            }
            Some(Pending::Restore { reply, .. }) => {
                let _ = reply.send(Err(error));
            }
            None => {}
        }
    }

    fn is_attached(&self, source: FrameId) -> bool {
        self.frame.as_ref().is_some_and(|f| f.id() == source)
    }

    fn push_config(&mut self) {
        let message = FrameMessage::HotkeyConfig {
            hotkeys: self.hotkeys.clone(),
            enabled: self.enabled,
        };
        if self.post(message) {
            tracing::debug!(count = self.hotkeys.len(), enabled = self.enabled, "Pushed hotkey config");
        }
    }

    fn post(&mut self, message: FrameMessage) -> bool {
        let Some(frame) = self.frame.as_ref() else {
            return false;
        };
        if frame.post(message) {
            return true;
        }
        tracing::debug!(frame = %frame.id(), "Game frame is gone, detaching");
        self.frame = None;
        self.settle_at = None;
        false
    }
}
