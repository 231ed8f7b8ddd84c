// ABOUTME: HostSession wires the messenger, hotkey matching, action execution and launch guard together
// ABOUTME: Every listener it starts is owned by its SubscriptionSet and torn down on close

use crate::actions::HotkeyExecutor;
use crate::hotkeys::{Hotkey, HotkeyStore};
use crate::keys::HotkeyMatcher;
use crate::launch::Launcher;
use crate::messenger::{HostMessenger, MessengerConfig, MessengerError, MessengerHandle};
use crate::protocol::{host_channel, FramePort, HostMailbox};
use crate::script::ScriptEngine;
use crate::settings::{SettingsChange, SettingsStore};
use crate::subscription::{Subscription, SubscriptionSet};
use crate::traits::{EmbeddedFrame, HostWindow, KeyEvent};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::broadcast::error::RecvError;
use tokio::time::Instant;

/// Window in which the same hotkey arriving over both delivery paths counts once.
const DUPLICATE_WINDOW: Duration = Duration::from_millis(100);

/// Collaborators a session runs against.
pub struct SessionDeps {
    pub window: Arc<dyn HostWindow>,
    pub engine: Arc<dyn ScriptEngine>,
    pub hotkeys: Arc<HotkeyStore>,
    pub settings: SettingsStore,
}

/// Shared by the host document listener, the same-origin frame listener and
/// the frame trigger relay.
struct Dispatcher {
    executor: HotkeyExecutor,
    hotkeys: Arc<HotkeyStore>,
    settings: SettingsStore,
    last_fired: Mutex<Option<(String, Instant)>>,
}

impl Dispatcher {
    fn on_key(&self, matcher: &Mutex<HotkeyMatcher>, event: KeyEvent) -> Option<Hotkey> {
        let mut matcher = matcher.lock().unwrap_or_else(|e| e.into_inner());
        match event {
            KeyEvent::Down(key) => {
                if !self.settings.hotkeys_enabled() {
                    return None;
                }
                let hotkey = matcher.on_key_down(&key, &self.hotkeys.matching_order())?;
                drop(matcher);
                self.fire(&hotkey);
                Some(hotkey)
            }
            KeyEvent::Up(key) => {
                matcher.on_key_up(&key);
                None
            }
            KeyEvent::Blur => {
                matcher.on_blur();
                None
            }
        }
    }

    fn fire(&self, hotkey: &Hotkey) {
        {
            let mut last = self.last_fired.lock().unwrap_or_else(|e| e.into_inner());
            let now = Instant::now();
            if let Some((id, at)) = last.as_ref() {
                if *id == hotkey.id && now.duration_since(*at) < DUPLICATE_WINDOW {
                    tracing::debug!(hotkey_id = %hotkey.id, "Dropping duplicate hotkey delivery");
                    return;
                }
            }
            *last = Some((hotkey.id.clone(), now));
        }
        // Failures are logged by the executor and never stop the session
        let _ = self.executor.execute(hotkey);
    }
}

/// Live state of the page hosting a game.
pub struct HostSession {
    messenger: MessengerHandle,
    mailbox: HostMailbox,
    dispatcher: Arc<Dispatcher>,
    host_matcher: Arc<Mutex<HotkeyMatcher>>,
    launcher: Arc<Launcher>,
    subscriptions: SubscriptionSet,
}

impl HostSession {
    /// Start the messenger and the session's listeners.
    ///
    /// Must be called inside a tokio runtime.
    pub fn start(config: MessengerConfig, deps: SessionDeps) -> Self {
        let SessionDeps {
            window,
            engine,
            hotkeys,
            settings,
        } = deps;

        let (mailbox, inbox) = host_channel();
        let (messenger, mut triggers) = HostMessenger::spawn(config, inbox);
        let launcher = Arc::new(Launcher::new(Arc::clone(&window)));
        launcher.sync_unload_guard(&settings.launch());

        let dispatcher = Arc::new(Dispatcher {
            executor: HotkeyExecutor::new(window, engine),
            hotkeys,
            settings: settings.clone(),
            last_fired: Mutex::new(None),
        });

        let mut subscriptions = SubscriptionSet::new();

        let relay = Arc::clone(&dispatcher);
        subscriptions.push(Subscription::from_task(
            "frame-hotkeys",
            tokio::spawn(async move {
                while let Some(hotkey) = triggers.recv().await {
                    relay.fire(&hotkey);
                }
            }),
        ));

        let mut changes = settings.subscribe();
        let watcher_messenger = messenger.clone();
        let watcher_launcher = Arc::clone(&launcher);
        let watcher = Arc::clone(&dispatcher);
        subscriptions.push(Subscription::from_task(
            "settings",
            tokio::spawn(async move {
                loop {
                    match changes.recv().await {
                        Ok(SettingsChange::Launch(launch)) => {
                            watcher_launcher.sync_unload_guard(&launch);
                        }
                        Ok(SettingsChange::HotkeysEnabled(enabled)) => {
                            let list = watcher.hotkeys.matching_order();
                            if watcher_messenger.set_hotkeys(list, enabled).await.is_err() {
                                break;
                            }
                        }
                        Ok(_) => {}
                        Err(RecvError::Lagged(skipped)) => {
                            tracing::debug!(skipped, "Settings watcher lagged");
                        }
                        Err(RecvError::Closed) => break,
                    }
                }
            }),
        ));

        let guard_launcher = Arc::clone(&launcher);
        subscriptions.push(Subscription::new("beforeunload", move || {
            guard_launcher.remove_unload_guard();
        }));

        tracing::info!("Host session started");
        Self {
            messenger,
            mailbox,
            dispatcher,
            host_matcher: Arc::new(Mutex::new(HotkeyMatcher::new())),
            launcher,
            subscriptions,
        }
    }

    pub fn messenger(&self) -> &MessengerHandle {
        &self.messenger
    }

    /// Mailbox frames use to post to this page.
    pub fn mailbox(&self) -> &HostMailbox {
        &self.mailbox
    }

    pub fn launcher(&self) -> Arc<Launcher> {
        Arc::clone(&self.launcher)
    }

    pub fn listener_count(&self) -> usize {
        self.subscriptions.len()
    }

    /// Push the current hotkey list to the frame.
    pub async fn refresh_hotkeys(&self) -> Result<(), MessengerError> {
        let list = self.dispatcher.hotkeys.matching_order();
        let enabled = self.dispatcher.settings.hotkeys_enabled();
        self.messenger.set_hotkeys(list, enabled).await
    }

    /// Attach a freshly loaded game frame.
    ///
    /// Same-origin frames also get direct key listeners; for cross-origin
    /// frames that step is skipped and the message protocol alone is used.
    pub async fn attach_frame(
        &mut self,
        port: FramePort,
        frame: &dyn EmbeddedFrame,
    ) -> Result<(), MessengerError> {
        self.subscriptions.remove("same-origin-keys");
        self.refresh_hotkeys().await?;
        self.messenger.attach(port).await?;

        match frame.same_origin_keys() {
            Ok(mut keys) => {
                let dispatcher = Arc::clone(&self.dispatcher);
                let matcher = Arc::new(Mutex::new(HotkeyMatcher::new()));
                self.subscriptions.push(Subscription::from_task(
                    "same-origin-keys",
                    tokio::spawn(async move {
                        while let Some(event) = keys.recv().await {
                            dispatcher.on_key(&matcher, event);
                        }
                    }),
                ));
                tracing::debug!("Attached same-origin key listeners");
            }
            Err(e) => {
                tracing::debug!(error = %e, "Frame keys not accessible, using messages only");
            }
        }
        Ok(())
    }

    /// Key event on the host document itself.
    pub fn on_key(&self, event: KeyEvent) -> Option<Hotkey> {
        self.dispatcher.on_key(&self.host_matcher, event)
    }

    /// Tear down every listener and stop the messenger.
    pub async fn close(mut self) {
        self.subscriptions.close_all();
        if let Err(e) = self.messenger.shutdown().await {
            tracing::debug!(error = %e, "Messenger already stopped");
        }
        tracing::info!("Host session closed");
    }
}
