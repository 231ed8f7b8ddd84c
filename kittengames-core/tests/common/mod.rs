// ABOUTME: Test doubles for the browser seams: a recording host window, in-memory frame storage,
// ABOUTME: a scripted catalog source and a frame whose keys may or may not be reachable
#![allow(dead_code)]

use async_trait::async_trait;
use kittengames_core::catalog::{CatalogEntry, CatalogError, CatalogSource};
use kittengames_core::hotkeys::{Hotkey, HotkeyAction};
use kittengames_core::save::GameData;
use kittengames_core::traits::{
    DocumentChrome, EmbeddedFrame, FrameAccessError, FrameStorage, HostWindow, KeyEvent,
    PopupWindow,
};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WindowCall {
    Navigate(String),
    Open { url: String, target: String },
    Alert(String),
    InstallGuard,
    RemoveGuard,
    Reload,
    Back,
    Forward,
    ToggleFullscreen,
    ExitFullscreen,
    Close,
    Title(String),
    Favicon(String),
}

#[derive(Default)]
pub struct RecordingWindow {
    calls: Mutex<Vec<WindowCall>>,
    block_popups: AtomicBool,
    documents: Arc<Mutex<Vec<String>>>,
}

impl RecordingWindow {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn blocking_popups() -> Arc<Self> {
        let window = Self::default();
        window.block_popups.store(true, Ordering::SeqCst);
        Arc::new(window)
    }

    pub fn calls(&self) -> Vec<WindowCall> {
        self.calls.lock().unwrap().clone()
    }

    /// Documents written into popups, in order.
    pub fn documents(&self) -> Vec<String> {
        self.documents.lock().unwrap().clone()
    }

    fn record(&self, call: WindowCall) {
        self.calls.lock().unwrap().push(call);
    }
}

struct RecordingPopup {
    documents: Arc<Mutex<Vec<String>>>,
}

impl PopupWindow for RecordingPopup {
    fn write_document(&mut self, html: &str) {
        self.documents.lock().unwrap().push(html.to_string());
    }
}

impl DocumentChrome for RecordingWindow {
    fn set_title(&self, title: &str) {
        self.record(WindowCall::Title(title.to_string()));
    }

    fn set_favicon(&self, href: &str) {
        self.record(WindowCall::Favicon(href.to_string()));
    }
}

impl HostWindow for RecordingWindow {
    fn navigate(&self, url: &str) {
        self.record(WindowCall::Navigate(url.to_string()));
    }

    fn open(&self, url: &str, target: &str) -> Option<Box<dyn PopupWindow>> {
        self.record(WindowCall::Open {
            url: url.to_string(),
            target: target.to_string(),
        });
        if self.block_popups.load(Ordering::SeqCst) {
            return None;
        }
        Some(Box::new(RecordingPopup {
            documents: Arc::clone(&self.documents),
        }))
    }

    fn alert(&self, message: &str) {
        self.record(WindowCall::Alert(message.to_string()));
    }

    fn install_before_unload(&self) {
        self.record(WindowCall::InstallGuard);
    }

    fn remove_before_unload(&self) {
        self.record(WindowCall::RemoveGuard);
    }

    fn reload(&self) {
        self.record(WindowCall::Reload);
    }

    fn history_back(&self) {
        self.record(WindowCall::Back);
    }

    fn history_forward(&self) {
        self.record(WindowCall::Forward);
    }

    fn toggle_fullscreen(&self) {
        self.record(WindowCall::ToggleFullscreen);
    }

    fn exit_fullscreen(&self) {
        self.record(WindowCall::ExitFullscreen);
    }

    fn close(&self) {
        self.record(WindowCall::Close);
    }
}

/// Frame storage backed by a shared cell so tests can inspect it after the
/// agent task has taken ownership.
#[derive(Clone, Default)]
pub struct MemoryFrameStorage {
    pub data: Arc<Mutex<GameData>>,
}

impl MemoryFrameStorage {
    pub fn with_local_storage(pairs: &[(&str, &str)]) -> Self {
        let storage = Self::default();
        {
            let mut data = storage.data.lock().unwrap();
            for (k, v) in pairs {
                data.local_storage.insert(k.to_string(), v.to_string());
            }
        }
        storage
    }

    pub fn snapshot(&self) -> GameData {
        self.data.lock().unwrap().clone()
    }
}

impl FrameStorage for MemoryFrameStorage {
    fn extract(&self) -> anyhow::Result<GameData> {
        Ok(self.data.lock().unwrap().clone())
    }

    fn restore(&mut self, data: &GameData) -> anyhow::Result<()> {
        *self.data.lock().unwrap() = data.clone();
        Ok(())
    }
}

pub struct BrokenFrameStorage;

impl FrameStorage for BrokenFrameStorage {
    fn extract(&self) -> anyhow::Result<GameData> {
        anyhow::bail!("SecurityError: storage is disabled")
    }

    fn restore(&mut self, _data: &GameData) -> anyhow::Result<()> {
        anyhow::bail!("QuotaExceededError: storage is full")
    }
}

/// Catalog source returning a fixed list, optionally failing, counting calls.
#[derive(Default)]
pub struct StaticSource {
    entries: Mutex<Vec<CatalogEntry>>,
    failing: AtomicBool,
    calls: AtomicUsize,
}

impl StaticSource {
    pub fn new(entries: Vec<CatalogEntry>) -> Arc<Self> {
        Arc::new(Self {
            entries: Mutex::new(entries),
            ..Default::default()
        })
    }

    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    pub fn set_entries(&self, entries: Vec<CatalogEntry>) {
        *self.entries.lock().unwrap() = entries;
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl CatalogSource for StaticSource {
    async fn fetch(&self) -> Result<Vec<CatalogEntry>, CatalogError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.failing.load(Ordering::SeqCst) {
            return Err(CatalogError::Status(503));
        }
        Ok(self.entries.lock().unwrap().clone())
    }
}

/// Game frame for the same-origin key fast path.
pub struct TestFrame {
    keys: Mutex<Option<mpsc::UnboundedReceiver<KeyEvent>>>,
}

impl TestFrame {
    pub fn same_origin() -> (Self, mpsc::UnboundedSender<KeyEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (
            Self {
                keys: Mutex::new(Some(rx)),
            },
            tx,
        )
    }

    pub fn cross_origin() -> Self {
        Self {
            keys: Mutex::new(None),
        }
    }
}

impl EmbeddedFrame for TestFrame {
    fn same_origin_keys(&self) -> Result<mpsc::UnboundedReceiver<KeyEvent>, FrameAccessError> {
        self.keys
            .lock()
            .unwrap()
            .take()
            .ok_or(FrameAccessError::CrossOrigin)
    }
}

pub fn entry(name: &str, path: &str) -> CatalogEntry {
    CatalogEntry {
        name: name.to_string(),
        kind: "game".to_string(),
        image: format!("/img/{}.png", name),
        url: None,
        path: Some(path.to_string()),
        newtab: None,
        added: None,
    }
}

pub fn hotkey(id: &str, keys: &[&str], action: HotkeyAction) -> Hotkey {
    Hotkey {
        id: id.to_string(),
        keys: keys.iter().map(|k| k.to_string()).collect(),
        action,
        enabled: true,
        description: None,
        created_at: 0,
    }
}

pub fn down(key: &str) -> KeyEvent {
    KeyEvent::Down(key.to_string())
}

pub fn up(key: &str) -> KeyEvent {
    KeyEvent::Up(key.to_string())
}
