// ABOUTME: Integration tests for HostSession: host keys, frame-relayed hotkeys and teardown
// ABOUTME: Checks the same-origin fast path, the cross-origin downgrade and duplicate suppression

mod common;

use common::{down, up, MemoryFrameStorage, RecordingWindow, TestFrame, WindowCall};
use kittengames_core::frame::spawn_agent;
use kittengames_core::hotkeys::{HotkeyAction, HotkeyDef, HotkeyStore};
use kittengames_core::messenger::MessengerConfig;
use kittengames_core::protocol::{connect_frame, FrameMessage};
use kittengames_core::script::EffectScriptEngine;
use kittengames_core::session::{HostSession, SessionDeps};
use kittengames_core::settings::SettingsStore;
use kittengames_core::storage::MemoryStore;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;

struct Fixture {
    window: Arc<RecordingWindow>,
    hotkeys: Arc<HotkeyStore>,
    settings: SettingsStore,
    session: HostSession,
}

fn def(keys: &[&str], action: HotkeyAction) -> HotkeyDef {
    HotkeyDef {
        keys: keys.iter().map(|k| k.to_string()).collect(),
        action,
        enabled: true,
        description: None,
    }
}

fn start() -> Fixture {
    let window = RecordingWindow::new();
    let backend = MemoryStore::shared();
    let hotkeys = Arc::new(HotkeyStore::open(backend.clone()));
    let settings = SettingsStore::new(backend);
    let session = HostSession::start(
        MessengerConfig::default(),
        SessionDeps {
            window: window.clone(),
            engine: Arc::new(EffectScriptEngine),
            hotkeys: Arc::clone(&hotkeys),
            settings: settings.clone(),
        },
    );
    Fixture {
        window,
        hotkeys,
        settings,
        session,
    }
}

async fn settle() {
    tokio::time::sleep(Duration::from_millis(10)).await;
}

#[tokio::test(start_paused = true)]
async fn test_host_keys_run_newest_matching_hotkey() {
    let fx = start();
    fx.hotkeys
        .add(def(&["Ctrl", "b"], HotkeyAction::Back))
        .unwrap();
    fx.hotkeys
        .add(def(&["b", "Ctrl"], HotkeyAction::Forward))
        .unwrap();

    fx.session.on_key(down("Control"));
    let fired = fx.session.on_key(down("B")).unwrap();
    assert_eq!(fired.action, HotkeyAction::Forward);
    assert_eq!(fx.window.calls(), vec![WindowCall::Forward]);
}

#[tokio::test(start_paused = true)]
async fn test_released_keys_do_not_leak_into_next_combo() {
    let fx = start();
    fx.hotkeys
        .add(def(&["Ctrl", "Alt", "q"], HotkeyAction::CloseTab))
        .unwrap();
    fx.hotkeys.add(def(&["q"], HotkeyAction::Refresh)).unwrap();

    assert!(fx.session.on_key(down("Control")).is_none());
    assert!(fx.session.on_key(down("Alt")).is_none());
    fx.session.on_key(up("Alt"));
    fx.session.on_key(up("Control"));
    let fired = fx.session.on_key(down("q")).unwrap();
    assert_eq!(fired.action, HotkeyAction::Refresh);
    assert_eq!(fx.window.calls(), vec![WindowCall::Reload]);
}

#[tokio::test(start_paused = true)]
async fn test_master_switch_disables_host_hotkeys() {
    let fx = start();
    fx.hotkeys.add(def(&["F9"], HotkeyAction::Fullscreen)).unwrap();
    fx.settings.set_hotkeys_enabled(false).unwrap();

    assert!(fx.session.on_key(down("F9")).is_none());
    assert!(fx.window.calls().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_script_hotkey_runs_allowed_effects() {
    let fx = start();
    let mut attributes = std::collections::BTreeMap::new();
    attributes.insert("home".to_string(), "https://classroom.google.com".to_string());
    fx.hotkeys
        .add(def(
            &["Ctrl", "Shift", "h"],
            HotkeyAction::Javascript {
                script: "title('Classes'); navigate(home)".to_string(),
                attributes,
            },
        ))
        .unwrap();

    fx.session.on_key(down("Control"));
    fx.session.on_key(down("Shift"));
    fx.session.on_key(down("H"));
    assert_eq!(
        fx.window.calls(),
        vec![
            WindowCall::Title("Classes".to_string()),
            WindowCall::Navigate("https://classroom.google.com".to_string()),
        ]
    );
}

#[tokio::test(start_paused = true)]
async fn test_frame_hotkey_is_executed_on_host() {
    let mut fx = start();
    fx.hotkeys
        .add(def(
            &["Ctrl", "q"],
            HotkeyAction::Redirect {
                url: "/".to_string(),
            },
        ))
        .unwrap();

    let (port, endpoint) = connect_frame(fx.session.mailbox());
    fx.session
        .attach_frame(port, &TestFrame::cross_origin())
        .await
        .unwrap();
    let (keys_tx, keys_rx) = mpsc::unbounded_channel();
    let _agent = spawn_agent(endpoint, MemoryFrameStorage::default(), keys_rx);
    settle().await;

    keys_tx.send(down("Control")).unwrap();
    keys_tx.send(down("q")).unwrap();
    settle().await;

    assert_eq!(fx.window.calls(), vec![WindowCall::Navigate("/".to_string())]);
}

#[tokio::test(start_paused = true)]
async fn test_same_origin_frame_keys_and_duplicate_delivery() {
    let mut fx = start();
    let id = fx
        .hotkeys
        .add(def(&["Escape", "Shift"], HotkeyAction::Escape))
        .unwrap();

    let (port, endpoint) = connect_frame(fx.session.mailbox());
    let parent = endpoint.parent.clone();
    let (frame, frame_keys) = TestFrame::same_origin();
    let before = fx.session.listener_count();
    fx.session.attach_frame(port, &frame).await.unwrap();
    assert_eq!(fx.session.listener_count(), before + 1);

    frame_keys.send(down("Shift")).unwrap();
    frame_keys.send(down("Escape")).unwrap();
    // The helper script inside the same frame reports the same press
    parent.post(FrameMessage::Hotkey {
        hotkey: fx.hotkeys.get(&id).unwrap(),
    });
    settle().await;

    assert_eq!(fx.window.calls(), vec![WindowCall::ExitFullscreen]);
}

#[tokio::test(start_paused = true)]
async fn test_cross_origin_frame_gets_no_key_listener() {
    let mut fx = start();
    let (port, _endpoint) = connect_frame(fx.session.mailbox());
    let before = fx.session.listener_count();
    fx.session
        .attach_frame(port, &TestFrame::cross_origin())
        .await
        .unwrap();
    assert_eq!(fx.session.listener_count(), before);
}

#[tokio::test(start_paused = true)]
async fn test_confirm_close_guard_tracks_settings_and_close() {
    let fx = start();
    fx.settings.update_launch(|s| s.confirm_close = true).unwrap();
    settle().await;
    assert!(fx.session.launcher().unload_guard_installed());

    fx.settings.update_launch(|s| s.confirm_close = false).unwrap();
    settle().await;
    assert!(!fx.session.launcher().unload_guard_installed());

    fx.settings.update_launch(|s| s.confirm_close = true).unwrap();
    settle().await;
    let messenger = fx.session.messenger().clone();
    fx.session.close().await;

    assert_eq!(
        fx.window.calls(),
        vec![
            WindowCall::InstallGuard,
            WindowCall::RemoveGuard,
            WindowCall::InstallGuard,
            WindowCall::RemoveGuard,
        ]
    );
    settle().await;
    assert!(messenger.set_hotkeys(Vec::new(), true).await.is_err());
}
