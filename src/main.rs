// ABOUTME: Command-line entry point: runs the HTTP host service and manages catalog, hotkeys and settings
// ABOUTME: Initializes logging and configuration before dispatching to the chosen subcommand

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use kittengames::{app::App, config::Config, logging, paths};
use kittengames_core::catalog::{play_path, CatalogEntry};
use kittengames_core::hotkeys::{HotkeyAction, HotkeyDef};
use kittengames_core::keys::format_combo;
use kittengames_core::launch::{cloaked_document, plan, LaunchPlan};
use kittengames_core::save;
use kittengames_core::script::analyze_script;
use kittengames_core::settings::OpenMode;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

#[derive(Parser)]
#[command(name = "kittengames")]
#[command(about = "Game catalog host with hotkeys, launch modes and save bundles")]
#[command(version)]
struct Cli {
    /// Also write logs to a daily rolling file in the log directory
    #[arg(long, global = true)]
    log_file: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the HTTP host service
    #[cfg(feature = "server")]
    Serve,

    /// List or search the game catalog
    Catalog {
        /// Bypass the cache and fetch the catalog again
        #[arg(long)]
        refresh: bool,
        /// Case-insensitive name filter
        #[arg(long)]
        search: Option<String>,
        /// Show the N most recently added games instead
        #[arg(long)]
        recent: Option<usize>,
    },

    /// Show how a game would open with the current launch settings
    Launch {
        slug: String,
        /// Write the cloaked about:blank document here
        #[arg(long)]
        out: Option<PathBuf>,
    },

    /// Manage hotkeys
    #[command(subcommand)]
    Hotkeys(HotkeyCommand),

    /// Work with save bundles
    #[command(subcommand)]
    Save(SaveCommand),

    /// Show or change launch and cloak settings
    #[command(subcommand)]
    Settings(SettingsCommand),
}

#[derive(Subcommand)]
enum HotkeyCommand {
    /// List all hotkeys, newest first
    List,
    /// Add a hotkey
    Add {
        /// Comma separated keys, e.g. "Ctrl,Shift,e"
        #[arg(long, value_delimiter = ',', required = true)]
        keys: Vec<String>,
        /// redirect, refresh, back, forward, fullscreen, escape, close-tab, new-tab or javascript
        #[arg(long)]
        action: String,
        /// Target for redirect
        #[arg(long)]
        url: Option<String>,
        /// Script body for javascript
        #[arg(long)]
        script: Option<String>,
        /// Script attribute as name=value (repeatable)
        #[arg(long = "attr")]
        attributes: Vec<String>,
        #[arg(long)]
        description: Option<String>,
    },
    /// Remove a hotkey by id
    Remove { id: String },
    /// Enable or disable a hotkey by id
    Toggle { id: String },
}

#[derive(Subcommand)]
enum SaveCommand {
    /// Validate a .kgsave file and summarize its contents
    Inspect { file: PathBuf },
}

#[derive(Subcommand)]
enum SettingsCommand {
    /// Print all settings as JSON
    Show,
    /// Set how games open: same-tab, new-tab or about-blank
    SetMode { mode: String },
    /// Apply a tab cloak preset (use "none" to clear)
    SetCloak { preset: String },
    /// Ask before leaving the page
    ConfirmClose {
        #[arg(action = clap::ArgAction::Set)]
        enabled: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    std::panic::set_hook(Box::new(|panic_info| {
        eprintln!("\nkittengames crashed: {}", panic_info);
        eprintln!("{:?}", std::backtrace::Backtrace::force_capture());
    }));

    let cli = Cli::parse();
    dotenvy::dotenv().ok();

    let log_dir = cli.log_file.then(paths::log_dir);
    let _log_guard = logging::init(log_dir.as_deref());

    let config = Config::load()?;
    tracing::debug!(
        catalog = %config.catalog.url,
        port = config.server.port,
        "Configuration loaded"
    );
    let app = Arc::new(App::open(config)?);

    match cli.command {
        #[cfg(feature = "server")]
        Commands::Serve => kittengames::server::serve(app).await,
        Commands::Catalog {
            refresh,
            search,
            recent,
        } => catalog(&app, refresh, search, recent).await,
        Commands::Launch { slug, out } => launch(&app, &slug, out).await,
        Commands::Hotkeys(cmd) => hotkeys(&app, cmd),
        Commands::Save(SaveCommand::Inspect { file }) => inspect_save(&file),
        Commands::Settings(cmd) => settings(&app, cmd),
    }
}

fn print_entry(entry: &CatalogEntry) {
    let added = entry.added.as_deref().unwrap_or("-");
    println!(
        "{:<32} {:<10} {:<12} {}",
        entry.name,
        entry.kind,
        added,
        play_path(&entry.name)
    );
}

async fn catalog(
    app: &App,
    refresh: bool,
    search: Option<String>,
    recent: Option<usize>,
) -> Result<()> {
    if refresh {
        app.catalog.get_catalog(true).await?;
    }
    let entries = match (recent, search) {
        (Some(limit), _) => app.catalog.recently_added(limit).await?,
        (None, Some(query)) => app.catalog.search(&query).await?,
        (None, None) => app.catalog.get_catalog(false).await?.to_vec(),
    };
    for entry in &entries {
        print_entry(entry);
    }
    println!("{} game(s)", entries.len());
    Ok(())
}

async fn launch(app: &App, slug: &str, out: Option<PathBuf>) -> Result<()> {
    let entry = app
        .catalog
        .find_by_slug(slug)
        .await?
        .with_context(|| format!("Unknown game: {}", slug))?;
    let url = entry.play_url(app.catalog.base_url())?;
    let plan = plan(&app.settings.launch(), url.as_str(), entry.opens_in_new_tab());

    match &plan {
        LaunchPlan::SameTab { url } => println!("same tab -> {}", url),
        LaunchPlan::NewTab { url } => println!("new tab -> {}", url),
        LaunchPlan::AboutBlank { url } => {
            println!("about:blank (cloaked) -> {}", url);
            let document = cloaked_document(url, &app.settings.cloak());
            match out {
                Some(path) => {
                    std::fs::write(&path, document)
                        .with_context(|| format!("Failed to write {}", path.display()))?;
                    println!("Cloaked document written to {}", path.display());
                }
                None => println!("{}", document),
            }
        }
    }
    Ok(())
}

fn parse_action(
    action: &str,
    url: Option<String>,
    script: Option<String>,
    attributes: Vec<String>,
) -> Result<HotkeyAction> {
    Ok(match action {
        "redirect" => HotkeyAction::Redirect {
            url: url.context("redirect needs --url")?,
        },
        "refresh" => HotkeyAction::Refresh,
        "back" => HotkeyAction::Back,
        "forward" => HotkeyAction::Forward,
        "fullscreen" => HotkeyAction::Fullscreen,
        "escape" => HotkeyAction::Escape,
        "close-tab" => HotkeyAction::CloseTab,
        "new-tab" => HotkeyAction::NewTab,
        "javascript" => {
            let mut attrs = BTreeMap::new();
            for pair in attributes {
                let (name, value) = pair
                    .split_once('=')
                    .with_context(|| format!("Attribute '{}' is not name=value", pair))?;
                attrs.insert(name.trim().to_string(), value.to_string());
            }
            HotkeyAction::Javascript {
                script: script.context("javascript needs --script")?,
                attributes: attrs,
            }
        }
        other => bail!("Unknown action: {}", other),
    })
}

fn hotkeys(app: &App, cmd: HotkeyCommand) -> Result<()> {
    match cmd {
        HotkeyCommand::List => {
            let enabled = app.settings.hotkeys_enabled();
            println!("Hotkeys are {}", if enabled { "on" } else { "off" });
            for hotkey in app.hotkeys.matching_order() {
                println!(
                    "{:<24} {:<20} {:<12} {}",
                    hotkey.id,
                    format_combo(&hotkey.keys),
                    hotkey.action.label(),
                    hotkey.description.as_deref().unwrap_or("")
                );
            }
            for hotkey in app.hotkeys.list().iter().filter(|h| !h.enabled) {
                println!("{:<24} {:<20} (disabled)", hotkey.id, format_combo(&hotkey.keys));
            }
        }
        HotkeyCommand::Add {
            keys,
            action,
            url,
            script,
            attributes,
            description,
        } => {
            let action = parse_action(&action, url, script, attributes)?;
            if let HotkeyAction::Javascript { script, .. } = &action {
                for finding in analyze_script(script) {
                    println!(
                        "warning [{:?}] {}: {}",
                        finding.severity, finding.pattern, finding.message
                    );
                }
            }
            let conflicts = app.hotkeys.conflicts(&keys, None);
            let id = app.hotkeys.add(HotkeyDef {
                keys,
                action,
                enabled: true,
                description,
            })?;
            println!("Added {}", id);
            if !conflicts.is_empty() {
                println!(
                    "Note: same keys as {}; the newest hotkey wins",
                    conflicts.join(", ")
                );
            }
        }
        HotkeyCommand::Remove { id } => {
            app.hotkeys.remove(&id)?;
            println!("Removed {}", id);
        }
        HotkeyCommand::Toggle { id } => {
            let hotkey = app
                .hotkeys
                .get(&id)
                .with_context(|| format!("Hotkey not found: {}", id))?;
            app.hotkeys.set_enabled(&id, !hotkey.enabled)?;
            println!(
                "{} is now {}",
                id,
                if hotkey.enabled { "disabled" } else { "enabled" }
            );
        }
    }
    Ok(())
}

fn inspect_save(file: &Path) -> Result<()> {
    let bytes =
        std::fs::read(file).with_context(|| format!("Failed to read {}", file.display()))?;
    let bundle = save::decode(&bytes)?;
    let data = &bundle.game_data;
    println!("scope:        {}", bundle.metadata.scope);
    println!("version:      {}", bundle.metadata.version);
    println!("created:      {}", bundle.metadata.timestamp);
    println!("page:         {}", bundle.metadata.url);
    println!("localStorage: {} key(s)", data.local_storage.len());
    println!("cookies:      {}", data.cookies.len());
    println!("indexedDB:    {} database(s)", data.indexed_db.len());
    Ok(())
}

fn settings(app: &App, cmd: SettingsCommand) -> Result<()> {
    match cmd {
        SettingsCommand::Show => {
            let summary = serde_json::json!({
                "launch": app.settings.launch(),
                "cloak": app.settings.cloak(),
                "hotkeysEnabled": app.settings.hotkeys_enabled(),
                "streamingDomain": app.settings.streaming_domain(),
                "navbarPosition": app.settings.navbar_position(),
            });
            println!("{}", serde_json::to_string_pretty(&summary)?);
        }
        SettingsCommand::SetMode { mode } => {
            let mode: OpenMode = mode.parse()?;
            app.settings.update_launch(|s| s.open_mode = mode)?;
            println!("Games now open in {}", mode);
        }
        SettingsCommand::SetCloak { preset } => {
            let cloak = app.settings.set_cloak_preset(&preset)?;
            println!("Tab shows \"{}\" ({})", cloak.title(), cloak.icon());
        }
        SettingsCommand::ConfirmClose { enabled } => {
            app.settings.update_launch(|s| s.confirm_close = enabled)?;
            println!("Confirm close {}", if enabled { "on" } else { "off" });
        }
    }
    Ok(())
}
