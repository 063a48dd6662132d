mod actions;
mod ai;
mod auth;
mod config;
mod db;
mod gmail;
mod mime;
mod models;
mod store;
mod sync;
mod ui;

use crate::actions::MailAction;
use crate::ai::{AiError, EnhanceRequest, Enricher, GeminiClient};
use crate::config::{Config, matches_key};
use crate::gmail::{GmailClient, MailProvider, OutgoingMessage, ProviderError};
use crate::models::{CustomLabel, Folder, LABEL_COLORS};
use crate::store::InboxStore;
use crate::sync::{EnrichmentPacer, SharedStore, SyncRequest, Synchronizer, lock_store};
use crate::ui::{
    ComposeField, ComposeState, FocusedPanel, FolderEntry, PromptKind, PromptState, UIMode,
    UIState,
};
use anyhow::Context;
use crossterm::{
    event::{self, Event, KeyCode, KeyEvent, KeyModifiers},
    execute,
    terminal::{disable_raw_mode, enable_raw_mode},
};
use ratatui::Terminal;
use ratatui::backend::CrosstermBackend;
use std::io;
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

const DEBUG_LOG: &str = "mailpilot_debug.log";
const DB_URL: &str = "sqlite:mailpilot.db?mode=rwc";
const CREDENTIALS_FILE: &str = "credentials.json";

/// Results of background work, drained by the UI loop.
enum AppEvent {
    Status(String),
    DraftReady(String),
    DraftFailed(String),
    Sent,
    SendFailed(String),
    Answer(String),
}

struct App {
    config: Config,
    provider: Arc<dyn MailProvider>,
    enricher: Arc<dyn Enricher>,
    synchronizer: Synchronizer,
    store: SharedStore,
    cache: Arc<db::Database>,
    auth: auth::GmailAuthenticator,
    authenticated: bool,
    api_key: Option<String>,
    events: mpsc::Sender<AppEvent>,
}

async fn fetch_token(auth: Option<auth::GmailAuthenticator>) -> Option<String> {
    match auth {
        Some(auth) => auth::access_token(&auth).await,
        None => None,
    }
}

impl App {
    fn auth_for_task(&self) -> Option<auth::GmailAuthenticator> {
        self.authenticated.then(|| self.auth.clone())
    }

    fn start_sync(&self, folder: Folder, search: Option<String>) {
        let synchronizer = self.synchronizer.clone();
        let auth = self.auth_for_task();
        let api_key = self.api_key.clone();
        tokio::spawn(async move {
            let token = fetch_token(auth).await;
            let request = SyncRequest {
                folder,
                search,
                token,
                api_key,
            };
            if let Some(report) = synchronizer.run(request).await {
                info!(
                    generation = report.generation,
                    listed = report.listed,
                    dropped = report.dropped.len(),
                    enriched = report.enriched.len(),
                    failed = report.failed.len(),
                    cancelled = report.cancelled,
                    "sync finished"
                );
            }
        });
    }

    fn refresh(&self) {
        let (folder, search) = {
            let store = lock_store(&self.store);
            (store.folder.clone(), store.search.clone())
        };
        self.start_sync(folder, search);
    }

    fn forget_label(&self, name: &str) {
        let cache = self.cache.clone();
        let key = Folder::Label(name.to_string()).cache_key();
        tokio::spawn(async move {
            if let Err(e) = cache.clear_folder(&key).await {
                warn!("failed to clear cached label view: {:#}", e);
            }
        });
    }

    fn perform(&self, id: String, action: MailAction) {
        let provider = self.provider.clone();
        let store = self.store.clone();
        let auth = self.auth_for_task();
        let events = self.events.clone();
        tokio::spawn(async move {
            let token = fetch_token(auth).await;
            let result =
                actions::perform(provider.as_ref(), &store, token.as_deref(), &id, action).await;
            let notice = match result {
                Ok(_) => return,
                Err(ProviderError::Unauthorized) => {
                    format!("Sign in to {}", action.description())
                }
                Err(e) => format!("Could not {}: {}", action.description(), e),
            };
            let _ = events.send(AppEvent::Status(notice)).await;
        });
    }

    fn send(&self, message: OutgoingMessage) {
        let provider = self.provider.clone();
        let auth = self.auth_for_task();
        let events = self.events.clone();
        tokio::spawn(async move {
            let event = match fetch_token(auth).await {
                None => AppEvent::SendFailed(ProviderError::Unauthorized.to_string()),
                Some(token) => match provider.send_message(&token, &message).await {
                    Ok(id) => {
                        info!(id = %id, "message sent");
                        AppEvent::Sent
                    }
                    Err(e) => {
                        error!("Send failed: {}", e);
                        AppEvent::SendFailed(e.to_string())
                    }
                },
            };
            let _ = events.send(event).await;
        });
    }

    fn enhance(&self, request: EnhanceRequest) {
        let enricher = self.enricher.clone();
        let api_key = self.api_key.clone().unwrap_or_default();
        let events = self.events.clone();
        tokio::spawn(async move {
            let event = match enricher.enhance_draft(&api_key, &request).await {
                Ok(text) => AppEvent::DraftReady(text),
                Err(e) => AppEvent::DraftFailed(e.to_string()),
            };
            let _ = events.send(event).await;
        });
    }

    fn draft_reply(&self, body: String, sender_name: String) {
        let enricher = self.enricher.clone();
        let api_key = self.api_key.clone().unwrap_or_default();
        let events = self.events.clone();
        tokio::spawn(async move {
            let event = match enricher.generate_reply(&api_key, &body, &sender_name).await {
                Ok(text) => AppEvent::DraftReady(text),
                Err(e) => AppEvent::DraftFailed(e.to_string()),
            };
            let _ = events.send(event).await;
        });
    }

    fn chat(&self, question: String) {
        let enricher = self.enricher.clone();
        let api_key = self.api_key.clone().unwrap_or_default();
        let context = lock_store(&self.store).inbox_context();
        let events = self.events.clone();
        tokio::spawn(async move {
            let event = match enricher.chat(&api_key, &question, &context).await {
                Ok(answer) => AppEvent::Answer(answer),
                Err(e) => AppEvent::Status(format!("Assistant unavailable: {}", e)),
            };
            let _ = events.send(event).await;
        });
    }
}

fn init_tracing(debug: bool) -> anyhow::Result<()> {
    if !debug {
        return Ok(());
    }
    let file = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(DEBUG_LOG)
        .with_context(|| format!("Failed to open {}", DEBUG_LOG))?;
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("mailpilot=debug")),
        )
        .with_writer(Mutex::new(file))
        .with_ansi(false)
        .init();
    Ok(())
}

fn arg_value(args: &[String], flag: &str) -> Option<String> {
    args.iter()
        .position(|a| a == flag)
        .and_then(|i| args.get(i + 1))
        .cloned()
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args: Vec<String> = std::env::args().collect();
    init_tracing(args.iter().any(|arg| arg == "--debug"))?;
    let config = Config::load();

    if args.iter().any(|arg| arg == "--reset-token") {
        auth::RingStorage.clear_token().await?;
        println!("Token cleared. Please restart without --reset-token to re-authenticate.");
        return Ok(());
    }
    if args.iter().any(|arg| arg == "--clear-api-key") {
        auth::ApiKeyStore::clear()?;
        println!("LLM API key removed.");
        return Ok(());
    }
    if args.iter().any(|arg| arg == "--set-api-key") {
        let key = arg_value(&args, "--set-api-key").context("--set-api-key needs a value")?;
        auth::ApiKeyStore::save(&key)?;
        println!("LLM API key stored in the system keyring.");
        return Ok(());
    }

    let db = Arc::new(db::Database::new(DB_URL).await?);
    db.run_migrations().await?;
    let secret = auth::Authenticator::load_secret(CREDENTIALS_FILE).await?;

    let api_key = auth::ApiKeyStore::load();
    let provider: Arc<dyn MailProvider> = Arc::new(GmailClient::new(config.request_timeout())?);
    let enricher: Arc<dyn Enricher> = Arc::new(GeminiClient::with_base_url(
        &config.llm.endpoint,
        &config.llm.model,
        config.request_timeout(),
    )?);
    let store: SharedStore = Arc::new(Mutex::new(InboxStore::with_labels(config.labels.clone())));

    let (url_tx, mut url_rx) = mpsc::channel::<String>(1);
    let (done_tx, mut done_rx) = mpsc::channel::<bool>(1);
    let (refresh_tx, mut refresh_rx) = mpsc::channel::<()>(1);
    let (events_tx, mut events_rx) = mpsc::channel::<AppEvent>(32);

    let synchronizer = Synchronizer::new(provider.clone(), enricher.clone(), store.clone())
        .with_pacer(EnrichmentPacer::new(config.enrichment_interval()))
        .with_page_size(config.page_size)
        .with_cache(db.clone())
        .with_refresh(refresh_tx);

    let auth_builder =
        auth::Authenticator::authenticate(secret, auth::TuiDelegate { tx: url_tx }).await?;
    let auth_clone = auth_builder.clone();
    tokio::spawn(async move {
        match auth_clone.token(auth::SCOPES).await {
            Ok(_) => {
                let _ = done_tx.send(true).await;
            }
            Err(e) => error!("Authentication failed: {}", e),
        }
    });

    let mut app = App {
        config,
        provider,
        enricher,
        synchronizer,
        store: store.clone(),
        cache: db,
        auth: auth_builder,
        authenticated: false,
        api_key,
        events: events_tx,
    };

    enable_raw_mode()?;
    let mut stdout = io::stdout();
    execute!(
        stdout,
        crossterm::terminal::EnterAlternateScreen,
        crossterm::event::EnableMouseCapture
    )?;
    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend)?;

    let mut ui_state = UIState::new(store);
    if app.api_key.is_none() {
        ui_state.status_message = Some(sync::MISSING_KEY_NOTICE.to_string());
    }

    let result = async {
        loop {
            while let Ok(url) = url_rx.try_recv() {
                ui_state.auth_url = Some(url);
                ui_state.mode = UIMode::Authentication;
            }

            if !app.authenticated {
                if let Ok(true) = done_rx.try_recv() {
                    app.authenticated = true;
                    ui_state.mode = UIMode::Browsing;
                    ui_state.auth_url = None;
                    info!("authenticated");
                    app.start_sync(Folder::Inbox, None);
                }
            }

            while let Ok(event) = events_rx.try_recv() {
                apply_event(&mut ui_state, event);
            }
            // Every tick redraws, so pending notifications only need draining.
            while refresh_rx.try_recv().is_ok() {}

            terminal.draw(|f| ui::render(f, &mut ui_state))?;

            if !event::poll(std::time::Duration::from_millis(100))? {
                continue;
            }

            if let Event::Key(key) = event::read()? {
                if !app.authenticated && key.code != KeyCode::Char('q') {
                    continue;
                }
                if handle_key(&app, &mut ui_state, key) {
                    break;
                }
            }
        }
        anyhow::Ok(())
    }
    .await;

    disable_raw_mode()?;
    execute!(
        terminal.backend_mut(),
        crossterm::terminal::LeaveAlternateScreen,
        crossterm::event::DisableMouseCapture
    )?;
    terminal.show_cursor()?;

    result
}

fn apply_event(ui_state: &mut UIState<'_>, event: AppEvent) {
    match event {
        AppEvent::Status(message) => ui_state.status_message = Some(message),
        AppEvent::DraftReady(text) => {
            if let Some(cs) = &mut ui_state.compose_state {
                cs.set_body(&text);
                cs.busy = None;
            }
        }
        AppEvent::DraftFailed(message) => {
            if let Some(cs) = &mut ui_state.compose_state {
                cs.busy = None;
            }
            ui_state.status_message = Some(format!("AI assist failed: {}", message));
        }
        AppEvent::Sent => {
            close_compose(ui_state);
            ui_state.status_message = Some("Message sent".to_string());
        }
        AppEvent::SendFailed(message) => {
            if let Some(cs) = &mut ui_state.compose_state {
                cs.busy = None;
            }
            ui_state.status_message = Some(format!("Send failed: {}", message));
        }
        AppEvent::Answer(answer) => {
            if let UIMode::Browsing = ui_state.mode {
                ui_state.mode = UIMode::Answer(answer);
            } else {
                ui_state.status_message = Some(answer);
            }
        }
    }
}

fn open_compose<'a>(ui_state: &mut UIState<'a>, compose: ComposeState<'a>) {
    ui_state.mode = UIMode::Composing;
    let _ = execute!(io::stdout(), crossterm::cursor::Show);
    ui_state.compose_state = Some(compose);
}

fn close_compose(ui_state: &mut UIState<'_>) {
    ui_state.mode = UIMode::Browsing;
    let _ = execute!(io::stdout(), crossterm::cursor::Hide);
    ui_state.compose_state = None;
}

/// Returns true when the user asked to quit.
fn handle_key(app: &App, ui_state: &mut UIState<'_>, key: KeyEvent) -> bool {
    if ui_state.prompt.is_some() {
        handle_prompt_key(app, ui_state, key);
        return false;
    }

    match ui_state.mode {
        UIMode::Authentication => key.code == KeyCode::Char('q'),
        UIMode::Answer(_) => {
            if matches!(key.code, KeyCode::Esc | KeyCode::Enter | KeyCode::Char('q')) {
                ui_state.mode = UIMode::Browsing;
            }
            false
        }
        UIMode::Composing => {
            handle_compose_key(app, ui_state, key);
            false
        }
        UIMode::Browsing => handle_browsing_key(app, ui_state, key),
    }
}

fn selected_message_id(ui_state: &UIState<'_>) -> Option<String> {
    let store = lock_store(&ui_state.store);
    store
        .messages
        .get(ui_state.selected_message_index)
        .map(|m| m.id.clone())
}

fn select_current(ui_state: &mut UIState<'_>) {
    ui_state.detail_scroll = 0;
    let mut store = lock_store(&ui_state.store);
    let id = store
        .messages
        .get(ui_state.selected_message_index)
        .map(|m| m.id.clone());
    match id {
        Some(id) => {
            store.select(&id);
        }
        None => store.clear_selection(),
    }
}

fn entry_index(ui_state: &UIState<'_>, folder: &Folder) -> usize {
    let store = lock_store(&ui_state.store);
    ui::folder_entries(&store.custom_labels)
        .iter()
        .position(|e| e == &FolderEntry::Mail(folder.clone()))
        .unwrap_or(0)
}

fn open_entry(app: &App, ui_state: &mut UIState<'_>) {
    ui_state.selected_message_index = 0;
    ui_state.selected_task_index = 0;
    ui_state.detail_scroll = 0;
    if let FolderEntry::Mail(folder) = ui_state.current_entry() {
        ui_state.status_message = None;
        app.start_sync(folder, None);
    }
}

fn handle_browsing_key(app: &App, ui_state: &mut UIState<'_>, key: KeyEvent) -> bool {
    let keys = &app.config.keybindings;
    let showing_tasks = ui_state.showing_tasks();

    if matches_key(key, &keys.quit) {
        return true;
    }

    if matches_key(key, &keys.prev_panel) {
        ui_state.focused_panel = match ui_state.focused_panel {
            FocusedPanel::Details => FocusedPanel::Messages,
            FocusedPanel::Messages | FocusedPanel::Folders => FocusedPanel::Folders,
        };
    } else if matches_key(key, &keys.next_panel) {
        ui_state.focused_panel = match ui_state.focused_panel {
            FocusedPanel::Folders => FocusedPanel::Messages,
            FocusedPanel::Messages | FocusedPanel::Details => FocusedPanel::Details,
        };
    } else if matches_key(key, &keys.move_down) {
        match ui_state.focused_panel {
            FocusedPanel::Folders => {
                let count = {
                    let store = lock_store(&ui_state.store);
                    ui::folder_entries(&store.custom_labels).len()
                };
                if ui_state.selected_folder_index < count.saturating_sub(1) {
                    ui_state.selected_folder_index += 1;
                    open_entry(app, ui_state);
                }
            }
            FocusedPanel::Messages if showing_tasks => {
                ui_state.selected_task_index = ui_state.selected_task_index.saturating_add(1);
                ui_state.detail_scroll = 0;
            }
            FocusedPanel::Messages => {
                let len = lock_store(&ui_state.store).messages.len();
                if ui_state.selected_message_index < len.saturating_sub(1) {
                    ui_state.selected_message_index += 1;
                    select_current(ui_state);
                }
            }
            FocusedPanel::Details => {
                ui_state.detail_scroll = ui_state.detail_scroll.saturating_add(1);
            }
        }
    } else if matches_key(key, &keys.move_up) {
        match ui_state.focused_panel {
            FocusedPanel::Folders => {
                if ui_state.selected_folder_index > 0 {
                    ui_state.selected_folder_index -= 1;
                    open_entry(app, ui_state);
                }
            }
            FocusedPanel::Messages if showing_tasks => {
                ui_state.selected_task_index = ui_state.selected_task_index.saturating_sub(1);
                ui_state.detail_scroll = 0;
            }
            FocusedPanel::Messages => {
                if ui_state.selected_message_index > 0 {
                    ui_state.selected_message_index -= 1;
                    select_current(ui_state);
                }
            }
            FocusedPanel::Details => {
                ui_state.detail_scroll = ui_state.detail_scroll.saturating_sub(1);
            }
        }
    } else if matches_key(key, &keys.open) {
        match ui_state.focused_panel {
            FocusedPanel::Folders => {
                open_entry(app, ui_state);
                ui_state.focused_panel = FocusedPanel::Messages;
            }
            FocusedPanel::Messages if showing_tasks => {
                ui_state.focused_panel = FocusedPanel::Details;
            }
            FocusedPanel::Messages => {
                select_current(ui_state);
                let unread = lock_store(&ui_state.store)
                    .selected
                    .as_ref()
                    .filter(|m| m.is_unread)
                    .map(|m| m.id.clone());
                if let Some(id) = unread {
                    app.perform(id, MailAction::Read);
                }
                ui_state.focused_panel = FocusedPanel::Details;
            }
            FocusedPanel::Details => {}
        }
    } else if showing_tasks && matches_key(key, &keys.toggle_task) {
        let mut store = lock_store(&ui_state.store);
        if let Some(id) = store.tasks.get(ui_state.selected_task_index).map(|t| t.id.clone()) {
            store.toggle_task(&id);
        }
    } else if showing_tasks && matches_key(key, &keys.delete_task) {
        let mut store = lock_store(&ui_state.store);
        if let Some(id) = store.tasks.get(ui_state.selected_task_index).map(|t| t.id.clone()) {
            store.delete_task(&id);
        }
    } else if matches_key(key, &keys.search) {
        let current = lock_store(&ui_state.store).search.clone().unwrap_or_default();
        ui_state.prompt = Some(PromptState::new(PromptKind::Search, &current));
    } else if matches_key(key, &keys.refresh) {
        app.refresh();
    } else if matches_key(key, &keys.new_label) {
        ui_state.prompt = Some(PromptState::new(PromptKind::LabelName, ""));
    } else if matches_key(key, &keys.delete_label) {
        if let FolderEntry::Mail(Folder::Label(name)) = ui_state.current_entry() {
            let evicted = lock_store(&ui_state.store).delete_label(&name);
            app.forget_label(&name);
            info!(label = %name, "label deleted");
            ui_state.status_message = Some(format!("Label \"{}\" deleted", name));
            if evicted {
                ui_state.selected_folder_index = 0;
                ui_state.selected_message_index = 0;
                app.start_sync(Folder::Inbox, None);
            }
        }
    } else if matches_key(key, &keys.chat) {
        ui_state.prompt = Some(PromptState::new(PromptKind::Chat, ""));
    } else if matches_key(key, &keys.new_message) {
        let mut compose = ComposeState::new("", "", "");
        compose.style = app.config.compose.style;
        open_compose(ui_state, compose);
    } else if showing_tasks {
        // Mail actions have no target in the task dashboard.
    } else if matches_key(key, &keys.reply) {
        let selected = lock_store(&ui_state.store).selected.clone();
        if let Some(m) = selected {
            let mut quoted = format!("\n\nOn {}, {} wrote:\n", m.date, m.from);
            for line in ui::display_body(&m).lines() {
                quoted.push_str(&format!("> {}\n", line));
            }
            let mut compose = ComposeState::reply_to(&m, &quoted);
            compose.style = app.config.compose.style;
            open_compose(ui_state, compose);
        }
    } else if matches_key(key, &keys.ai_reply) {
        let selected = lock_store(&ui_state.store).selected.clone();
        if let Some(m) = selected {
            let draft = m
                .enrichment
                .as_ref()
                .map(|e| e.draft_reply.clone())
                .unwrap_or_default();
            let mut compose = ComposeState::reply_to(&m, &draft);
            compose.style = app.config.compose.style;
            if draft.is_empty() {
                compose.busy = Some("Drafting reply");
                app.draft_reply(ui::display_body(&m), m.from.clone());
            }
            open_compose(ui_state, compose);
        }
    } else if let Some(id) = selected_message_id(ui_state) {
        let current = lock_store(&ui_state.store).message(&id).cloned();
        let Some(m) = current else {
            return false;
        };
        let action = if matches_key(key, &keys.toggle_read) {
            Some(if m.is_unread {
                MailAction::Read
            } else {
                MailAction::Unread
            })
        } else if matches_key(key, &keys.star) {
            Some(if m.is_starred {
                MailAction::Unstar
            } else {
                MailAction::Star
            })
        } else if matches_key(key, &keys.archive) {
            Some(MailAction::Archive)
        } else if matches_key(key, &keys.unarchive) {
            Some(MailAction::Unarchive)
        } else if matches_key(key, &keys.trash) {
            Some(MailAction::Trash)
        } else {
            None
        };
        if let Some(action) = action {
            if action.is_terminal() {
                ui_state.detail_scroll = 0;
            }
            app.perform(id, action);
        }
    }
    false
}

fn handle_compose_key(app: &App, ui_state: &mut UIState<'_>, key: KeyEvent) {
    let keys = &app.config.keybindings;
    let ctrl = key.modifiers.contains(KeyModifiers::CONTROL);
    let Some(cs) = &mut ui_state.compose_state else {
        return;
    };

    if key.code == KeyCode::Esc {
        close_compose(ui_state);
    } else if matches_key(key, &keys.send_message) {
        if cs.busy.is_some() {
            return;
        }
        let to = cs.get_to().trim().to_string();
        if to.is_empty() {
            ui_state.status_message = Some("Add a recipient before sending".to_string());
            return;
        }
        cs.busy = Some("Sending");
        app.send(OutgoingMessage {
            to,
            subject: cs.get_subject(),
            body: cs.get_body(),
            thread_id: cs.thread_id.clone(),
        });
    } else if matches_key(key, &keys.enhance) {
        if app.api_key.is_none() {
            ui_state.status_message = Some(AiError::MissingApiKey.to_string());
            return;
        }
        cs.busy = Some("Enhancing");
        app.enhance(EnhanceRequest {
            draft: cs.get_body(),
            language: app.config.compose.language.clone(),
            style: cs.style,
            command: String::new(),
        });
    } else if ctrl && key.code == KeyCode::Char('k') {
        ui_state.prompt = Some(PromptState::new(PromptKind::AssistCommand, ""));
    } else if ctrl && key.code == KeyCode::Char('t') {
        cs.style = cs.style.next();
    } else if key.code == KeyCode::Tab {
        cs.focused_field = cs.focused_field.next();
    } else if key.code == KeyCode::BackTab {
        cs.focused_field = cs.focused_field.prev();
    } else if key.code == KeyCode::Enter && cs.focused_field != ComposeField::Body {
        cs.focused_field = cs.focused_field.next();
    } else {
        cs.focused_textarea().input(key);
    }
}

fn handle_prompt_key(app: &App, ui_state: &mut UIState<'_>, key: KeyEvent) {
    let Some(prompt) = &mut ui_state.prompt else {
        return;
    };
    match key.code {
        KeyCode::Esc => {
            ui_state.prompt = None;
            return;
        }
        KeyCode::Enter => {}
        _ => {
            prompt.input.input(key);
            return;
        }
    }

    let value = prompt.value();
    let kind = prompt.kind.clone();
    ui_state.prompt = None;

    match kind {
        PromptKind::Search => {
            let folder = lock_store(&ui_state.store).folder.clone();
            if ui_state.showing_tasks() {
                ui_state.selected_folder_index = entry_index(ui_state, &folder);
            }
            ui_state.selected_message_index = 0;
            let search = Some(value).filter(|s| !s.is_empty());
            app.start_sync(folder, search);
        }
        PromptKind::LabelName => {
            if !value.is_empty() {
                ui_state.prompt = Some(PromptState::new(PromptKind::LabelRule { name: value }, ""));
            }
        }
        PromptKind::LabelRule { name } => {
            let mut store = lock_store(&ui_state.store);
            let color = LABEL_COLORS[store.custom_labels.len() % LABEL_COLORS.len()];
            let notice = match CustomLabel::new(&name, &value, color, true) {
                None => "A label needs a name and a rule".to_string(),
                Some(label) => {
                    let retro = label.apply_retroactively;
                    let label_name = label.name.clone();
                    if store.add_label(label) {
                        drop(store);
                        info!(label = %label_name, "label created");
                        if retro {
                            app.refresh();
                        }
                        format!("Label \"{}\" created", label_name)
                    } else {
                        format!("Label \"{}\" already exists", label_name)
                    }
                }
            };
            ui_state.status_message = Some(notice);
        }
        PromptKind::Chat => {
            if !value.is_empty() {
                ui_state.status_message = Some("Asking the assistant…".to_string());
                app.chat(value);
            }
        }
        PromptKind::AssistCommand => {
            if app.api_key.is_none() {
                ui_state.status_message = Some(AiError::MissingApiKey.to_string());
                return;
            }
            if let Some(cs) = &mut ui_state.compose_state {
                cs.busy = Some("Enhancing");
                app.enhance(EnhanceRequest {
                    draft: cs.get_body(),
                    language: app.config.compose.language.clone(),
                    style: cs.style,
                    command: value,
                });
            } else {
                warn!("assist command without an open draft");
            }
        }
    }
}
