use crate::ai::DraftStyle;
use crate::models::{Category, CustomLabel, Folder, Message, Task, TaskStatus};
use crate::store::InboxStore;
use crate::sync::{SharedStore, lock_store};
use ratatui::{
    Frame,
    layout::{Constraint, Direction, Layout, Rect},
    style::{Color, Modifier, Style},
    text::{Line, Span, Text},
    widgets::{Block, Borders, Clear, List, ListItem, ListState, Paragraph, Wrap},
};
use tui_textarea::TextArea;

#[derive(Debug, PartialEq, Eq, Clone, Copy, Default)]
pub enum FocusedPanel {
    Folders,
    #[default]
    Messages,
    Details,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FolderEntry {
    Mail(Folder),
    Tasks,
}

impl FolderEntry {
    pub fn title(&self) -> String {
        match self {
            FolderEntry::Mail(folder) => folder.to_string(),
            FolderEntry::Tasks => "To-do".to_string(),
        }
    }
}

/// System folders, then custom labels, then the task dashboard.
pub fn folder_entries(labels: &[CustomLabel]) -> Vec<FolderEntry> {
    Folder::SYSTEM
        .iter()
        .cloned()
        .map(FolderEntry::Mail)
        .chain(
            labels
                .iter()
                .map(|l| FolderEntry::Mail(Folder::Label(l.name.clone()))),
        )
        .chain(std::iter::once(FolderEntry::Tasks))
        .collect()
}

pub enum UIMode {
    Browsing,
    Composing,
    Answer(String),
    Authentication,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PromptKind {
    Search,
    LabelName,
    LabelRule { name: String },
    Chat,
    AssistCommand,
}

impl PromptKind {
    fn title(&self) -> String {
        match self {
            PromptKind::Search => " Search [Enter to apply, empty to clear] ".to_string(),
            PromptKind::LabelName => " New label name ".to_string(),
            PromptKind::LabelRule { name } => format!(" Rule for \"{}\" ", name),
            PromptKind::Chat => " Ask about your inbox ".to_string(),
            PromptKind::AssistCommand => " AI instruction for this draft ".to_string(),
        }
    }
}

pub struct PromptState<'a> {
    pub kind: PromptKind,
    pub input: TextArea<'a>,
}

impl<'a> PromptState<'a> {
    pub fn new(kind: PromptKind, initial: &str) -> Self {
        let mut input = TextArea::from(initial.lines());
        input.set_cursor_line_style(Style::default());
        input.move_cursor(tui_textarea::CursorMove::End);
        Self { kind, input }
    }

    pub fn value(&self) -> String {
        self.input.lines().join(" ").trim().to_string()
    }
}

#[derive(Debug, PartialEq, Eq, Clone, Copy, Default)]
pub enum ComposeField {
    #[default]
    To,
    Subject,
    Body,
}

impl ComposeField {
    pub fn next(self) -> Self {
        match self {
            ComposeField::To => ComposeField::Subject,
            ComposeField::Subject => ComposeField::Body,
            ComposeField::Body => ComposeField::To,
        }
    }

    pub fn prev(self) -> Self {
        match self {
            ComposeField::To => ComposeField::Body,
            ComposeField::Subject => ComposeField::To,
            ComposeField::Body => ComposeField::Subject,
        }
    }
}

pub struct ComposeState<'a> {
    pub to: TextArea<'a>,
    pub subject: TextArea<'a>,
    pub body: TextArea<'a>,
    pub focused_field: ComposeField,
    pub thread_id: Option<String>,
    pub style: DraftStyle,
    pub busy: Option<&'static str>,
}

fn text_area<'a>(content: &str) -> TextArea<'a> {
    let mut area = TextArea::from(content.lines());
    area.set_cursor_line_style(Style::default());
    area
}

impl<'a> ComposeState<'a> {
    pub fn new(to: &str, subject: &str, body: &str) -> Self {
        Self {
            to: text_area(to),
            subject: text_area(subject),
            body: text_area(body),
            focused_field: ComposeField::To,
            thread_id: None,
            style: DraftStyle::Default,
            busy: None,
        }
    }

    pub fn reply_to(message: &Message, body: &str) -> Self {
        let mut state = Self::new(&message.from_address, &reply_subject(&message.subject), body);
        state.thread_id = Some(message.thread_id.clone()).filter(|t| !t.is_empty());
        state.focused_field = ComposeField::Body;
        state
    }

    pub fn get_to(&self) -> String {
        self.to.lines().join("\n")
    }

    pub fn get_subject(&self) -> String {
        self.subject.lines().join("\n")
    }

    pub fn get_body(&self) -> String {
        self.body.lines().join("\n")
    }

    pub fn set_body(&mut self, body: &str) {
        self.body = text_area(body);
        self.body.move_cursor(tui_textarea::CursorMove::Bottom);
        self.body.move_cursor(tui_textarea::CursorMove::End);
    }

    pub fn focused_textarea(&mut self) -> &mut TextArea<'a> {
        match self.focused_field {
            ComposeField::To => &mut self.to,
            ComposeField::Subject => &mut self.subject,
            ComposeField::Body => &mut self.body,
        }
    }
}

pub struct UIState<'a> {
    pub store: SharedStore,
    pub selected_folder_index: usize,
    pub selected_message_index: usize,
    pub selected_task_index: usize,
    pub messages_list_state: ListState,
    pub tasks_list_state: ListState,
    pub detail_scroll: u16,
    pub focused_panel: FocusedPanel,
    pub mode: UIMode,
    pub compose_state: Option<ComposeState<'a>>,
    pub prompt: Option<PromptState<'a>>,
    pub auth_url: Option<String>,
    pub status_message: Option<String>,
}

impl<'a> UIState<'a> {
    pub fn new(store: SharedStore) -> Self {
        Self {
            store,
            selected_folder_index: 0,
            selected_message_index: 0,
            selected_task_index: 0,
            messages_list_state: ListState::default(),
            tasks_list_state: ListState::default(),
            detail_scroll: 0,
            focused_panel: FocusedPanel::Messages,
            mode: UIMode::Browsing,
            compose_state: None,
            prompt: None,
            auth_url: None,
            status_message: None,
        }
    }

    pub fn current_entry(&self) -> FolderEntry {
        let store = lock_store(&self.store);
        folder_entries(&store.custom_labels)
            .into_iter()
            .nth(self.selected_folder_index)
            .unwrap_or(FolderEntry::Mail(Folder::Inbox))
    }

    pub fn showing_tasks(&self) -> bool {
        self.current_entry() == FolderEntry::Tasks
    }
}

pub fn render(f: &mut Frame, state: &mut UIState<'_>) {
    if let UIMode::Authentication = state.mode {
        render_authentication(f, state);
        return;
    }

    let handle = state.store.clone();
    let store = lock_store(&handle);
    let entries = folder_entries(&store.custom_labels);
    state.selected_folder_index = state
        .selected_folder_index
        .min(entries.len().saturating_sub(1));
    let showing_tasks = entries.get(state.selected_folder_index) == Some(&FolderEntry::Tasks);

    let chunks = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([
            Constraint::Percentage(15),
            Constraint::Percentage(35),
            Constraint::Percentage(50),
        ])
        .split(f.area());

    render_folders(f, state, &store, &entries, chunks[0]);
    if showing_tasks {
        render_tasks(f, state, &store, chunks[1]);
        let source = store
            .tasks
            .get(state.selected_task_index)
            .and_then(|t| store.message(&t.message_id));
        render_details(f, state, source, chunks[2]);
    } else {
        render_messages(f, state, &store, chunks[1]);
        render_details(f, state, store.selected.as_ref(), chunks[2]);
    }
    drop(store);

    if let UIMode::Answer(answer) = &state.mode {
        let area = centered_rect(70, 60, f.area());
        f.render_widget(Clear, area);
        let p = Paragraph::new(answer.as_str())
            .block(
                Block::default()
                    .borders(Borders::ALL)
                    .title(" Inbox assistant [Esc to close] ")
                    .border_style(Style::default().fg(Color::Cyan)),
            )
            .wrap(Wrap { trim: false });
        f.render_widget(p, area);
    }

    if let UIMode::Composing = state.mode {
        render_compose(f, state);
    }

    if let Some(prompt) = &mut state.prompt {
        let area = centered_rect(60, 20, f.area());
        let area = Rect {
            height: area.height.min(3),
            ..area
        };
        f.render_widget(Clear, area);
        prompt.input.set_block(
            Block::default()
                .borders(Borders::ALL)
                .title(prompt.kind.title())
                .border_style(Style::default().fg(Color::Cyan)),
        );
        f.render_widget(&prompt.input, area);
        let (row, col) = prompt.input.cursor();
        f.set_cursor_position((area.x + 1 + col as u16, area.y + 1 + row as u16));
    }
}

fn panel_border(focused: bool) -> Style {
    if focused {
        Style::default()
            .fg(Color::Yellow)
            .add_modifier(Modifier::BOLD)
    } else {
        Style::default().fg(Color::Gray)
    }
}

fn label_color(name: &str) -> Color {
    match name {
        "green" => Color::Green,
        "yellow" => Color::Yellow,
        "red" => Color::Red,
        "gray" => Color::Gray,
        "indigo" => Color::Indexed(61),
        "purple" => Color::Magenta,
        _ => Color::Blue,
    }
}

fn category_color(category: &Category) -> Color {
    match category {
        Category::Important => Color::Red,
        Category::Social => Color::Blue,
        Category::Promotions => Color::Green,
        Category::Spam | Category::Error => Color::DarkGray,
        Category::Other(_) => Color::Cyan,
    }
}

fn render_folders(
    f: &mut Frame,
    state: &UIState<'_>,
    store: &InboxStore,
    entries: &[FolderEntry],
    area: Rect,
) {
    let items: Vec<ListItem> = entries
        .iter()
        .enumerate()
        .map(|(i, entry)| {
            let mut style = match entry {
                FolderEntry::Mail(Folder::Label(name)) => {
                    let color = store
                        .custom_labels
                        .iter()
                        .find(|l| &l.name == name)
                        .map(|l| label_color(&l.color))
                        .unwrap_or(Color::Blue);
                    Style::default().fg(color)
                }
                _ => Style::default(),
            };
            if i == state.selected_folder_index {
                style = style.fg(Color::Yellow).add_modifier(Modifier::BOLD);
            }

            let title = match entry {
                FolderEntry::Mail(Folder::Label(name)) => format!("# {}", name),
                FolderEntry::Tasks => {
                    let active = store
                        .tasks
                        .iter()
                        .filter(|t| t.status == TaskStatus::Active)
                        .count();
                    format!("To-do ({})", active)
                }
                other => other.title(),
            };
            ListItem::new(title).style(style)
        })
        .collect();

    let block = Block::default()
        .borders(Borders::ALL)
        .title("Folders")
        .border_style(panel_border(state.focused_panel == FocusedPanel::Folders));
    f.render_widget(List::new(items).block(block), area);
}

/// Title of the message panel: folder, search and sync progress.
pub fn messages_title(store: &InboxStore, status_message: Option<&str>) -> String {
    let mut title = store.folder.to_string();
    if let Some(search) = &store.search {
        title.push_str(&format!(" \"{}\"", search));
    }
    let status = &store.status;
    if status.fetching {
        title.push_str(" - fetching…");
    } else if status.enriching {
        title.push_str(&format!(" - AI {}/{}", status.enriched, status.total));
    }
    if let Some(msg) = status_message.or(status.last_error.as_deref()) {
        title.push_str(" - ");
        title.push_str(msg);
    }
    title
}

fn pad(s: String, len: usize) -> String {
    let char_count = s.chars().count();
    if char_count > len {
        let truncated: String = s.chars().take(len.saturating_sub(3)).collect();
        format!("{}...", truncated)
    } else {
        format!("{:width$}", s, width = len)
    }
}

fn render_messages(f: &mut Frame, state: &mut UIState<'_>, store: &InboxStore, area: Rect) {
    let list_width = area.width.saturating_sub(2) as usize;
    let inner_len = list_width.saturating_sub(2);
    state.selected_message_index = state
        .selected_message_index
        .min(store.messages.len().saturating_sub(1));

    let block = Block::default()
        .borders(Borders::ALL)
        .title(messages_title(store, state.status_message.as_deref()))
        .border_style(panel_border(state.focused_panel == FocusedPanel::Messages));

    if store.messages.is_empty() {
        let (text, style) = if store.status.fetching {
            (
                format!("⏳ Loading \"{}\"…", store.folder),
                Style::default().fg(Color::Yellow),
            )
        } else {
            ("No messages".to_string(), Style::default().fg(Color::DarkGray))
        };
        let p = Paragraph::new(text)
            .block(block)
            .style(style)
            .wrap(Wrap { trim: true });
        f.render_widget(p, area);
        return;
    }

    let separator = "─".repeat(inner_len);
    let mut items: Vec<ListItem> = Vec::new();
    for (i, m) in store.messages.iter().enumerate() {
        let is_selected = i == state.selected_message_index;
        let mut style = if is_selected {
            Style::default().fg(Color::Yellow)
        } else {
            Style::default()
        };
        if m.is_unread {
            style = style.add_modifier(Modifier::BOLD);
        }
        let indicator = if is_selected { "█" } else { " " };
        let star = if m.is_starred { "★ " } else { "" };
        let clip = if m.has_attachment { " 📎" } else { "" };

        let mut badge_spans = vec![Span::raw(indicator)];
        match &m.enrichment {
            Some(e) if !e.is_failed() => {
                badge_spans.push(Span::styled(
                    format!(" [{}]", e.category),
                    Style::default().fg(category_color(&e.category)),
                ));
                if e.requires_reply {
                    badge_spans.push(Span::styled(" ↩", Style::default().fg(Color::Magenta)));
                }
                for label in &e.applied_labels {
                    let color = store
                        .custom_labels
                        .iter()
                        .find(|l| &l.name == label)
                        .map(|l| label_color(&l.color))
                        .unwrap_or(Color::Blue);
                    badge_spans.push(Span::styled(
                        format!(" #{}", label),
                        Style::default().fg(color),
                    ));
                }
            }
            Some(_) => badge_spans.push(Span::styled(
                " [AI unavailable]",
                Style::default().fg(Color::DarkGray),
            )),
            None => badge_spans.push(Span::styled(" …", Style::default().fg(Color::DarkGray))),
        }

        let text = Text::from(vec![
            Line::styled(
                format!("{}{}", indicator, pad(format!(" {}{}", star, m.from), inner_len)),
                style,
            ),
            Line::styled(
                format!("{}{}", indicator, pad(format!(" {}{}", m.subject, clip), inner_len)),
                style,
            ),
            Line::from(badge_spans),
        ]);
        items.push(ListItem::new(text));
        if i < store.messages.len() - 1 {
            items.push(ListItem::new(separator.clone()).style(Style::default().fg(Color::DarkGray)));
        }
    }

    state
        .messages_list_state
        .select(Some(state.selected_message_index * 2));
    f.render_stateful_widget(List::new(items).block(block), area, &mut state.messages_list_state);
}

fn task_line(task: &Task, width: usize) -> Line<'static> {
    let check = match task.status {
        TaskStatus::Active => "[ ]",
        TaskStatus::Done => "[x]",
    };
    let mut style = Style::default();
    if task.status == TaskStatus::Done {
        style = style.fg(Color::DarkGray).add_modifier(Modifier::CROSSED_OUT);
    } else if task.is_past_due {
        style = style.fg(Color::Red);
    } else if task.is_urgent {
        style = style.fg(Color::Yellow).add_modifier(Modifier::BOLD);
    }
    let due = if task.date.is_empty() {
        String::new()
    } else {
        format!(" ({})", task.date)
    };
    Line::styled(pad(format!("{} {}{}", check, task.title, due), width), style)
}

fn render_tasks(f: &mut Frame, state: &mut UIState<'_>, store: &InboxStore, area: Rect) {
    state.selected_task_index = state
        .selected_task_index
        .min(store.tasks.len().saturating_sub(1));
    let width = area.width.saturating_sub(4) as usize;

    let block = Block::default()
        .borders(Borders::ALL)
        .title("To-do [x toggle, X delete]")
        .border_style(panel_border(state.focused_panel == FocusedPanel::Messages));

    if store.tasks.is_empty() {
        let p = Paragraph::new("No tasks extracted yet")
            .block(block)
            .style(Style::default().fg(Color::DarkGray));
        f.render_widget(p, area);
        return;
    }

    let items: Vec<ListItem> = store
        .tasks
        .iter()
        .map(|t| ListItem::new(task_line(t, width)))
        .collect();
    state.tasks_list_state.select(Some(state.selected_task_index));
    let list = List::new(items)
        .block(block)
        .highlight_symbol("> ")
        .highlight_style(Style::default().add_modifier(Modifier::REVERSED));
    f.render_stateful_widget(list, area, &mut state.tasks_list_state);
}

fn render_details(f: &mut Frame, state: &UIState<'_>, message: Option<&Message>, area: Rect) {
    let block = Block::default()
        .borders(Borders::ALL)
        .title("Message Details")
        .border_style(panel_border(state.focused_panel == FocusedPanel::Details));

    let Some(msg) = message else {
        let p = Paragraph::new("No message selected")
            .block(block)
            .style(Style::default().fg(Color::DarkGray));
        f.render_widget(p, area);
        return;
    };

    let dim = Style::default().fg(Color::DarkGray);
    let mut lines = vec![
        Line::from(vec![Span::styled("From: ", dim), Span::raw(format!("{} <{}>", msg.from, msg.from_address))]),
        Line::from(vec![Span::styled("To: ", dim), Span::raw(msg.to.clone())]),
    ];
    if !msg.cc.is_empty() {
        lines.push(Line::from(vec![Span::styled("Cc: ", dim), Span::raw(msg.cc.clone())]));
    }
    lines.push(Line::from(vec![Span::styled("Date: ", dim), Span::raw(msg.date.clone())]));
    lines.push(Line::from(vec![
        Span::styled("Subject: ", dim),
        Span::styled(msg.subject.clone(), Style::default().add_modifier(Modifier::BOLD)),
    ]));

    if let Some(e) = msg.enrichment.as_ref().filter(|e| !e.is_failed()) {
        lines.push(Line::raw(""));
        lines.push(Line::from(vec![
            Span::styled("AI ", Style::default().fg(Color::Cyan).add_modifier(Modifier::BOLD)),
            Span::styled(format!("[{}]", e.category), Style::default().fg(category_color(&e.category))),
            Span::raw(if e.requires_reply { "  reply needed" } else { "" }),
        ]));
        if !e.summary.is_empty() {
            lines.push(Line::styled(e.summary.clone(), Style::default().fg(Color::Cyan)));
        }
        if !e.applied_labels.is_empty() {
            lines.push(Line::styled(
                format!("Labels: {}", e.applied_labels.join(", ")),
                Style::default().fg(Color::Blue),
            ));
        }
        for task in &e.tasks {
            let due = if task.date.is_empty() {
                String::new()
            } else {
                format!(" ({})", task.date)
            };
            lines.push(Line::raw(format!("• {}{}", task.title, due)));
        }
        if !e.draft_reply.is_empty() {
            lines.push(Line::styled("Suggested reply [g to use]:", dim));
            for l in e.draft_reply.lines() {
                lines.push(Line::styled(format!("  {}", l), Style::default().fg(Color::Green)));
            }
        }
    }

    lines.push(Line::styled("─".repeat(area.width.saturating_sub(2) as usize), dim));
    for l in display_body(msg).lines() {
        lines.push(Line::raw(l.to_string()));
    }

    let p = Paragraph::new(lines)
        .block(block)
        .wrap(Wrap { trim: false })
        .scroll((state.detail_scroll, 0));
    f.render_widget(p, area);
}

fn render_compose(f: &mut Frame, state: &mut UIState<'_>) {
    let Some(cs) = &mut state.compose_state else {
        return;
    };
    let area = centered_rect(80, 80, f.area());
    f.render_widget(Clear, area);

    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(3),
            Constraint::Length(3),
            Constraint::Min(10),
        ])
        .split(area);

    let field_style = |field: ComposeField| {
        if cs.focused_field == field {
            Style::default()
                .fg(Color::Cyan)
                .add_modifier(Modifier::BOLD)
        } else {
            Style::default().fg(Color::Gray)
        }
    };
    let (to_style, subject_style, body_style) = (
        field_style(ComposeField::To),
        field_style(ComposeField::Subject),
        field_style(ComposeField::Body),
    );

    cs.to.set_block(
        Block::default()
            .borders(Borders::ALL)
            .title(" To ")
            .border_style(to_style),
    );
    cs.subject.set_block(
        Block::default()
            .borders(Borders::ALL)
            .title(" Subject ")
            .border_style(subject_style),
    );
    let body_title = match cs.busy {
        Some(activity) => format!(" Body [{}…] ", activity),
        None => format!(
            " Body [Esc cancel, Ctrl-S send, Ctrl-E AI assist, Ctrl-K AI command, Ctrl-T style: {:?}] ",
            cs.style
        ),
    };
    cs.body.set_block(
        Block::default()
            .borders(Borders::ALL)
            .title(body_title)
            .border_style(body_style),
    );

    f.render_widget(&cs.to, chunks[0]);
    f.render_widget(&cs.subject, chunks[1]);
    f.render_widget(&cs.body, chunks[2]);

    if state.prompt.is_none() {
        let (chunk, (row, col)) = match cs.focused_field {
            ComposeField::To => (chunks[0], cs.to.cursor()),
            ComposeField::Subject => (chunks[1], cs.subject.cursor()),
            ComposeField::Body => (chunks[2], cs.body.cursor()),
        };
        f.set_cursor_position((chunk.x + 1 + col as u16, chunk.y + 1 + row as u16));
    }
}

fn render_authentication(f: &mut Frame, state: &mut UIState<'_>) {
    let area = centered_rect(60, 40, f.area());
    f.render_widget(Clear, area);

    let block = Block::default()
        .title(" Authentication Required ")
        .borders(Borders::ALL)
        .border_style(Style::default().fg(Color::Cyan));

    let inner = block.inner(area);
    f.render_widget(block, area);

    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .margin(1)
        .constraints([
            Constraint::Length(3),
            Constraint::Length(6),
            Constraint::Length(4),
            Constraint::Min(0),
        ])
        .split(inner);

    let msg = Paragraph::new(
        "To let mailpilot read and triage your Gmail, visit the following URL and authorize the application:",
    )
    .wrap(Wrap { trim: true });
    f.render_widget(msg, chunks[0]);

    if let Some(url) = &state.auth_url {
        let url_p = Paragraph::new(url.as_str())
            .style(
                Style::default()
                    .fg(Color::Yellow)
                    .add_modifier(Modifier::UNDERLINED),
            )
            .block(Block::default().borders(Borders::ALL).title(" URL "))
            .wrap(Wrap { trim: false });
        f.render_widget(url_p, chunks[1]);
    }

    let footer = Paragraph::new("Your default browser should have opened automatically. If not, copy the URL above (hold Shift to select in most terminals).\n\nPress q to quit.")
        .style(Style::default().fg(Color::Gray))
        .wrap(Wrap { trim: true });
    f.render_widget(footer, chunks[2]);
}

fn centered_rect(percent_x: u16, percent_y: u16, r: Rect) -> Rect {
    let popup_layout = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Percentage((100 - percent_y) / 2),
            Constraint::Percentage(percent_y),
            Constraint::Percentage((100 - percent_y) / 2),
        ])
        .split(r);

    Layout::default()
        .direction(Direction::Horizontal)
        .constraints([
            Constraint::Percentage((100 - percent_x) / 2),
            Constraint::Percentage(percent_x),
            Constraint::Percentage((100 - percent_x) / 2),
        ])
        .split(popup_layout[1])[1]
}

/// `Re: ` plus the subject with any existing `Re:` chain removed.
pub fn reply_subject(subject: &str) -> String {
    let mut rest = subject.trim();
    while rest.get(..3).is_some_and(|p| p.eq_ignore_ascii_case("re:")) {
        rest = rest[3..].trim_start();
    }
    format!("Re: {}", rest)
}

fn looks_like_html(body: &str) -> bool {
    let lower = body.to_lowercase();
    ["<html", "<body", "<div", "<p>", "<p ", "<br", "<table", "<span"]
        .iter()
        .any(|tag| lower.contains(tag))
}

/// Body as shown in the details panel: HTML flattened to text, blank runs
/// collapsed.
pub fn display_body(message: &Message) -> String {
    let body = if message.body.trim().is_empty() {
        message.snippet.as_str()
    } else {
        message.body.as_str()
    };
    if looks_like_html(body) {
        clean_body(&nanohtml2text::html2text(body))
    } else {
        clean_body(body)
    }
}

fn clean_body(body: &str) -> String {
    let normalized = body.replace("\r\n", "\n").replace('\r', "\n");
    let mut result = String::with_capacity(normalized.len());

    let mut consecutive_empty_lines = 0;
    let mut first_content = true;

    for line in normalized.split('\n') {
        let trimmed = line.trim_end();

        if trimmed.is_empty() {
            consecutive_empty_lines += 1;
        } else {
            if !first_content {
                // One newline between lines, two at most after a blank run.
                let newlines_to_add = std::cmp::min(consecutive_empty_lines + 1, 2);
                for _ in 0..newlines_to_add {
                    result.push('\n');
                }
            }

            result.push_str(trimmed);
            consecutive_empty_lines = 0;
            first_content = false;
        }
    }

    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::tests::message;

    #[test]
    fn test_clean_body_removes_extra_newlines() {
        let input = "Line 1\n\n\nLine 2\n\n\n\nLine 3";
        let expected = "Line 1\n\nLine 2\n\nLine 3";
        assert_eq!(clean_body(input), expected);
    }

    #[test]
    fn test_clean_body_normalizes_crlf() {
        let input = "Line 1\r\n\r\n\r\nLine 2";
        let expected = "Line 1\n\nLine 2";
        assert_eq!(clean_body(input), expected);
    }

    #[test]
    fn test_clean_body_handles_whitespace_lines() {
        let input = "Line 1\n   \n\t\nLine 2";
        let expected = "Line 1\n\nLine 2";
        assert_eq!(clean_body(input), expected);
    }

    #[test]
    fn test_clean_body_trims_lines() {
        let input = "Line 1   \nLine 2\t";
        let expected = "Line 1\nLine 2";
        assert_eq!(clean_body(input), expected);
    }

    #[test]
    fn test_reply_subject_collapses_re_chain() {
        assert_eq!(reply_subject("Lunch"), "Re: Lunch");
        assert_eq!(reply_subject("Re: Lunch"), "Re: Lunch");
        assert_eq!(reply_subject("RE: re:Re: Lunch"), "Re: Lunch");
        assert_eq!(reply_subject(""), "Re: ");
    }

    #[test]
    fn test_display_body_flattens_html() {
        let mut msg = message("a");
        msg.body = "<html><body><p>Hello <b>there</b></p></body></html>".to_string();
        let shown = display_body(&msg);
        assert!(shown.contains("Hello"));
        assert!(shown.contains("there"));
        assert!(!shown.contains('<'));
    }

    #[test]
    fn test_display_body_falls_back_to_snippet() {
        let mut msg = message("a");
        msg.body = "  ".to_string();
        assert_eq!(display_body(&msg), "snippet a");
    }

    #[test]
    fn test_folder_entries_order() {
        let labels = vec![CustomLabel::new("Invoices", "bills", "green", true).unwrap()];
        let entries = folder_entries(&labels);
        assert_eq!(entries.len(), Folder::SYSTEM.len() + 2);
        assert_eq!(entries[0], FolderEntry::Mail(Folder::Inbox));
        assert_eq!(
            entries[Folder::SYSTEM.len()],
            FolderEntry::Mail(Folder::Label("Invoices".to_string()))
        );
        assert_eq!(entries.last(), Some(&FolderEntry::Tasks));
    }

    #[test]
    fn test_messages_title_shows_progress() {
        let mut store = InboxStore::default();
        let generation = store.begin_sync(Folder::Starred, Some("invoice".to_string()));
        assert_eq!(messages_title(&store, None), "Starred \"invoice\" - fetching…");

        store.publish(generation, vec![message("a"), message("b")]);
        store.set_enriching(generation, true);
        assert_eq!(messages_title(&store, None), "Starred \"invoice\" - AI 0/2");

        store.fail_sync(generation, "offline".to_string());
        assert_eq!(messages_title(&store, Some("Archived")), "Starred \"invoice\" - Archived");
        assert_eq!(messages_title(&store, None), "Starred \"invoice\" - offline");
    }

    #[test]
    fn test_reply_compose_prefills_envelope() {
        let msg = message("a");
        let cs = ComposeState::reply_to(&msg, "Thanks!");
        assert_eq!(cs.get_to(), "ada@example.com");
        assert_eq!(cs.get_subject(), "Re: Subject a");
        assert_eq!(cs.get_body(), "Thanks!");
        assert_eq!(cs.thread_id.as_deref(), Some("t-a"));
        assert_eq!(cs.focused_field, ComposeField::Body);
    }
}
