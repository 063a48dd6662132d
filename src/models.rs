use inflections::case::to_title_case;
use serde::{Deserialize, Serialize};
use std::fmt;

pub const INBOX: &str = "INBOX";
pub const UNREAD: &str = "UNREAD";
pub const STARRED: &str = "STARRED";
pub const TRASH: &str = "TRASH";

#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Folder {
    #[default]
    Inbox,
    Starred,
    Sent,
    Draft,
    Spam,
    Trash,
    Label(String),
}

impl Folder {
    pub const SYSTEM: [Folder; 6] = [
        Folder::Inbox,
        Folder::Starred,
        Folder::Sent,
        Folder::Draft,
        Folder::Spam,
        Folder::Trash,
    ];

    pub fn query_fragment(&self) -> String {
        match self {
            Folder::Inbox => "in:inbox".to_string(),
            Folder::Starred => "is:starred".to_string(),
            Folder::Sent => "in:sent".to_string(),
            Folder::Draft => "is:draft".to_string(),
            Folder::Spam => "in:spam".to_string(),
            Folder::Trash => "in:trash".to_string(),
            Folder::Label(name) => format!("label:\"{}\"", name),
        }
    }

    /// Key used for the local cache.
    pub fn cache_key(&self) -> String {
        match self {
            Folder::Label(name) => format!("label:{}", name),
            other => other.to_string().to_lowercase(),
        }
    }
}

impl fmt::Display for Folder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Folder::Inbox => write!(f, "Inbox"),
            Folder::Starred => write!(f, "Starred"),
            Folder::Sent => write!(f, "Sent"),
            Folder::Draft => write!(f, "Draft"),
            Folder::Spam => write!(f, "Spam"),
            Folder::Trash => write!(f, "Trash"),
            Folder::Label(name) => write!(f, "{}", name),
        }
    }
}

/// Provider query for a folder plus optional free-text search.
pub fn build_query(folder: &Folder, search: Option<&str>) -> String {
    let mut query = folder.query_fragment();
    if let Some(term) = search {
        if !term.trim().is_empty() {
            query.push(' ');
            query.push_str(term);
        }
    }
    query
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Category {
    Important,
    Social,
    Promotions,
    Spam,
    Error,
    Other(String),
}

impl Category {
    pub fn parse(raw: &str) -> Self {
        match raw.trim().to_lowercase().as_str() {
            "important" => Category::Important,
            "social" => Category::Social,
            "promotions" => Category::Promotions,
            "spam" => Category::Spam,
            "error" => Category::Error,
            _ => Category::Other(to_title_case(raw.trim())),
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Category::Important => write!(f, "Important"),
            Category::Social => write!(f, "Social"),
            Category::Promotions => write!(f, "Promotions"),
            Category::Spam => write!(f, "Spam"),
            Category::Error => write!(f, "Error"),
            Category::Other(s) => write!(f, "{}", s),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExtractedTask {
    pub title: String,
    #[serde(default)]
    pub date: String,
    #[serde(default, rename = "isUrgent")]
    pub is_urgent: bool,
    #[serde(default, rename = "isPastDue")]
    pub is_past_due: bool,
}

/// LLM-derived fields for one message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Enrichment {
    pub category: Category,
    pub summary: String,
    pub requires_reply: bool,
    pub draft_reply: String,
    pub tasks: Vec<ExtractedTask>,
    pub applied_labels: Vec<String>,
}

impl Enrichment {
    pub fn failed() -> Self {
        Self {
            category: Category::Error,
            summary: String::new(),
            requires_reply: false,
            draft_reply: String::new(),
            tasks: Vec::new(),
            applied_labels: Vec::new(),
        }
    }

    pub fn is_failed(&self) -> bool {
        self.category == Category::Error
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub id: String,
    pub thread_id: String,
    pub subject: String,
    pub from: String,
    pub from_address: String,
    pub to: String,
    pub cc: String,
    pub date: String,
    pub snippet: String,
    pub body: String,
    pub has_attachment: bool,
    pub is_unread: bool,
    pub is_starred: bool,
    pub enrichment: Option<Enrichment>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TaskStatus {
    Active,
    Done,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Task {
    pub id: String,
    pub message_id: String,
    pub title: String,
    pub date: String,
    pub is_urgent: bool,
    pub is_past_due: bool,
    pub status: TaskStatus,
}

impl Task {
    pub fn from_extracted(message_id: &str, task: &ExtractedTask) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            message_id: message_id.to_string(),
            title: task.title.clone(),
            date: task.date.clone(),
            is_urgent: task.is_urgent,
            is_past_due: task.is_past_due,
            status: TaskStatus::Active,
        }
    }
}

pub const LABEL_COLORS: [&str; 7] = ["blue", "green", "yellow", "red", "gray", "indigo", "purple"];
pub const LABEL_NAME_MAX: usize = 30;
pub const LABEL_PROMPT_MAX: usize = 100;

/// User-defined classification rule consulted on every enrichment call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CustomLabel {
    pub name: String,
    pub prompt: String,
    #[serde(default = "default_label_color")]
    pub color: String,
    #[serde(default = "default_true")]
    pub apply_retroactively: bool,
}

fn default_label_color() -> String {
    "blue".to_string()
}

fn default_true() -> bool {
    true
}

impl CustomLabel {
    pub fn new(name: &str, prompt: &str, color: &str, apply_retroactively: bool) -> Option<Self> {
        let name = name.trim();
        let prompt = prompt.trim();
        if name.is_empty() || prompt.is_empty() {
            return None;
        }
        let color = if LABEL_COLORS.contains(&color) {
            color
        } else {
            "blue"
        };
        Some(Self {
            name: name.chars().take(LABEL_NAME_MAX).collect(),
            prompt: prompt.chars().take(LABEL_PROMPT_MAX).collect(),
            color: color.to_string(),
            apply_retroactively,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_build_query_folder_only() {
        assert_eq!(build_query(&Folder::Inbox, None), "in:inbox");
        assert_eq!(build_query(&Folder::Starred, Some("   ")), "is:starred");
    }

    #[test]
    fn test_build_query_appends_search_verbatim() {
        assert_eq!(
            build_query(&Folder::Sent, Some("from:bob invoice")),
            "in:sent from:bob invoice"
        );
    }

    #[test]
    fn test_build_query_custom_label_is_quoted() {
        let folder = Folder::Label("Urgent Invoices".to_string());
        assert_eq!(build_query(&folder, None), "label:\"Urgent Invoices\"");
    }

    #[test]
    fn test_category_parse_is_case_insensitive() {
        assert_eq!(Category::parse("promotions"), Category::Promotions);
        assert_eq!(Category::parse(" SPAM "), Category::Spam);
        assert_eq!(
            Category::parse("newsletters"),
            Category::Other("Newsletters".to_string())
        );
    }

    #[test]
    fn test_custom_label_rejects_blank_and_truncates() {
        assert!(CustomLabel::new("  ", "prompt", "blue", true).is_none());
        let long = "x".repeat(50);
        let label = CustomLabel::new(&long, "invoices", "magenta", false).unwrap();
        assert_eq!(label.name.len(), LABEL_NAME_MAX);
        assert_eq!(label.color, "blue");
    }
}
