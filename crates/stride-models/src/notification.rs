use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Category {
    Message,
    Assessment,
    Nutrition,
    System,
    Workout,
}

impl Category {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Message => "MESSAGE",
            Self::Assessment => "ASSESSMENT",
            Self::Nutrition => "NUTRITION",
            Self::System => "SYSTEM",
            Self::Workout => "WORKOUT",
        }
    }
}

impl std::str::FromStr for Category {
    type Err = ();

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "MESSAGE" => Ok(Self::Message),
            "ASSESSMENT" => Ok(Self::Assessment),
            "NUTRITION" => Ok(Self::Nutrition),
            "SYSTEM" => Ok(Self::System),
            "WORKOUT" => Ok(Self::Workout),
            _ => Err(()),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Channel {
    #[default]
    InApp,
    Email,
    Sms,
    Push,
}

impl Channel {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::InApp => "IN_APP",
            Self::Email => "EMAIL",
            Self::Sms => "SMS",
            Self::Push => "PUSH",
        }
    }
}

impl std::str::FromStr for Channel {
    type Err = ();

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "IN_APP" => Ok(Self::InApp),
            "EMAIL" => Ok(Self::Email),
            "SMS" => Ok(Self::Sms),
            "PUSH" => Ok(Self::Push),
            _ => Err(()),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Priority {
    Low,
    #[default]
    Normal,
    High,
}

impl Priority {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Low => "LOW",
            Self::Normal => "NORMAL",
            Self::High => "HIGH",
        }
    }
}

impl std::str::FromStr for Priority {
    type Err = ();

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "LOW" => Ok(Self::Low),
            "NORMAL" => Ok(Self::Normal),
            "HIGH" => Ok(Self::High),
            _ => Err(()),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Notification {
    pub id: i64,
    pub user_id: i64,
    pub category: Category,
    pub channel: Channel,
    pub priority: Priority,
    pub title: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<serde_json::Value>,
    pub read_at: Option<DateTime<Utc>>,
    pub delivered_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}

/// Which categories a user has opted into. Stored on disk as a JSON list
/// where the empty list means "everything"; decoded into a tagged type so
/// the two meanings cannot be confused in code.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CategoryFilter {
    All,
    Only(BTreeSet<Category>),
}

impl CategoryFilter {
    pub fn allows(&self, category: Category) -> bool {
        match self {
            Self::All => true,
            Self::Only(set) => set.contains(&category),
        }
    }

    pub fn from_list(categories: Vec<Category>) -> Self {
        if categories.is_empty() {
            Self::All
        } else {
            Self::Only(categories.into_iter().collect())
        }
    }

    pub fn to_list(&self) -> Vec<Category> {
        match self {
            Self::All => Vec::new(),
            Self::Only(set) => set.iter().copied().collect(),
        }
    }
}

impl Default for CategoryFilter {
    fn default() -> Self {
        Self::All
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Preference {
    pub user_id: i64,
    pub email_enabled: bool,
    pub sms_enabled: bool,
    pub push_enabled: bool,
    pub quiet_hours_start: Option<String>,
    pub quiet_hours_end: Option<String>,
    /// Empty list serializes as "all categories allowed".
    pub categories: Vec<Category>,
}

impl Preference {
    pub fn defaults(user_id: i64) -> Self {
        Self {
            user_id,
            email_enabled: true,
            sms_enabled: false,
            push_enabled: true,
            quiet_hours_start: None,
            quiet_hours_end: None,
            categories: Vec::new(),
        }
    }

    pub fn category_filter(&self) -> CategoryFilter {
        CategoryFilter::from_list(self.categories.clone())
    }
}

/// Partial update applied over the stored (or default) preference row.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct PreferenceUpdate {
    pub email_enabled: Option<bool>,
    pub sms_enabled: Option<bool>,
    pub push_enabled: Option<bool>,
    #[serde(default, with = "double_option")]
    pub quiet_hours_start: Option<Option<String>>,
    #[serde(default, with = "double_option")]
    pub quiet_hours_end: Option<Option<String>>,
    pub categories: Option<Vec<Category>>,
}

/// Distinguishes "field absent" from "field explicitly set to null" so
/// quiet hours can be cleared over the API.
mod double_option {
    use serde::{Deserialize, Deserializer};

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Option<Option<String>>, D::Error>
    where
        D: Deserializer<'de>,
    {
        Option::<String>::deserialize(deserializer).map(Some)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum EmailStatus {
    NotRequested,
    Disabled,
    PreferenceDisabled,
    Dispatched,
}

/// Why (or whether) the email fallback fired, echoed to clients alongside
/// the persisted notification.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmailDelivery {
    pub requested: bool,
    pub enabled: bool,
    pub preference_enabled: bool,
    pub dispatched: bool,
    pub status: EmailStatus,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeliverySummary {
    pub email: EmailDelivery,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotificationPage {
    pub items: Vec<Notification>,
    pub total: i64,
    pub unread: i64,
    pub page: u32,
    pub per_page: u32,
}
