use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Notification type enumeration
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum NotificationType {
    /// A new user signed up and awaits approval
    UserRegistration,
    /// Loan documents were uploaded
    LoanUpload,
    /// Income analysis finished
    AnalysisComplete,
    /// An account or loan changed status
    StatusChange,
    /// System-wide alert
    SystemAlert,
    /// Anything the client does not know yet
    #[serde(other)]
    Other,
}

impl NotificationType {
    pub fn as_str(&self) -> &'static str {
        match self {
            NotificationType::UserRegistration => "USER_REGISTRATION",
            NotificationType::LoanUpload => "LOAN_UPLOAD",
            NotificationType::AnalysisComplete => "ANALYSIS_COMPLETE",
            NotificationType::StatusChange => "STATUS_CHANGE",
            NotificationType::SystemAlert => "SYSTEM_ALERT",
            NotificationType::Other => "OTHER",
        }
    }
}

/// Core notification model, as delivered by the REST list and the push channel
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Notification {
    #[serde(alias = "_id")]
    pub id: String,

    #[serde(rename = "type")]
    pub notification_type: NotificationType,

    pub title: String,

    pub message: String,

    /// Free-form payload attached by the producer
    #[serde(default = "empty_metadata")]
    pub metadata: Value,

    #[serde(default)]
    pub is_read: bool,

    #[serde(with = "timestamp")]
    pub created_at: DateTime<Utc>,

    #[serde(default, with = "timestamp::option")]
    pub read_at: Option<DateTime<Utc>>,
}

impl Notification {
    pub fn new(
        id: impl Into<String>,
        notification_type: NotificationType,
        title: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            notification_type,
            title: title.into(),
            message: message.into(),
            metadata: empty_metadata(),
            is_read: false,
            created_at: Utc::now(),
            read_at: None,
        }
    }

    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }
}

fn empty_metadata() -> Value {
    Value::Object(Default::default())
}

/// One page of `GET /notifications/me`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NotificationPage {
    #[serde(default)]
    pub notifications: Vec<Notification>,
    #[serde(default)]
    pub total: u64,
    #[serde(default)]
    pub unread_count: u64,
    #[serde(default = "default_page")]
    pub page: u32,
    #[serde(default)]
    pub page_size: u32,
}

fn default_page() -> u32 {
    1
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub struct UnreadCount {
    #[serde(default)]
    pub unread_count: u64,
}

/// Timestamps arrive either as RFC 3339 or as naive ISO datetimes in UTC
pub(crate) mod timestamp {
    use chrono::{DateTime, NaiveDateTime, Utc};
    use serde::{de::Error, Deserialize, Deserializer, Serializer};

    const NAIVE_FORMAT: &str = "%Y-%m-%dT%H:%M:%S%.f";

    pub fn parse(raw: &str) -> Result<DateTime<Utc>, chrono::ParseError> {
        DateTime::parse_from_rfc3339(raw)
            .map(|dt| dt.with_timezone(&Utc))
            .or_else(|_| NaiveDateTime::parse_from_str(raw, NAIVE_FORMAT).map(|n| n.and_utc()))
    }

    pub fn serialize<S: Serializer>(dt: &DateTime<Utc>, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_str(&dt.to_rfc3339())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<DateTime<Utc>, D::Error> {
        let raw = String::deserialize(d)?;
        parse(&raw).map_err(D::Error::custom)
    }

    pub mod option {
        use super::parse;
        use chrono::{DateTime, Utc};
        use serde::{de::Error, Deserialize, Deserializer, Serializer};

        pub fn serialize<S: Serializer>(
            dt: &Option<DateTime<Utc>>,
            s: S,
        ) -> Result<S::Ok, S::Error> {
            match dt {
                Some(dt) => s.serialize_some(&dt.to_rfc3339()),
                None => s.serialize_none(),
            }
        }

        pub fn deserialize<'de, D: Deserializer<'de>>(
            d: D,
        ) -> Result<Option<DateTime<Utc>>, D::Error> {
            Option::<String>::deserialize(d)?
                .map(|raw| parse(&raw).map_err(D::Error::custom))
                .transpose()
        }
    }
}
