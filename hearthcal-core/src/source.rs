//! Calendar subscriptions ("sources").

use std::fmt;

use serde::{Deserialize, Serialize};

/// Store-assigned identity of a calendar source.
pub type SourceId = u64;

/// Reference to a household member (member records live outside this crate).
pub type MemberId = u64;

/// What kind of remote calendar a source points at. Only `Ical` is synced here.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceKind {
    Ical,
    Google,
    Outlook,
}

impl fmt::Display for SourceKind {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let name = match self {
            SourceKind::Ical => "ical",
            SourceKind::Google => "google",
            SourceKind::Outlook => "outlook",
        };
        write!(f, "{}", name)
    }
}

/// A calendar subscription as stored.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CalendarSource {
    /// None until the store has assigned one
    pub id: Option<SourceId>,
    /// Display name, filled in from X-WR-CALNAME after the first successful sync
    pub name: Option<String>,
    pub kind: SourceKind,
    pub url: Option<String>,
    pub account_email: Option<String>,
    pub member_id: MemberId,
}

impl CalendarSource {
    /// Name for logs and listings: the display name, falling back to the URL.
    pub fn label(&self) -> &str {
        self.name
            .as_deref()
            .or(self.url.as_deref())
            .unwrap_or("(unnamed source)")
    }
}

/// A subscription the user wants to add.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewSource {
    pub kind: SourceKind,
    pub url: Option<String>,
    pub account_email: Option<String>,
    pub member_id: MemberId,
}

impl NewSource {
    pub fn ical(url: &str, member_id: MemberId) -> Self {
        NewSource {
            kind: SourceKind::Ical,
            url: Some(url.to_string()),
            account_email: None,
            member_id,
        }
    }

    pub(crate) fn into_source(self, id: SourceId) -> CalendarSource {
        CalendarSource {
            id: Some(id),
            name: None,
            kind: self.kind,
            url: self.url,
            account_email: self.account_email,
            member_id: self.member_id,
        }
    }
}

impl fmt::Display for CalendarSource {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self.id {
            Some(id) => write!(f, "#{} {}", id, self.label()),
            None => write!(f, "{}", self.label()),
        }
    }
}
