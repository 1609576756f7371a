//! Turning meeting metadata into search terms.

use std::sync::LazyLock;

use regex::Regex;

use crate::context::Meeting;

/// Attendee strings are cut to this many characters before parsing.
pub const MAX_ATTENDEE_LEN: usize = 200;

/// Query tokens must be longer than this many characters.
pub const MIN_TOKEN_LEN: usize = 2;

/// Description text from the first of these markers onward is invite
/// boilerplate. Matched case-insensitively.
const BOILERPLATE_MARKERS: &[&str] = &[
    "is inviting you",
    "join zoom meeting",
    "meeting url",
    "meeting id",
    "password:",
    "passcode:",
    "join with google meet",
    "microsoft teams meeting",
    "-::~:~::",
];

const FREE_MAIL_DOMAINS: &[&str] = &[
    "gmail.com",
    "googlemail.com",
    "outlook.com",
    "hotmail.com",
    "live.com",
    "yahoo.com",
    "icloud.com",
    "me.com",
    "proton.me",
    "protonmail.com",
];

const CONFERENCE_HOSTS: &[&str] = &[
    "zoom.us",
    "meet.google.com",
    "teams.microsoft.com",
    "teams.live.com",
    "webex.com",
    "whereby.com",
    "around.co",
    "gotomeeting.com",
];

struct Cleaners {
    link: Regex,
    url: Regex,
}

static CLEANERS: LazyLock<Option<Cleaners>> = LazyLock::new(|| {
    let compiled = (|| -> Result<Cleaners, regex::Error> {
        Ok(Cleaners {
            link: Regex::new(r"!?\[([^\]]*)\]\([^)]*\)")?,
            url: Regex::new(r"(?:https?://|www\.)\S+")?,
        })
    })();
    match compiled {
        Ok(c) => Some(c),
        Err(e) => {
            tracing::warn!(error = %e, "description cleaners failed to compile");
            None
        }
    }
});

/// A parsed attendee.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attendee {
    pub name: String,
    pub email: Option<String>,
}

impl Attendee {
    /// The organisation label of the email domain (`acme` for
    /// `jane@mail.acme.com`), unless it is a free-mail provider.
    pub fn organisation(&self) -> Option<String> {
        let domain = self.email.as_deref()?.rsplit_once('@')?.1.to_lowercase();
        if FREE_MAIL_DOMAINS.contains(&domain.as_str()) {
            return None;
        }
        let labels: Vec<&str> = domain.split('.').filter(|l| !l.is_empty()).collect();
        match labels.as_slice() {
            [] | [_] => None,
            [.., org, _tld] => Some((*org).to_string()),
        }
    }
}

/// Search terms derived from a meeting.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SearchQuery {
    /// Deduplicated words, first casing kept.
    pub tokens: Vec<String>,
    /// Display names of the attendees, for entity matching.
    pub attendee_names: Vec<String>,
}

impl SearchQuery {
    pub fn is_empty(&self) -> bool {
        self.tokens.is_empty()
    }

    /// The tokens as one query string.
    pub fn text(&self) -> String {
        self.tokens.join(" ")
    }
}

/// Build the search query for a meeting.
pub fn build_query(meeting: &Meeting) -> SearchQuery {
    let mut raw: Vec<String> = Vec::new();
    raw.push(meeting.title.clone());

    if let Some(description) = meeting.description.as_deref() {
        raw.push(clean_description(description));
    }

    let mut attendee_names = Vec::new();
    for entry in &meeting.attendees {
        let Some(attendee) = parse_attendee(entry) else {
            continue;
        };
        if !attendee.name.is_empty() {
            raw.push(attendee.name.clone());
            attendee_names.push(attendee.name.clone());
        }
        if let Some(org) = attendee.organisation() {
            raw.push(org);
        }
    }

    if let Some(location) = meeting.location.as_deref()
        && !is_conference_location(location)
    {
        raw.push(location.to_string());
    }

    let mut tokens: Vec<String> = Vec::new();
    for word in raw.iter().flat_map(|s| words(s)) {
        if word.chars().count() <= MIN_TOKEN_LEN {
            continue;
        }
        if !tokens.iter().any(|t| t.to_lowercase() == word.to_lowercase()) {
            tokens.push(word.to_string());
        }
    }

    SearchQuery {
        tokens,
        attendee_names,
    }
}

fn words(text: &str) -> impl Iterator<Item = &str> {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|w| !w.is_empty())
}

/// Parse `Name <email>`, a bare email, or a bare name.
///
/// Input is cut to [`MAX_ATTENDEE_LEN`] characters first, and parsing is a
/// fixed number of linear scans, so hostile input cannot stall it.
pub fn parse_attendee(raw: &str) -> Option<Attendee> {
    let bounded = match raw.char_indices().nth(MAX_ATTENDEE_LEN) {
        Some((idx, _)) => &raw[..idx],
        None => raw,
    };
    let text = bounded.trim();
    if text.is_empty() {
        return None;
    }

    if let Some(open) = text.find('<')
        && let Some(close) = text[open..].find('>')
    {
        let name = strip_quotes(text[..open].trim());
        let email = text[open + 1..open + close].trim();
        let email = valid_email(email).then(|| email.to_string());
        let name = if name.is_empty() {
            email.as_deref().map(name_from_email).unwrap_or_default()
        } else {
            name.to_string()
        };
        return Some(Attendee { name, email });
    }

    if text.contains('@') && !text.contains(char::is_whitespace) {
        if valid_email(text) {
            return Some(Attendee {
                name: name_from_email(text),
                email: Some(text.to_string()),
            });
        }
        // Not an address; keep whatever precedes the first `@`.
        let local = text.split('@').next().unwrap_or_default();
        return Some(Attendee {
            name: local.to_string(),
            email: None,
        });
    }

    Some(Attendee {
        name: strip_quotes(text).to_string(),
        email: None,
    })
}

fn strip_quotes(s: &str) -> &str {
    s.trim_matches(|c| c == '"' || c == '\'').trim()
}

fn valid_email(s: &str) -> bool {
    let Some((local, domain)) = s.split_once('@') else {
        return false;
    };
    !local.is_empty()
        && !domain.contains('@')
        && domain.contains('.')
        && !domain.starts_with('.')
        && !domain.ends_with('.')
}

fn name_from_email(email: &str) -> String {
    let local = email.split('@').next().unwrap_or_default();
    local
        .split(['.', '_', '-', '+'])
        .filter(|p| !p.is_empty())
        .collect::<Vec<_>>()
        .join(" ")
}

/// Strip conferencing boilerplate and markdown from an event description.
pub fn clean_description(text: &str) -> String {
    // ASCII lowercasing keeps byte offsets aligned with `text`.
    let lower = text.to_ascii_lowercase();
    let text = match BOILERPLATE_MARKERS.iter().filter_map(|m| lower.find(m)).min() {
        Some(at) => &text[..at],
        None => text,
    };

    let mut kept = String::with_capacity(text.len());
    let mut in_fence = false;
    for line in text.lines() {
        if line.trim_start().starts_with("```") {
            in_fence = !in_fence;
            continue;
        }
        if !in_fence {
            kept.push_str(line);
            kept.push('\n');
        }
    }

    let kept = match CLEANERS.as_ref() {
        Some(c) => {
            let delinked = c.link.replace_all(&kept, "$1");
            c.url.replace_all(&delinked, " ").into_owned()
        }
        None => kept,
    };

    kept.replace("**", "")
        .replace("__", "")
        .replace('`', "")
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

/// Whether a location is a video call rather than a place.
pub fn is_conference_location(location: &str) -> bool {
    let lower = location.trim().to_lowercase();
    lower.contains("://")
        || lower.starts_with("www.")
        || CONFERENCE_HOSTS.iter().any(|host| lower.contains(host))
}
