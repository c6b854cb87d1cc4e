//! Extracts the account to invite from the HTML of a mention.
//!
//! Mastodon renders `@bot` as
//! `<span class="h-card"><a ...>@<span>bot</span></a></span>`, so everything
//! after the closing `</span></a></span>` is what the user typed.

use std::sync::LazyLock;

use regex::Regex;

/// Suffix every invitable account id carries.
pub const ACCOUNT_SUFFIX: &str = ".near";

/// Longest accepted account name, not counting [`ACCOUNT_SUFFIX`].
pub const MAX_ACCOUNT_NAME_LEN: usize = 30;

// Underscore-separated lowercase labels, the suffix, then one character that
// cannot continue an account id (sub-accounts and hyphens are rejected).
static ACCOUNT_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"((?:[a-z0-9]+_)*[a-z0-9]+)\.near[^a-z0-9_.\-]").expect("valid regex")
});

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MentionOutcome {
    Valid,
    TooLong,
    Unparseable,
    NoMention,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MentionCandidate {
    /// Account name without suffix for `Valid`/`TooLong`, the unmatched text
    /// for `Unparseable`, empty for `NoMention`.
    pub raw_fragment: String,
    /// `name.near`, only set when `outcome == Valid`.
    pub normalized_account_id: Option<String>,
    pub outcome: MentionOutcome,
}

impl MentionCandidate {
    fn rejected(raw_fragment: impl Into<String>, outcome: MentionOutcome) -> Self {
        Self {
            raw_fragment: raw_fragment.into(),
            normalized_account_id: None,
            outcome,
        }
    }
}

/// End of the bot's own mention markup.
pub fn mention_delimiter(bot_handle: &str) -> String {
    format!("@<span>{bot_handle}</span></a></span>")
}

pub fn parse(content: &str, bot_handle: &str) -> MentionCandidate {
    let delimiter = mention_delimiter(bot_handle);
    let Some(pos) = content.find(&delimiter) else {
        return MentionCandidate::rejected("", MentionOutcome::NoMention);
    };
    let remaining = &content[pos + delimiter.len()..];

    let Some(name) = ACCOUNT_RE
        .captures(remaining)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str())
    else {
        return MentionCandidate::rejected(remaining, MentionOutcome::Unparseable);
    };

    if name.len() > MAX_ACCOUNT_NAME_LEN {
        return MentionCandidate::rejected(name, MentionOutcome::TooLong);
    }

    MentionCandidate {
        raw_fragment: name.to_string(),
        normalized_account_id: Some(format!("{name}{ACCOUNT_SUFFIX}")),
        outcome: MentionOutcome::Valid,
    }
}
