use std::collections::HashMap;
use std::fmt;

/// Default plain-text API port
pub const API_PORT: u16 = 8728;

/// API attribute carrying the request tag
pub const TAG_PREFIX: &str = ".tag=";

/// Command used to verify that a session still answers
pub const HEALTHCHECK_COMMAND: &str = "/system/identity/print";

/// Reply sentence kinds
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReplyKind {
    /// One data row
    Re,
    /// Request finished
    Done,
    /// Request failed; a `!done` follows
    Trap,
    /// Session is being closed by the device
    Fatal,
    /// Request finished without data (RouterOS 7.18+)
    Empty,
}

impl ReplyKind {
    pub fn from_word(word: &str) -> Option<Self> {
        match word {
            "!re" => Some(ReplyKind::Re),
            "!done" => Some(ReplyKind::Done),
            "!trap" => Some(ReplyKind::Trap),
            "!fatal" => Some(ReplyKind::Fatal),
            "!empty" => Some(ReplyKind::Empty),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ReplyKind::Re => "!re",
            ReplyKind::Done => "!done",
            ReplyKind::Trap => "!trap",
            ReplyKind::Fatal => "!fatal",
            ReplyKind::Empty => "!empty",
        }
    }
}

/// A sentence is an ordered list of words terminated on the wire by a zero-length word.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Sentence {
    words: Vec<String>,
}

impl Sentence {
    pub fn new(words: Vec<String>) -> Self {
        Self { words }
    }

    pub fn from_words<I, S>(words: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            words: words.into_iter().map(Into::into).collect(),
        }
    }

    pub fn words(&self) -> &[String] {
        &self.words
    }

    pub fn push(&mut self, word: impl Into<String>) {
        self.words.push(word.into());
    }

    pub fn is_empty(&self) -> bool {
        self.words.is_empty()
    }

    /// Kind of reply, if the first word is a reply word
    pub fn reply_kind(&self) -> Option<ReplyKind> {
        self.words.first().and_then(|w| ReplyKind::from_word(w))
    }

    /// Value of the `.tag=` API attribute
    pub fn tag(&self) -> Option<&str> {
        self.words.iter().find_map(|w| w.strip_prefix(TAG_PREFIX))
    }

    /// Value of the `=key=value` attribute word named `key`
    pub fn attribute(&self, key: &str) -> Option<&str> {
        self.words
            .iter()
            .filter_map(|w| split_attribute(w))
            .find(|(k, _)| *k == key)
            .map(|(_, v)| v)
    }

    /// All `=key=value` attribute words, later words winning on duplicate keys
    pub fn attributes(&self) -> HashMap<&str, &str> {
        self.words
            .iter()
            .filter_map(|w| split_attribute(w))
            .collect()
    }

    /// `=message=` attribute of a `!trap` or `!fatal` reply.
    /// `!fatal` carries its reason as a bare second word instead.
    pub fn message(&self) -> Option<&str> {
        self.attribute("message").or_else(|| {
            if self.reply_kind() == Some(ReplyKind::Fatal) {
                self.words.get(1).map(String::as_str)
            } else {
                None
            }
        })
    }
}

fn split_attribute(word: &str) -> Option<(&str, &str)> {
    word.strip_prefix('=')?.split_once('=')
}

impl fmt::Display for Sentence {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.words.join(" "))
    }
}
