use std::fmt;
use std::sync::LazyLock;

use regex::Regex;

use crate::common::RecordId;

static CHAT_ROUTE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^/chat/([^/?#]+)/?$").expect("chat route pattern is valid"));

/// Client-side pages.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Route {
    Directory,
    Chat(RecordId),
}

impl Route {
    /// Unknown paths fall back to the directory.
    pub fn parse(path: &str) -> Self {
        let path = path.trim();
        match CHAT_ROUTE.captures(path) {
            Some(captures) => Route::Chat(RecordId::new(&captures[1])),
            None => {
                if path != "/" && !path.is_empty() {
                    log::warn!("Unknown route {path}; showing directory");
                }
                Route::Directory
            }
        }
    }
}

impl fmt::Display for Route {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Route::Directory => f.write_str("/"),
            Route::Chat(id) => write!(f, "/chat/{id}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_chat_and_directory() {
        assert_eq!(Route::parse("/chat/42"), Route::Chat(RecordId::from(42)));
        assert_eq!(Route::parse("/chat/42/"), Route::Chat(RecordId::from(42)));
        assert_eq!(Route::parse("/"), Route::Directory);
        assert_eq!(Route::parse("/chat/"), Route::Directory);
        assert_eq!(Route::parse("/settings"), Route::Directory);
        assert_eq!(Route::Chat(RecordId::new("abc")).to_string(), "/chat/abc");
    }
}
