//! Per-session page history behind the "back" link.

//!
//! The navigator lives in the cookie session next to the identity, so each
//! page is stored as its path and the history is capped.

use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::catalog::ParseEnumError;

pub const HISTORY_LIMIT: usize = 50;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum Page {
    Landing,
    Login,
    Register,
    Dashboard,
    Items,
    ItemDetail(String),
    AddItem,
    Admin,
}

impl Page {
    pub fn path(&self) -> String {
        match self {
            Page::Landing => "/".to_owned(),
            Page::Login => "/login".to_owned(),
            Page::Register => "/register".to_owned(),
            Page::Dashboard => "/dashboard".to_owned(),
            Page::Items => "/items".to_owned(),
            Page::ItemDetail(id) => format!("/items/{id}"),
            Page::AddItem => "/items/new".to_owned(),
            Page::Admin => "/admin".to_owned(),
        }
    }

    pub fn requires_identity(&self) -> bool {
        matches!(self, Page::Dashboard | Page::AddItem | Page::Admin)
    }
}

impl FromStr for Page {
    type Err = ParseEnumError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "/" => Ok(Page::Landing),
            "/login" => Ok(Page::Login),
            "/register" => Ok(Page::Register),
            "/dashboard" => Ok(Page::Dashboard),
            "/items" => Ok(Page::Items),
            "/items/new" => Ok(Page::AddItem),
            "/admin" => Ok(Page::Admin),
            other => match other.strip_prefix("/items/") {
                Some(id) if !id.is_empty() && !id.contains('/') => {
                    Ok(Page::ItemDetail(id.to_owned()))
                }
                _ => Err(ParseEnumError {
                    kind: "page",
                    value: other.to_owned(),
                }),
            },
        }
    }
}

impl TryFrom<String> for Page {
    type Error = ParseEnumError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<Page> for String {
    fn from(value: Page) -> Self {
        value.path()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Navigator {
    current: Page,
    history: Vec<Page>,
}

impl Default for Navigator {
    fn default() -> Self {
        Navigator {
            current: Page::Landing,
            history: Vec::new(),
        }
    }
}

impl Navigator {
    pub const SESSION_KEY: &'static str = "nav";

    pub fn current(&self) -> &Page {
        &self.current
    }

    pub fn history(&self) -> &[Page] {
        &self.history
    }

    /// Switch to `page`, remembering where we came from. Re-rendering the
    /// current page (a refresh) leaves the history alone.
    pub fn navigate(&mut self, page: Page) {
        if page == self.current {
            return;
        }
        let previous = std::mem::replace(&mut self.current, page);
        self.history.push(previous);
        if self.history.len() > HISTORY_LIMIT {
            self.history.remove(0);
        }
    }

    pub fn go_back(&mut self) -> &Page {
        self.current = self.history.pop().unwrap_or(Page::Landing);
        &self.current
    }
}
