use crate::models::Category;

/// Opaque control token: `action:category:target` with a percent-encoded
/// target, so titles containing the delimiter or arbitrary Unicode survive
/// the round trip through the platform unambiguously.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Token {
    pub action: Action,
    pub category: Category,
    pub target: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    Prev,
    Next,
    Select,
    Search,
    ViewAll,
    Rate,
}

impl Action {
    fn as_str(self) -> &'static str {
        match self {
            Action::Prev => "prev",
            Action::Next => "next",
            Action::Select => "select",
            Action::Search => "search",
            Action::ViewAll => "view_all",
            Action::Rate => "rate",
        }
    }

    fn parse(s: &str) -> Option<Action> {
        match s {
            "prev" => Some(Action::Prev),
            "next" => Some(Action::Next),
            "select" => Some(Action::Select),
            "search" => Some(Action::Search),
            "view_all" => Some(Action::ViewAll),
            "rate" => Some(Action::Rate),
            _ => None,
        }
    }
}

impl Token {
    pub fn new(action: Action, category: Category, target: impl Into<String>) -> Self {
        Self {
            action,
            category,
            target: target.into(),
        }
    }

    pub fn encode(&self) -> String {
        format!(
            "{}:{}:{}",
            self.action.as_str(),
            self.category.slug(),
            urlencoding::encode(&self.target)
        )
    }

    /// Decode an inbound token. `None` for anything undecodable or naming
    /// an unknown action/category; callers answer those with a generic
    /// "not found" reply instead of faulting.
    pub fn decode(raw: &str) -> Option<Token> {
        let mut parts = raw.splitn(3, ':');
        let action = Action::parse(parts.next()?)?;
        let category = Category::parse(parts.next()?)?;
        let target = urlencoding::decode(parts.next()?).ok()?.into_owned();
        Some(Token {
            action,
            category,
            target,
        })
    }
}
