use crate::models::{Category, Entry};
use crate::token::{Action, Token};
use serde::Serialize;

/// Outbound view shape consumed by the chat platform: a titled body with an
/// optional image, optional named fields, and a row of labeled controls.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct View {
    pub title: String,
    pub body: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub fields: Vec<Field>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub controls: Vec<Control>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Field {
    pub name: String,
    pub value: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Control {
    /// Opaque action token round-tripped by the platform.
    pub token: String,
    pub label: String,
    pub style: ControlStyle,
    pub disabled: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ControlStyle {
    Primary,
    Secondary,
    Success,
}

impl Control {
    pub fn new(token: Token, label: impl Into<String>, style: ControlStyle) -> Self {
        Self {
            token: token.encode(),
            label: label.into(),
            style,
            disabled: false,
        }
    }

    pub fn disabled(mut self, disabled: bool) -> Self {
        self.disabled = disabled;
        self
    }
}

impl View {
    /// Copy of this view with every control disabled; the terminal render
    /// of an expired pagination session.
    pub fn with_controls_disabled(&self) -> View {
        let mut view = self.clone();
        for control in &mut view.controls {
            control.disabled = true;
        }
        view
    }
}

/// `★★★★☆` line for a rounded average, 5 stars wide.
pub fn stars(rating: f64) -> String {
    let full = (rating.round() as usize).min(5);
    "★".repeat(full) + &"☆".repeat(5 - full)
}

/// Title-case for display: keys are stored lower-cased, casing is derived
/// here and never persisted.
pub fn title_case(s: &str) -> String {
    s.split_whitespace()
        .map(|word| {
            let mut chars = word.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().collect::<String>() + chars.as_str(),
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}

/// Detail view of one entry: rating line, link line (or season list for a
/// series, sorted ascending), themes field and a rate control.
pub fn entry_detail(category: Category, key: &str, entry: &Entry) -> View {
    let rating_line = match entry.rating {
        Some(r) => format!("Rating: {}", stars(r)),
        None => "Rating: not rated yet".to_string(),
    };

    let body = if category == Category::Series {
        let seasons = entry.seasons_sorted();
        if seasons.is_empty() {
            format!("{rating_line}\n\nNo seasons found for this series.")
        } else {
            let mut lines = vec![rating_line, String::new(), "**Available seasons:**".into()];
            for season in &seasons {
                lines.push(format!("- [{}]({})", season.title, season.url));
            }
            lines.join("\n")
        }
    } else {
        let link = match &entry.url {
            Some(url) => format!("[🔗 Open the {}]({})", category.singular(), url),
            None => "Link unavailable".to_string(),
        };
        format!("{link}\n\n{rating_line}")
    };

    let mut fields = Vec::new();
    if !entry.themes.is_empty() {
        let value = entry
            .themes
            .iter()
            .map(|t| title_case(t))
            .collect::<Vec<_>>()
            .join(", ");
        fields.push(Field {
            name: "Genres/Themes".into(),
            value,
        });
    }

    View {
        title: title_case(key),
        body,
        image: entry.image.clone(),
        fields,
        controls: vec![Control::new(
            Token::new(Action::Rate, category, key),
            "⭐ Rate",
            ControlStyle::Success,
        )],
    }
}

/// Per-category search home: free-text search plus view-all. This is the
/// `Category`'s search-view factory the router posts into each category's
/// browse channel.
pub fn search_home(category: Category) -> View {
    View {
        title: format!("🔍 Search for a {}", title_case(category.singular())),
        body: format!(
            "Type a title to look one up, enter a genre to browse it, or view every {} at once.",
            category.singular()
        ),
        image: None,
        fields: Vec::new(),
        controls: vec![
            Control::new(
                Token::new(Action::Search, category, ""),
                "🔍 Search by title",
                ControlStyle::Primary,
            ),
            Control::new(
                Token::new(Action::ViewAll, category, ""),
                "📖 View all",
                ControlStyle::Secondary,
            ),
        ],
    }
}

/// Plain notice reply (errors, confirmations).
pub fn notice(text: impl Into<String>) -> View {
    View {
        title: String::new(),
        body: text.into(),
        image: None,
        fields: Vec::new(),
        controls: Vec::new(),
    }
}
