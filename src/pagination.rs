use crate::models::Category;
use crate::render::{Control, ControlStyle, View};
use crate::token::{Action, Token};

pub const PAGE_SIZE: usize = 10;

/// Pure pagination state over an already-sorted list of titles. Transitions
/// clamp to `[0, total_pages - 1]`; a prev/next on a boundary is a no-op
/// re-render, never an error.
#[derive(Debug, Clone)]
pub struct Pager {
    category: Category,
    heading: String,
    titles: Vec<String>,
    page_size: usize,
    current_page: usize,
}

impl Pager {
    pub fn new(
        category: Category,
        heading: impl Into<String>,
        mut titles: Vec<String>,
        page_size: usize,
    ) -> Self {
        titles.sort();
        Self {
            category,
            heading: heading.into(),
            titles,
            page_size: page_size.max(1),
            current_page: 0,
        }
    }

    pub fn category(&self) -> Category {
        self.category
    }

    pub fn current_page(&self) -> usize {
        self.current_page
    }

    /// Number of pages, at least 1 even for an empty list (the empty page
    /// renders a placeholder instead of vanishing).
    pub fn total_pages(&self) -> usize {
        self.titles.len().div_ceil(self.page_size).max(1)
    }

    pub fn page_slice(&self) -> &[String] {
        let start = (self.current_page * self.page_size).min(self.titles.len());
        let end = (start + self.page_size).min(self.titles.len());
        &self.titles[start..end]
    }

    pub fn prev(&mut self) {
        self.current_page = self.current_page.saturating_sub(1);
        self.clamp();
    }

    pub fn next(&mut self) {
        self.current_page = (self.current_page + 1).min(self.total_pages() - 1);
    }

    fn clamp(&mut self) {
        self.current_page = self.current_page.min(self.total_pages() - 1);
    }

    /// Render the current page. Navigation tokens carry the owning session
    /// id; selection tokens carry the title itself.
    pub fn render(&self, session_id: u64) -> View {
        let slice = self.page_slice();
        let body = if slice.is_empty() {
            "Nothing to show on this page.".to_string()
        } else {
            slice
                .iter()
                .map(|title| format!("• **{}**", crate::render::title_case(title)))
                .collect::<Vec<_>>()
                .join("\n")
        };
        let body = format!(
            "{body}\n\nPage {}/{}",
            self.current_page + 1,
            self.total_pages()
        );

        let mut controls = Vec::new();
        if self.total_pages() > 1 {
            let session = session_id.to_string();
            controls.push(
                Control::new(
                    Token::new(Action::Prev, self.category, session.clone()),
                    "◀️ Previous",
                    ControlStyle::Secondary,
                )
                .disabled(self.current_page == 0),
            );
            controls.push(
                Control::new(
                    Token::new(Action::Next, self.category, session),
                    "Next ▶️",
                    ControlStyle::Secondary,
                )
                .disabled(self.current_page == self.total_pages() - 1),
            );
        }
        for title in slice {
            controls.push(Control::new(
                Token::new(Action::Select, self.category, title.as_str()),
                crate::render::title_case(title),
                ControlStyle::Primary,
            ));
        }

        View {
            title: self.heading.clone(),
            body,
            image: None,
            fields: Vec::new(),
            controls,
        }
    }
}
