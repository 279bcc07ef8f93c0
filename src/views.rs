//! Server-rendered page templates.
//!
//! Templates are compiled into the binary and the environment is built
//! once at startup, shared through `AppState`. Autoescaping is on for
//! every template (all names end in `.html`), so entry text and backend
//! error messages interpolate safely.

use axum::response::Html;
use chrono::DateTime;
use minijinja::Environment;
use serde::Serialize;

use crate::error::Result;
use crate::models::session::{Session, SessionState};

/// Characters of entry body shown on a list card before the ellipsis.
const PREVIEW_CHARS: usize = 100;

/// The slice of session state a page may see. Deliberately excludes the
/// access token; templates never need it.
#[derive(Debug, Serialize)]
pub struct SessionView {
    pub user_id: String,
    pub email: Option<String>,
    pub updated_at: Option<String>,
}

impl From<&Session> for SessionView {
    fn from(session: &Session) -> Self {
        Self {
            user_id: session.user_id.to_string(),
            email: session.email.clone(),
            updated_at: session.updated_at.map(|t| t.to_rfc3339()),
        }
    }
}

/// Maps the resolved session onto its template-visible slice.
pub fn session_view(state: &SessionState) -> Option<SessionView> {
    state.session().map(SessionView::from)
}

/// `2025年6月1日` from an RFC 3339 timestamp. Unparseable input passes
/// through untouched rather than breaking the page.
fn date_short(value: String) -> String {
    match DateTime::parse_from_rfc3339(&value) {
        Ok(date) => date.format("%Y年%-m月%-d日").to_string(),
        Err(_) => value,
    }
}

/// `2025年6月1日 09:30` from an RFC 3339 timestamp.
fn date_long(value: String) -> String {
    match DateTime::parse_from_rfc3339(&value) {
        Ok(date) => date.format("%Y年%-m月%-d日 %H:%M").to_string(),
        Err(_) => value,
    }
}

/// First hundred characters of an entry body, with an ellipsis when the
/// body runs longer.
fn preview(value: String) -> String {
    if value.chars().count() <= PREVIEW_CHARS {
        return value;
    }
    let cut: String = value.chars().take(PREVIEW_CHARS).collect();
    format!("{cut}...")
}

/// The template environment plus the render entry point.
pub struct Views {
    env: Environment<'static>,
}

impl Views {
    pub fn new() -> Result<Self> {
        let mut env = Environment::new();

        env.add_filter("date_short", date_short);
        env.add_filter("date_long", date_long);
        env.add_filter("preview", preview);
        env.add_global(
            "current_year",
            chrono::Utc::now().format("%Y").to_string(),
        );

        env.add_template("base.html", include_str!("../templates/base.html"))?;
        env.add_template("index.html", include_str!("../templates/index.html"))?;
        env.add_template(
            "entry_detail.html",
            include_str!("../templates/entry_detail.html"),
        )?;
        env.add_template(
            "entry_form.html",
            include_str!("../templates/entry_form.html"),
        )?;
        env.add_template(
            "delete_confirm.html",
            include_str!("../templates/delete_confirm.html"),
        )?;
        env.add_template("login.html", include_str!("../templates/login.html"))?;
        env.add_template(
            "reset_password.html",
            include_str!("../templates/reset_password.html"),
        )?;
        env.add_template("profile.html", include_str!("../templates/profile.html"))?;
        env.add_template(
            "not_found.html",
            include_str!("../templates/not_found.html"),
        )?;

        Ok(Self { env })
    }

    /// Renders one template to a complete HTML response body.
    pub fn render(&self, name: &str, ctx: minijinja::Value) -> Result<Html<String>> {
        let template = self.env.get_template(name)?;
        Ok(Html(template.render(ctx)?))
    }
}
