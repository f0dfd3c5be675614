use super::{Solution, Solver};
use crate::state_machine::{Context, Directive, StateError};

pub const URL_PANEL_TITLE: &str = "URL View";

/// Opens a web panel when the message is a bare http(s) URL
pub struct UrlHandler;

fn bare_url(text: &str) -> Option<&str> {
    let text = text.trim();
    if text.contains(char::is_whitespace) {
        return None;
    }
    let parsed = url::Url::parse(text).ok()?;
    matches!(parsed.scheme(), "http" | "https").then_some(text)
}

impl Solver for UrlHandler {
    fn name(&self) -> &str {
        "url"
    }

    fn solve(&self, ctx: &mut Context<'_>) -> Result<Solution, StateError> {
        let Some(url) = bare_url(ctx.text()).map(str::to_string) else {
            return Ok(Solution::Unhandled);
        };
        tracing::debug!(url = %url, "Opening URL panel");
        ctx.open_panel(&url, URL_PANEL_TITLE);
        Ok(Solution::Handled(Directive::Default))
    }
}
