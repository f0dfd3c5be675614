//! Built-in states and the default state registry

mod classification;
mod forms;

use crate::state_machine::{Directive, Redirect, StateFn, StateModule, StateRegistry};
use std::collections::HashMap;

/// State that replies `text` and returns to the default state
pub fn reply_state(text: String) -> StateFn {
    StateFn::new("reply", move |ctx, _| {
        ctx.reply(text.clone());
        Ok(Directive::Default)
    })
}

/// State that opens `url` in a side panel titled `title`
pub fn panel_state(url: String, title: String) -> StateFn {
    StateFn::new("panel", move |ctx, _| {
        ctx.open_panel(&url, &title);
        Ok(Directive::Default)
    })
}

/// State that jumps to a `!subject` or `<module>?<function>` command
pub fn state_loader(command: String) -> StateFn {
    StateFn::new(format!("load {command}"), move |_, _| {
        Ok(Directive::Redirect(Redirect::new(
            Directive::command(command.clone()),
            Vec::new(),
        )))
    })
}

/// Every built-in module by name
pub fn builtin_modules() -> HashMap<String, StateModule> {
    HashMap::from([
        (
            "data".to_string(),
            StateModule::new().with(forms::select_column()),
        ),
        (
            "io".to_string(),
            StateModule::new()
                .with(forms::ask_input())
                .with(forms::display()),
        ),
        (
            "classification".to_string(),
            StateModule::new().with(classification::steps()),
        ),
    ])
}

/// Registry holding every built-in module
pub fn builtin_registry() -> StateRegistry {
    let registry = StateRegistry::new();
    registry.reload(builtin_modules());
    registry
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state_machine::context::testing::Turn;

    #[test]
    fn test_builtin_modules() {
        let registry = builtin_registry();
        assert!(registry.lookup("data", "select_column").is_ok());
        assert!(registry.lookup("io", "ask_input").is_ok());
        assert!(registry.lookup("io", "display").is_ok());
        assert!(registry.lookup("classification", "steps").is_ok());
    }

    #[test]
    fn test_state_loader_redirects() {
        let loader = state_loader("io?display".to_string());
        let mut turn = Turn::new("x");
        let directive = loader.call(&mut turn.context(), &[]).unwrap();
        let Directive::Redirect(redirect) = directive else {
            panic!("expected a redirect");
        };
        assert!(matches!(*redirect.target, Directive::Command(ref c) if c == "io?display"));
        assert!(redirect.params.is_empty());
    }

    #[test]
    fn test_panel_state_markup() {
        let panel = panel_state("https://x.org".to_string(), "Docs".to_string());
        let mut turn = Turn::new("x");
        let mut ctx = turn.context();
        panel.call(&mut ctx, &[]).unwrap();
        assert_eq!(ctx.replies()[0].message.text, "####web-panel#:Docs#:https://x.org");
    }
}
