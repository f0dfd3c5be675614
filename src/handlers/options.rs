//! Option lists tied to states

use crate::message::{MessageId, OptionItem, OptionLayout};
use crate::state_machine::{Checkpoint, Context, Directive, State, StateError, StateFn};

pub const CHOOSE_OPTION: &str = "Please, choose an option:";
pub const INVALID_OPTION: &str = "I could not understand this option. Please, try again.";

/// An option that runs `state` when selected
#[derive(Debug, Clone)]
pub struct StatefulOption {
    pub key: String,
    pub label: String,
    pub state: Option<StateFn>,
}

impl StatefulOption {
    pub fn new(key: impl Into<String>, label: impl Into<String>, state: StateFn) -> Self {
        Self {
            key: key.into(),
            label: label.into(),
            state: Some(state),
        }
    }

    /// An option that only returns to the default state
    pub fn plain(key: impl Into<String>, label: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            label: label.into(),
            state: None,
        }
    }

    pub fn item(&self) -> OptionItem {
        OptionItem {
            key: self.key.clone(),
            label: self.label.clone(),
        }
    }
}

/// Match user input against options by 1-based position (`2` or `2.`),
/// literal key or case-insensitive label
pub fn select<'o>(options: &'o [StatefulOption], text: &str) -> Option<&'o StatefulOption> {
    let text = text.trim();
    let numeric = text.starts_with(|c: char| c.is_ascii_digit())
        && (text.contains('.') || text.chars().all(|c| c.is_ascii_digit()));
    if numeric {
        let position = text
            .split('.')
            .next()
            .and_then(|number| number.parse::<usize>().ok());
        if let Some(option) = position
            .and_then(|position| position.checked_sub(1))
            .and_then(|index| options.get(index))
        {
            return Some(option);
        }
    }

    let lowered = text.to_lowercase();
    options
        .iter()
        .find(|option| option.key == text || option.label.to_lowercase() == lowered)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Mismatch {
    /// Hand the message back to the default state
    Reprocess,
    /// Ask again and keep waiting for a valid option
    Retry,
}

/// Active state waiting for one of `options`
#[derive(Debug, Clone)]
pub struct OptionSelection {
    options: Vec<StatefulOption>,
    mismatch: Mismatch,
}

impl State for OptionSelection {
    fn process_message(self: Box<Self>, ctx: &mut Context<'_>) -> Result<Directive, StateError> {
        if let Some(option) = select(&self.options, ctx.text()) {
            tracing::debug!(key = %option.key, "Option selected");
            return match &option.state {
                Some(state) => state.call(ctx, &[]),
                None => Ok(Directive::Default),
            };
        }
        match self.mismatch {
            Mismatch::Reprocess => Ok(Directive::Reprocess),
            Mismatch::Retry => {
                ctx.reply(INVALID_OPTION);
                Ok(Directive::State(self))
            }
        }
    }
}

/// Reply `options` as a list checkpointed on the reply
///
/// Answers that match no option are processed from the default state, so a
/// new question typed in reply to the list still gets answered.
pub fn show_options(
    ctx: &mut Context<'_>,
    options: Vec<StatefulOption>,
    layout: OptionLayout,
    text: Option<&str>,
) -> MessageId {
    let items: Vec<OptionItem> = options.iter().map(StatefulOption::item).collect();
    let selection = OptionSelection {
        options,
        mismatch: Mismatch::Reprocess,
    };
    ctx.reply_options(&items, layout, text, Some(Checkpoint::state(selection)))
}

/// Present `label` and an unordered list of `options`, then make the
/// selection the active state; unmatched answers are rejected until a valid
/// option arrives
pub fn options_state(
    ctx: &mut Context<'_>,
    options: Vec<StatefulOption>,
    label: Option<&str>,
) -> Directive {
    ctx.reply(label.unwrap_or(CHOOSE_OPTION));
    let items: Vec<OptionItem> = options.iter().map(StatefulOption::item).collect();
    ctx.reply_options(&items, OptionLayout::Unordered, None, None);
    Directive::state(OptionSelection {
        options,
        mismatch: Mismatch::Retry,
    })
}
