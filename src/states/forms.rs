//! Multi-question forms that produce code for the user's notebook

use crate::message::MessageType;
use crate::state_machine::resumable::resumable;
use crate::state_machine::{Context, Directive, Param, Resumable, StateError, StateFn, Step};

const COPY_CODE: &str = "Copy the following code to a cell:";

fn param(params: &[Param], position: usize) -> Option<String> {
    params
        .get(position)
        .cloned()
        .flatten()
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

/// Single-quoted Python string literal holding `value`
fn quote(value: &str) -> String {
    let escaped = value.replace('\\', "\\\\").replace('\'', "\\'");
    format!("'{escaped}'")
}

fn reply_cell(ctx: &mut Context<'_>, code: String) {
    ctx.reply(COPY_CODE);
    ctx.reply_with(code, MessageType::Cell, None);
}

// ============================================================================
// data?select_column
// ============================================================================

/// Which dataframe column the user means, asked one piece at a time
#[derive(Debug, Clone)]
enum ColumnForm {
    Dataframe { column: Option<String> },
    Column { dataframe: String },
}

/// `data?select_column`: asks for a dataframe, then a column, and replies
/// code describing the column. Values captured by the triggering rule or
/// remembered from earlier answers skip their question.
pub fn select_column() -> StateFn {
    resumable("select_column", Directive::Default, |ctx, params| {
        let dataframe = param(params, 0)
            .or_else(|| ctx.memory().get_str("dataframe").map(str::to_string));
        let column = param(params, 1)
            .map(|column| {
                let stripped = column.strip_prefix("column ").map(str::to_string);
                stripped.unwrap_or(column)
            })
            .or_else(|| ctx.memory().get_str("column").map(str::to_string));

        Ok(match dataframe {
            Some(dataframe) => with_dataframe(ctx, dataframe, column),
            None => {
                ctx.reply("Please, write the expression of the dataframe");
                Step::suspend(ColumnForm::Dataframe { column })
            }
        })
    })
}

fn with_dataframe(ctx: &mut Context<'_>, dataframe: String, column: Option<String>) -> Step {
    ctx.memory_mut().set("dataframe", dataframe.as_str());
    match column {
        Some(column) => describe_column(ctx, &dataframe, &column),
        None => {
            ctx.reply("Please, write the column name");
            Step::suspend(ColumnForm::Column { dataframe })
        }
    }
}

fn describe_column(ctx: &mut Context<'_>, dataframe: &str, column: &str) -> Step {
    ctx.memory_mut().set("column", column);
    ctx.reply_code(
        &format!("To describe {column:?} from {dataframe:?}, copy the following code to a cell:"),
        &format!("{dataframe}[{}].describe()", quote(column)),
    );
    Step::done()
}

impl Resumable for ColumnForm {
    fn resume(self: Box<Self>, ctx: &mut Context<'_>, input: &str) -> Result<Step, StateError> {
        let answer = input.trim();
        if answer.is_empty() {
            ctx.reply("Please, write a name");
            return Ok(Step::Suspend(self));
        }
        Ok(match *self {
            ColumnForm::Dataframe { column } => with_dataframe(ctx, answer.to_string(), column),
            ColumnForm::Column { dataframe } => describe_column(ctx, &dataframe, answer),
        })
    }
}

// ============================================================================
// io?ask_input
// ============================================================================

#[derive(Debug, Clone)]
enum InputForm {
    Prompt,
    Store { code: String },
    Variable { code: String },
}

const STORE_QUESTION: &str = "If you just ask for input and do not store it, it will be lost for \
future interactions. You could store it in a <b>variable</b> to access it during the execution of \
your program. Do you want to do it?";

fn ask_to_store(ctx: &mut Context<'_>, prompt: &str) -> Step {
    ctx.reply(STORE_QUESTION);
    Step::suspend(InputForm::Store {
        code: format!("input({prompt:?})"),
    })
}

/// `io?ask_input`: builds an `input(...)` call, optionally stored in a variable
pub fn ask_input() -> StateFn {
    resumable("ask_input", Directive::Default, |ctx, params| {
        Ok(match param(params, 0) {
            Some(prompt) => ask_to_store(ctx, &prompt),
            None => {
                ctx.reply("Please, write the input text");
                Step::suspend(InputForm::Prompt)
            }
        })
    })
}

impl Resumable for InputForm {
    fn resume(self: Box<Self>, ctx: &mut Context<'_>, input: &str) -> Result<Step, StateError> {
        Ok(match *self {
            InputForm::Prompt => ask_to_store(ctx, input),
            InputForm::Store { code } => match input.trim().to_lowercase().as_str() {
                "y" | "yes" | "sure" | "of course" => {
                    ctx.reply("What name do you want to use for the variable? (Suggestion: reply)");
                    Step::suspend(InputForm::Variable { code })
                }
                "n" | "no" | "nope" => {
                    reply_cell(ctx, code);
                    Step::done()
                }
                "exit" | "quit" | "return" => Step::done(),
                _ => {
                    ctx.reply(
                        "I could not understand the options. Please, answer \"yes\"/\"no\" or \
                         type \"exit\" to go back",
                    );
                    Step::suspend(InputForm::Store { code })
                }
            },
            InputForm::Variable { code } => {
                reply_cell(ctx, format!("{} = {code}", input.trim()));
                Step::done()
            }
        })
    }
}

// ============================================================================
// io?display
// ============================================================================

/// Python expression printing `text`: quoted text is kept, bare text gets
/// quoted, and braces turn the literal into an f-string
fn print_code(text: &str) -> String {
    let text = text.trim();
    // An explicit f prefix is re-added below when the literal interpolates
    let unprefixed = text
        .strip_prefix(['f', 'F'])
        .filter(|rest| rest.starts_with(['\'', '"']))
        .unwrap_or(text);
    let literal = if unprefixed.starts_with(['\'', '"']) {
        unprefixed.to_string()
    } else {
        quote(text)
    };
    if literal.contains('{') {
        format!("print(f{literal})")
    } else {
        format!("print({literal})")
    }
}

#[derive(Debug, Clone)]
struct DisplayForm;

impl Resumable for DisplayForm {
    fn resume(self: Box<Self>, ctx: &mut Context<'_>, input: &str) -> Result<Step, StateError> {
        reply_cell(ctx, print_code(input));
        Ok(Step::done())
    }
}

/// `io?display`: builds a `print(...)` call
pub fn display() -> StateFn {
    resumable("display", Directive::Default, |ctx, params| {
        Ok(match param(params, 0) {
            Some(text) => {
                reply_cell(ctx, print_code(&text));
                Step::done()
            }
            None => {
                ctx.reply("Please, write the display text");
                Step::suspend(DisplayForm)
            }
        })
    })
}
