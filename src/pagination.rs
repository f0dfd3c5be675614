//! Splits long option lists into pages
//!
//! Only the first page is built up front. Its last entry is a "More..."
//! option whose state splits the remaining items when it is picked.

use crate::config::DEFAULT_PAGE_SIZE;
use crate::handlers::options::{show_options, StatefulOption};
use crate::message::{MessageId, OptionLayout};
use crate::state_machine::{Context, Directive, StateFn};

pub const MORE_LABEL: &str = "More...";

/// Page splitter with a per-conversation counter for synthetic keys
#[derive(Debug, Clone)]
pub struct Paginator {
    page_size: usize,
    next_page_id: u64,
}

impl Default for Paginator {
    fn default() -> Self {
        Self::new(DEFAULT_PAGE_SIZE)
    }
}

/// Result of cutting one page off an option list
pub(crate) struct Split {
    pub visible: Vec<StatefulOption>,
    /// Synthetic key of the "More..." option and the items behind it
    pub more: Option<(String, Vec<StatefulOption>)>,
}

impl Paginator {
    pub fn new(page_size: usize) -> Self {
        Self {
            page_size: page_size.max(1),
            next_page_id: 0,
        }
    }

    pub fn page_size(&self) -> usize {
        self.page_size
    }

    pub(crate) fn split(&mut self, mut items: Vec<StatefulOption>) -> Split {
        // A single leftover item is shown in place of the "More..." link
        if items.len() <= self.page_size + 1 {
            return Split {
                visible: items,
                more: None,
            };
        }
        let rest = items.split_off(self.page_size);
        let key = format!("<page {}>", self.next_page_id);
        self.next_page_id += 1;
        Split {
            visible: items,
            more: Some((key, rest)),
        }
    }

    /// Items for page `number`, ending with a "More..." option unless it is
    /// the last page
    fn page(&mut self, items: Vec<StatefulOption>, number: usize) -> (Vec<StatefulOption>, bool) {
        let Split { mut visible, more } = self.split(items);
        match more {
            None => (visible, true),
            Some((key, rest)) => {
                visible.push(StatefulOption::new(key, MORE_LABEL, more_state(rest, number + 1)));
                (visible, false)
            }
        }
    }

    pub fn paginate(&mut self, items: Vec<StatefulOption>) -> (Vec<StatefulOption>, bool) {
        self.page(items, 1)
    }
}

fn more_state(rest: Vec<StatefulOption>, number: usize) -> StateFn {
    StateFn::new(format!("page {number}"), move |ctx, _| {
        show_page(ctx, rest.clone(), number);
        Ok(Directive::Default)
    })
}

fn show_page(ctx: &mut Context<'_>, items: Vec<StatefulOption>, number: usize) -> MessageId {
    let page_size = ctx.paginator().page_size();
    let (visible, last) = ctx.paginator().page(items, number);
    if !(number == 1 && last) {
        let listed = visible.len() - usize::from(!last);
        let start = (number - 1) * page_size + 1;
        let end = start + listed.saturating_sub(1);
        ctx.reply(format!("Showing {start}..{end} (page {number})"));
    }
    show_options(ctx, visible, OptionLayout::Ordered, None)
}

/// Reply the first page of `items` as a checkpointed option list
pub fn show_paginated(ctx: &mut Context<'_>, items: Vec<StatefulOption>) -> MessageId {
    show_page(ctx, items, 1)
}
