//! Subject search and subject navigation states

use super::options::{show_options, StatefulOption};
use super::{Solution, Solver};
use crate::knowledge::subjects::{parent_key, subject_name, KEY_SEPARATOR};
use crate::knowledge::{LoadError, NodeId, Reloadable, SubjectIndex};
use crate::message::OptionLayout;
use crate::pagination::show_paginated;
use crate::protocol::AutocompleteItem;
use crate::state_machine::{Checkpoint, Context, Directive, StateError, StateFn};
use crate::states::{panel_state, reply_state, state_loader};
use std::sync::Arc;

/// Number of subjects offered by autocomplete
pub const AUTOCOMPLETE_LIMIT: usize = 5;

/// Answers messages that match subjects in the knowledge base
pub struct SubjectHandler {
    index: Arc<Reloadable<SubjectIndex>>,
}

impl SubjectHandler {
    pub fn new(index: Arc<Reloadable<SubjectIndex>>) -> Self {
        Self { index }
    }

    /// State showing the subject stored under `key`, if any
    pub fn state_by_key(&self, key: &str) -> Result<Option<StateFn>, LoadError> {
        let index = self.index.current()?;
        Ok(index
            .lookup(key)
            .map(|document| document.node)
            .map(|node| subject_state(&index, node, key)))
    }

    pub fn autocomplete(&self, query: &str) -> Result<Vec<AutocompleteItem>, LoadError> {
        let index = self.index.current()?;
        Ok(index
            .search(query)
            .into_iter()
            .take(AUTOCOMPLETE_LIMIT)
            .map(|hit| {
                let node = index.node(hit.node);
                AutocompleteItem {
                    kind: "subject".to_string(),
                    value: node.description.clone().unwrap_or_default(),
                    url: node.url.clone().unwrap_or_default(),
                    key: hit.key,
                }
            })
            .collect())
    }
}

impl Solver for SubjectHandler {
    fn name(&self) -> &str {
        "subject"
    }

    fn solve(&self, ctx: &mut Context<'_>) -> Result<Solution, StateError> {
        let index = self.index.current()?;
        let hits = index.search(ctx.text());
        if hits.is_empty() {
            return Ok(Solution::Unhandled);
        }
        tracing::debug!(
            query = %ctx.text(),
            hits = hits.len(),
            top_score = hits[0].score,
            "Subjects found"
        );

        ctx.reply(format!(
            "I found {} subjects. Which one of these best describe your query?",
            hits.len()
        ));
        let options = hits
            .into_iter()
            .map(|hit| {
                let state = subject_state(&index, hit.node, &hit.key);
                StatefulOption::new(hit.key.clone(), subject_name(&hit.key), state)
            })
            .collect();
        show_paginated(ctx, options);
        Ok(Solution::Handled(Directive::Default))
    }
}

/// State presenting what the knowledge base holds about one subject
pub fn subject_state(index: &Arc<SubjectIndex>, node: NodeId, key: &str) -> StateFn {
    let index = Arc::clone(index);
    let key = key.to_string();
    StateFn::new(format!("subject {key}"), move |ctx, _| {
        show_subject(ctx, &index, node, &key);
        Ok(Directive::Default)
    })
}

fn show_subject(ctx: &mut Context<'_>, index: &Arc<SubjectIndex>, id: NodeId, key: &str) {
    let node = index.node(id);
    let name = subject_name(key);
    let mut options = Vec::new();

    if let Some(description) = &node.description {
        options.push(StatefulOption::new(
            format!("{key}::description"),
            "Description",
            reply_state(description.clone()),
        ));
    }
    if let Some(url) = &node.url {
        options.push(StatefulOption::new(
            format!("{key}::url"),
            "Documentation",
            panel_state(url.clone(), name.to_string()),
        ));
    }
    if let Some(parent) = node.parent {
        let parent_key = parent_key(key);
        let parent_name = index.node(parent).names.first().map_or("", String::as_str);
        options.push(StatefulOption::new(
            parent_key,
            format!("⬆️ {parent_name}"),
            subject_state(index, parent, parent_key),
        ));
    }
    if !node.actions.is_empty() {
        let actions = node
            .actions
            .iter()
            .map(|action| {
                StatefulOption::new(
                    action.state.clone(),
                    action.name.clone(),
                    state_loader(action.state.clone()),
                )
            })
            .collect();
        options.push(StatefulOption::new(
            format!("{key}::actions"),
            "Actions",
            state_list(name, actions, "action(s)"),
        ));
    }
    if !node.children.is_empty() {
        let mut names = Vec::new();
        let children = node
            .children
            .iter()
            .map(|child| {
                let child_name = index.node(*child).names.first().cloned().unwrap_or_default();
                let child_key = format!("{key}{KEY_SEPARATOR}{child_name}");
                names.push(child_name.clone());
                StatefulOption::new(
                    child_key.clone(),
                    child_name,
                    subject_state(index, *child, &child_key),
                )
            })
            .collect();
        options.push(StatefulOption::new(
            format!("{key}::children"),
            format!("⬇️ {}", names.join(", ")),
            state_list(name, children, "child subject(s)"),
        ));
    }

    if options.is_empty() {
        ctx.reply_checkpoint(
            format!("Unfortunately, there is nothing in my knowlegde base about {name}."),
            Checkpoint::call(subject_state(index, id, key)),
        );
    } else {
        let text = format!("What do you want to know about {name}?");
        show_options(ctx, options, OptionLayout::Ordered, Some(&text));
    }
}

/// State listing `items` that belong to the subject `name`
fn state_list(name: &str, items: Vec<StatefulOption>, theme: &'static str) -> StateFn {
    let name = name.to_string();
    StateFn::new(format!("{name} {theme}"), move |ctx, _| {
        ctx.reply(format!("{name} has {} {theme}. Please select one:", items.len()));
        show_paginated(ctx, items.clone());
        Ok(Directive::Default)
    })
}
