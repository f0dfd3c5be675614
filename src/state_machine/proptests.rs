//! Property-based tests for the dialogue engine
//!
//! These tests verify key invariants hold across all possible inputs.

use super::*;
use crate::handlers::options::StatefulOption;
use crate::knowledge::rules::{GroupRef, RegexRule, RULES_FILE};
use crate::knowledge::subjects::SUBJECTS_FILE;
use crate::knowledge::testing::write_definition;
use crate::knowledge::Knowledge;
use crate::message::{Message, MessageType};
use crate::pagination::Paginator;
use proptest::prelude::*;
use serde_json::json;
use tempfile::TempDir;

// ============================================================================
// Test Helpers
// ============================================================================

#[derive(Debug, Clone)]
struct Echo;

impl State for Echo {
    fn process_message(self: Box<Self>, ctx: &mut Context<'_>) -> Result<Directive, StateError> {
        let text = format!("echo {}", ctx.text());
        ctx.reply(text);
        Ok(Directive::Default)
    }
}

struct Harness {
    _dir: TempDir,
    engine: DialogueEngine,
    history: Vec<Message>,
    memory: Memory,
    paginator: Paginator,
}

impl Harness {
    fn new() -> Self {
        let dir = TempDir::new().unwrap();
        write_definition(dir.path(), SUBJECTS_FILE, &json!([{"name": "Pandas"}]));
        write_definition(
            dir.path(),
            RULES_FILE,
            &json!([
                {"regex": "^fail (.*)$", "state": "test?fail", "params": ["1"]},
                {"regex": "^echo$", "state": "test?echo"}
            ]),
        );
        let knowledge = Knowledge::load(dir.path()).unwrap();
        knowledge.registry.register(
            "test",
            StateModule::new()
                .with(StateFn::new("fail", |_, params| {
                    let reason = params.first().cloned().flatten().unwrap_or_default();
                    Err(StateError::failed(reason))
                }))
                .with(StateFn::new("echo", |ctx, _| {
                    ctx.reply_checkpoint("Say something", Checkpoint::state(Echo));
                    Ok(Directive::state(Echo))
                })),
        );
        Self {
            engine: DialogueEngine::new(&knowledge),
            _dir: dir,
            history: Vec::new(),
            memory: Memory::default(),
            paginator: Paginator::default(),
        }
    }

    fn send(&mut self, text: &str, reply: Option<String>) -> Vec<Message> {
        let message = Message::user(text, reply);
        let previous = self.history.last().map(|m| m.id.clone());
        self.history.push(message.clone());
        let mut ctx = Context::new(&message, previous, &mut self.memory, &mut self.paginator);
        self.engine.process_message(&mut ctx);
        let replies: Vec<Message> = ctx.into_replies().into_iter().map(|r| r.message).collect();
        self.history.extend(replies.iter().cloned());
        replies
    }
}

fn labels(count: usize) -> Vec<StatefulOption> {
    (0..count)
        .map(|i| StatefulOption::plain(format!("k{i}"), format!("Item {i}")))
        .collect()
}

// ============================================================================
// Arbitrary Generators
// ============================================================================

fn arb_word() -> impl Strategy<Value = String> {
    "[a-z]{1,12}"
}

fn arb_sentence() -> impl Strategy<Value = String> {
    "[a-z0-9 ]{1,40}"
}

// ============================================================================
// Properties
// ============================================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    /// Any failing turn leaves the engine in the default state with an error reply
    #[test]
    fn prop_failure_resets_to_default(reason in arb_word()) {
        let mut harness = Harness::new();
        harness.send("echo", None);
        prop_assert!(!harness.engine.is_default());

        let replies = harness.send(&format!("fail {reason}"), Some("elsewhere".to_string()));
        prop_assert!(harness.engine.is_default());
        let last = replies.last().unwrap();
        prop_assert_eq!(&last.kind, &MessageType::Error);
        prop_assert_eq!(&last.text, &format!("Something is wrong: {reason}"));
    }

    /// Replying to a checkpointed message resumes that state, however many
    /// turns happened in between
    #[test]
    fn prop_checkpoint_resumes(answer in arb_sentence(), detours in 0usize..4) {
        let mut harness = Harness::new();
        let replies = harness.send("echo", None);
        let question = replies[0].id.clone();
        for _ in 0..detours {
            harness.send("zebra", Some("elsewhere".to_string()));
        }
        let answer = answer.trim().to_string();
        prop_assume!(!answer.is_empty());
        let replies = harness.send(&answer, Some(question));
        prop_assert_eq!(&replies[0].text, &format!("echo {answer}"));
        prop_assert!(harness.engine.is_default());
    }

    /// Following "More..." links visits every item exactly once, in order
    #[test]
    fn prop_pagination_partitions(count in 0usize..40, page_size in 1usize..8) {
        let mut paginator = Paginator::new(page_size);
        let mut rest = labels(count);
        let mut seen = Vec::new();
        loop {
            let split = paginator.split(rest);
            prop_assert!(split.visible.len() <= page_size + 1);
            seen.extend(split.visible.iter().map(|o| o.key.clone()));
            match split.more {
                Some((key, remaining)) => {
                    prop_assert_eq!(split.visible.len(), page_size);
                    prop_assert!(key.starts_with("<page "));
                    prop_assert!(remaining.len() > 1);
                    rest = remaining;
                }
                None => break,
            }
        }
        let expected: Vec<String> = (0..count).map(|i| format!("k{i}")).collect();
        prop_assert_eq!(seen, expected);
    }

    /// A parameter naming an unmatched or unknown group comes back empty
    #[test]
    fn prop_unmatched_group_is_null(word in arb_word(), with_suffix in any::<bool>()) {
        let rule = RegexRule {
            pattern: regex::Regex::new(r"^(?P<head>[a-z]+)(?: with ([a-z]+))?$").unwrap(),
            state: "test?x".to_string(),
            params: vec![GroupRef::from("head"), GroupRef::Index(2), GroupRef::from("missing")],
        };
        let text = if with_suffix {
            format!("{word} with {word}")
        } else {
            word.clone()
        };
        let params = rule.captures(&text).unwrap();
        prop_assert_eq!(params[0].as_deref(), Some(word.as_str()));
        if with_suffix {
            prop_assert_eq!(params[1].as_deref(), Some(word.as_str()));
        } else {
            prop_assert_eq!(params[1].as_deref(), None);
        }
        prop_assert_eq!(params[2].as_deref(), None);
    }
}
