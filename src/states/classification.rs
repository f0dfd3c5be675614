use super::state_loader;
use crate::handlers::options::{options_state, StatefulOption};
use crate::state_machine::StateFn;

const STEPS: &[&str] = &[
    "Preprocessing",
    "Algorithm Specification",
    "Validation",
    "Feature Engineering",
];

/// `classification?steps`: asks which classification step to explore
pub fn steps() -> StateFn {
    StateFn::new("steps", |ctx, params| {
        if let Some(Some(class_state)) = params.first() {
            ctx.memory_mut().set("class_state", class_state.as_str());
        }
        ctx.memory_mut().set("sub_state", "Classification");

        let options = STEPS
            .iter()
            .enumerate()
            .map(|(position, step)| {
                StatefulOption::new(
                    (position + 1).to_string(),
                    *step,
                    state_loader(format!("!subject Classification > {step}")),
                )
            })
            .collect();
        Ok(options_state(
            ctx,
            options,
            Some("Sounds good. Here are the steps for a classification:"),
        ))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state_machine::context::testing::Turn;
    use crate::state_machine::Directive;

    #[test]
    fn test_steps_records_memory() {
        let mut turn = Turn::new("classify");
        let mut ctx = turn.context();
        let directive = steps()
            .call(&mut ctx, &[Some("binary".to_string())])
            .unwrap();
        assert!(matches!(directive, Directive::State(_)));
        assert_eq!(
            ctx.replies()[0].message.text,
            "Sounds good. Here are the steps for a classification:"
        );
        assert!(ctx.replies()[1]
            .message
            .text
            .contains("3::bot::Validation"));
        drop(ctx);
        assert_eq!(turn.memory.get_str("class_state"), Some("binary"));
        assert_eq!(turn.memory.get_str("sub_state"), Some("Classification"));
    }
}
