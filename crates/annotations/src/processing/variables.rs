use crate::models::{AnnotationEvent, AnnotationFilterRule, TemplateVariable};

/// Drop events whose tags do not match the current template-variable
/// selections.
///
/// Untagged events never pass. A tagged event must satisfy every variable;
/// a variable constrains it only when it has a selection and at least one
/// filter rule with the variable's name, and is satisfied as soon as one of
/// those rules is disabled, does not filter by variable, or finds a selected
/// value among the event's tags.
pub fn filter_by_variables(
    events: Vec<AnnotationEvent>,
    variables: &[TemplateVariable],
    rules: &[AnnotationFilterRule],
) -> Vec<AnnotationEvent> {
    events
        .into_iter()
        .filter(|event| match &event.tags {
            Some(tags) => variables
                .iter()
                .all(|variable| satisfies_variable(tags, variable, rules)),
            None => false,
        })
        .collect()
}

fn satisfies_variable(tags: &[String], variable: &TemplateVariable, rules: &[AnnotationFilterRule]) -> bool {
    if variable.current.value.to_vec().is_empty() {
        return true;
    }

    let mut relevant = rules.iter().filter(|rule| rule.name == variable.name).peekable();
    if relevant.peek().is_none() {
        return true;
    }

    let selected = variable.selected_values();
    relevant.any(|rule| {
        !rule.filter_by_variable
            || !rule.enable
            || selected.iter().any(|value| tags.contains(value))
    })
}
