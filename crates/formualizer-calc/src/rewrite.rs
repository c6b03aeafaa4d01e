use crate::symbols::VariableBinding;

/// Rewrite `#key` references into internal names and add the `=` marker.
///
/// Longer keys are substituted first so `#ScoreTotal` is never split into `#Score` +
/// `Total`. Equal lengths are ordered by key so the result does not depend on input order.
pub fn rewrite_formula(formula: &str, bindings: &[VariableBinding]) -> String {
    let mut ordered: Vec<&VariableBinding> = bindings.iter().collect();
    ordered.sort_by(|a, b| {
        b.user_key
            .len()
            .cmp(&a.user_key.len())
            .then_with(|| a.user_key.cmp(&b.user_key))
    });

    let mut rewritten = formula.to_string();
    for binding in ordered {
        let token = format!("#{}", binding.user_key);
        if rewritten.contains(&token) {
            rewritten = rewritten.replace(&token, &binding.internal_name);
        }
    }

    if rewritten.starts_with('=') {
        rewritten
    } else {
        format!("={rewritten}")
    }
}
