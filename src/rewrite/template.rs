//! Checkpoint code rendering.

use tracing::debug;

use crate::analysis::PointKind;
use crate::rules::Templates;

/// Render the checkpoint statement for one point.
///
/// Returns `None` when the language has no template for `kind`.
pub fn render(
    templates: &Templates,
    kind: PointKind,
    checkpoint_id: &str,
    name: &str,
    line: usize,
) -> Option<String> {
    let Some(template) = templates.get(kind) else {
        debug!(kind = %kind, "no template, skipping point");
        return None;
    };

    let mut text = template
        .replace("{checkpoint_id}", checkpoint_id)
        .replace("{kind}", kind.as_str())
        .replace("{name}", name)
        .replace("{line}", &line.to_string());

    let terminator = templates.statement_terminator.as_str();
    let trimmed = text.trim_end();
    if !terminator.is_empty() && !trimmed.ends_with(terminator) && !trimmed.ends_with('}') {
        text.truncate(trimmed.len());
        text.push_str(terminator);
    }
    Some(text)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rules;

    #[test]
    fn test_render_python() {
        let templates = &rules::base_rules("python").unwrap().templates;
        let text = render(
            templates,
            PointKind::FunctionEnter,
            "function_enter_hello_1_1",
            "hello",
            1,
        )
        .unwrap();
        assert_eq!(
            text,
            r#"_codegreen_rt.checkpoint("function_enter_hello_1_1", "function_enter", "hello", 1)"#
        );
    }

    #[test]
    fn test_render_appends_terminator_once() {
        let templates = &rules::base_rules("c").unwrap().templates;
        let text = render(templates, PointKind::LoopStart, "id", "for_loop", 7).unwrap();
        assert!(text.ends_with(", 7);"));
        assert!(!text.ends_with(";;"));
    }

    #[test]
    fn test_render_block_template_has_no_terminator() {
        let templates = &rules::base_rules("java").unwrap().templates;
        let text = render(templates, PointKind::ClassEnter, "id", "A", 1).unwrap();
        assert!(text.starts_with("static { "));
        assert!(text.ends_with("); }"));
    }

    #[test]
    fn test_missing_template_is_skipped() {
        let templates = &rules::base_rules("c").unwrap().templates;
        assert!(render(templates, PointKind::ClassEnter, "id", "A", 1).is_none());
    }
}
