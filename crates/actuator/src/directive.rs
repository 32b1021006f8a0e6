//! Directive-block composition for staged messages.
//!
//! When the inbound message came from a thread, the staged text carries a
//! directive header naming that thread and a tail instruction telling the
//! agent to respond through the `post_to_thread` tool, so the reply lands
//! back in the right place.

/// Compose the text staged onto the clipboard.
#[must_use]
pub fn compose(text: &str, thread_id: Option<&str>) -> String {
    match thread_id {
        Some(thread_id) => format!(
            "[Discord Thread: {thread_id}]\n{text}\n\nWhen you respond, post the answer to this \
             Discord thread with the post_to_thread tool."
        ),
        None => text.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plain_text_passes_through() {
        assert_eq!(compose("hello", None), "hello");
    }

    #[test]
    fn directive_names_the_thread() {
        let staged = compose("fix the test", Some("T42"));
        assert!(staged.starts_with("[Discord Thread: T42]\n"));
        assert!(staged.contains("fix the test"));
        assert!(staged.contains("post_to_thread"));
    }
}
