/// A query with zero or more subject slots.
///
/// Stored as the literal text between slots, so rendering is a join and
/// never has to find a previous subject's text again.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueryTemplate {
    parts: Vec<String>,
}

impl QueryTemplate {
    /// Parses a user query. The first `{` and the first `}` after it delimit
    /// the placeholder; without such a pair the query has no slot.
    pub fn parse(query: &str) -> Self {
        if let Some(open) = query.find('{') {
            if let Some(close) = query[open..].find('}').map(|offset| open + offset) {
                return Self {
                    parts: vec![query[..open].to_string(), query[close + 1..].to_string()],
                };
            }
        }
        Self {
            parts: vec![query.to_string()],
        }
    }

    /// Turns every occurrence of `subject` in `text` into a slot. `None` when
    /// the subject does not appear.
    pub fn from_literal(text: &str, subject: &str) -> Option<Self> {
        if subject.is_empty() || !text.contains(subject) {
            return None;
        }
        Some(Self {
            parts: text.split(subject).map(str::to_string).collect(),
        })
    }

    pub fn has_slot(&self) -> bool {
        self.parts.len() > 1
    }

    pub fn render(&self, subject: &str) -> String {
        self.parts.join(subject)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const QUERY: &str = "Find me the email and address of the headquarters for the company - {company}.";

    #[test]
    fn placeholder_is_replaced() {
        let template = QueryTemplate::parse(QUERY);
        assert!(template.has_slot());
        assert_eq!(
            template.render("Google"),
            "Find me the email and address of the headquarters for the company - Google."
        );
    }

    #[test]
    fn query_without_placeholder_is_verbatim() {
        let template = QueryTemplate::parse("Who founded Meta?");
        assert!(!template.has_slot());
        assert_eq!(template.render("Amazon"), "Who founded Meta?");
    }

    #[test]
    fn unmatched_brace_is_not_a_slot() {
        let template = QueryTemplate::parse("price in } or { dollars");
        assert!(!template.has_slot());
    }

    #[test]
    fn literal_template_replaces_every_occurrence() {
        let template =
            QueryTemplate::from_literal("Meta support email, Meta helpdesk number", "Meta").unwrap();
        assert_eq!(
            template.render("Amazon"),
            "Amazon support email, Amazon helpdesk number"
        );
    }

    #[test]
    fn literal_template_needs_the_subject() {
        assert!(QueryTemplate::from_literal("headquarters email", "Meta").is_none());
        assert!(QueryTemplate::from_literal("headquarters email", "").is_none());
    }
}
