use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CannedResponse {
    pub trigger: String,
    pub reply: String,
}

/// Lowercase, keep only alphanumerics and whitespace, trim.
pub fn normalize_query(query: &str) -> String {
    query
        .to_lowercase()
        .chars()
        .filter(|c| c.is_alphanumeric() || c.is_whitespace())
        .collect::<String>()
        .trim()
        .to_string()
}

/// Ordered trigger table, consulted before semantic search. The first
/// trigger contained anywhere in the normalized query wins, so order matters
/// when triggers overlap.
#[derive(Debug, Clone)]
pub struct CannedResponses {
    table: Vec<CannedResponse>,
}

impl CannedResponses {
    pub fn new(table: Vec<CannedResponse>) -> Self {
        let table = table
            .into_iter()
            .map(|c| CannedResponse {
                trigger: normalize_query(&c.trigger),
                reply: c.reply,
            })
            .filter(|c| !c.trigger.is_empty())
            .collect();
        Self { table }
    }

    pub fn find(&self, normalized_query: &str) -> Option<&CannedResponse> {
        self.table
            .iter()
            .find(|c| normalized_query.contains(c.trigger.as_str()))
    }

    pub fn len(&self) -> usize {
        self.table.len()
    }

    pub fn is_empty(&self) -> bool {
        self.table.is_empty()
    }
}

impl Default for CannedResponses {
    fn default() -> Self {
        Self::new(default_table())
    }
}

pub fn default_table() -> Vec<CannedResponse> {
    [
        ("hi", "Hello there! How can I assist you with cloud services today?"),
        ("hello", "Hi! What can I help you with regarding cloud services?"),
        ("hey", "Hey! Ask me anything about cloud services."),
        (
            "how are you",
            "I'm a bot, so I don't have feelings, but I'm ready to help you with cloud services questions!",
        ),
        ("thank you", "You're welcome! Happy to help."),
        ("thanks", "No problem! Let me know if you have more questions."),
        ("bye", "Goodbye! Have a great day."),
        ("goodbye", "Farewell! Feel free to return if you have more questions."),
    ]
    .into_iter()
    .map(|(trigger, reply)| CannedResponse {
        trigger: trigger.to_string(),
        reply: reply.to_string(),
    })
    .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn reply_for(query: &str) -> Option<String> {
        CannedResponses::default()
            .find(&normalize_query(query))
            .map(|c| c.reply.clone())
    }

    #[test]
    fn normalization_strips_punctuation_and_case() {
        assert_eq!(normalize_query("  Hey there, HELLO!  "), "hey there hello");
        assert_eq!(normalize_query("What's S3?"), "whats s3");
        assert_eq!(normalize_query("?!"), "");
    }

    #[test]
    fn trigger_matches_as_substring() {
        assert_eq!(
            reply_for("hello there!").as_deref(),
            Some("Hi! What can I help you with regarding cloud services?")
        );
    }

    #[test]
    fn first_trigger_in_table_order_wins() {
        // Both "hello" and "hey" occur; "hello" comes first in the table.
        assert_eq!(
            reply_for("hey there, hello!").as_deref(),
            Some("Hi! What can I help you with regarding cloud services?")
        );
        // "goodbye" contains "bye", which is listed earlier.
        assert_eq!(
            reply_for("Goodbye").as_deref(),
            Some("Goodbye! Have a great day.")
        );
    }

    #[test]
    fn substring_matching_reaches_inside_words() {
        assert_eq!(
            reply_for("what is this").as_deref(),
            Some("Hello there! How can I assist you with cloud services today?")
        );
    }

    #[test]
    fn unrelated_query_has_no_canned_reply() {
        assert_eq!(reply_for("What is cloud storage?"), None);
        assert_eq!(reply_for("asdkjaslkdj random text"), None);
    }

    #[test]
    fn custom_tables_are_normalized_and_keep_order() {
        let canned = CannedResponses::new(vec![
            CannedResponse {
                trigger: "Good Morning!".into(),
                reply: "morning".into(),
            },
            CannedResponse {
                trigger: "  ".into(),
                reply: "never".into(),
            },
            CannedResponse {
                trigger: "good".into(),
                reply: "good".into(),
            },
        ]);

        assert_eq!(canned.len(), 2);
        assert_eq!(canned.find("good morning all").unwrap().reply, "morning");
        assert_eq!(canned.find("good evening").unwrap().reply, "good");
    }
}
