use crate::bson::{Bson, Document};

pub(crate) const COMMAND_TRACING_EVENT_TARGET: &str = "mongodb_motor::command";
pub(crate) const EXECUTOR_TRACING_EVENT_TARGET: &str = "mongodb_motor::executor";

/// Commands and replies longer than this are truncated in tracing events.
pub(crate) const DEFAULT_MAX_DOCUMENT_LENGTH_BYTES: usize = 1000;

pub(crate) trait TracingRepresentation {
    type Representation;

    fn tracing_representation(&self) -> Self::Representation;
}

impl TracingRepresentation for Document {
    type Representation = String;

    fn tracing_representation(&self) -> String {
        Bson::Document(self.clone())
            .into_relaxed_extjson()
            .to_string()
    }
}

impl TracingRepresentation for crate::error::Error {
    type Representation = String;

    fn tracing_representation(&self) -> String {
        self.to_string()
    }
}

/// Renders a command or reply as relaxed extended JSON, truncated to `max_length_bytes`.
pub(crate) fn serialize_command_or_reply(doc: &Document, max_length_bytes: usize) -> String {
    let mut ext_json = doc.tracing_representation();
    truncate_on_char_boundary(&mut ext_json, max_length_bytes);
    ext_json
}

pub(crate) fn truncate_on_char_boundary(s: &mut String, new_len: usize) {
    let original_len = s.len();
    if original_len > new_len {
        // find the first char boundary at or before the requested length.
        let mut truncate_index = new_len;
        while !s.is_char_boundary(truncate_index) {
            truncate_index -= 1;
        }
        s.truncate(truncate_index);

        // add trailing dots to indicate truncation.
        if s.len() < original_len {
            s.push_str("...");
        }
    }
}

#[cfg(test)]
mod test {
    use super::{serialize_command_or_reply, truncate_on_char_boundary};
    use crate::bson::doc;

    #[test]
    fn truncation_respects_char_boundaries() {
        let mut s = "héllo".to_string();
        truncate_on_char_boundary(&mut s, 2);
        assert_eq!(s, "h...");

        let mut short = "ok".to_string();
        truncate_on_char_boundary(&mut short, 10);
        assert_eq!(short, "ok");
    }

    #[test]
    fn long_commands_are_truncated() {
        let command = doc! { "insert": "coll", "documents": [{ "x": "a".repeat(50) }] };
        let rendered = serialize_command_or_reply(&command, 20);
        assert_eq!(rendered.len(), 23);
        assert!(rendered.ends_with("..."));
    }
}
