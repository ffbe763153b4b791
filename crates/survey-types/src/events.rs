use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ToastLevel {
    Success,
    Error,
    Info,
}

/// Client-side events delivered through the `HX-Trigger` response header.
/// The page layout listens for each event name and reacts to its payload.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum HxEvent {
    /// Show a notification toast
    ShowToast { message: String, level: ToastLevel },

    /// Ask the table console grid to reload itself
    TableChanged { table: String },
}

impl HxEvent {
    pub fn toast(message: impl Into<String>, level: ToastLevel) -> Self {
        Self::ShowToast { message: message.into(), level }
    }

    /// Serialized header value, e.g. `{"showToast":{"level":"success","message":"..."}}`.
    pub fn header_value(&self) -> String {
        Self::combined_header_value(std::slice::from_ref(self))
    }

    /// Several events in one `HX-Trigger` header, one key per event.
    ///
    /// Header values must stay ASCII, so non-ASCII characters are written as
    /// JSON `\u` escapes.
    pub fn combined_header_value(events: &[HxEvent]) -> String {
        let mut merged = serde_json::Map::new();
        for event in events {
            if let Ok(serde_json::Value::Object(map)) = serde_json::to_value(event) {
                merged.extend(map);
            }
        }
        let json = serde_json::Value::Object(merged).to_string();

        let mut out = String::with_capacity(json.len());
        for ch in json.chars() {
            if ch.is_ascii() {
                out.push(ch);
            } else {
                let mut units = [0u16; 2];
                for unit in ch.encode_utf16(&mut units) {
                    out.push_str(&format!("\\u{:04x}", unit));
                }
            }
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn toast_serializes_as_named_event() {
        let value = HxEvent::toast("Saved", ToastLevel::Success).header_value();
        let parsed: serde_json::Value = serde_json::from_str(&value).unwrap();
        assert_eq!(parsed, serde_json::json!({"showToast": {"message": "Saved", "level": "success"}}));
    }

    #[test]
    fn non_ascii_is_escaped_for_headers() {
        let value = HxEvent::toast("Да", ToastLevel::Info).header_value();
        assert!(value.is_ascii());
        assert!(value.contains(r"\u0414\u0430"));
        let parsed: serde_json::Value = serde_json::from_str(&value).unwrap();
        assert_eq!(parsed["showToast"]["message"], "Да");
    }

    #[test]
    fn events_combine_into_one_header() {
        let value = HxEvent::combined_header_value(&[
            HxEvent::toast("ok", ToastLevel::Success),
            HxEvent::TableChanged { table: "tags".into() },
        ]);
        let parsed: serde_json::Value = serde_json::from_str(&value).unwrap();
        assert_eq!(parsed["showToast"]["level"], "success");
        assert_eq!(parsed["tableChanged"]["table"], "tags");
    }

    #[test]
    fn table_changed_carries_table_name() {
        let value = HxEvent::TableChanged { table: "users".into() }.header_value();
        assert_eq!(value, r#"{"tableChanged":{"table":"users"}}"#);
    }
}
