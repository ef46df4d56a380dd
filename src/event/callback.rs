//! Parsing of a handler's asynchronous reply.

use serde::{Deserialize, Deserializer};

use crate::event::headers::Headers;

/// The fields a handler may hand back through its callback.
///
/// Every field is optional; a reply of `null` or an empty body changes nothing.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CallbackResult {
    #[serde(default, deserialize_with = "status_from_string_or_number")]
    pub status: Option<String>,
    #[serde(default)]
    pub status_description: Option<String>,
    #[serde(default)]
    pub body: Option<String>,
    #[serde(default)]
    pub headers: Option<Headers>,
    #[serde(default)]
    pub uri: Option<String>,
    #[serde(default)]
    pub querystring: Option<String>,
}

impl CallbackResult {
    pub fn parse(raw: &[u8]) -> Result<Self, serde_json::Error> {
        if raw.iter().all(u8::is_ascii_whitespace) {
            return Ok(Self::default());
        }
        let mut result = serde_json::from_slice::<Option<Self>>(raw)?.unwrap_or_default();
        if let Some(headers) = result.headers.as_mut() {
            headers.normalize();
        }
        Ok(result)
    }

    /// A non-empty status means "stop the pipeline and answer with this".
    pub fn short_circuit_status(&self) -> Option<&str> {
        self.status
            .as_deref()
            .map(str::trim)
            .filter(|status| !status.is_empty())
    }
}

fn status_from_string_or_number<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Status {
        Text(String),
        Code(u64),
    }

    Ok(Option::<Status>::deserialize(deserializer)?.map(|status| match status {
        Status::Text(text) => text,
        Status::Code(code) => code.to_string(),
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_and_null_mean_no_changes() {
        assert_eq!(CallbackResult::parse(b"").unwrap(), CallbackResult::default());
        assert_eq!(CallbackResult::parse(b"  \n").unwrap(), CallbackResult::default());
        assert_eq!(CallbackResult::parse(b"null").unwrap(), CallbackResult::default());
    }

    #[test]
    fn short_circuit_reply() {
        let result = CallbackResult::parse(
            br#"{"status":"403","headers":{"x-blocked":[{"key":"x-blocked","value":"1"}]}}"#,
        )
        .unwrap();

        assert_eq!(result.short_circuit_status(), Some("403"));
        assert_eq!(result.headers.unwrap().first_value("x-blocked"), Some("1"));
    }

    #[test]
    fn numeric_status_is_accepted() {
        let result = CallbackResult::parse(br#"{"status":302}"#).unwrap();
        assert_eq!(result.status.as_deref(), Some("302"));
    }

    #[test]
    fn blank_status_does_not_short_circuit() {
        let result = CallbackResult::parse(br#"{"status":"  "}"#).unwrap();
        assert_eq!(result.short_circuit_status(), None);
    }

    #[test]
    fn missing_entry_keys_inherit_map_key() {
        let result =
            CallbackResult::parse(br#"{"headers":{"x-served-by":[{"value":"edge"}]}}"#).unwrap();
        let headers = result.headers.unwrap();
        assert_eq!(headers.get("x-served-by").unwrap()[0].key, "x-served-by");
    }

    #[test]
    fn malformed_reply_is_an_error() {
        assert!(CallbackResult::parse(b"{not json").is_err());
    }
}
