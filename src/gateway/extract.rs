//! Request body extraction.

use axum::extract::{FromRequest, Request};
use axum::http::header;
use axum::response::{IntoResponse, Response};
use axum::{Form, Json};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer};

/// Body decoded from JSON when the request says so, otherwise from a
/// URL-encoded form.
#[derive(Debug, Clone)]
pub struct Payload<T>(pub T);

impl<S, T> FromRequest<S> for Payload<T>
where
    T: DeserializeOwned,
    S: Send + Sync,
{
    type Rejection = Response;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let is_json = req
            .headers()
            .get(header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .is_some_and(|ct| {
                let mime = ct.split(';').next().unwrap_or("").trim();
                mime.eq_ignore_ascii_case("application/json") || mime.ends_with("+json")
            });

        if is_json {
            let Json(value) = Json::<T>::from_request(req, state)
                .await
                .map_err(IntoResponse::into_response)?;
            Ok(Self(value))
        } else {
            let Form(value) = Form::<T>::from_request(req, state)
                .await
                .map_err(IntoResponse::into_response)?;
            Ok(Self(value))
        }
    }
}

/// Accepts `true`/`false`, numbers, or the strings `true/1/on/yes`
/// (case-insensitive). Missing or null is `false`.
pub fn lenient_bool<'de, D>(deserializer: D) -> Result<bool, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Bool(bool),
        Int(i64),
        Text(String),
    }

    Ok(match Option::<Raw>::deserialize(deserializer)? {
        None => false,
        Some(Raw::Bool(b)) => b,
        Some(Raw::Int(n)) => n != 0,
        Some(Raw::Text(s)) => matches!(
            s.trim().to_ascii_lowercase().as_str(),
            "true" | "1" | "on" | "yes"
        ),
    })
}

/// `Some` only for present, non-blank values.
pub fn present(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Deserialize)]
    struct Flag {
        #[serde(default, deserialize_with = "lenient_bool")]
        admin: bool,
    }

    fn from_json(raw: &str) -> bool {
        serde_json::from_str::<Flag>(raw).unwrap().admin
    }

    #[test]
    fn json_flags() {
        assert!(from_json(r#"{"admin": true}"#));
        assert!(!from_json(r#"{"admin": false}"#));
        assert!(from_json(r#"{"admin": "true"}"#));
        assert!(from_json(r#"{"admin": 1}"#));
        assert!(!from_json(r#"{"admin": null}"#));
        assert!(!from_json("{}"));
    }

    #[test]
    fn text_flags() {
        assert!(from_json(r#"{"admin": "ON"}"#));
        assert!(from_json(r#"{"admin": " yes "}"#));
        assert!(!from_json(r#"{"admin": "off"}"#));
        assert!(!from_json(r#"{"admin": ""}"#));
    }

    #[test]
    fn present_filters_blank() {
        assert_eq!(present(Some("bob".into())), Some("bob".into()));
        assert_eq!(present(Some("   ".into())), None);
        assert_eq!(present(None), None);
    }
}
