//! Response rendering. Picks JSON or XML from the `Accept` header; carries no
//! business rules.

use axum::{
    http::{header, HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use chrono::{DateTime, SecondsFormat, Utc};
use quick_xml::events::{BytesDecl, BytesText, Event};
use quick_xml::Writer;
use serde::Serialize;
use tracing::error;

use crate::store::Secret;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Format {
    Json,
    Xml,
}

impl Format {
    /// XML when the client asks for it anywhere in `Accept`, JSON otherwise.
    pub fn negotiate(headers: &HeaderMap) -> Self {
        let wants_xml = headers
            .get_all(header::ACCEPT)
            .iter()
            .filter_map(|v| v.to_str().ok())
            .flat_map(|v| v.split(','))
            .map(|v| v.split(';').next().unwrap_or("").trim())
            .any(|mime| {
                mime.eq_ignore_ascii_case("application/xml")
                    || mime.eq_ignore_ascii_case("text/xml")
            });
        if wants_xml {
            Self::Xml
        } else {
            Self::Json
        }
    }
}

/// Wire shape of a secret.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SecretBody<'a> {
    pub hash: &'a str,
    pub secret_text: &'a str,
    pub created_at: String,
    pub expires_at: Option<String>,
    pub remaining_views: u32,
}

impl<'a> From<&'a Secret> for SecretBody<'a> {
    fn from(s: &'a Secret) -> Self {
        Self {
            hash: &s.handle,
            secret_text: &s.text,
            created_at: iso8601(s.created_at),
            expires_at: s.expiry.timestamp().map(iso8601),
            remaining_views: s.remaining_views,
        }
    }
}

pub fn secret(headers: &HeaderMap, secret: &Secret) -> Response {
    let body = SecretBody::from(secret);
    match Format::negotiate(headers) {
        Format::Json => Json(body).into_response(),
        Format::Xml => match to_xml(&body) {
            Ok(xml) => (
                [(header::CONTENT_TYPE, "application/xml; charset=utf-8")],
                xml,
            )
                .into_response(),
            Err(e) => {
                error!(error = %e, "render xml");
                StatusCode::INTERNAL_SERVER_ERROR.into_response()
            }
        },
    }
}

/// `2024-05-01T12:00:00.000Z`
pub fn iso8601(unix_secs: i64) -> String {
    DateTime::<Utc>::from_timestamp(unix_secs, 0)
        .map(|dt| dt.to_rfc3339_opts(SecondsFormat::Millis, true))
        .unwrap_or_default()
}

fn to_xml(body: &SecretBody<'_>) -> anyhow::Result<String> {
    let remaining_views = body.remaining_views.to_string();
    let mut writer = Writer::new(Vec::new());
    writer.write_event(Event::Decl(BytesDecl::new("1.0", Some("UTF-8"), Some("yes"))))?;
    // Null is an empty element.
    writer.create_element("Secret").write_inner_content(|w| {
        w.create_element("hash")
            .write_text_content(BytesText::new(body.hash))?;
        w.create_element("secretText")
            .write_text_content(BytesText::new(body.secret_text))?;
        w.create_element("createdAt")
            .write_text_content(BytesText::new(&body.created_at))?;
        match body.expires_at.as_deref() {
            Some(at) => w.create_element("expiresAt").write_text_content(BytesText::new(at))?,
            None => w.create_element("expiresAt").write_empty()?,
        };
        w.create_element("remainingViews")
            .write_text_content(BytesText::new(&remaining_views))?;
        Ok(())
    })?;
    Ok(String::from_utf8(writer.into_inner())?)
}
