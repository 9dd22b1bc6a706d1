use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::HashMap;

use crate::shared::error::ApiError;

/// Email fields every provider payload is reduced to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InboundEmail {
    pub from: String,
    pub subject: String,
    pub body: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Provider {
    SendGrid,
    Mailgun,
    Postmark,
}

impl Provider {
    pub fn from_slug(slug: &str) -> Result<Self, ApiError> {
        match slug {
            "sendgrid" => Ok(Self::SendGrid),
            "mailgun" => Ok(Self::Mailgun),
            "postmark" => Ok(Self::Postmark),
            other => Err(ApiError::Validation(format!("unknown provider '{other}'"))),
        }
    }

    pub fn slug(&self) -> &'static str {
        match self {
            Self::SendGrid => "sendgrid",
            Self::Mailgun => "mailgun",
            Self::Postmark => "postmark",
        }
    }
}

/// Decode an application/x-www-form-urlencoded body into a field map.
pub fn parse_form(body: &str) -> HashMap<String, String> {
    body.split('&')
        .filter_map(|pair| {
            let (key, value) = pair.split_once('=')?;
            let decode = |s: &str| {
                urlencoding::decode(&s.replace('+', " "))
                    .map(|c| c.into_owned())
                    .unwrap_or_else(|_| s.to_string())
            };
            Some((decode(key), decode(value)))
        })
        .collect()
}

fn json_str(value: &serde_json::Value, key: &str) -> Option<String> {
    value.get(key).and_then(|v| v.as_str()).map(|s| s.to_string())
}

/// Reduce a provider payload (JSON, or form-encoded for the inbound-parse
/// style providers) to sender, subject, and plain-text body.
pub fn parse_payload(
    provider: Provider,
    content_type: Option<&str>,
    raw_body: &str,
) -> Result<InboundEmail, ApiError> {
    let is_form = content_type
        .map(|ct| ct.starts_with("application/x-www-form-urlencoded") || ct.starts_with("multipart/"))
        .unwrap_or(false);

    let fields: HashMap<String, String> = if is_form {
        parse_form(raw_body)
    } else {
        let value: serde_json::Value = serde_json::from_str(raw_body)
            .map_err(|e| ApiError::Validation(format!("payload is not valid JSON: {e}")))?;
        let keys = match provider {
            Provider::SendGrid => ["from", "subject", "text"],
            Provider::Mailgun => ["sender", "subject", "body-plain"],
            Provider::Postmark => ["From", "Subject", "TextBody"],
        };
        let mut map = HashMap::new();
        for key in keys {
            if let Some(v) = json_str(&value, key) {
                map.insert(key.to_string(), v);
            }
        }
        // Mailgun signature fields ride along in the same JSON object.
        for key in ["timestamp", "token", "signature"] {
            if let Some(v) = json_str(&value, key) {
                map.insert(key.to_string(), v);
            }
        }
        map
    };

    let (from_key, subject_key, body_key) = match provider {
        Provider::SendGrid => ("from", "subject", "text"),
        Provider::Mailgun => ("sender", "subject", "body-plain"),
        Provider::Postmark => ("From", "Subject", "TextBody"),
    };

    let from = fields
        .get(from_key)
        .cloned()
        .filter(|s| !s.trim().is_empty())
        .ok_or_else(|| ApiError::Validation(format!("payload is missing '{from_key}'")))?;

    Ok(InboundEmail {
        from,
        subject: fields.get(subject_key).cloned().unwrap_or_default(),
        body: fields.get(body_key).cloned().unwrap_or_default(),
    })
}

/// Mailgun carries its signature material inside the payload itself.
pub fn mailgun_signature_fields(
    content_type: Option<&str>,
    raw_body: &str,
) -> Option<(String, String, String)> {
    let is_form = content_type
        .map(|ct| ct.starts_with("application/x-www-form-urlencoded") || ct.starts_with("multipart/"))
        .unwrap_or(false);
    let fields = if is_form {
        parse_form(raw_body)
    } else {
        let value: serde_json::Value = serde_json::from_str(raw_body).ok()?;
        let mut map = HashMap::new();
        for key in ["timestamp", "token", "signature"] {
            map.insert(key.to_string(), json_str(&value, key)?);
        }
        map
    };
    Some((
        fields.get("timestamp")?.clone(),
        fields.get("token")?.clone(),
        fields.get("signature")?.clone(),
    ))
}

static FROM_HEADER_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"^\s*"?([^"<]*?)"?\s*<([^>]+)>\s*$"#).expect("from header regex"));

/// Split `Jane Doe <jane@acme.com>` into display name and address.
pub fn parse_from_header(from: &str) -> (Option<String>, String) {
    if let Some(caps) = FROM_HEADER_RE.captures(from) {
        let name = caps
            .get(1)
            .map(|m| m.as_str().trim().to_string())
            .filter(|s| !s.is_empty());
        let email = caps
            .get(2)
            .map(|m| m.as_str().trim().to_lowercase())
            .unwrap_or_default();
        (name, email)
    } else {
        (None, from.trim().to_lowercase())
    }
}

static PHONE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\+?\d[\d\s().-]{7,16}\d").expect("phone regex"));

/// First phone-looking token in the text.
pub fn extract_phone(text: &str) -> Option<String> {
    PHONE_RE
        .find_iter(text)
        .map(|m| m.as_str().trim().to_string())
        .find(|candidate| candidate.chars().filter(|c| c.is_ascii_digit()).count() >= 8)
}

static COMPANY_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?:\b(?:at|from|with)\s+)([A-Z][A-Za-z0-9&'.-]*(?:\s+[A-Z][A-Za-z0-9&'.-]*){0,3})")
        .expect("company regex")
});

/// Company name guessed from "at/from <Proper Noun>" phrases.
pub fn extract_company(text: &str) -> Option<String> {
    COMPANY_RE
        .captures(text)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().trim_end_matches(['.', ',']).trim().to_string())
        .filter(|s| !s.is_empty())
}

/// Product names from the tenant catalog mentioned in the text.
pub fn extract_interests(text: &str, product_names: &[String]) -> Vec<String> {
    let haystack = text.to_lowercase();
    product_names
        .iter()
        .filter(|name| !name.trim().is_empty() && haystack.contains(&name.to_lowercase()))
        .cloned()
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_form_decodes() {
        let fields = parse_form("from=jane%40acme.com&subject=Hello+world&text=Call%20me");
        assert_eq!(fields["from"], "jane@acme.com");
        assert_eq!(fields["subject"], "Hello world");
        assert_eq!(fields["text"], "Call me");
    }

    #[test]
    fn test_sendgrid_form_payload() {
        let email = parse_payload(
            Provider::SendGrid,
            Some("application/x-www-form-urlencoded"),
            "from=Jane+Doe+%3Cjane%40acme.com%3E&subject=Pricing&text=Interested+in+a+quote",
        )
        .unwrap();
        assert_eq!(email.from, "Jane Doe <jane@acme.com>");
        assert_eq!(email.subject, "Pricing");
        assert_eq!(email.body, "Interested in a quote");
    }

    #[test]
    fn test_sendgrid_json_payload() {
        let email = parse_payload(
            Provider::SendGrid,
            Some("application/json"),
            r#"{"from":"jane@acme.com","subject":"Hi","text":"hello"}"#,
        )
        .unwrap();
        assert_eq!(email.from, "jane@acme.com");
    }

    #[test]
    fn test_mailgun_json_payload() {
        let email = parse_payload(
            Provider::Mailgun,
            Some("application/json"),
            r#"{"sender":"bob@corp.io","subject":"Demo request","body-plain":"please call"}"#,
        )
        .unwrap();
        assert_eq!(email.from, "bob@corp.io");
        assert_eq!(email.body, "please call");
    }

    #[test]
    fn test_postmark_json_payload() {
        let email = parse_payload(
            Provider::Postmark,
            Some("application/json"),
            r#"{"From":"eve@firm.co","Subject":"Question","TextBody":"details inside"}"#,
        )
        .unwrap();
        assert_eq!(email.from, "eve@firm.co");
        assert_eq!(email.subject, "Question");
    }

    #[test]
    fn test_missing_sender_rejected() {
        let err = parse_payload(
            Provider::Postmark,
            Some("application/json"),
            r#"{"Subject":"no sender"}"#,
        )
        .unwrap_err();
        assert_eq!(err.error_type(), "validation");
    }

    #[test]
    fn test_invalid_json_rejected() {
        assert!(parse_payload(Provider::Postmark, Some("application/json"), "not json").is_err());
    }

    #[test]
    fn test_from_header_with_display_name() {
        let (name, email) = parse_from_header("Jane Doe <Jane@Acme.com>");
        assert_eq!(name.as_deref(), Some("Jane Doe"));
        assert_eq!(email, "jane@acme.com");
    }

    #[test]
    fn test_from_header_bare_address() {
        let (name, email) = parse_from_header("  bob@corp.io ");
        assert_eq!(name, None);
        assert_eq!(email, "bob@corp.io");
    }

    #[test]
    fn test_phone_extraction() {
        assert_eq!(
            extract_phone("call me at +1 (555) 123-4567 tomorrow").as_deref(),
            Some("+1 (555) 123-4567")
        );
        assert_eq!(extract_phone("reach me on 020 7946 0958").as_deref(), Some("020 7946 0958"));
        assert_eq!(extract_phone("no numbers here"), None);
    }

    #[test]
    fn test_short_digit_runs_are_not_phones() {
        assert_eq!(extract_phone("order #12 34"), None);
    }

    #[test]
    fn test_company_extraction() {
        assert_eq!(
            extract_company("I'm the buyer at Initech Solutions and need pricing").as_deref(),
            Some("Initech Solutions")
        );
        assert_eq!(
            extract_company("Greetings from Globex Corp.").as_deref(),
            Some("Globex Corp")
        );
        assert_eq!(extract_company("just a plain sentence"), None);
    }

    #[test]
    fn test_interest_matching_is_case_insensitive() {
        let catalog = vec!["Widget Pro".to_string(), "Gizmo".to_string()];
        let found = extract_interests("We want the WIDGET PRO for our team", &catalog);
        assert_eq!(found, vec!["Widget Pro".to_string()]);
    }

    #[test]
    fn test_mailgun_signature_fields_from_form() {
        let body = "timestamp=170&token=tok&signature=sig&sender=a%40b.c";
        let (ts, token, sig) = mailgun_signature_fields(
            Some("application/x-www-form-urlencoded"),
            body,
        )
        .unwrap();
        assert_eq!((ts.as_str(), token.as_str(), sig.as_str()), ("170", "tok", "sig"));
    }
}
