//! Placeholder rendering for block formats
//!
//! `{name}` is replaced by the snapshot value of `name`, `{{` and `}}` are
//! literal braces. A name the snapshot does not carry is an error rather
//! than an empty string, so a format that cannot be satisfied is visible.
//!
//! There are no format specs: `{quota_left:>5}` or `{name!r}` is a
//! `Malformed` error, not a padded or converted value.

use thiserror::Error;

use crate::providers::StatusSnapshot;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum TemplateError {
    #[error("Format references missing placeholder {{{0}}}")]
    MissingPlaceholder(String),
    #[error("Malformed format at byte {position}: {reason}")]
    Malformed {
        position: usize,
        reason: &'static str,
    },
}

/// Render `template` with the values of `snapshot`
pub fn render(template: &str, snapshot: &StatusSnapshot) -> Result<String, TemplateError> {
    let mut output = String::with_capacity(template.len());
    let mut chars = template.char_indices().peekable();

    while let Some((position, ch)) = chars.next() {
        match ch {
            '{' => {
                if matches!(chars.peek(), Some((_, '{'))) {
                    chars.next();
                    output.push('{');
                    continue;
                }

                let mut name = String::new();
                let mut closed = false;
                for (_, inner) in chars.by_ref() {
                    if inner == '}' {
                        closed = true;
                        break;
                    }
                    if !(inner.is_ascii_alphanumeric() || inner == '_') {
                        return Err(TemplateError::Malformed {
                            position,
                            reason: "placeholder names may only contain letters, digits and '_'",
                        });
                    }
                    name.push(inner);
                }

                if !closed {
                    return Err(TemplateError::Malformed {
                        position,
                        reason: "unclosed '{'",
                    });
                }
                if name.is_empty() {
                    return Err(TemplateError::Malformed {
                        position,
                        reason: "empty placeholder",
                    });
                }

                let value = snapshot
                    .get(&name)
                    .ok_or(TemplateError::MissingPlaceholder(name))?;
                output.push_str(value);
            }
            '}' => {
                if matches!(chars.peek(), Some((_, '}'))) {
                    chars.next();
                    output.push('}');
                } else {
                    return Err(TemplateError::Malformed {
                        position,
                        reason: "single '}' outside a placeholder",
                    });
                }
            }
            other => output.push(other),
        }
    }

    Ok(output)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn quota_snapshot() -> StatusSnapshot {
        let mut snapshot = StatusSnapshot::new();
        snapshot.insert("quota_left", "3.2GB");
        snapshot.insert("quota_total", "10GB");
        snapshot.insert("quota_days", "12");
        snapshot
    }

    #[test]
    fn renders_placeholders() {
        let text = render("EE:{quota_left}/{quota_total}[{quota_days}d]", &quota_snapshot())
            .expect("render");
        assert_eq!(text, "EE:3.2GB/10GB[12d]");
    }

    #[test]
    fn renders_plain_text_and_unicode() {
        assert_eq!(render("ɆɆ", &StatusSnapshot::new()).expect("render"), "ɆɆ");
        assert_eq!(render("", &StatusSnapshot::new()).expect("render"), "");
    }

    #[test]
    fn escapes_double_braces() {
        let text = render("{{{quota_left}}}", &quota_snapshot()).expect("render");
        assert_eq!(text, "{3.2GB}");
    }

    #[test]
    fn missing_placeholder_is_an_error() {
        let err = render("{quota_hours}h", &quota_snapshot()).unwrap_err();
        assert_eq!(err, TemplateError::MissingPlaceholder("quota_hours".to_string()));
    }

    #[test]
    fn rejects_malformed_formats() {
        let snapshot = quota_snapshot();
        assert!(matches!(
            render("{quota_left", &snapshot),
            Err(TemplateError::Malformed { position: 0, .. })
        ));
        assert!(matches!(
            render("a}b", &snapshot),
            Err(TemplateError::Malformed { position: 1, .. })
        ));
        assert!(matches!(
            render("{}", &snapshot),
            Err(TemplateError::Malformed { .. })
        ));
        assert!(matches!(
            render("{quota_left:>5}", &snapshot),
            Err(TemplateError::Malformed { .. })
        ));
    }
}
