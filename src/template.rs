//! Stamp templates and placeholder substitution.
//!
//! A template is stamp markup containing placeholders:
//!
//! | Placeholder              | Replaced with                         |
//! |--------------------------|---------------------------------------|
//! | `$$SUBJECTCN$$`          | subject common name                   |
//! | `$$ISSUERCN$$`           | issuer common name                    |
//! | `$$CERTSERIAL$$`         | certificate serial number (decimal)   |
//! | `$$SIGNDATE=<pattern>$$` | signing time formatted with `pattern` |
//!
//! Date patterns use `dd MM yyyy yy HH mm ss`; everything else is copied.

use crate::credentials::Certificate;
use crate::error::{Error, Result};
use chrono::{DateTime, TimeZone};
use lazy_static::lazy_static;
use regex::{Captures, Regex};
use serde::{Deserialize, Serialize};
use std::fmt::Write;

lazy_static! {
    static ref RE_PLACEHOLDER: Regex =
        Regex::new(r"\$\$(SUBJECTCN|ISSUERCN|CERTSERIAL|SIGNDATE=(.*?))\$\$").unwrap();
}

/// Markup of the built-in template.
pub const DEFAULT_TEMPLATE_MARKUP: &str = "<b>$$SUBJECTCN$$</b>\n$$SIGNDATE=dd/MM/yyyy HH:mm$$";

/// Id of the built-in template.
pub const DEFAULT_TEMPLATE_ID: &str = "default";

/// The closed set of recognized placeholders.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Placeholder {
    /// `$$SUBJECTCN$$`
    SubjectCn,
    /// `$$ISSUERCN$$`
    IssuerCn,
    /// `$$CERTSERIAL$$`
    CertSerial,
    /// `$$SIGNDATE=<pattern>$$`
    SignDate(String),
}

impl Placeholder {
    fn from_captures(caps: &Captures<'_>) -> Option<Self> {
        match caps.get(1).map(|m| m.as_str()) {
            Some("SUBJECTCN") => Some(Self::SubjectCn),
            Some("ISSUERCN") => Some(Self::IssuerCn),
            Some("CERTSERIAL") => Some(Self::CertSerial),
            Some(_) => caps.get(2).map(|p| Self::SignDate(p.as_str().to_string())),
            None => None,
        }
    }

    /// The placeholder as written in a template.
    pub fn token(&self) -> String {
        match self {
            Self::SubjectCn => "$$SUBJECTCN$$".to_string(),
            Self::IssuerCn => "$$ISSUERCN$$".to_string(),
            Self::CertSerial => "$$CERTSERIAL$$".to_string(),
            Self::SignDate(pattern) => format!("$$SIGNDATE={}$$", pattern),
        }
    }
}

/// List the placeholders used by `template`, in order of appearance.
pub fn placeholders(template: &str) -> Vec<Placeholder> {
    RE_PLACEHOLDER
        .captures_iter(template)
        .filter_map(|caps| Placeholder::from_captures(&caps))
        .collect()
}

/// Certificate values substituted into templates.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CertificateFields {
    /// Subject CN (or full subject DN)
    pub subject_cn: String,
    /// Issuer CN (or full issuer DN)
    pub issuer_cn: String,
    /// Serial number in decimal
    pub serial: String,
}

impl From<&Certificate> for CertificateFields {
    fn from(cert: &Certificate) -> Self {
        Self {
            subject_cn: cert.subject_common_name(),
            issuer_cn: cert.issuer_common_name(),
            serial: cert.serial_decimal().to_string(),
        }
    }
}

/// Translate a `dd/MM/yyyy`-style pattern into a chrono format string.
///
/// Longest tokens win (`yyyy` before `yy`); `%` is escaped.
///
/// ```
/// use stamp_signer::template::translate_date_pattern;
///
/// assert_eq!(translate_date_pattern("dd/MM/yyyy HH:mm"), "%d/%m/%Y %H:%M");
/// assert_eq!(translate_date_pattern("yy-100%"), "%y-100%%");
/// ```
pub fn translate_date_pattern(pattern: &str) -> String {
    const TOKENS: [(&str, &str); 7] = [
        ("yyyy", "%Y"),
        ("yy", "%y"),
        ("dd", "%d"),
        ("MM", "%m"),
        ("HH", "%H"),
        ("mm", "%M"),
        ("ss", "%S"),
    ];

    let mut out = String::with_capacity(pattern.len() * 2);
    let mut rest = pattern;
    'outer: while let Some(ch) = rest.chars().next() {
        for (token, strftime) in TOKENS {
            if let Some(after) = rest.strip_prefix(token) {
                out.push_str(strftime);
                rest = after;
                continue 'outer;
            }
        }
        if ch == '%' {
            out.push_str("%%");
        } else {
            out.push(ch);
        }
        rest = &rest[ch.len_utf8()..];
    }
    out
}

/// Format `now` with a template date pattern.
pub fn format_sign_date<Tz>(pattern: &str, now: &DateTime<Tz>) -> String
where
    Tz: TimeZone,
    Tz::Offset: std::fmt::Display,
{
    let format = translate_date_pattern(pattern);
    let mut out = String::new();
    if write!(out, "{}", now.format(&format)).is_err() {
        log::warn!("Could not format signing date with pattern {:?}", pattern);
        return pattern.to_string();
    }
    out
}

/// `&`, `<` and `>` as character references.
fn escape_markup(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for c in value.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            other => out.push(other),
        }
    }
    out
}

/// Substitutes placeholders in stamp templates.
#[derive(Debug, Clone, Copy, Default)]
pub struct TemplateResolver;

impl TemplateResolver {
    /// Resolve `template` against `cert` at time `now`.
    pub fn resolve<Tz>(template: &str, cert: &Certificate, now: &DateTime<Tz>) -> String
    where
        Tz: TimeZone,
        Tz::Offset: std::fmt::Display,
    {
        Self::resolve_fields(template, &CertificateFields::from(cert), now)
    }

    /// Resolve `template` against already-extracted certificate fields.
    ///
    /// All placeholders are replaced in a single pass, so substituted values
    /// are never scanned for further placeholders. Only the first
    /// `$$SIGNDATE=...$$` is replaced; later ones are left as written.
    /// Certificate values are escaped so they stay text inside the markup.
    pub fn resolve_fields<Tz>(template: &str, fields: &CertificateFields, now: &DateTime<Tz>) -> String
    where
        Tz: TimeZone,
        Tz::Offset: std::fmt::Display,
    {
        let mut date_done = false;
        RE_PLACEHOLDER
            .replace_all(template, |caps: &Captures<'_>| match Placeholder::from_captures(caps) {
                Some(Placeholder::SubjectCn) => escape_markup(&fields.subject_cn),
                Some(Placeholder::IssuerCn) => escape_markup(&fields.issuer_cn),
                Some(Placeholder::CertSerial) => escape_markup(&fields.serial),
                Some(Placeholder::SignDate(pattern)) if !date_done => {
                    date_done = true;
                    format_sign_date(&pattern, now)
                },
                _ => caps[0].to_string(),
            })
            .into_owned()
    }
}

/// A named stamp template.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StampTemplate {
    /// Stable identifier
    pub id: String,
    /// Name shown to the user
    pub display_name: String,
    /// Markup with placeholders
    pub markup: String,
}

impl StampTemplate {
    /// Create a template.
    pub fn new(id: impl Into<String>, display_name: impl Into<String>, markup: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            display_name: display_name.into(),
            markup: markup.into(),
        }
    }
}

impl Default for StampTemplate {
    fn default() -> Self {
        Self::new(DEFAULT_TEMPLATE_ID, "Default", DEFAULT_TEMPLATE_MARKUP)
    }
}

/// The configured templates and which one is active.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TemplateSet {
    templates: Vec<StampTemplate>,
    active: String,
}

impl Default for TemplateSet {
    fn default() -> Self {
        Self {
            templates: vec![StampTemplate::default()],
            active: DEFAULT_TEMPLATE_ID.to_string(),
        }
    }
}

impl TemplateSet {
    /// All templates in display order.
    pub fn templates(&self) -> &[StampTemplate] {
        &self.templates
    }

    /// Template with the given id.
    pub fn get(&self, id: &str) -> Option<&StampTemplate> {
        self.templates.iter().find(|t| t.id == id)
    }

    /// The active template, falling back to the first one.
    pub fn active(&self) -> Option<&StampTemplate> {
        self.get(&self.active).or_else(|| self.templates.first())
    }

    /// Id of the active template.
    pub fn active_id(&self) -> &str {
        &self.active
    }

    /// Make `id` the active template.
    pub fn set_active(&mut self, id: &str) -> Result<()> {
        if self.get(id).is_none() {
            return Err(Error::Config(format!("unknown stamp template '{}'", id)));
        }
        self.active = id.to_string();
        Ok(())
    }

    /// Add a template, replacing one with the same id.
    pub fn upsert(&mut self, template: StampTemplate) {
        match self.templates.iter_mut().find(|t| t.id == template.id) {
            Some(existing) => *existing = template,
            None => self.templates.push(template),
        }
    }

    /// Remove a template. The last remaining template cannot be removed.
    pub fn remove(&mut self, id: &str) -> Result<()> {
        if self.templates.len() <= 1 {
            return Err(Error::Config("cannot remove the only stamp template".to_string()));
        }
        self.templates.retain(|t| t.id != id);
        if self.get(&self.active).is_none() {
            if let Some(first) = self.templates.first() {
                self.active = first.id.clone();
            }
        }
        Ok(())
    }
}
