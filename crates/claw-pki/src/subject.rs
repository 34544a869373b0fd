//! Subject construction from prompted answers.
//!
//! The command layer asks a fixed list of questions and hands the answers
//! over in order. [`build_subject`] turns them into a [`Subject`] and the
//! list of SAN candidates taken from the Common-Name answer.

use serde::Serialize;
use tracing::debug;

use crate::error::{Error, Result};
use crate::template::TemplateKind;

/// Object identifier of the PKCS#9 `emailAddress` attribute.
pub const OID_EMAIL_ADDRESS: &[u64] = &[1, 2, 840, 113549, 1, 9, 1];

/// Questions asked for a certificate subject (no e-mail).
pub const CERTIFICATE_QUESTIONS: &[&str] = &[
    "Common Name - SAN (eg, FQDN or IP)* []",
    "Country Name (2 letter code) [AU]",
    "State or Province Name []",
    "Locality Name (eg, city) []",
    "Organization Name [eg, company]",
    "Organizational Unit Name (eg, section) []",
    "Street Addr []",
    "Postal Code []",
];

/// Questions asked for a request subject (e-mail second).
pub const REQUEST_QUESTIONS: &[&str] = &[
    "Common Name - SAN (eg, FQDN or IP)* []",
    "E-mail address* []",
    "Country Name (2 letter code) [AU]",
    "State or Province Name []",
    "Locality Name (eg, city) []",
    "Organization Name [eg, company]",
    "Organizational Unit Name (eg, section) []",
    "Street Addr []",
    "Postal Code []",
];

/// Multi-valued distinguished-name attributes a [`Subject`] carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum NameAttribute {
    /// `C`
    Country,
    /// `ST`
    Province,
    /// `L`
    Locality,
    /// `O`
    Organization,
    /// `OU`
    OrganizationalUnit,
    /// `street`
    StreetAddress,
    /// `postalCode`
    PostalCode,
}

impl NameAttribute {
    /// All attributes in encoding order.
    pub const ALL: [Self; 7] = [
        Self::Country,
        Self::Province,
        Self::Locality,
        Self::Organization,
        Self::OrganizationalUnit,
        Self::StreetAddress,
        Self::PostalCode,
    ];

    /// Returns the X.520 object identifier arcs.
    #[must_use]
    pub const fn oid(&self) -> &'static [u64] {
        match self {
            Self::Country => &[2, 5, 4, 6],
            Self::Province => &[2, 5, 4, 8],
            Self::Locality => &[2, 5, 4, 7],
            Self::Organization => &[2, 5, 4, 10],
            Self::OrganizationalUnit => &[2, 5, 4, 11],
            Self::StreetAddress => &[2, 5, 4, 9],
            Self::PostalCode => &[2, 5, 4, 17],
        }
    }

    /// Returns the short name used in distinguished-name strings.
    #[must_use]
    pub const fn short_name(&self) -> &'static str {
        match self {
            Self::Country => "C",
            Self::Province => "ST",
            Self::Locality => "L",
            Self::Organization => "O",
            Self::OrganizationalUnit => "OU",
            Self::StreetAddress => "street",
            Self::PostalCode => "postalCode",
        }
    }
}

/// An attribute carried outside the named subject fields.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ExtraAttribute {
    /// Object identifier arcs.
    pub oid: Vec<u64>,
    /// IA5 string value.
    pub value: String,
}

/// Certificate subject.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Subject {
    /// Common name; never empty in a built subject.
    pub common_name: String,
    /// Country codes.
    pub country: Vec<String>,
    /// States or provinces.
    pub province: Vec<String>,
    /// Localities.
    pub locality: Vec<String>,
    /// Organizations.
    pub organization: Vec<String>,
    /// Organizational units.
    pub organizational_unit: Vec<String>,
    /// Street addresses.
    pub street_address: Vec<String>,
    /// Postal codes.
    pub postal_code: Vec<String>,
    /// E-mail address; only set for certificate requests.
    pub email: Option<String>,
    /// Attributes with no named field, such as the request e-mail.
    pub extra_attributes: Vec<ExtraAttribute>,
}

impl Subject {
    /// Creates a subject with only a common name.
    #[must_use]
    pub fn new(common_name: impl Into<String>) -> Self {
        Self {
            common_name: common_name.into(),
            ..Self::default()
        }
    }

    /// Returns the values of a multi-valued attribute.
    #[must_use]
    pub fn values(&self, attribute: NameAttribute) -> &[String] {
        match attribute {
            NameAttribute::Country => &self.country,
            NameAttribute::Province => &self.province,
            NameAttribute::Locality => &self.locality,
            NameAttribute::Organization => &self.organization,
            NameAttribute::OrganizationalUnit => &self.organizational_unit,
            NameAttribute::StreetAddress => &self.street_address,
            NameAttribute::PostalCode => &self.postal_code,
        }
    }

    fn values_mut(&mut self, attribute: NameAttribute) -> &mut Vec<String> {
        match attribute {
            NameAttribute::Country => &mut self.country,
            NameAttribute::Province => &mut self.province,
            NameAttribute::Locality => &mut self.locality,
            NameAttribute::Organization => &mut self.organization,
            NameAttribute::OrganizationalUnit => &mut self.organizational_unit,
            NameAttribute::StreetAddress => &mut self.street_address,
            NameAttribute::PostalCode => &mut self.postal_code,
        }
    }

    /// Returns the extra attributes carrying the PKCS#9 e-mail OID.
    pub fn email_attributes(&self) -> impl Iterator<Item = &ExtraAttribute> {
        self.extra_attributes
            .iter()
            .filter(|attr| attr.oid == OID_EMAIL_ADDRESS)
    }

    /// Sets the e-mail extra attribute, replacing any previous one.
    pub fn set_email_attribute(&mut self, email: &str) {
        self.extra_attributes
            .retain(|attr| attr.oid != OID_EMAIL_ADDRESS);
        self.extra_attributes.push(ExtraAttribute {
            oid: OID_EMAIL_ADDRESS.to_vec(),
            value: email.to_string(),
        });
    }
}

/// Question list for a template kind.
#[must_use]
pub const fn questions(kind: TemplateKind) -> &'static [&'static str] {
    match kind {
        TemplateKind::Leaf => CERTIFICATE_QUESTIONS,
        TemplateKind::Ca | TemplateKind::Csr => REQUEST_QUESTIONS,
    }
}

/// A subject together with the SAN candidates from the Common-Name answer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubjectAnswers {
    /// The built subject.
    pub subject: Subject,
    /// Comma-separated Common-Name answer, split and trimmed.
    pub sans: Vec<String>,
}

/// Builds a subject from answers to [`questions`]`(kind)`.
///
/// The first Common-Name/SAN entry becomes the common name. Multi-value
/// answers are split on commas; blank entries are dropped, so an empty
/// answer produces an empty sequence.
///
/// # Errors
///
/// Returns [`Error::Validation`] if the answer count does not match the
/// question list, the Common-Name answer is empty, or the e-mail answer is
/// empty for a CSR.
pub fn build_subject<S: AsRef<str>>(kind: TemplateKind, answers: &[S]) -> Result<SubjectAnswers> {
    let expected = questions(kind).len();
    if answers.len() != expected {
        return Err(Error::Validation(format!(
            "expected {expected} answers, got {}",
            answers.len()
        )));
    }

    let mut answers = answers.iter().map(AsRef::as_ref);
    let sans = split_values(answers.next().unwrap_or_default());
    let Some(common_name) = sans.first().cloned() else {
        return Err(Error::Validation("Common Name - SAN cannot be empty".into()));
    };

    let mut subject = Subject::new(common_name);

    if kind != TemplateKind::Leaf {
        let email = answers.next().unwrap_or_default().trim();
        match kind {
            TemplateKind::Csr if email.is_empty() => {
                return Err(Error::Validation("E-mail address cannot be empty".into()));
            }
            TemplateKind::Csr => subject.email = Some(email.to_string()),
            _ => debug!("e-mail answer is only used for certificate requests"),
        }
    }

    for (attribute, answer) in NameAttribute::ALL.into_iter().zip(answers) {
        *subject.values_mut(attribute) = split_values(answer);
    }

    Ok(SubjectAnswers { subject, sans })
}

fn split_values(answer: &str) -> Vec<String> {
    answer
        .split(',')
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map(String::from)
        .collect()
}
