use std::fmt;
use openssl::error::ErrorStack;
use openssl::nid::Nid;
use openssl::x509::{X509Name, X509NameBuilder};
use serde_derive::{Deserialize, Serialize};

/// Subject of a generated certificate. `/` is the field delimiter of the
/// string form, so no field may contain one.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize, Serialize)]
pub struct DistinguishedName {
    #[serde(rename = "CN")]
    pub cn: String,
    #[serde(rename = "O", default, skip_serializing_if = "Option::is_none")]
    pub o: Option<String>,
    #[serde(rename = "OU", default, skip_serializing_if = "Option::is_none")]
    pub ou: Option<String>,
}

impl DistinguishedName {
    pub fn new(cn: impl Into<String>) -> Self {
        DistinguishedName {
            cn: cn.into(),
            o: None,
            ou: None,
        }
    }

    pub fn organization(mut self, o: impl Into<String>) -> Self {
        self.o = Some(o.into());
        self
    }

    pub fn organizational_unit(mut self, ou: impl Into<String>) -> Self {
        self.ou = Some(ou.into());
        self
    }

    pub fn is_valid(&self) -> bool {
        self.fields().all(|(_, value)| !value.contains('/'))
    }

    // Present fields in subject order; empty O/OU count as absent.
    fn fields(&self) -> impl Iterator<Item = (&'static str, &str)> {
        [
            ("CN", Some(self.cn.as_str())),
            ("O", self.o.as_deref()),
            ("OU", self.ou.as_deref()),
        ]
        .into_iter()
        .filter_map(|(name, value)| match value {
            Some(v) if name == "CN" || !v.is_empty() => Some((name, v)),
            _ => None,
        })
    }

    pub(crate) fn to_x509_name(&self) -> Result<X509Name, ErrorStack> {
        let mut builder = X509NameBuilder::new()?;
        for (field, value) in self.fields() {
            let nid = match field {
                "CN" => Nid::COMMONNAME,
                "O" => Nid::ORGANIZATIONNAME,
                _ => Nid::ORGANIZATIONALUNITNAME,
            };
            builder.append_entry_by_nid(nid, value)?;
        }
        Ok(builder.build())
    }
}

impl fmt::Display for DistinguishedName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (field, value) in self.fields() {
            write!(f, "/{}={}", field, value)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cn_only_formats_as_single_field() {
        let dn = DistinguishedName::new("DeadlineRCS");
        assert!(dn.is_valid());
        assert_eq!(dn.to_string(), "/CN=DeadlineRCS");
    }

    #[test]
    fn all_fields_format_in_order() {
        let dn = DistinguishedName::new("host")
            .organization("AWS")
            .organizational_unit("Thinkbox");
        assert_eq!(dn.to_string(), "/CN=host/O=AWS/OU=Thinkbox");
        assert_eq!(DistinguishedName::new("host").organization("").to_string(), "/CN=host");
    }

    #[test]
    fn slash_in_any_field_is_invalid() {
        assert!(!DistinguishedName::new("a/b").is_valid());
        assert!(!DistinguishedName::new("a").organization("b/c").is_valid());
        assert!(!DistinguishedName::new("a").organizational_unit("/").is_valid());
    }

    #[test]
    fn decodes_cloudformation_properties() {
        let dn: DistinguishedName =
            serde_json::from_str(r#"{"CN": "ca", "OU": "render"}"#).unwrap();
        assert_eq!(dn, DistinguishedName::new("ca").organizational_unit("render"));
        assert!(serde_json::from_str::<DistinguishedName>(r#"{"O": "x"}"#).is_err());
    }
}
