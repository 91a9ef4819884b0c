use openssl::asn1::Asn1Time;
use openssl::error::ErrorStack;
use time::{Duration, OffsetDateTime};

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Validity {
    pub not_before: OffsetDateTime,
    pub not_after: OffsetDateTime,
}

impl Validity {
    pub fn days_from(not_before: OffsetDateTime, days: u32) -> Validity {
        Validity {
            not_before,
            not_after: not_before + Duration::days(i64::from(days)),
        }
    }

    pub fn days_from_now(days: u32) -> Validity {
        Self::days_from(OffsetDateTime::now_utc(), days)
    }

    pub fn to_asn1(&self) -> Result<(Asn1Time, Asn1Time), ErrorStack> {
        Ok((
            Asn1Time::from_unix(self.not_before.unix_timestamp())?,
            Asn1Time::from_unix(self.not_after.unix_timestamp())?,
        ))
    }
}
