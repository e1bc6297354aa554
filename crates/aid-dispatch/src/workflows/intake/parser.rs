use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Deserializer};

use crate::workflows::distribution::domain::{
    AreaCode, Beneficiary, BeneficiaryId, EnrollmentStatus,
};

/// One registration row as exported by the intake spreadsheet.
#[derive(Debug, Deserialize)]
pub(crate) struct BeneficiaryRow {
    id: String,
    national_id: String,
    full_name: String,
    phone: String,
    governorate: String,
    #[serde(default)]
    district: String,
    household_size: u8,
    #[serde(deserialize_with = "flag")]
    has_children: bool,
    #[serde(deserialize_with = "flag")]
    has_elderly: bool,
    #[serde(default)]
    total_packages: u32,
    #[serde(default, deserialize_with = "empty_string_as_none")]
    last_received_on: Option<String>,
    #[serde(default, deserialize_with = "empty_string_as_none")]
    added_on: Option<String>,
}

impl BeneficiaryRow {
    /// Builds the directory record; `as_of` stands in for a missing registration date.
    pub(crate) fn into_beneficiary(self, as_of: DateTime<Utc>) -> Result<Beneficiary, String> {
        let last_received_at = self
            .last_received_on
            .as_deref()
            .map(|raw| parse_date(raw).ok_or_else(|| format!("invalid last_received_on '{raw}'")))
            .transpose()?;
        let added_at = match self.added_on.as_deref() {
            Some(raw) => parse_date(raw).ok_or_else(|| format!("invalid added_on '{raw}'"))?,
            None => as_of,
        };

        Ok(Beneficiary {
            id: BeneficiaryId(self.id),
            national_id: self.national_id,
            full_name: self.full_name,
            phone: normalize_phone(&self.phone),
            governorate: AreaCode(self.governorate.to_ascii_lowercase()),
            district: self.district,
            household_size: self.household_size,
            has_children: self.has_children,
            has_elderly: self.has_elderly,
            total_packages: self.total_packages,
            last_received_at,
            added_at,
            status: EnrollmentStatus::Active,
        })
    }
}

fn flag<'de, D>(deserializer: D) -> Result<bool, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = String::deserialize(deserializer)?;
    parse_flag(&raw).ok_or_else(|| serde::de::Error::custom(format!("invalid flag '{raw}'")))
}

fn empty_string_as_none<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let opt = Option::<String>::deserialize(deserializer)?;
    Ok(opt.filter(|value| !value.trim().is_empty()))
}

pub(crate) fn parse_flag(raw: &str) -> Option<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "true" | "yes" | "1" => Some(true),
        "false" | "no" | "0" | "" => Some(false),
        _ => None,
    }
}

/// Dates are calendar days at UTC midnight.
pub(crate) fn parse_date(raw: &str) -> Option<DateTime<Utc>> {
    let trimmed = raw.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(trimmed) {
        return Some(dt.with_timezone(&Utc));
    }
    NaiveDate::parse_from_str(trimmed, "%Y-%m-%d")
        .ok()
        .and_then(|date| date.and_hms_opt(0, 0, 0))
        .map(|naive| naive.and_utc())
}

fn normalize_phone(raw: &str) -> String {
    raw.chars().filter(|c| !matches!(c, ' ' | '-')).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn flags_accept_common_spellings() {
        assert_eq!(parse_flag("Yes"), Some(true));
        assert_eq!(parse_flag("1"), Some(true));
        assert_eq!(parse_flag(" false "), Some(false));
        assert_eq!(parse_flag(""), Some(false));
        assert_eq!(parse_flag("maybe"), None);
    }

    #[test]
    fn dates_support_plain_days_and_rfc3339() {
        assert_eq!(
            parse_date("2025-03-01"),
            Some(Utc.with_ymd_and_hms(2025, 3, 1, 0, 0, 0).unwrap())
        );
        assert_eq!(
            parse_date("2025-03-01T10:30:00Z"),
            Some(Utc.with_ymd_and_hms(2025, 3, 1, 10, 30, 0).unwrap())
        );
        assert!(parse_date("01/03/2025").is_none());
    }

    #[test]
    fn phone_separators_are_stripped() {
        assert_eq!(normalize_phone("059-123 4567"), "0591234567");
    }
}
