//! Public order identifiers (`ORD-1A2B3C4D`).
//!
//! The database key of an order never leaves the server; customers, emails and
//! URLs use the order number instead.

use core::fmt;
use core::str::FromStr;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

const PREFIX: &str = "ORD-";
const SUFFIX_LEN: usize = 8;

/// Errors that can occur when parsing an [`OrderNumber`].
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
#[error("invalid order number {0:?}: expected ORD- followed by 8 hex digits")]
pub struct OrderNumberError(pub String);

/// A human-facing, immutable order identifier.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct OrderNumber(String);

impl OrderNumber {
    /// Generate a fresh random order number.
    ///
    /// Uniqueness is enforced by the database; a collision surfaces as a
    /// failed insert, never as a silent overwrite.
    #[must_use]
    pub fn generate() -> Self {
        let hex = Uuid::new_v4().simple().to_string().to_uppercase();
        let suffix: String = hex.chars().take(SUFFIX_LEN).collect();
        Self(format!("{PREFIX}{suffix}"))
    }

    /// Parse an order number, accepting lower-case hex.
    ///
    /// # Errors
    ///
    /// Returns [`OrderNumberError`] if the input is not `ORD-` plus 8 hex digits.
    pub fn parse(input: &str) -> Result<Self, OrderNumberError> {
        let trimmed = input.trim();
        let upper = trimmed.to_uppercase();
        let valid = upper
            .strip_prefix(PREFIX)
            .is_some_and(|rest| rest.len() == SUFFIX_LEN && rest.chars().all(|c| c.is_ascii_hexdigit()));
        if valid {
            Ok(Self(upper))
        } else {
            Err(OrderNumberError(input.to_owned()))
        }
    }

    /// The order number as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for OrderNumber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for OrderNumber {
    type Err = OrderNumberError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<String> for OrderNumber {
    type Error = OrderNumberError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<OrderNumber> for String {
    fn from(number: OrderNumber) -> Self {
        number.0
    }
}

#[cfg(feature = "postgres")]
impl sqlx::Type<sqlx::Postgres> for OrderNumber {
    fn type_info() -> sqlx::postgres::PgTypeInfo {
        <String as sqlx::Type<sqlx::Postgres>>::type_info()
    }

    fn compatible(ty: &sqlx::postgres::PgTypeInfo) -> bool {
        <String as sqlx::Type<sqlx::Postgres>>::compatible(ty)
    }
}

#[cfg(feature = "postgres")]
impl<'r> sqlx::Decode<'r, sqlx::Postgres> for OrderNumber {
    fn decode(value: sqlx::postgres::PgValueRef<'r>) -> Result<Self, sqlx::error::BoxDynError> {
        let s = <String as sqlx::Decode<sqlx::Postgres>>::decode(value)?;
        Ok(Self::parse(&s)?)
    }
}

#[cfg(feature = "postgres")]
impl sqlx::Encode<'_, sqlx::Postgres> for OrderNumber {
    fn encode_by_ref(
        &self,
        buf: &mut sqlx::postgres::PgArgumentBuffer,
    ) -> Result<sqlx::encode::IsNull, sqlx::error::BoxDynError> {
        <String as sqlx::Encode<sqlx::Postgres>>::encode_by_ref(&self.0, buf)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_generate_format() {
        let number = OrderNumber::generate();
        assert!(number.as_str().starts_with("ORD-"));
        assert_eq!(number.as_str().len(), 12);
        assert!(OrderNumber::parse(number.as_str()).is_ok());
    }

    #[test]
    fn test_parse_normalizes_case() {
        let number = OrderNumber::parse("ord-00ff12ab").unwrap();
        assert_eq!(number.as_str(), "ORD-00FF12AB");
    }

    #[test]
    fn test_parse_rejects_bad_input() {
        assert!(OrderNumber::parse("ORD-123").is_err());
        assert!(OrderNumber::parse("ORD-ZZZZZZZZ").is_err());
        assert!(OrderNumber::parse("INV-00FF12AB").is_err());
    }
}
