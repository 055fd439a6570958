//! Newtype IDs for type-safe entity references.
//!
//! Use the `define_id!` macro to create ID wrappers that prevent accidentally
//! passing a product ID where an order ID is expected.

/// Error returned when an ID cannot be parsed from text.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
#[error("invalid id {input:?}: must be a positive integer")]
pub struct ParseIdError {
    /// The rejected input.
    pub input: String,
}

/// Macro to define a type-safe ID wrapper.
///
/// Creates a newtype wrapper around `i32` with:
/// - `Serialize`/`Deserialize` with `#[serde(transparent)]`
/// - `Debug`, `Clone`, `Copy`, `PartialEq`, `Eq`, `Hash`, `Ord`
/// - Conversion methods: `new()`, `as_i32()`
/// - `FromStr` accepting positive integers only (session keys are strings)
/// - `sqlx` `Type`, `Encode`, and `Decode` implementations (with `postgres` feature)
///
/// # Example
///
/// ```rust
/// # use bazaar_core::define_id;
/// define_id!(WidgetId);
///
/// let id: WidgetId = "42".parse().unwrap();
/// assert_eq!(id.as_i32(), 42);
/// assert!("-1".parse::<WidgetId>().is_err());
/// ```
#[macro_export]
macro_rules! define_id {
    ($name:ident) => {
        #[derive(
            Debug,
            Clone,
            Copy,
            PartialEq,
            Eq,
            Hash,
            PartialOrd,
            Ord,
            ::serde::Serialize,
            ::serde::Deserialize
        )]
        #[serde(transparent)]
        pub struct $name(i32);

        impl $name {
            /// Create a new ID from an i32 value.
            #[must_use]
            pub const fn new(id: i32) -> Self {
                Self(id)
            }

            /// Get the underlying i32 value.
            #[must_use]
            pub const fn as_i32(&self) -> i32 {
                self.0
            }
        }

        impl ::core::fmt::Display for $name {
            fn fmt(&self, f: &mut ::core::fmt::Formatter<'_>) -> ::core::fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl ::core::str::FromStr for $name {
            type Err = $crate::types::id::ParseIdError;

            fn from_str(s: &str) -> ::core::result::Result<Self, Self::Err> {
                match s.parse::<i32>() {
                    Ok(id) if id > 0 => Ok(Self(id)),
                    _ => Err($crate::types::id::ParseIdError {
                        input: s.to_owned(),
                    }),
                }
            }
        }

        impl From<i32> for $name {
            fn from(id: i32) -> Self {
                Self(id)
            }
        }

        impl From<$name> for i32 {
            fn from(id: $name) -> Self {
                id.0
            }
        }

        #[cfg(feature = "postgres")]
        impl ::sqlx::Type<::sqlx::Postgres> for $name {
            fn type_info() -> ::sqlx::postgres::PgTypeInfo {
                <i32 as ::sqlx::Type<::sqlx::Postgres>>::type_info()
            }

            fn compatible(ty: &::sqlx::postgres::PgTypeInfo) -> bool {
                <i32 as ::sqlx::Type<::sqlx::Postgres>>::compatible(ty)
            }
        }

        #[cfg(feature = "postgres")]
        impl<'r> ::sqlx::Decode<'r, ::sqlx::Postgres> for $name {
            fn decode(
                value: ::sqlx::postgres::PgValueRef<'r>,
            ) -> ::core::result::Result<Self, ::sqlx::error::BoxDynError> {
                let id = <i32 as ::sqlx::Decode<::sqlx::Postgres>>::decode(value)?;
                Ok(Self(id))
            }
        }

        #[cfg(feature = "postgres")]
        impl ::sqlx::Encode<'_, ::sqlx::Postgres> for $name {
            fn encode_by_ref(
                &self,
                buf: &mut ::sqlx::postgres::PgArgumentBuffer,
            ) -> ::std::result::Result<::sqlx::encode::IsNull, ::sqlx::error::BoxDynError> {
                <i32 as ::sqlx::Encode<::sqlx::Postgres>>::encode_by_ref(&self.0, buf)
            }
        }
    };
}

define_id!(UserId);
define_id!(StoreId);
define_id!(ProductId);
define_id!(OrderId);
define_id!(OrderItemId);
define_id!(ReviewId);

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_positive_id() {
        let id: ProductId = "17".parse().unwrap();
        assert_eq!(id, ProductId::new(17));
    }

    #[test]
    fn test_parse_rejects_zero_and_negative() {
        assert!("0".parse::<ProductId>().is_err());
        assert!("-3".parse::<ProductId>().is_err());
    }

    #[test]
    fn test_parse_rejects_garbage() {
        let err = "abc".parse::<UserId>().unwrap_err();
        assert_eq!(err.input, "abc");
    }

    #[test]
    fn test_ids_order_numerically() {
        let mut ids = vec![ProductId::new(10), ProductId::new(2), ProductId::new(7)];
        ids.sort();
        assert_eq!(ids, vec![ProductId::new(2), ProductId::new(7), ProductId::new(10)]);
    }

    #[test]
    fn test_display_matches_inner_value() {
        assert_eq!(OrderId::new(5).to_string(), "5");
    }
}
