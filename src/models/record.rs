//! Record mapping.
//!
//! A record type registers how result columns land in its fields by
//! implementing [`Record`], usually through [`impl_record!`](crate::impl_record).
//! Matching is by exact column label; unmatched columns are ignored and
//! unmatched fields keep their default.

use crate::error::DbResult;
use crate::models::value::Value;

/// A caller-defined shape that rows can be projected onto.
pub trait Record: Default {
    /// Store `value` into the field mapped to `column`.
    ///
    /// Returns `Ok(false)` when no field is mapped to `column`.
    fn assign(&mut self, column: &str, value: Value) -> DbResult<bool>;
}

/// Implement [`Record`] for a struct by listing its fields.
///
/// Each field matches the column of the same name, or the label given
/// after `=>`. A NULL column leaves the field at its default.
///
/// ```
/// use simple_db::impl_record;
///
/// #[derive(Debug, Default)]
/// struct Article {
///     id: i64,
///     title: String,
///     is_blind: bool,
/// }
///
/// impl_record!(Article { id, title, is_blind => "isBlind" });
/// ```
#[macro_export]
macro_rules! impl_record {
    ($ty:ty { $($field:ident $(=> $column:literal)?),+ $(,)? }) => {
        impl $crate::Record for $ty {
            fn assign(
                &mut self,
                column: &str,
                value: $crate::Value,
            ) -> $crate::DbResult<bool> {
                $(
                    if column == $crate::impl_record!(@column $field $(, $column)?) {
                        if !value.is_null() {
                            self.$field = $crate::FromValue::from_value(value)
                                .map_err(|e| e.for_column(column))?;
                        }
                        return Ok(true);
                    }
                )+
                Ok(false)
            }
        }
    };
    (@column $field:ident) => {
        stringify!($field)
    };
    (@column $field:ident, $column:literal) => {
        $column
    };
}
