//! Field selection: the `detail` each mutation publishes.
//!
//! Only the listed fields are copied from the caller's arguments; anything
//! else in the argument object is dropped.

use crate::event::{Detail, Mutation};
use serde_json::{json, Value};

/// A required argument is absent or not a string.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ArgumentError {
    #[error("missing argument '{0}'")]
    Missing(&'static str),

    #[error("argument '{0}' must be a string")]
    NotAString(&'static str),
}

/// Argument paths (dot separated) read for `mutation`, paired with the
/// detail field each one fills.
pub fn detail_fields(mutation: Mutation) -> &'static [(&'static str, &'static str)] {
    match mutation {
        Mutation::AddTimeSlot => &[("timeSlot.from", "from"), ("timeSlot.to", "to")],
        Mutation::AddBookingRequest => &[("id", "id"), ("userName", "userName")],
        Mutation::DeleteTimeSlot
        | Mutation::BookTimeSlot
        | Mutation::DeleteBookingRequest
        | Mutation::CancelBooking
        | Mutation::ResetAllBookings => &[("id", "id")],
    }
}

/// Builds the event detail for `mutation` from the caller's arguments.
pub fn build_detail(mutation: Mutation, args: &Value) -> Result<Detail, ArgumentError> {
    let mut detail = Detail::new();
    for &(path, field) in detail_fields(mutation) {
        let value = lookup(args, path).ok_or(ArgumentError::Missing(path))?;
        let value = value.as_str().ok_or(ArgumentError::NotAString(path))?;
        detail.insert(field.to_string(), json!(value));
    }
    Ok(detail)
}

fn lookup<'a>(args: &'a Value, path: &str) -> Option<&'a Value> {
    path.split('.')
        .try_fold(args, |value, key| value.get(key))
        .filter(|v| !v.is_null())
}
