use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Client mutations accepted by the booking API.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Mutation {
    AddTimeSlot,
    DeleteTimeSlot,
    BookTimeSlot,
    AddBookingRequest,
    DeleteBookingRequest,
    CancelBooking,
    ResetAllBookings,
}

impl Mutation {
    pub const ALL: [Mutation; 7] = [
        Mutation::AddTimeSlot,
        Mutation::DeleteTimeSlot,
        Mutation::BookTimeSlot,
        Mutation::AddBookingRequest,
        Mutation::DeleteBookingRequest,
        Mutation::CancelBooking,
        Mutation::ResetAllBookings,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Mutation::AddTimeSlot => "addTimeSlot",
            Mutation::DeleteTimeSlot => "deleteTimeSlot",
            Mutation::BookTimeSlot => "bookTimeSlot",
            Mutation::AddBookingRequest => "addBookingRequest",
            Mutation::DeleteBookingRequest => "deleteBookingRequest",
            Mutation::CancelBooking => "cancelBooking",
            Mutation::ResetAllBookings => "resetAllBookings",
        }
    }
}

impl fmt::Display for Mutation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Returned when a name is not one of the seven mutations.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unsupported mutation '{0}'")]
pub struct UnknownMutation(pub String);

impl FromStr for Mutation {
    type Err = UnknownMutation;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Mutation::ALL
            .into_iter()
            .find(|m| m.as_str() == s)
            .ok_or_else(|| UnknownMutation(s.to_string()))
    }
}
