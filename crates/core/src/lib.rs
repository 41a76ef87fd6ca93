//! Back-office domain logic shared by the HTTP service and UI helpers.
//!
//! [`search_params`] reconciles link targets with the current location and
//! [`pay_period`] maps dates onto the biweekly payroll grid. Both are pure and
//! take every ambient input (current href, time zone) as an argument.
pub mod pay_period;
pub mod search_params;

pub use pay_period::{PayPeriod, PayPeriodCalendar, PayPeriodError};
pub use search_params::{
    resolve, NavigationRequest, PreservationPolicy, QueryMap, ResolvedNavigation,
    SearchParamError,
};
